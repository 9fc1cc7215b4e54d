#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "rollcall: replay record events through the registration handlers",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        // A broken user config must not stop `init` or `completions`; the
        // commands that need it report the parse error themselves.
        let user = rollcall_core::config::load_user_config().unwrap_or_default();
        resolve_output_mode(self.json, user.output.as_deref())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Project",
        about = "Initialize a rollcall project",
        long_about = "Create .rollcall/ with a starter config and an empty record store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    rollcall init\n\n    # Recreate the config and store files, keeping records\n    rollcall init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Records",
        about = "Import records into the store",
        long_about = "Load a JSON array of records into the local store, replacing records with the same entity and id.",
        after_help = "EXAMPLES:\n    # Import fixtures\n    rollcall import fixtures.json\n\n    # Read from a pipe\n    cat fixtures.json | rollcall import -"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Records",
        about = "Show one record",
        after_help = "EXAMPLES:\n    # Show a training slot\n    rollcall show ctail_trainingslot 6f1c...\n\n    # Only the seat counters\n    rollcall show ctail_trainingslot 6f1c... -f ctail_filledupseats -f ctail_totalseats"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Events",
        about = "Dispatch one event",
        long_about = "Run a raw platform event through the handlers of its entity against the local store. Exits non-zero when the operation is rejected.",
        after_help = "EXAMPLES:\n    # Replay a registration create\n    rollcall dispatch create-registration.json\n\n    # Without calling the email validator\n    rollcall dispatch create-registration.json --offline --json"
    )]
    Dispatch(cmd::dispatch::DispatchArgs),

    #[command(
        next_help_heading = "Events",
        about = "Rewrite a filter document",
        long_about = "Splice a list of references into a stored filter document, offline.",
        after_help = "EXAMPLES:\n    rollcall rewrite filter.json --refs groups.json -o filter.new.json"
    )]
    Rewrite(cmd::rewrite::RewriteArgs),

    #[command(
        next_help_heading = "Project",
        about = "Show the effective configuration"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Project",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    rollcall completions zsh > _rollcall"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// Filter directives used when `ROLLCALL_LOG` is unset.
const fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "rollcall=debug,info"
    } else {
        "rollcall=info,warn"
    }
}

fn init_tracing(verbose: bool) {
    let verbose = verbose || env::var("DEBUG").is_ok();
    let filter = EnvFilter::try_from_env("ROLLCALL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let format = env::var("ROLLCALL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, output: OutputMode) -> anyhow::Result<ExitCode> {
    let project_root = env::current_dir()?;
    debug!(root = %project_root.display(), ?output, "starting");

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &project_root)?,
        Commands::Import(args) => cmd::import::run_import(args, output, &project_root)?,
        Commands::Show(args) => cmd::show::run_show(args, output, &project_root)?,
        Commands::Dispatch(args) => {
            return cmd::dispatch::run_dispatch(args, output, &project_root);
        }
        Commands::Rewrite(args) => cmd::rewrite::run_rewrite(args)?,
        Commands::Config(args) => cmd::config::run_config(args, output, &project_root)?,
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();
    match run(&cli, output) {
        Ok(code) => code,
        Err(err) => {
            debug!(error = ?err, "command failed");
            if let Err(render) = render_error(output, &CliError::from(&err)) {
                eprintln!("error: {err:#} ({render})");
            }
            ExitCode::FAILURE
        }
    }
}
