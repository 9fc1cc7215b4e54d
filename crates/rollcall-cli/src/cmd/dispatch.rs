//! `rollcall dispatch`: replay one platform event against the local store.
//!
//! The store is taken as it stands after the triggering write, so the
//! record the event describes should already be imported. Rejections are
//! printed to stderr and end the process with a non-zero status.

use anyhow::{Context as _, Result};
use clap::Args;
use rollcall_core::config::{EffectiveConfig, resolve_config};
use rollcall_core::event::RawEvent;
use rollcall_core::handlers::entity_list::ListOutcome;
use rollcall_core::handlers::rollup::RollupOutcome;
use rollcall_core::handlers::validator::{ExternalValidator, HttpValidator, NoopValidator};
use rollcall_core::handlers::{Dispatcher, Outcome, Services};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::{open_store, read_input};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Raw event JSON file; `-` reads stdin.
    pub event: PathBuf,

    /// Skip the external email validator regardless of configuration.
    #[arg(long)]
    pub offline: bool,
}

fn validator_for(config: &EffectiveConfig, offline: bool) -> Box<dyn ExternalValidator> {
    if offline || !config.project.validator.enabled {
        Box::new(NoopValidator)
    } else {
        Box::new(HttpValidator::new(config.project.validator.base_url.clone()))
    }
}

fn write_rollup(w: &mut dyn Write, rollup: &RollupOutcome) -> io::Result<()> {
    match rollup {
        RollupOutcome::Written { parent, field, value } => {
            pretty_kv(w, "rollup", format!("{parent}.{field} = {value}"))
        }
        RollupOutcome::NoRows { parent } => pretty_kv(w, "rollup", format!("{parent}: no rows")),
    }
}

fn write_list(w: &mut dyn Write, list: &ListOutcome) -> io::Result<()> {
    match list {
        ListOutcome::Rewritten { list, conditions } => {
            pretty_kv(w, "list", format!("{list} rewritten ({conditions} condition(s))"))
        }
        ListOutcome::NoDocument { list } => pretty_kv(w, "list", format!("{list}: no document")),
    }
}

fn text_line(outcome: &Outcome, w: &mut dyn Write) -> io::Result<()> {
    match outcome {
        Outcome::Completed(report) => {
            write!(w, "completed\tvalidations={}", report.validations.join(","))?;
            if let Some(RollupOutcome::Written { field, value, .. }) = &report.rollup {
                write!(w, "\t{field}={value}")?;
            }
            if let Some(ListOutcome::Rewritten { conditions, .. }) = &report.list {
                write!(w, "\tconditions={conditions}")?;
            }
            writeln!(w)
        }
        Outcome::Skipped { reason } => writeln!(w, "skipped\t{reason}"),
    }
}

fn pretty(outcome: &Outcome, w: &mut dyn Write) -> io::Result<()> {
    match outcome {
        Outcome::Completed(report) => {
            pretty_section(w, "Completed")?;
            let steps = if report.validations.is_empty() {
                "-".to_string()
            } else {
                report.validations.join(", ")
            };
            pretty_kv(w, "validations", steps)?;
            if let Some(rollup) = &report.rollup {
                write_rollup(w, rollup)?;
            }
            if let Some(list) = &report.list {
                write_list(w, list)?;
            }
            Ok(())
        }
        Outcome::Skipped { reason } => {
            pretty_section(w, "Skipped")?;
            pretty_kv(w, "reason", reason.to_string())
        }
    }
}

/// # Errors
///
/// Returns an error if the project, the configuration or the event cannot be
/// loaded. A rejection is not an error: it is rendered and reported through
/// the exit code.
pub fn run_dispatch(
    args: &DispatchArgs,
    output: OutputMode,
    project_root: &Path,
) -> Result<ExitCode> {
    let config = resolve_config(project_root, output.is_json())?;
    let store = open_store(project_root)?;
    let zones = config.project.zones()?;
    let validator = validator_for(&config, args.offline);

    let text = read_input(&args.event)?;
    let raw: RawEvent = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse event from {}", args.event.display()))?;

    let dispatcher = Dispatcher::new(config.project.catalog(), config.project.settings());
    let services = Services {
        store: &store,
        zones: &zones,
        validator: validator.as_ref(),
    };

    match dispatcher.dispatch(services, &raw) {
        Ok(outcome) => {
            render_mode(output, &outcome, text_line, pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(rejection) => {
            render_error(output, &CliError::from(&rejection))?;
            Ok(ExitCode::FAILURE)
        }
    }
}
