//! `rollcall rewrite`: regenerate a filter document offline.
//!
//! Takes a stored document and a JSON array of references
//! (`[{"entity": "ctail_group", "id": "…", "name": "Sales"}]`) and prints the
//! rewritten document, or writes it to `--output`.

use anyhow::{Context as _, Result};
use clap::Args;
use rollcall_core::filter::{ConditionTemplate, rewrite_text};
use rollcall_core::model::EntityRef;
use std::path::{Path, PathBuf};

use super::read_input;

#[derive(Args, Debug)]
pub struct RewriteArgs {
    /// Filter document file; `-` reads stdin.
    pub document: PathBuf,

    /// JSON file with the references to splice in, in order.
    #[arg(long)]
    pub refs: PathBuf,

    /// Attribute each generated condition compares.
    #[arg(long, default_value = "ctail_groupid")]
    pub attribute: String,

    /// Entity tag each generated condition carries.
    #[arg(long = "type", default_value = "ctail_group")]
    pub type_tag: String,

    /// Write the document here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// # Errors
///
/// Returns an error if either input cannot be read, the document is
/// malformed, or the output cannot be written.
pub fn run_rewrite(args: &RewriteArgs) -> Result<()> {
    let text = read_input(&args.document)?;
    let refs: Vec<EntityRef> = serde_json::from_str(&read_input(&args.refs)?)
        .with_context(|| format!("Failed to parse references from {}", args.refs.display()))?;
    let template = ConditionTemplate::new(&args.attribute, &args.type_tag);

    let rewritten = rewrite_text(&text, &refs, &template)
        .with_context(|| format!("Failed to rewrite {}", args.document.display()))?;
    tracing::debug!(conditions = refs.len(), "document rewritten");

    match &args.output {
        Some(path) => write_output(path, &rewritten),
        None => {
            println!("{rewritten}");
            Ok(())
        }
    }
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
