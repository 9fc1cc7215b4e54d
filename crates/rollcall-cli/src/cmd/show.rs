use anyhow::{Context as _, Result};
use clap::Args;
use rollcall_core::model::Value;
use rollcall_core::store::RecordStore;
use std::path::Path;
use uuid::Uuid;

use super::open_store;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Entity logical name, e.g. `ctail_trainingslot`.
    pub entity: String,
    pub id: Uuid,
    /// Restrict to these fields (repeatable).
    #[arg(long = "field", short = 'f')]
    pub fields: Vec<String>,
}

fn display(value: &Value) -> String {
    match value.unaliased() {
        Value::Reference(r) => match &r.name {
            Some(name) => format!("{r} \"{name}\""),
            None => r.to_string(),
        },
        other => other.to_string(),
    }
}

/// # Errors
///
/// Returns an error if the store is missing or the record does not exist.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let columns: Vec<&str> = args.fields.iter().map(String::as_str).collect();
    let record = store
        .get(&args.entity, args.id, &columns)
        .with_context(|| format!("Failed to load {}({})", args.entity, args.id))?;

    render_mode(
        output,
        &record,
        |r, w| {
            for (field, value) in &r.fields {
                writeln!(w, "{field}\t{}", display(value))?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &r.to_ref().to_string())?;
            for (field, value) in &r.fields {
                pretty_kv(w, field, display(value))?;
            }
            Ok(())
        },
    )
}
