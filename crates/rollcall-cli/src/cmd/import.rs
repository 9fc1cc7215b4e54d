//! `rollcall import`: load records into the local store.
//!
//! The input is a JSON array of records:
//!
//! ```json
//! [{"entity": "ctail_trainingslot", "id": "…", "fields": {"ctail_totalseats": {"integer": 20}}}]
//! ```
//!
//! Existing records with the same entity and id are replaced.

use anyhow::{Context as _, Result};
use clap::Args;
use rollcall_core::model::Record;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{open_store, read_input};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON file with an array of records; `-` reads stdin.
    pub file: PathBuf,
}

#[derive(Debug, Default, Serialize)]
struct ImportReport {
    imported: usize,
    by_entity: BTreeMap<String, usize>,
}

/// # Errors
///
/// Returns an error if the input cannot be read or parsed, or a record
/// cannot be written. Records written before the failure stay written.
pub fn run_import(args: &ImportArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let store = open_store(project_root)?;
    let text = read_input(&args.file)?;
    let records: Vec<Record> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse records from {}", args.file.display()))?;

    let mut report = ImportReport::default();
    for record in &records {
        store
            .upsert(record)
            .with_context(|| format!("Failed to import {}", record.to_ref()))?;
        report.imported += 1;
        *report.by_entity.entry(record.entity.clone()).or_default() += 1;
    }
    tracing::info!(imported = report.imported, "records imported");

    render_mode(
        output,
        &report,
        |r, w| {
            for (entity, count) in &r.by_entity {
                writeln!(w, "{entity}\t{count}")?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &format!("Imported {} record(s)", r.imported))?;
            for (entity, count) in &r.by_entity {
                pretty_kv(w, entity, count.to_string())?;
            }
            Ok(())
        },
    )
}
