use anyhow::{Context as _, Result};
use clap::Args;
use rollcall_core::config::{PROJECT_DIR, starter_config};
use rollcall_core::store::SqliteStore;
use serde::Serialize;
use std::path::Path;

use super::store_path;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-initialize even if `.rollcall/` already exists. Existing records are kept.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    project_dir: String,
    store: String,
    schema_version: u32,
    config_written: bool,
}

/// Execute `rollcall init`:
///
/// ```text
/// .rollcall/
///   config.toml   (commented starter config, never overwritten)
///   records.db    (SQLite record store)
/// ```
///
/// # Errors
///
/// Returns an error if `.rollcall/` exists without `--force`, or if any
/// filesystem or store operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let dir = project_root.join(PROJECT_DIR);
    if dir.exists() && !args.force {
        anyhow::bail!(
            "{PROJECT_DIR}/ already exists. Use `rollcall init --force` to reinitialize."
        );
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = dir.join("config.toml");
    let config_written = !config_path.exists();
    if config_written {
        std::fs::write(&config_path, starter_config())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let path = store_path(project_root);
    let store = SqliteStore::open(&path)?;
    let report = InitReport {
        project_dir: dir.display().to_string(),
        store: path.display().to_string(),
        schema_version: store.schema_version()?,
        config_written,
    };
    tracing::info!(store = %report.store, "project initialized");

    render(output, &report, |r, w| {
        writeln!(w, "Initialized rollcall project in {}", r.project_dir)?;
        writeln!(w, "  store: {} (schema v{})", r.store, r.schema_version)
    })
}
