pub mod completions;
pub mod config;
pub mod dispatch;
pub mod import;
pub mod init;
pub mod rewrite;
pub mod show;

use anyhow::{Context as _, Result, bail};
use rollcall_core::config::PROJECT_DIR;
use rollcall_core::store::SqliteStore;
use std::io::Read as _;
use std::path::{Path, PathBuf};

pub const STORE_FILE: &str = "records.db";

pub fn store_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join(STORE_FILE)
}

/// Open the project's record store; the project must be initialized.
pub fn open_store(project_root: &Path) -> Result<SqliteStore> {
    let path = store_path(project_root);
    if !path.exists() {
        bail!("no record store at {}. Run `rollcall init` first.", path.display());
    }
    SqliteStore::open(&path)
}

/// Read a file argument; `-` reads stdin.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
