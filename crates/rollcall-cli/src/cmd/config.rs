use anyhow::Result;
use clap::Args;
use rollcall_core::config::resolve_config;
use rollcall_core::rules::EntityRule;
use serde::Serialize;
use std::path::Path;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Also print the effective rule catalog (built-in rules plus overrides).
    #[arg(long)]
    pub rules: bool,
}

#[derive(Debug, Serialize)]
struct ConfigView {
    #[serde(flatten)]
    effective: rollcall_core::config::EffectiveConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<Vec<EntityRule>>,
}

/// Print the effective configuration.
///
/// # Errors
///
/// Returns an error if either config file cannot be read or parsed.
pub fn run_config(args: &ConfigArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let effective = resolve_config(project_root, output.is_json())?;
    let catalog = args
        .rules
        .then(|| effective.project.catalog().iter().cloned().collect());
    let view = ConfigView { effective, catalog };

    render_mode(
        output,
        &view,
        |v, w| {
            let p = &v.effective.project;
            writeln!(w, "validator.enabled\t{}", p.validator.enabled)?;
            writeln!(w, "validator.base_url\t{}", p.validator.base_url)?;
            if let Some(email) = &p.validator.placeholder_email {
                writeln!(w, "validator.placeholder_email\t{email}")?;
            }
            if let Some(id) = p.entity_list.list_id {
                writeln!(w, "entity_list.list_id\t{id}")?;
            }
            for (code, minutes) in &p.zones {
                writeln!(w, "zones.{code}\t{minutes}")?;
            }
            writeln!(w, "output\t{}", v.effective.resolved_output)?;
            for rule in v.catalog.iter().flatten() {
                writeln!(w, "rule\t{}", rule.entity)?;
            }
            Ok(())
        },
        |v, w| {
            let p = &v.effective.project;
            pretty_section(w, "Validator")?;
            pretty_kv(w, "enabled", p.validator.enabled.to_string())?;
            pretty_kv(w, "base_url", &p.validator.base_url)?;
            pretty_kv(
                w,
                "placeholder_email",
                p.validator.placeholder_email.as_deref().unwrap_or("(skip)"),
            )?;
            writeln!(w)?;
            pretty_section(w, "Entity list")?;
            let list = p
                .entity_list
                .list_id
                .map_or_else(|| "(not configured)".to_string(), |id| id.to_string());
            pretty_kv(w, "list_id", list)?;
            if !p.zones.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Zone overrides")?;
                for (code, minutes) in &p.zones {
                    pretty_kv(w, code, format!("{minutes:+} min"))?;
                }
            }
            writeln!(w)?;
            pretty_kv(w, "output", &v.effective.resolved_output)?;
            if let Some(catalog) = &v.catalog {
                writeln!(w)?;
                pretty_section(w, "Rules")?;
                for rule in catalog {
                    let kinds: Vec<String> =
                        rule.trigger.kinds.iter().map(ToString::to_string).collect();
                    pretty_kv(w, &rule.entity, kinds.join(", "))?;
                }
            }
            Ok(())
        },
    )
}
