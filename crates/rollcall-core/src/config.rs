use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use uuid::Uuid;

use crate::handlers::{PLACEHOLDER_EMAIL, Settings};
use crate::rules::{EntityRule, RuleCatalog};
use crate::store::FixedOffsetZones;

/// Project directory holding the store and the configuration.
pub const PROJECT_DIR: &str = ".rollcall";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub entity_list: EntityListConfig,
    /// Zone code → offset east of UTC in minutes, on top of the built-in zones.
    #[serde(default)]
    pub zones: BTreeMap<String, i32>,
    /// Per-entity replacements of the built-in rules.
    #[serde(default)]
    pub rules: Vec<EntityRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent when a registrant has no email address. An empty value skips
    /// validation for such registrants.
    #[serde(default = "default_placeholder_email")]
    pub placeholder_email: Option<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_base_url(),
            placeholder_email: default_placeholder_email(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityListConfig {
    #[serde(default)]
    pub list_id: Option<Uuid>,
}

impl EngineConfig {
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            validate_email: self.validator.enabled,
            placeholder_email: self
                .validator
                .placeholder_email
                .clone()
                .filter(|email| !email.trim().is_empty()),
            entity_list_id: self.entity_list.list_id,
        }
    }

    /// Built-in rules overlaid with the configured ones.
    #[must_use]
    pub fn catalog(&self) -> RuleCatalog {
        RuleCatalog::builtin().with_rules(self.rules.iter().cloned())
    }

    /// # Errors
    ///
    /// Returns an error if a `[zones]` key is not an integer zone code.
    pub fn zones(&self) -> Result<FixedOffsetZones> {
        let overrides = self
            .zones
            .iter()
            .map(|(code, minutes)| {
                code.trim()
                    .parse::<i32>()
                    .map(|code| (code, *minutes))
                    .with_context(|| format!("Invalid zone code '{code}' in [zones]"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FixedOffsetZones::with_overrides(overrides))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: EngineConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Read `.rollcall/config.toml` under `project_root`; defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<EngineConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Whether `err` stems from a config file that is not valid TOML for its
/// section layout.
#[must_use]
pub fn is_parse_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<toml::de::Error>())
}

/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("rollcall/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error if either config file is unreadable.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some("pretty"),
            "text" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

/// Commented starting config written by `rollcall init`.
#[must_use]
pub fn starter_config() -> String {
    format!(
        r#"# rollcall project configuration

[validator]
enabled = true
base_url = "{}"
# Sent when a registrant has no email address; set to "" to skip them.
placeholder_email = "{}"

[entity_list]
# Id of the list record whose filter document follows the active groups.
# list_id = "00000000-0000-0000-0000-000000000000"

[zones]
# "190" = 330
"#,
        default_base_url(),
        PLACEHOLDER_EMAIL
    )
}

const fn default_true() -> bool {
    true
}

#[allow(clippy::unnecessary_wraps)]
fn default_placeholder_email() -> Option<String> {
    Some(PLACEHOLDER_EMAIL.to_string())
}

fn default_base_url() -> String {
    "http://mbshandson.azure-api.net/test".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, content: &str) {
        let dir = root.join(PROJECT_DIR);
        std::fs::create_dir_all(&dir).expect("create project dir");
        std::fs::write(dir.join("config.toml"), content).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert!(cfg.validator.enabled);
        assert_eq!(cfg.validator.base_url, "http://mbshandson.azure-api.net/test");
        assert_eq!(cfg.entity_list.list_id, None);
        assert!(cfg.rules.is_empty());
        assert_eq!(cfg.settings(), Settings::default());
        assert_eq!(cfg.settings().placeholder_email.as_deref(), Some(PLACEHOLDER_EMAIL));
    }

    #[test]
    fn empty_placeholder_email_skips_registrants_without_one() {
        let cfg: EngineConfig =
            toml::from_str("[validator]\nplaceholder_email = \"\"\n").expect("parse");
        assert_eq!(cfg.settings().placeholder_email, None);
    }

    #[test]
    fn starter_config_parses_to_defaults() {
        let cfg: EngineConfig = toml::from_str(&starter_config()).expect("parse starter");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn sections_are_read() {
        let root = tempfile::tempdir().expect("temp dir");
        write_config(
            root.path(),
            r#"
[validator]
enabled = false
placeholder_email = "abc@xyz.com"

[entity_list]
list_id = "00000000-0000-0000-0000-000000000384"

[zones]
"500" = -90
"#,
        );
        let cfg = load_project_config(root.path()).expect("load");
        let settings = cfg.settings();
        assert!(!settings.validate_email);
        assert_eq!(settings.placeholder_email.as_deref(), Some("abc@xyz.com"));
        assert_eq!(settings.entity_list_id, Some(Uuid::from_u128(0x384)));
        assert_eq!(cfg.zones().expect("zones").offset_minutes(500), Some(-90));
        assert_eq!(cfg.zones().expect("zones").offset_minutes(190), Some(330));
    }

    #[test]
    fn rule_overrides_replace_builtin_entities() {
        let root = tempfile::tempdir().expect("temp dir");
        write_config(
            root.path(),
            r#"
[[rules]]
entity = "ctail_trainingslot"

[rules.trigger]
kinds = ["create"]

[rules.pipeline]
type = "guarded"
required_post = ["ctail_training"]
"#,
        );
        let cfg = load_project_config(root.path()).expect("load");
        let catalog = cfg.catalog();
        assert_eq!(catalog.len(), 4);
        let slot = catalog.get("ctail_trainingslot").expect("slot rule");
        assert_eq!(slot.trigger.kinds, vec![crate::event::EventKind::Create]);
    }

    #[test]
    fn bad_zone_code_is_reported() {
        let mut cfg = EngineConfig::default();
        cfg.zones.insert("pacific".to_string(), -480);
        let err = cfg.zones().unwrap_err();
        assert!(err.to_string().contains("pacific"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let root = tempfile::tempdir().expect("temp dir");
        write_config(root.path(), "[validator\nenabled = ");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(is_parse_error(&err));
        assert!(format!("{err:#}").contains("Failed to parse"));

        let unrelated = anyhow::anyhow!("disk full");
        assert!(!is_parse_error(&unrelated));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_beats_user_config() {
        assert_eq!(resolve_output(false, Some("json"), Some("TEXT")), "text");
        assert_eq!(resolve_output(false, Some("pretty"), Some("bogus")), "pretty");
    }
}
