//! Stored filter documents.
//!
//! A filter document is the JSON form of a list query that the portal uses to
//! render its filter panel. Its shape is fixed:
//!
//! ```text
//! document
//! └── entity
//!     └── links[0]            outer (intersect) link, carries `adx.rawfetch`
//!         └── links[0]        inner link to the filtered entity
//!             └── filters[0]
//!                 └── conditions[..]
//! ```
//!
//! Both link levels share one recursive [`LinkNode`] type. Keys this crate
//! does not interpret are kept in `extra` maps so that a parse/serialize
//! cycle does not drop portal metadata.

pub mod rewrite;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as Json};

pub use rewrite::{ConditionTemplate, raw_fragment, rewrite, rewrite_text};

/// Errors raised while reading or reshaping a filter document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("filter document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filter document has no splice point: expected exactly one entry at {path}, found {found}")]
    MissingSplice { path: &'static str, found: usize },
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDocument {
    #[serde(rename = "xmlns.adx", default, skip_serializing_if = "Option::is_none")]
    pub xmlns_adx: Option<String>,
    #[serde(default)]
    pub distinct: bool,
    pub entity: EntityNode,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl FilterDocument {
    /// Parse the stored textual form.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] when `text` is not a filter document.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize back to the stored textual form.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] if serialization fails.
    pub fn to_text(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Conditions currently stored at the splice point.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::MissingSplice`] when the document does not
    /// have the expected shape.
    pub fn spliced_conditions(&self) -> Result<&[Condition], DocumentError> {
        Ok(&rewrite::locate(self)?.filter.conditions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub name: String,
    #[serde(rename = "all-attributes", default)]
    pub all_attributes: bool,
    #[serde(default, deserialize_with = "nullable_list")]
    pub filters: Vec<FilterNode>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub links: Vec<LinkNode>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// A link-entity node at any depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkNode {
    /// Raw fetch fragment the portal injects verbatim into its query.
    #[serde(rename = "adx.rawfetch", default, skip_serializing_if = "Option::is_none")]
    pub raw_fetch: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersect: Option<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub filters: Vec<FilterNode>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub links: Vec<LinkNode>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    #[serde(rename = "type", default = "default_filter_type")]
    pub filter_type: String,
    /// Nested filters are carried through untouched.
    #[serde(default, deserialize_with = "nullable_list")]
    pub filters: Vec<Json>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub conditions: Vec<Condition>,
    #[serde(rename = "adx.uiname", default, skip_serializing_if = "Option::is_none")]
    pub ui_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

fn default_filter_type() -> String {
    "and".to_string()
}

/// One condition of the filter panel.
///
/// Stored documents may carry conditions in any shape the portal accepts, so
/// every member is optional and unknown keys are kept. Conditions generated
/// by [`rewrite`] always carry all of them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(rename = "uiname", default, skip_serializing_if = "Option::is_none")]
    pub ui_label: Option<String>,
    #[serde(rename = "uitype", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    /// Position within the splice list, kept as stored.
    #[serde(rename = "adx.id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Json>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Condition {
    /// Zero-based position, read from either a decimal string or a number.
    #[must_use]
    pub fn ordinal(&self) -> Option<usize> {
        match self.id.as_ref()? {
            Json::String(s) => s.trim().parse().ok(),
            Json::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            _ => None,
        }
    }

    /// The compared value when it is stored as a string.
    #[must_use]
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Json::as_str)
    }
}
