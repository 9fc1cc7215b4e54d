//! Normalization of one inbound platform event.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::kind::{EventKind, UnknownEventKind};
use crate::model::Record;

/// Default alias under which the platform registers the pre-image.
pub const DEFAULT_PRE_IMAGE: &str = "PreImage";
/// Default alias under which the platform registers the post-image.
pub const DEFAULT_POST_IMAGE: &str = "PostImage";

/// An event as handed over by the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Declared operation name (`Create`, `Update`, `Delete`, ...).
    pub message_name: String,
    pub primary_entity_name: String,
    pub primary_entity_id: Uuid,
    /// User the handler acts on behalf of.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub initiating_user_id: Option<Uuid>,
    /// Nesting depth of the pipeline that produced this event.
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Partial record as submitted by the caller.
    #[serde(default)]
    pub target: Option<Record>,
    #[serde(default)]
    pub pre_images: BTreeMap<String, Record>,
    #[serde(default)]
    pub post_images: BTreeMap<String, Record>,
}

const fn default_depth() -> u32 {
    1
}

/// Registration of one entity image: the alias it is published under and
/// the attributes it carries (empty = every attribute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub alias: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ImageSpec {
    pub fn new(alias: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            alias: alias.into(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    fn select(&self, images: &BTreeMap<String, Record>) -> Option<Record> {
        images
            .get(&self.alias)
            .cloned()
            .map(|image| image.project(&self.fields))
    }
}

/// Uniform view of one event.
///
/// Create and update need `post_image`; delete needs `pre_image`. A missing
/// image is not an error: handlers treat it as insufficient data and skip.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub kind: EventKind,
    pub entity: String,
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub initiating_user_id: Option<Uuid>,
    pub depth: u32,
    pub target: Record,
    pub pre_image: Option<Record>,
    pub post_image: Option<Record>,
}

impl EventContext {
    /// Build the context for `raw`, picking images by the registered aliases.
    ///
    /// Pure: never touches the store.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEventKind`] when the message is not create, update or
    /// delete. Callers treat that as "take no action".
    pub fn build(
        raw: &RawEvent,
        pre: &ImageSpec,
        post: &ImageSpec,
    ) -> Result<Self, UnknownEventKind> {
        let kind: EventKind = raw.message_name.parse()?;

        let target = raw
            .target
            .clone()
            .unwrap_or_else(|| Record::new(raw.primary_entity_name.clone(), raw.primary_entity_id));

        let (pre_image, post_image) = match kind {
            EventKind::Create => (None, post.select(&raw.post_images)),
            EventKind::Update => (pre.select(&raw.pre_images), post.select(&raw.post_images)),
            EventKind::Delete => (pre.select(&raw.pre_images), None),
        };

        Ok(Self {
            kind,
            entity: raw.primary_entity_name.clone(),
            id: raw.primary_entity_id,
            user_id: raw.user_id,
            initiating_user_id: raw.initiating_user_id,
            depth: raw.depth,
            target,
            pre_image,
            post_image,
        })
    }

    /// The image handlers reason about for this kind: post-state for create
    /// and update, pre-state for delete.
    #[must_use]
    pub fn image(&self) -> Option<&Record> {
        if self.kind.uses_post_image() {
            self.post_image.as_ref()
        } else {
            self.pre_image.as_ref()
        }
    }
}
