//! Keeps a list's stored filter document in step with the active groups.
//!
//! Any change to a group re-reads every active group (ordered by label),
//! rewrites the splice point of the configured list's document and writes
//! the whole document back. The store only replaces whole fields, so the
//! document is never patched in place.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::HandlerContext;
use crate::error::HandlerError;
use crate::filter::{ConditionTemplate, FilterDocument, rewrite};
use crate::model::{EntityRef, Fields, Value, primary_key};
use crate::query::Query;

/// Message used when no list is configured.
pub const CONFIGURATION_MISSING: &str = "Plugin Configuration missing.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityListRule {
    /// Entity whose active rows become conditions.
    pub group_entity: String,
    /// Label attribute; also the sort key.
    pub label_field: String,
    pub list_entity: String,
    /// Field of the list record holding the document text.
    pub document_field: String,
    /// Attribute each generated condition compares.
    pub condition_attribute: String,
    /// Entity tag each generated condition carries.
    pub condition_type: String,
}

impl Default for EntityListRule {
    fn default() -> Self {
        Self {
            group_entity: "ctail_group".to_string(),
            label_field: "ctail_name".to_string(),
            list_entity: "adx_entitylist".to_string(),
            document_field: "adx_filter_definition".to_string(),
            condition_attribute: "ctail_groupid".to_string(),
            condition_type: "ctail_group".to_string(),
        }
    }
}

impl EntityListRule {
    #[must_use]
    pub fn template(&self) -> ConditionTemplate {
        ConditionTemplate::new(&self.condition_attribute, &self.condition_type)
    }

    fn groups_query(&self) -> Query {
        Query::new(&self.group_entity)
            .column(&self.label_field)
            .column(primary_key(&self.group_entity))
            .order_by(&self.label_field, false)
            .active_only()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ListOutcome {
    /// The document was rewritten with `conditions` entries and stored.
    Rewritten { list: EntityRef, conditions: usize },
    /// The list has no document to rewrite; nothing was written.
    NoDocument { list: EntityRef },
}

/// Active groups as labelled references, in label order.
///
/// # Errors
///
/// Returns the store's error when the query cannot be answered.
pub fn active_groups(
    ctx: &HandlerContext<'_>,
    rule: &EntityListRule,
) -> Result<Vec<EntityRef>, HandlerError> {
    let query = rule.groups_query();
    debug!(fetch = %query, "active groups");

    Ok(ctx
        .store
        .query(&query)?
        .into_iter()
        .map(|group| {
            let label = group
                .get(&rule.label_field)
                .and_then(Value::as_str)
                .map(str::to_owned);
            let r = group.to_ref();
            match label {
                Some(label) => r.with_name(label),
                None => r,
            }
        })
        .collect())
}

/// Regenerate the configured list's filter document.
///
/// # Errors
///
/// - [`HandlerError::Configuration`] when `list_id` is not set.
/// - [`HandlerError::MalformedDocument`] when the stored document cannot be
///   parsed or lacks its splice point; the stored text is left untouched.
/// - [`HandlerError::Store`] on any store fault.
pub fn refresh(
    ctx: &HandlerContext<'_>,
    rule: &EntityListRule,
    list_id: Option<Uuid>,
) -> Result<ListOutcome, HandlerError> {
    let list_id =
        list_id.ok_or_else(|| HandlerError::Configuration(CONFIGURATION_MISSING.to_string()))?;
    let list = EntityRef::new(&rule.list_entity, list_id);

    let groups = active_groups(ctx, rule)?;
    debug!(groups = groups.len(), "groups retrieved");

    let record = ctx
        .store
        .get(&rule.list_entity, list_id, &[rule.document_field.as_str()])?;
    let Some(text) = record
        .get(&rule.document_field)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
    else {
        debug!(list = %list, "no filter document to update");
        return Ok(ListOutcome::NoDocument { list });
    };

    let document = rewrite(FilterDocument::parse(text)?, &groups, &rule.template())?;
    let text = document.to_text()?;

    ctx.store.update(
        &rule.list_entity,
        list_id,
        Fields::from([(rule.document_field.clone(), Value::String(text))]),
    )?;
    debug!(list = %list, conditions = groups.len(), "filter document rewritten");

    Ok(ListOutcome::Rewritten {
        list,
        conditions: groups.len(),
    })
}
