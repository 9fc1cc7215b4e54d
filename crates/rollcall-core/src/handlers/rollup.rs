//! Rollup aggregator: recompute a derived value on the parent from its
//! children and write it back.
//!
//! The read-aggregate-then-write sequence is not atomic. Two events adding
//! children to the same parent concurrently can both read a stale aggregate;
//! consistency beyond that has to come from the store.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::HandlerContext;
use crate::error::HandlerError;
use crate::model::{EntityRef, Fields, Value};
use crate::query::{AggregateFunction, Query};

/// Upper bound stored on the parent; only checked for counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ceiling {
    /// Parent field holding the bound. Absent or null reads as 0.
    pub field: String,
    /// Rejection shown when the new count exceeds the bound.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub child_entity: String,
    /// Child field referencing the parent.
    pub parent_link_field: String,
    /// Child attribute to aggregate.
    pub attribute: String,
    pub function: AggregateFunction,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
    /// Alias of the aggregate column.
    pub alias: String,
    /// Parent field that receives the result.
    pub target_field: String,
    #[serde(default)]
    pub ceiling: Option<Ceiling>,
}

const fn default_active_only() -> bool {
    true
}

impl AggregateSpec {
    #[must_use]
    pub fn query(&self, parent: &EntityRef) -> Query {
        let query = Query::new(&self.child_entity)
            .aggregate(self.function, &self.attribute, &self.alias)
            .references(&self.parent_link_field, parent);
        if self.active_only {
            query.active_only()
        } else {
            query
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RollupOutcome {
    /// One `update` was issued.
    Written {
        parent: EntityRef,
        field: String,
        value: Value,
    },
    /// The aggregate returned no rows; nothing was written.
    NoRows { parent: EntityRef },
}

fn read_ceiling(
    ctx: &HandlerContext<'_>,
    parent: &EntityRef,
    field: &str,
) -> Result<i64, HandlerError> {
    let record = ctx.store.get(&parent.entity, parent.id, &[field])?;
    let ceiling = record.get(field).and_then(Value::as_i64).unwrap_or(0);
    trace!(parent = %parent, ceiling, "capacity ceiling");
    Ok(ceiling)
}

/// Recompute `spec` for `parent` and write the result onto it.
///
/// # Errors
///
/// - [`HandlerError::CapacityExceeded`] when a count exceeds the parent's
///   ceiling; nothing is written.
/// - [`HandlerError::Store`] on any store fault.
pub fn recompute(
    ctx: &HandlerContext<'_>,
    parent: &EntityRef,
    spec: &AggregateSpec,
) -> Result<RollupOutcome, HandlerError> {
    let query = spec.query(parent);
    debug!(fetch = %query, "rollup aggregate");

    let rows = ctx.store.query_aggregate(&query)?;
    if rows.len() > 1 {
        debug!(rows = rows.len(), "aggregate returned several rows, using the first");
    }
    let Some(row) = rows.into_iter().next() else {
        debug!(parent = %parent, "aggregate returned no rows, nothing written");
        return Ok(RollupOutcome::NoRows {
            parent: parent.clone(),
        });
    };
    let value = row
        .get(&spec.alias)
        .map_or(Value::Null, |v| v.unaliased().clone());

    if let (AggregateFunction::Count, Some(ceiling)) = (spec.function, &spec.ceiling) {
        let count = value.as_i64().unwrap_or(0);
        let bound = read_ceiling(ctx, parent, &ceiling.field)?;
        if count > bound {
            return Err(HandlerError::CapacityExceeded {
                message: ceiling.message.clone(),
                count,
                ceiling: bound,
            });
        }
    }

    ctx.store.update(
        &parent.entity,
        parent.id,
        Fields::from([(spec.target_field.clone(), value.clone())]),
    )?;
    debug!(parent = %parent, field = %spec.target_field, value = %value, "rollup written");

    Ok(RollupOutcome::Written {
        parent: parent.clone(),
        field: spec.target_field.clone(),
        value,
    })
}
