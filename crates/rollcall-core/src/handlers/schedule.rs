//! Schedule conflict checker: no two active siblings of one parent at the
//! same local instant.
//!
//! The image carries the schedule in UTC while siblings are compared on the
//! acting user's wall clock, so the timestamp is converted first. A user
//! without a zone setting is compared in UTC.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{HandlerContext, Verdict};
use crate::model::{EntityRef, Value, primary_key};
use crate::query::{Operator, Query};
use crate::store::StoreError;

pub const USER_SETTINGS_ENTITY: &str = "usersettings";
pub const USER_ID_FIELD: &str = "systemuserid";
pub const TIME_ZONE_FIELD: &str = "timezonecode";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    /// Reference to the parent shared by siblings.
    pub parent_field: String,
    /// UTC timestamp of the scheduled instant.
    pub timestamp_field: String,
    /// Rejection shown to the user on conflict.
    pub message: String,
}

/// Zone code from the acting user's settings, if any.
///
/// # Errors
///
/// Returns the store's error when the settings cannot be queried.
pub fn user_time_zone(ctx: &HandlerContext<'_>) -> Result<Option<i32>, StoreError> {
    let Some(user) = ctx.event.user_id else {
        return Ok(None);
    };
    let query = Query::new(USER_SETTINGS_ENTITY)
        .column(TIME_ZONE_FIELD)
        .references(USER_ID_FIELD, &EntityRef::new("systemuser", user));

    let zone = ctx
        .store
        .query(&query)?
        .into_iter()
        .next()
        .and_then(|settings| settings.get(TIME_ZONE_FIELD).and_then(Value::as_i64))
        .and_then(|code| i32::try_from(code).ok());
    debug!(user = %user, zone = ?zone, "user time zone");
    Ok(zone)
}

/// `utc` on the acting user's wall clock, or `utc` itself when the user has
/// no zone.
///
/// # Errors
///
/// Store faults, or an unknown zone code from the time-zone service.
pub fn local_timestamp(
    ctx: &HandlerContext<'_>,
    utc: NaiveDateTime,
) -> Result<NaiveDateTime, StoreError> {
    match user_time_zone(ctx)? {
        Some(zone) => ctx.zones.local_time(utc, zone),
        None => {
            debug!("no time zone for user, comparing in UTC");
            Ok(utc)
        }
    }
}

/// Look for another active `entity` record of `parent` scheduled at `local`.
///
/// # Errors
///
/// Returns the store's error when the query cannot be answered.
pub fn check(
    ctx: &HandlerContext<'_>,
    entity: &str,
    rule: &ScheduleRule,
    parent: &EntityRef,
    local: NaiveDateTime,
    exclude: Uuid,
) -> Result<Verdict, StoreError> {
    let query = Query::new(entity)
        .column(primary_key(entity))
        .condition(&rule.timestamp_field, Operator::Eq, local)
        .references(&rule.parent_field, parent)
        .excluding(exclude)
        .active_only();
    debug!(fetch = %query, "schedule check");

    if ctx.store.query(&query)?.is_empty() {
        Ok(Verdict::NoConflict)
    } else {
        Ok(Verdict::ConflictFound)
    }
}
