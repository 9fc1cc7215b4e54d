//! Collaborator interfaces: the record store and the time-zone service.
//!
//! The platform's store is the system of record. This crate only talks to it
//! through [`RecordStore`]; the adapters here ([`memory`], [`sqlite`]) exist
//! for tests and for the local CLI harness. Calls are blocking and are never
//! retried: a fault is reported to the caller as a [`StoreError`].

pub mod memory;
pub mod sqlite;
pub mod zones;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::model::{Fields, Record};
use crate::query::Query;
use crate::query::eval::AggregateRow;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use zones::FixedOffsetZones;

/// Failures surfaced by the store or the time-zone service.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {entity}({id})")]
    NotFound { entity: String, id: Uuid },

    #[error("unknown time zone code {0}")]
    UnknownZone(i32),

    #[error("store fault: {0}")]
    Fault(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Generic query and CRUD access to the record store.
pub trait RecordStore {
    /// Fetch one record, restricted to `columns` (all columns when empty).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no such record exists, or a transport fault.
    fn get(&self, entity: &str, id: Uuid, columns: &[&str]) -> Result<Record, StoreError>;

    /// Run a row query.
    ///
    /// # Errors
    ///
    /// Returns a transport fault when the store cannot answer.
    fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Run an aggregate query; each row maps aliases to aggregated values.
    ///
    /// # Errors
    ///
    /// Returns a transport fault when the store cannot answer.
    fn query_aggregate(&self, query: &Query) -> Result<Vec<AggregateRow>, StoreError>;

    /// Replace the given fields of one record (other fields are untouched).
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no such record exists, or a transport fault.
    fn update(&self, entity: &str, id: Uuid, fields: Fields) -> Result<(), StoreError>;
}

/// Conversion of UTC timestamps into a platform time zone's wall clock.
pub trait TimeZoneService {
    /// # Errors
    ///
    /// [`StoreError::UnknownZone`] when `zone_code` is not known.
    fn local_time(&self, utc: NaiveDateTime, zone_code: i32) -> Result<NaiveDateTime, StoreError>;
}
