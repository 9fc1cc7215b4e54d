//! In-process record store.
//!
//! Keeps records in a map and journals every `update` call so tests can
//! assert on exactly what a handler wrote.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::model::{Fields, Record};
use crate::query::Query;
use crate::query::eval::{self, AggregateRow, RecordSource};

/// One journaled `update` call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCall {
    pub entity: String,
    pub id: Uuid,
    pub fields: Fields,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(String, Uuid), Record>>,
    updates: Mutex<Vec<UpdateCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a whole record. Not journaled.
    pub fn insert(&self, record: Record) {
        lock(&self.records).insert((record.entity.clone(), record.id), record);
    }

    /// Current state of a record, if stored.
    #[must_use]
    pub fn record(&self, entity: &str, id: Uuid) -> Option<Record> {
        lock(&self.records).get(&(entity.to_string(), id)).cloned()
    }

    /// Every `update` call made so far, in order.
    #[must_use]
    pub fn updates(&self) -> Vec<UpdateCall> {
        lock(&self.updates).clone()
    }
}

impl RecordSource for MemoryStore {
    fn records_of(&self, entity: &str) -> Result<Vec<Record>, StoreError> {
        Ok(lock(&self.records)
            .values()
            .filter(|r| r.entity == entity)
            .cloned()
            .collect())
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, entity: &str, id: Uuid, columns: &[&str]) -> Result<Record, StoreError> {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        self.record(entity, id)
            .map(|r| r.project(&columns))
            .ok_or_else(|| StoreError::NotFound {
                entity: entity.to_string(),
                id,
            })
    }

    fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        eval::select(query, self)
    }

    fn query_aggregate(&self, query: &Query) -> Result<Vec<AggregateRow>, StoreError> {
        eval::aggregate(query, self)
    }

    fn update(&self, entity: &str, id: Uuid, fields: Fields) -> Result<(), StoreError> {
        {
            let mut records = lock(&self.records);
            let record = records
                .get_mut(&(entity.to_string(), id))
                .ok_or_else(|| StoreError::NotFound {
                    entity: entity.to_string(),
                    id,
                })?;
            record.fields.extend(fields.clone());
        }
        lock(&self.updates).push(UpdateCall {
            entity: entity.to_string(),
            id,
            fields,
        });
        Ok(())
    }
}
