//! Local SQLite-backed record store used by the CLI harness.
//!
//! Records are stored whole, one row per `(entity, id)`, with their fields
//! as JSON. Queries load the candidate rows of an entity and run through the
//! shared evaluator. Every `update` call is also appended to `update_log`.
//!
//! Runtime defaults follow the usual local-database setup:
//! - `journal_mode = WAL`
//! - `busy_timeout = 5s`

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::memory::UpdateCall;
use super::{RecordStore, StoreError};
use crate::model::{Fields, Record};
use crate::query::Query;
use crate::query::eval::{self, AggregateRow, RecordSource};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

const MIGRATION_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS records (
    entity     TEXT NOT NULL,
    id         TEXT NOT NULL,
    fields     TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (entity, id)
);
CREATE INDEX IF NOT EXISTS idx_records_entity ON records(entity);
";

const MIGRATION_V2_SQL: &str = "
CREATE TABLE IF NOT EXISTS update_log (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    entity     TEXT NOT NULL,
    id         TEXT NOT NULL,
    fields     TEXT NOT NULL,
    written_at TEXT NOT NULL
);
";

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_V1_SQL), (2, MIGRATION_V2_SQL)];

fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let mut current = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", i64::from(*version))?;
        tx.commit()?;
        current = *version;
    }

    Ok(current)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn parse_id(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|err| StoreError::Fault(format!("bad record id '{raw}': {err}")))
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store database, apply pragmas and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring or migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open record store {}", path.display()))?;
        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrate(&mut conn).context("apply record store migrations")?;

        Ok(Self { conn })
    }

    /// In-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        migrate(&mut conn).context("apply record store migrations")?;
        Ok(Self { conn })
    }

    /// Schema version recorded in `PRAGMA user_version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(current_schema_version(&self.conn)?)
    }

    /// Insert or replace a whole record. Not journaled.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        let fields = serde_json::to_string(&record.fields)?;
        self.conn.execute(
            "INSERT INTO records (entity, id, fields, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity, id) DO UPDATE SET fields = excluded.fields,
                                                   updated_at = excluded.updated_at",
            params![
                record.entity,
                record.id.to_string(),
                fields,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn load(&self, entity: &str, id: Uuid) -> Result<Option<Record>, StoreError> {
        let fields: Option<String> = self
            .conn
            .query_row(
                "SELECT fields FROM records WHERE entity = ?1 AND id = ?2",
                params![entity, id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        fields
            .map(|raw| {
                Ok(Record {
                    entity: entity.to_string(),
                    id,
                    fields: serde_json::from_str(&raw)?,
                })
            })
            .transpose()
    }

    /// Journaled `update` calls, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or decoded.
    pub fn journal(&self) -> Result<Vec<UpdateCall>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity, id, fields FROM update_log ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut calls = Vec::new();
        for row in rows {
            let (entity, id, fields) = row?;
            calls.push(UpdateCall {
                entity,
                id: parse_id(&id)?,
                fields: serde_json::from_str(&fields)?,
            });
        }
        Ok(calls)
    }
}

impl RecordSource for SqliteStore {
    fn records_of(&self, entity: &str) -> Result<Vec<Record>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fields FROM records WHERE entity = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![entity], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, fields) = row?;
            records.push(Record {
                entity: entity.to_string(),
                id: parse_id(&id)?,
                fields: serde_json::from_str(&fields)?,
            });
        }
        Ok(records)
    }
}

impl RecordStore for SqliteStore {
    fn get(&self, entity: &str, id: Uuid, columns: &[&str]) -> Result<Record, StoreError> {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        self.load(entity, id)?
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
        let mut record = self.load(entity, id)?.ok_or_else(|| StoreError::NotFound {
            entity: entity.to_string(),
            id,
        })?;
        let written = serde_json::to_string(&fields)?;
        record.fields.extend(fields);

        let tx = self.conn.unchecked_transaction()?;
        let now = chrono::Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE records SET fields = ?3, updated_at = ?4 WHERE entity = ?1 AND id = ?2",
            params![
                entity,
                id.to_string(),
                serde_json::to_string(&record.fields)?,
                now
            ],
        )?;
        tx.execute(
            "INSERT INTO update_log (entity, id, fields, written_at) VALUES (?1, ?2, ?3, ?4)",
            params![entity, id.to_string(), written, now],
        )?;
        tx.commit()?;
        Ok(())
    }
}
