use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::{Record, Value};

/// Attribute carrying a record's lifecycle state.
pub const STATE_FIELD: &str = "statecode";

/// Soft-delete lifecycle state. Filters and aggregates only see `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateCode {
    Active,
    Inactive,
}

impl StateCode {
    /// Stored option value.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Active => 0,
            Self::Inactive => 1,
        }
    }

    #[must_use]
    pub const fn value(self) -> Value {
        Value::Integer(self.code())
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

/// Lifecycle direction of a create/update, judged from the submitted target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Target is active, becoming active, or does not touch `statecode`.
    Activating,
    /// Target sets `statecode` to anything other than active.
    Deactivating,
}

impl Transition {
    /// Classify a partial target record.
    ///
    /// A target without `statecode` keeps whatever state the record had; the
    /// validation phase still applies to it.
    #[must_use]
    pub fn of(target: &Record) -> Self {
        match target.get(STATE_FIELD) {
            None => Self::Activating,
            Some(value) if value.as_i64() == Some(StateCode::Active.code()) => Self::Activating,
            Some(_) => Self::Deactivating,
        }
    }

    #[must_use]
    pub const fn is_activating(self) -> bool {
        matches!(self, Self::Activating)
    }
}
