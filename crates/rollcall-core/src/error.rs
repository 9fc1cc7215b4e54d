use std::fmt;

use crate::filter::DocumentError;
use crate::handlers::validator::ValidatorError;
use crate::store::StoreError;

/// Machine-readable error codes for logs and CLI JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigurationMissing,
    ConfigParseError,
    ConflictDetected,
    CapacityExceeded,
    MalformedDocument,
    StoreFailure,
    ValidatorFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ConflictDetected => "E2001",
            Self::CapacityExceeded => "E2002",
            Self::MalformedDocument => "E3001",
            Self::StoreFailure => "E5001",
            Self::ValidatorFailure => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "Handler configuration missing",
            Self::ConfigParseError => "Config file parse error",
            Self::ConflictDetected => "Conflicting record exists",
            Self::CapacityExceeded => "Capacity exceeded",
            Self::MalformedDocument => "Malformed filter document",
            Self::StoreFailure => "Record store failure",
            Self::ValidatorFailure => "External validation call failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigurationMissing => {
                Some("Set [entity_list] list_id in .rollcall/config.toml.")
            }
            Self::ConfigParseError => Some("Fix syntax in .rollcall/config.toml and retry."),
            Self::ConflictDetected | Self::CapacityExceeded => None,
            Self::MalformedDocument => Some(
                "The stored filter document must have exactly one link chain ending in one filter.",
            ),
            Self::StoreFailure => Some("Check that the record store is reachable and retry."),
            Self::ValidatorFailure => {
                Some("Check [validator] base_url, or set enabled = false for offline runs.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Anything a handler can fail with. Never leaves the dispatcher: it is
/// folded into a [`Rejection`] first.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{message}")]
    ConflictDetected { message: String },

    #[error("{message}")]
    CapacityExceeded {
        message: String,
        count: i64,
        ceiling: i64,
    },

    #[error(transparent)]
    MalformedDocument(#[from] DocumentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error("{0}")]
    Configuration(String),
}

impl HandlerError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ConflictDetected { .. } => ErrorCode::ConflictDetected,
            Self::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            Self::MalformedDocument(_) => ErrorCode::MalformedDocument,
            Self::Store(_) => ErrorCode::StoreFailure,
            Self::Validator(_) => ErrorCode::ValidatorFailure,
            Self::Configuration(_) => ErrorCode::ConfigurationMissing,
        }
    }
}

/// The single user-facing failure of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub message: String,
    pub code: ErrorCode,
}

impl From<HandlerError> for Rejection {
    fn from(error: HandlerError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rejection {}
