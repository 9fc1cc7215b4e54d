//! The closed set of event kinds a handler can subscribe to.
//!
//! Platform message names arrive as free-form strings; they are matched once,
//! case-insensitively, at the event-context boundary. Everything downstream
//! works with [`EventKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// Error returned for message names outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised message name.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported message '{}': expected one of create, update, delete",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Create, Self::Update, Self::Delete];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Create and update carry a post-image; delete carries a pre-image.
    #[must_use]
    pub const fn uses_post_image(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(UnknownEventKind { raw: s.to_string() }),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Create".parse::<EventKind>(), Ok(EventKind::Create));
        assert_eq!("UPDATE".parse::<EventKind>(), Ok(EventKind::Update));
        assert_eq!("delete".parse::<EventKind>(), Ok(EventKind::Delete));
    }

    #[test]
    fn display_fromstr_roundtrip() {
        for kind in EventKind::ALL {
            let reparsed: EventKind = kind.to_string().parse().expect("should roundtrip");
            assert_eq!(kind, reparsed);
        }
    }

    #[test]
    fn other_messages_are_unsupported() {
        let err = "Assign".parse::<EventKind>().unwrap_err();
        assert_eq!(err.raw, "Assign");
        assert!(err.to_string().contains("expected one of"));
        assert!("".parse::<EventKind>().is_err());
        assert!("SetState".parse::<EventKind>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EventKind::Delete).expect("serialize");
        assert_eq!(json, "\"delete\"");
        let back: EventKind = serde_json::from_str("\"Update\"").expect("deserialize");
        assert_eq!(back, EventKind::Update);
    }

    #[test]
    fn image_side_follows_kind() {
        assert!(EventKind::Create.uses_post_image());
        assert!(EventKind::Update.uses_post_image());
        assert!(!EventKind::Delete.uses_post_image());
    }
}
