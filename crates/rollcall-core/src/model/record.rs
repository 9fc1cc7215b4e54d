//! Records, field values and references.
//!
//! A [`Record`] is a typed bag of fields keyed by logical attribute name. A
//! field that is absent from [`Record::fields`] is distinct from a field that
//! is present with [`Value::Null`]: handlers must check presence with
//! [`Record::get`] before interpreting a value.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Field map of a record, ordered by attribute name.
pub type Fields = BTreeMap<String, Value>;

/// Name of the primary-key attribute of `entity` (`<entity>id`).
#[must_use]
pub fn primary_key(entity: &str) -> String {
    format!("{entity}id")
}

/// A typed field value.
///
/// Serialized externally tagged, e.g. `{"integer": 20}` or
/// `{"reference": {"entity": "contact", "id": "..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Reference(EntityRef),
    /// A value produced by an aggregate query under an alias.
    Aggregate(Box<Value>),
}

impl Value {
    /// Strip any aggregate aliasing and return the inner value.
    #[must_use]
    pub fn unaliased(&self) -> &Self {
        match self {
            Self::Aggregate(inner) => inner.unaliased(),
            other => other,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self.unaliased() {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.unaliased() {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view used by averages; integers widen to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self.unaliased() {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self.unaliased() {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_reference(&self) -> Option<&EntityRef> {
        match self.unaliased() {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Query-language equality.
    ///
    /// References compare by id only, numbers compare across integer/float,
    /// and `Null` never matches anything (including another `Null`).
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self.unaliased(), other.unaliased()) {
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Reference(a), Self::Reference(b)) => a.id == b.id,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Integer(_) | Self::Float(_), Self::Integer(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (a, b) => a == b,
        }
    }

    /// Ordering used by `order` clauses. Values of different shapes, and
    /// nulls, are unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self.unaliased(), other.unaliased()) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(_) | Self::Float(_), Self::Integer(_) | Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Reference(a), Self::Reference(b)) => Some(a.id.cmp(&b.id)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::String(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S")),
            Self::Reference(r) => write!(f, "{}", r.id),
            Self::Aggregate(inner) => inner.fmt(f),
        }
    }
}

impl From<EntityRef> for Value {
    fn from(value: EntityRef) -> Self {
        Self::Reference(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

/// A typed pointer to another record, optionally carrying its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity: String,
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityRef {
    pub fn new(entity: impl Into<String>, id: Uuid) -> Self {
        Self {
            entity: entity.into(),
            id,
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display label, falling back to the id when the reference is unnamed.
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity, self.id)
    }
}

/// A record of a given entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity: String,
    pub id: Uuid,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn new(entity: impl Into<String>, id: Uuid) -> Self {
        Self {
            entity: entity.into(),
            id,
            fields: Fields::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field value when present (a present field may still be `Null`).
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Present, non-null reference field.
    #[must_use]
    pub fn reference(&self, field: &str) -> Option<&EntityRef> {
        self.get(field).and_then(Value::as_reference)
    }

    #[must_use]
    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.entity.clone(), self.id)
    }

    /// Attribute lookup as seen by the query language: the primary-key
    /// attribute resolves to a reference to the record itself.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.fields.get(name) {
            return Some(value.clone());
        }
        (name == primary_key(&self.entity)).then(|| Value::Reference(self.to_ref()))
    }

    /// Keep only `columns` (all fields when `columns` is empty).
    #[must_use]
    pub fn project(mut self, columns: &[String]) -> Self {
        if !columns.is_empty() {
            self.fields.retain(|name, _| columns.iter().any(|c| c == name));
        }
        self
    }
}
