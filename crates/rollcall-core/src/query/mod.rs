//! Declarative query documents.
//!
//! A [`Query`] mirrors the store's filter language: one root entity, an
//! `and`/`or` filter of attribute conditions, inner-joined link entities,
//! ordering, and an optional aggregate. Handlers build queries with the
//! builder methods; store adapters either translate them or hand them to
//! [`eval`] to run against loaded records.
//!
//! `Display` renders the query as fetch markup, which is what gets traced.

pub mod eval;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use uuid::Uuid;

use crate::model::{EntityRef, STATE_FIELD, StateCode, Value, primary_key};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
}

impl Operator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
        }
    }
}

/// How a filter combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    And,
    Or,
}

impl FilterType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Aggregate functions the store supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Avg,
    Count,
}

impl AggregateFunction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type", default)]
    pub filter_type: FilterType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Filter {
    fn push(&mut self, attribute: &str, operator: Operator, value: Value) {
        self.conditions.push(Condition {
            attribute: attribute.to_string(),
            operator,
            value,
        });
    }
}

/// Inner join to another entity: a root row survives when at least one row
/// of `name` has `from` equal to the root's `to` and passes `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntity {
    pub name: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub filter: Filter,
}

impl LinkEntity {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            filter: Filter::default(),
        }
    }

    #[must_use]
    pub fn condition(mut self, attribute: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.filter.push(attribute, operator, value.into());
        self
    }

    #[must_use]
    pub fn active_only(self) -> Self {
        self.condition(STATE_FIELD, Operator::Eq, StateCode::Active.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub attribute: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub attribute: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub entity: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub links: Vec<LinkEntity>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub aggregate: Option<Aggregate>,
}

impl Query {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            columns: Vec::new(),
            filter: Filter::default(),
            links: Vec::new(),
            orders: Vec::new(),
            aggregate: None,
        }
    }

    #[must_use]
    pub fn column(mut self, attribute: impl Into<String>) -> Self {
        self.columns.push(attribute.into());
        self
    }

    #[must_use]
    pub fn condition(mut self, attribute: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.filter.push(attribute, operator, value.into());
        self
    }

    /// Restrict to rows referencing `target` through `attribute`.
    #[must_use]
    pub fn references(self, attribute: &str, target: &EntityRef) -> Self {
        self.condition(attribute, Operator::Eq, Value::Reference(target.clone()))
    }

    /// Restrict to active rows.
    #[must_use]
    pub fn active_only(self) -> Self {
        self.condition(STATE_FIELD, Operator::Eq, StateCode::Active.value())
    }

    /// Exclude the row with primary key `id`.
    #[must_use]
    pub fn excluding(self, id: Uuid) -> Self {
        let key = primary_key(&self.entity);
        let me = EntityRef::new(self.entity.clone(), id);
        self.condition(&key, Operator::Ne, Value::Reference(me))
    }

    #[must_use]
    pub fn link(mut self, link: LinkEntity) -> Self {
        self.links.push(link);
        self
    }

    #[must_use]
    pub fn order_by(mut self, attribute: impl Into<String>, descending: bool) -> Self {
        self.orders.push(Order {
            attribute: attribute.into(),
            descending,
        });
        self
    }

    #[must_use]
    pub fn aggregate(
        mut self,
        function: AggregateFunction,
        attribute: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.aggregate = Some(Aggregate {
            function,
            attribute: attribute.into(),
            alias: alias.into(),
        });
        self
    }
}

/// Escape a string for use inside a single- or double-quoted XML attribute.
#[must_use]
pub fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

fn write_filter(out: &mut String, filter: &Filter) -> fmt::Result {
    if filter.conditions.is_empty() {
        return Ok(());
    }
    write!(out, "<filter type='{}'>", filter.filter_type.as_str())?;
    for c in &filter.conditions {
        write!(
            out,
            "<condition attribute='{}' operator='{}' value='{}' />",
            xml_escape(&c.attribute),
            c.operator.as_str(),
            xml_escape(&c.value.to_string())
        )?;
    }
    out.push_str("</filter>");
    Ok(())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        if self.aggregate.is_some() {
            out.push_str("<fetch mapping='logical' aggregate='true'>");
        } else {
            out.push_str("<fetch mapping='logical'>");
        }
        write!(out, "<entity name='{}'>", xml_escape(&self.entity))?;
        for column in &self.columns {
            write!(out, "<attribute name='{}' />", xml_escape(column))?;
        }
        if let Some(agg) = &self.aggregate {
            write!(
                out,
                "<attribute name='{}' alias='{}' aggregate='{}' />",
                xml_escape(&agg.attribute),
                xml_escape(&agg.alias),
                agg.function
            )?;
        }
        for order in &self.orders {
            write!(
                out,
                "<order attribute='{}' descending='{}' />",
                xml_escape(&order.attribute),
                order.descending
            )?;
        }
        write_filter(&mut out, &self.filter)?;
        for link in &self.links {
            write!(
                out,
                "<link-entity name='{}' from='{}' to='{}' link-type='inner'>",
                xml_escape(&link.name),
                xml_escape(&link.from),
                xml_escape(&link.to)
            )?;
            write_filter(&mut out, &link.filter)?;
            out.push_str("</link-entity>");
        }
        out.push_str("</entity></fetch>");
        f.write_str(&out)
    }
}
