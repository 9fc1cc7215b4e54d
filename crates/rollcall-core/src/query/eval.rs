//! Reference evaluator for [`Query`] documents over in-process records.
//!
//! Adapters that keep records locally ([`crate::store::memory`],
//! [`crate::store::sqlite`]) load the candidate rows of an entity through
//! [`RecordSource`] and let this module apply filters, joins, ordering and
//! aggregates, so every local store answers queries identically.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{AggregateFunction, Condition, Filter, FilterType, Operator, Query};
use crate::model::{Record, Value};
use crate::store::StoreError;

/// One row of an aggregate result: alias → aliased value.
pub type AggregateRow = BTreeMap<String, Value>;

/// Access to every stored record of one entity type.
pub trait RecordSource {
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage cannot be read.
    fn records_of(&self, entity: &str) -> Result<Vec<Record>, StoreError>;
}

fn condition_holds(record: &Record, condition: &Condition) -> bool {
    let Some(actual) = record.attribute(&condition.attribute) else {
        return false;
    };
    match condition.operator {
        Operator::Eq => actual.matches(&condition.value),
        Operator::Ne => {
            !actual.is_null() && !condition.value.is_null() && !actual.matches(&condition.value)
        }
    }
}

fn filter_holds(record: &Record, filter: &Filter) -> bool {
    if filter.conditions.is_empty() {
        return true;
    }
    match filter.filter_type {
        FilterType::And => filter.conditions.iter().all(|c| condition_holds(record, c)),
        FilterType::Or => filter.conditions.iter().any(|c| condition_holds(record, c)),
    }
}

fn compare_by(a: &Record, b: &Record, query: &Query) -> Ordering {
    for order in &query.orders {
        let left = a.attribute(&order.attribute);
        let right = b.attribute(&order.attribute);
        let ord = match (left, right) {
            (Some(l), Some(r)) => l.compare(&r).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ord = if order.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn matching(query: &Query, source: &dyn RecordSource) -> Result<Vec<Record>, StoreError> {
    let linked = query
        .links
        .iter()
        .map(|link| source.records_of(&link.name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows: Vec<Record> = source
        .records_of(&query.entity)?
        .into_iter()
        .filter(|record| filter_holds(record, &query.filter))
        .filter(|record| {
            query.links.iter().zip(&linked).all(|(link, candidates)| {
                let Some(local) = record.attribute(&link.to) else {
                    return false;
                };
                candidates.iter().any(|other| {
                    other
                        .attribute(&link.from)
                        .is_some_and(|remote| remote.matches(&local))
                        && filter_holds(other, &link.filter)
                })
            })
        })
        .collect();

    rows.sort_by(|a, b| compare_by(a, b, query));
    Ok(rows)
}

/// Rows of `query.entity` that satisfy the query, projected to its columns.
///
/// # Errors
///
/// Propagates read failures from `source`.
pub fn select(query: &Query, source: &dyn RecordSource) -> Result<Vec<Record>, StoreError> {
    Ok(matching(query, source)?
        .into_iter()
        .map(|record| record.project(&query.columns))
        .collect())
}

/// Evaluate the query's aggregate.
///
/// `count` always yields one row (possibly `0`). `avg` yields no row at all
/// when no matching row carries a numeric value. A query without an
/// aggregate yields no rows.
///
/// # Errors
///
/// Propagates read failures from `source`.
#[allow(clippy::cast_precision_loss)]
pub fn aggregate(query: &Query, source: &dyn RecordSource) -> Result<Vec<AggregateRow>, StoreError> {
    let Some(agg) = &query.aggregate else {
        return Ok(Vec::new());
    };
    let rows = matching(query, source)?;

    let value = match agg.function {
        AggregateFunction::Count => {
            Value::Integer(i64::try_from(rows.len()).unwrap_or(i64::MAX))
        }
        AggregateFunction::Avg => {
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.get(&agg.attribute).and_then(Value::as_f64))
                .collect();
            if values.is_empty() {
                return Ok(Vec::new());
            }
            Value::Float(values.iter().sum::<f64>() / values.len() as f64)
        }
    };

    Ok(vec![AggregateRow::from([(
        agg.alias.clone(),
        Value::Aggregate(Box::new(value)),
    )])])
}
