//! Query descriptor and client-side evaluation.
//!
//! A [`Query`] is an opaque filter/sort/skip/limit document. Backends expose
//! only an unordered full scan, so evaluation happens here, over the scanned
//! rows.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sort direction for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Filter/sort/skip/limit descriptor over JSON entities.
///
/// The filter is a Mongo-style document: top-level fields are AND-combined,
/// values are either literals (equality) or operator objects supporting
/// `$gt`, `$gte`, `$lt`, `$lte`, `$ne`, `$in`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub filter: Option<Value>,
    #[serde(default)]
    pub sort: Vec<(String, SortOrder)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality constraint on `field`.
    pub fn equal_to(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let filter = self
            .filter
            .get_or_insert_with(|| Value::Object(Map::new()));
        if let Some(obj) = filter.as_object_mut() {
            obj.insert(field.into(), value.into());
        }
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `doc` satisfies the filter. An absent filter matches all.
    pub fn matches(&self, doc: &Value) -> bool {
        let Some(filter) = self.filter.as_ref().and_then(Value::as_object) else {
            return true;
        };
        filter.iter().all(|(field, condition)| {
            let actual = doc.get(field);
            match condition.as_object() {
                Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    ops.iter().all(|(op, expected)| {
                        matches_operator(op, actual, expected)
                    })
                }
                _ => actual == Some(condition),
            }
        })
    }

    /// Apply filter, sort, skip and limit to a scanned row set.
    pub fn evaluate(&self, docs: Vec<Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = docs.into_iter().filter(|d| self.matches(d)).collect();
        if !self.sort.is_empty() {
            matched.sort_by(|a, b| {
                for (field, order) in &self.sort {
                    let ord = compare_values(a.get(field), b.get(field));
                    let ord = match order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }
        let skip = self.skip.unwrap_or(0);
        let mut matched: Vec<Value> = matched.into_iter().skip(skip).collect();
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Filter only; sort/skip/limit are ignored, as for counting.
    pub fn filter_only(&self, docs: Vec<Value>) -> Vec<Value> {
        docs.into_iter().filter(|d| self.matches(d)).collect()
    }
}

fn matches_operator(op: &str, actual: Option<&Value>, expected: &Value) -> bool {
    use std::cmp::Ordering::*;
    match op {
        "$ne" => actual != Some(expected),
        "$in" => expected
            .as_array()
            .is_some_and(|set| actual.is_some_and(|a| set.contains(a))),
        "$gt" => actual.is_some_and(|a| compare_values(Some(a), Some(expected)) == Greater),
        "$gte" => actual.is_some_and(|a| compare_values(Some(a), Some(expected)) != Less),
        "$lt" => actual.is_some_and(|a| compare_values(Some(a), Some(expected)) == Less),
        "$lte" => actual.is_some_and(|a| compare_values(Some(a), Some(expected)) != Greater),
        _ => false,
    }
}

/// Total order over JSON values for sorting and range operators.
/// Missing and null sort first; numbers compare numerically; strings and
/// booleans compare naturally; anything else falls back to text rendering.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Group rows by the values of `key` fields.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Fields whose value tuple identifies a group.
    pub key: Vec<String>,
    /// Optional pre-filter applied before grouping.
    pub query: Option<Query>,
}

impl Aggregation {
    pub fn group_by(fields: &[&str]) -> Self {
        Self {
            key: fields.iter().map(|f| f.to_string()).collect(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }
}

/// One group produced by [`Aggregation`] evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupResult {
    /// Key field values identifying this group.
    pub key: Map<String, Value>,
    /// Number of rows in the group.
    pub count: usize,
}

/// Evaluate an aggregation over a scanned row set.
pub fn group(aggregation: &Aggregation, docs: Vec<Value>) -> Vec<GroupResult> {
    let docs = match &aggregation.query {
        Some(query) => query.filter_only(docs),
        None => docs,
    };

    let mut groups: Vec<GroupResult> = Vec::new();
    for doc in &docs {
        let mut key = Map::new();
        for field in &aggregation.key {
            key.insert(
                field.clone(),
                doc.get(field).cloned().unwrap_or(Value::Null),
            );
        }
        match groups.iter_mut().find(|g| g.key == key) {
            Some(existing) => existing.count += 1,
            None => groups.push(GroupResult { key, count: 1 }),
        }
    }
    groups
}
