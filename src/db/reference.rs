// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Document and collection references.
//!
//! A reference is either a slash-separated path string or an already resolved
//! handle. Resolution never fails: a malformed path is only reported by the
//! backend when an operation actually uses it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Handle to a single document, e.g. `users/abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    path: String,
}

impl DocumentRef {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize(path.as_ref()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment (the document id).
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionRef {
        match self.path.rsplit_once('/') {
            Some((parent, _)) => CollectionRef::new(parent),
            None => CollectionRef::new(""),
        }
    }

    /// A sub-collection below this document.
    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef::new(format!("{}/{}", self.path, name))
    }

    /// Split into `(parent document path, collection id, document id)`.
    ///
    /// Returns `None` when the path does not name a document (an odd number of
    /// segments, or an empty segment).
    pub fn split(&self) -> Option<(Option<&str>, &str, &str)> {
        let segments = segments(&self.path)?;
        if segments.len() % 2 != 0 {
            return None;
        }
        let (rest, id) = self.path.rsplit_once('/')?;
        match rest.rsplit_once('/') {
            Some((parent, collection)) => Some((Some(parent), collection, id)),
            None => Some((None, rest, id)),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Handle to a collection plus the query narrowing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRef {
    path: String,
    query: Query,
}

impl CollectionRef {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize(path.as_ref()),
            query: Query::default(),
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Collection id (last path segment).
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn doc(&self, id: &str) -> DocumentRef {
        DocumentRef::new(format!("{}/{}", self.path, id))
    }

    /// Split into `(parent document path, collection id)`.
    pub fn split(&self) -> Option<(Option<&str>, &str)> {
        let segments = segments(&self.path)?;
        if segments.len() % 2 != 1 {
            return None;
        }
        match self.path.rsplit_once('/') {
            Some((parent, collection)) => Some((Some(parent), collection)),
            None => Some((None, self.path.as_str())),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn segments(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Anything that resolves to a [`DocumentRef`]: a path or a handle.
pub trait IntoDocumentRef {
    fn into_document_ref(self) -> DocumentRef;
}

impl IntoDocumentRef for DocumentRef {
    fn into_document_ref(self) -> DocumentRef {
        self
    }
}

impl IntoDocumentRef for &DocumentRef {
    fn into_document_ref(self) -> DocumentRef {
        self.clone()
    }
}

impl IntoDocumentRef for &str {
    fn into_document_ref(self) -> DocumentRef {
        DocumentRef::new(self)
    }
}

impl IntoDocumentRef for String {
    fn into_document_ref(self) -> DocumentRef {
        DocumentRef::new(self)
    }
}

impl IntoDocumentRef for &String {
    fn into_document_ref(self) -> DocumentRef {
        DocumentRef::new(self)
    }
}

/// Anything that resolves to a [`CollectionRef`].
///
/// Only path strings take the caller's query; a handle keeps its own.
pub trait IntoCollectionRef {
    fn into_collection_ref(self, query: Option<Query>) -> CollectionRef;
}

impl IntoCollectionRef for CollectionRef {
    fn into_collection_ref(self, _query: Option<Query>) -> CollectionRef {
        self
    }
}

impl IntoCollectionRef for &CollectionRef {
    fn into_collection_ref(self, _query: Option<Query>) -> CollectionRef {
        self.clone()
    }
}

impl IntoCollectionRef for &str {
    fn into_collection_ref(self, query: Option<Query>) -> CollectionRef {
        CollectionRef::new(self).with_query(query.unwrap_or_default())
    }
}

impl IntoCollectionRef for String {
    fn into_collection_ref(self, query: Option<Query>) -> CollectionRef {
        self.as_str().into_collection_ref(query)
    }
}

impl IntoCollectionRef for &String {
    fn into_collection_ref(self, query: Option<Query>) -> CollectionRef {
        self.as_str().into_collection_ref(query)
    }
}

// ─── Queries ─────────────────────────────────────────────────

/// Comparison operator of a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Query narrowing a collection: all filters must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<FieldFilter>,
    pub order_by: Vec<(String, Direction)>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Equal, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.order_by.is_empty() && self.limit.is_none()
    }

    /// Order two documents by the `order_by` clauses; equal when there are none.
    pub fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        for (field, direction) in &self.order_by {
            let ord = match (field_value(a, field), field_value(b, field)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            let ord = match direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Look up a possibly dotted field path.
pub(crate) fn field_value<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
