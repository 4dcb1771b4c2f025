// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory document backend for tests and local development.
//!
//! Holds every document under a single lock, so each write (and each batch)
//! is applied atomically and listeners see a consistent view. Nothing is
//! persisted.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use super::backend::{
    BatchOp, ChangeKind, DbError, Document, DocumentBackend, DocumentChange, DocumentSnapshot,
    Fields, ListenerRx, ListenerTx,
};
use super::reference::{compare_values, field_value, CollectionRef, DocumentRef, FieldFilter, FilterOp};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-memory [`DocumentBackend`].
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    clock: Clock,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Fields>,
    denied_prefixes: Vec<String>,
    doc_listeners: Vec<DocListener>,
    col_listeners: Vec<ColListener>,
}

struct DocListener {
    doc: DocumentRef,
    tx: ListenerTx<DocumentSnapshot>,
    last: DocumentSnapshot,
}

struct ColListener {
    collection: CollectionRef,
    tx: ListenerTx<Vec<DocumentChange>>,
    current: BTreeMap<String, Fields>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Use a custom clock for the timestamps this backend assigns.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock: Arc::new(clock),
        }
    }

    /// Reject every write to paths starting with `prefix`, as a security rule
    /// of the hosted database would.
    pub fn deny_writes(&self, prefix: &str) {
        self.lock().denied_prefixes.push(prefix.trim_matches('/').to_string());
    }

    /// Current fields of a document, bypassing listeners.
    pub fn document(&self, path: &str) -> Option<Fields> {
        self.lock().docs.get(path.trim_matches('/')).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of listeners whose receivers are still open.
    pub fn active_listeners(&self) -> usize {
        let mut inner = self.lock();
        inner.doc_listeners.retain(|l| !l.tx.is_closed());
        inner.col_listeners.retain(|l| !l.tx.is_closed());
        inner.doc_listeners.len() + inner.col_listeners.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn check_writable(&self, doc: &DocumentRef) -> Result<(), DbError> {
        if doc.split().is_none() {
            return Err(DbError::InvalidPath(doc.path().to_string()));
        }
        let denied = self
            .denied_prefixes
            .iter()
            .any(|prefix| doc.path().starts_with(prefix.as_str()));
        if denied {
            return Err(DbError::PermissionDenied(doc.path().to_string()));
        }
        Ok(())
    }

    fn snapshot(&self, doc: &DocumentRef) -> DocumentSnapshot {
        self.docs.get(doc.path()).map(|fields| Document {
            id: doc.id().to_string(),
            fields: fields.clone(),
        })
    }

    /// Documents directly inside `collection` that satisfy its query.
    fn query(&self, collection: &CollectionRef) -> Vec<(String, Fields)> {
        let prefix = format!("{}/", collection.path());
        let query = collection.query();

        let mut matches: Vec<(String, Fields)> = self
            .docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .filter(|(_, fields)| query.filters.iter().all(|f| matches_filter(fields, f)))
            .filter(|(_, fields)| {
                query
                    .order_by
                    .iter()
                    .all(|(field, _)| field_value(fields, field).is_some())
            })
            .map(|(path, fields)| (path[prefix.len()..].to_string(), fields.clone()))
            .collect();

        if !query.order_by.is_empty() {
            matches.sort_by(|(_, a), (_, b)| query.compare(a, b));
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit as usize);
        }
        matches
    }

    /// Push fresh state to every listener and drop the closed ones.
    fn notify(&mut self) {
        let mut doc_listeners = std::mem::take(&mut self.doc_listeners);
        doc_listeners.retain_mut(|listener| {
            let snapshot = self.snapshot(&listener.doc);
            if snapshot == listener.last {
                return !listener.tx.is_closed();
            }
            listener.last = snapshot.clone();
            listener.tx.send(Ok(snapshot)).is_ok()
        });
        self.doc_listeners = doc_listeners;

        let mut col_listeners = std::mem::take(&mut self.col_listeners);
        col_listeners.retain_mut(|listener| {
            let next: BTreeMap<String, Fields> =
                self.query(&listener.collection).into_iter().collect();
            let changes = diff(&listener.current, &next);
            listener.current = next;
            if changes.is_empty() {
                return !listener.tx.is_closed();
            }
            listener.tx.send(Ok(changes)).is_ok()
        });
        self.col_listeners = col_listeners;
    }
}

fn diff(before: &BTreeMap<String, Fields>, after: &BTreeMap<String, Fields>) -> Vec<DocumentChange> {
    let mut changes = Vec::new();
    for (id, fields) in after {
        let kind = match before.get(id) {
            None => ChangeKind::Added,
            Some(old) if old != fields => ChangeKind::Modified,
            Some(_) => continue,
        };
        changes.push(DocumentChange {
            kind,
            doc: Document {
                id: id.clone(),
                fields: fields.clone(),
            },
        });
    }
    for (id, fields) in before {
        if !after.contains_key(id) {
            changes.push(DocumentChange {
                kind: ChangeKind::Removed,
                doc: Document {
                    id: id.clone(),
                    fields: fields.clone(),
                },
            });
        }
    }
    changes
}

fn matches_filter(fields: &Fields, filter: &FieldFilter) -> bool {
    let Some(value) = field_value(fields, &filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Equal => value == &filter.value,
        FilterOp::NotEqual => value != &filter.value,
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|items| items.contains(&filter.value)),
        op => {
            let Some(ord) = compare_values(value, &filter.value) else {
                return false;
            };
            match op {
                FilterOp::LessThan => ord == Ordering::Less,
                FilterOp::LessThanOrEqual => ord != Ordering::Greater,
                FilterOp::GreaterThan => ord == Ordering::Greater,
                FilterOp::GreaterThanOrEqual => ord != Ordering::Less,
                _ => false,
            }
        }
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, DbError> {
        if doc.split().is_none() {
            return Err(DbError::InvalidPath(doc.path().to_string()));
        }
        Ok(self.lock().snapshot(doc))
    }

    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), DbError> {
        let mut inner = self.lock();
        inner.check_writable(doc)?;
        inner.docs.insert(doc.path().to_string(), fields);
        inner.notify();
        Ok(())
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), DbError> {
        let mut inner = self.lock();
        inner.check_writable(doc)?;
        let existing = inner
            .docs
            .get_mut(doc.path())
            .ok_or_else(|| DbError::NotFound(doc.path().to_string()))?;
        existing.extend(fields);
        inner.notify();
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), DbError> {
        let mut inner = self.lock();
        inner.check_writable(doc)?;
        if inner.docs.remove(doc.path()).is_some() {
            inner.notify();
        }
        Ok(())
    }

    async fn commit(&self, ops: Vec<BatchOp>) -> Result<(), DbError> {
        let mut inner = self.lock();
        for op in &ops {
            inner.check_writable(op.doc()).map_err(|e| {
                DbError::Aborted(format!("{} rejected: {}", op.doc(), e))
            })?;
        }
        for op in ops {
            match op {
                BatchOp::Set { doc, fields } => {
                    inner.docs.insert(doc.path().to_string(), fields);
                }
                BatchOp::Delete { doc } => {
                    inner.docs.remove(doc.path());
                }
            }
        }
        inner.notify();
        Ok(())
    }

    fn listen_document(&self, doc: &DocumentRef) -> ListenerRx<DocumentSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if doc.split().is_none() {
            let _ = tx.send(Err(DbError::InvalidPath(doc.path().to_string())));
            return rx;
        }
        let snapshot = inner.snapshot(doc);
        if tx.send(Ok(snapshot.clone())).is_ok() {
            inner.doc_listeners.push(DocListener {
                doc: doc.clone(),
                tx,
                last: snapshot,
            });
        }
        rx
    }

    fn listen_collection(&self, collection: &CollectionRef) -> ListenerRx<Vec<DocumentChange>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if collection.split().is_none() {
            let _ = tx.send(Err(DbError::InvalidPath(collection.path().to_string())));
            return rx;
        }
        let current = inner.query(collection);
        let initial = current
            .iter()
            .map(|(id, fields)| DocumentChange {
                kind: ChangeKind::Added,
                doc: Document {
                    id: id.clone(),
                    fields: fields.clone(),
                },
            })
            .collect();
        if tx.send(Ok(initial)).is_ok() {
            inner.col_listeners.push(ColListener {
                collection: collection.clone(),
                tx,
                current: current.into_iter().collect(),
            });
        }
        rx
    }

    fn server_timestamp(&self) -> Value {
        Value::String((self.clock)().to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}
