// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data-access service.
//!
//! A thin layer over [`DocumentBackend`] that resolves references, stamps
//! `createdAt`/`updatedAt`, and turns listeners into typed subscriptions.
//!
//! ```ignore
//! db.upsert("notes/xyz", &json!({ "content": "hello world" })).await?;
//! db.update("items/ID", &data).await?; // stamps updatedAt
//! db.set("items/ID", &data).await?;    // stamps createdAt and updatedAt
//! db.add("items", &data).await?;       // stamps createdAt and updatedAt
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::auto_id::auto_id;
use super::backend::{
    BatchOp, ChangeKind, DbError, Document, DocumentBackend, DocumentChange, Fields, ListenerRx,
};
use super::reference::{CollectionRef, DocumentRef, IntoCollectionRef, IntoDocumentRef, Query};
use super::subscription::{Subscription, WithId};

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Which branch an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

/// Kind of writes in a [`DatabaseService::batch_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    Set,
    Delete,
}

/// Generic document/collection access against the hosted database.
#[derive(Clone)]
pub struct DatabaseService {
    backend: Arc<dyn DocumentBackend>,
}

impl DatabaseService {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    /// Backend-assigned timestamp value.
    pub fn timestamp(&self) -> Value {
        self.backend.server_timestamp()
    }

    // ─── References ──────────────────────────────────────────────

    pub fn resolve_doc(&self, doc: impl IntoDocumentRef) -> DocumentRef {
        doc.into_document_ref()
    }

    pub fn resolve_collection(
        &self,
        collection: impl IntoCollectionRef,
        query: Option<Query>,
    ) -> CollectionRef {
        collection.into_collection_ref(query)
    }

    /// A fresh document id for `collection`. Nothing is written.
    pub fn new_key(&self, collection: impl IntoCollectionRef) -> Result<String, DbError> {
        let collection = collection.into_collection_ref(None);
        let key = auto_id()?;
        tracing::debug!(collection = %collection, key = %key, "Generated new key");
        Ok(key)
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Insert or update, decided by one existence read.
    ///
    /// Not atomic: a writer that creates or deletes the document between the
    /// read and the write can make this take the wrong branch.
    pub async fn upsert<D: Serialize>(
        &self,
        doc: impl IntoDocumentRef,
        data: &D,
    ) -> Result<Upserted, DbError> {
        let doc = doc.into_document_ref();
        let exists = self.backend.get(&doc).await?.is_some();

        if exists {
            self.update(&doc, data).await?;
            Ok(Upserted::Updated)
        } else {
            self.set(&doc, data).await?;
            Ok(Upserted::Created)
        }
    }

    /// Partial merge; stamps `updatedAt` only and never touches `createdAt`.
    pub async fn update<D: Serialize>(
        &self,
        doc: impl IntoDocumentRef,
        data: &D,
    ) -> Result<(), DbError> {
        let doc = doc.into_document_ref();
        let mut fields = to_fields(data)?;
        fields.remove(CREATED_AT);
        fields.insert(UPDATED_AT.to_string(), self.timestamp());
        self.backend.update(&doc, fields).await
    }

    /// Full replace; stamps `createdAt` and `updatedAt`.
    pub async fn set<D: Serialize>(&self, doc: impl IntoDocumentRef, data: &D) -> Result<(), DbError> {
        let doc = doc.into_document_ref();
        let fields = self.stamp_both(to_fields(data)?);
        self.backend.set(&doc, fields).await
    }

    pub async fn delete(&self, doc: impl IntoDocumentRef) -> Result<(), DbError> {
        let doc = doc.into_document_ref();
        self.backend.delete(&doc).await
    }

    /// Insert with a generated id; stamps `createdAt` and `updatedAt`.
    pub async fn add<D: Serialize>(
        &self,
        collection: impl IntoCollectionRef,
        data: &D,
    ) -> Result<DocumentRef, DbError> {
        let collection = collection.into_collection_ref(None);
        let doc = collection.doc(&auto_id()?);
        let fields = self.stamp_both(to_fields(data)?);
        self.backend.set(&doc, fields).await?;
        Ok(doc)
    }

    /// Apply every write in one all-or-nothing commit.
    ///
    /// Payloads are written as given; in [`BatchMode::Delete`] they are ignored.
    pub async fn batch_write(
        &self,
        updates: BTreeMap<String, Value>,
        mode: BatchMode,
    ) -> Result<(), DbError> {
        let mut ops = Vec::with_capacity(updates.len());
        for (path, data) in updates {
            let doc = DocumentRef::new(&path);
            match mode {
                BatchMode::Set => {
                    tracing::debug!(path = %doc, "batch set");
                    ops.push(BatchOp::Set {
                        doc,
                        fields: to_fields(&data)?,
                    });
                }
                BatchMode::Delete => {
                    tracing::debug!(path = %doc, "batch delete");
                    ops.push(BatchOp::Delete { doc });
                }
            }
        }
        self.backend.commit(ops).await
    }

    fn stamp_both(&self, mut fields: Fields) -> Fields {
        let timestamp = self.timestamp();
        fields.insert(UPDATED_AT.to_string(), timestamp.clone());
        fields.insert(CREATED_AT.to_string(), timestamp);
        fields
    }

    // ─── Live reads ──────────────────────────────────────────────

    /// Live payload of one document; `None` while it does not exist.
    pub fn read<T>(&self, doc: impl IntoDocumentRef) -> Subscription<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let doc = doc.into_document_ref();
        let rx = self.backend.listen_document(&doc);
        Subscription::from_listener(rx, |snapshot: Option<Document>| {
            snapshot.map(|d| decode::<T>(d.fields)).transpose()
        })
    }

    /// Live payloads of the documents matching a collection query.
    pub fn read_collection<T>(
        &self,
        collection: impl IntoCollectionRef,
        query: Option<Query>,
    ) -> Subscription<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let collection = collection.into_collection_ref(query);
        let rx = self.backend.listen_collection(&collection);
        let query = collection.query().clone();
        Subscription::from_listener_with_state(rx, Vec::new(), move |docs: &mut Vec<Document>, changes| {
            apply_changes(docs, changes, &query);
            docs.iter()
                .map(|d| decode::<T>(d.fields.clone()))
                .collect()
        })
    }

    /// Like [`DatabaseService::read_collection`], with each item's id.
    pub fn read_collection_with_ids<T>(
        &self,
        collection: impl IntoCollectionRef,
        query: Option<Query>,
    ) -> Subscription<Vec<WithId<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let collection = collection.into_collection_ref(query);
        let rx = self.backend.listen_collection(&collection);
        let query = collection.query().clone();
        Subscription::from_listener_with_state(rx, Vec::new(), move |docs: &mut Vec<Document>, changes| {
            apply_changes(docs, changes, &query);
            docs.iter().map(with_id::<T>).collect()
        })
    }

    /// Documents in the order they were first added. Later modifications and
    /// removals are not reflected.
    pub fn read_collection_added_with_ids<T>(
        &self,
        collection: impl IntoCollectionRef,
        query: Option<Query>,
    ) -> Subscription<Vec<WithId<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let collection = collection.into_collection_ref(query);
        let rx = self.backend.listen_collection(&collection);
        Subscription::from_listener_with_state(rx, Vec::new(), |docs: &mut Vec<Document>, changes| {
            for change in changes {
                if change.kind == ChangeKind::Added && !docs.iter().any(|d| d.id == change.doc.id) {
                    docs.push(change.doc);
                }
            }
            docs.iter().map(with_id::<T>).collect()
        })
    }

    // ─── Inspection ──────────────────────────────────────────────

    /// Load a document once and log how long it took.
    pub async fn inspect_doc(&self, doc: impl IntoDocumentRef) -> Result<Duration, DbError> {
        let doc = doc.into_document_ref();
        let start = Instant::now();
        let mut rx = self.backend.listen_document(&doc);
        let snapshot = first_event(&mut rx).await??;
        let elapsed = start.elapsed();

        tracing::info!(
            path = %doc,
            exists = snapshot.is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Loaded document"
        );
        Ok(elapsed)
    }

    /// Load a collection once and log how long it took.
    pub async fn inspect_col(&self, collection: impl IntoCollectionRef) -> Result<Duration, DbError> {
        let collection = collection.into_collection_ref(None);
        let start = Instant::now();
        let mut rx = self.backend.listen_collection(&collection);
        let changes = first_event(&mut rx).await??;
        let elapsed = start.elapsed();

        tracing::info!(
            path = %collection,
            count = changes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Loaded collection"
        );
        Ok(elapsed)
    }
}

async fn first_event<E>(rx: &mut ListenerRx<E>) -> Result<Result<E, DbError>, DbError> {
    let event = rx
        .recv()
        .await
        .ok_or_else(|| DbError::Backend("Listener closed before first snapshot".to_string()));
    rx.close();
    event
}

fn to_fields<D: Serialize>(data: &D) -> Result<Fields, DbError> {
    match serde_json::to_value(data)? {
        Value::Object(fields) => Ok(fields),
        other => Err(DbError::InvalidData(format!(
            "document data must be an object, got {}",
            kind_name(&other)
        ))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn decode<T: DeserializeOwned>(fields: Fields) -> Result<T, DbError> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

fn with_id<T: DeserializeOwned>(doc: &Document) -> Result<WithId<T>, DbError> {
    Ok(WithId {
        id: doc.id.clone(),
        data: decode(doc.fields.clone())?,
    })
}

/// Fold a batch of changes into the current result set, then restore the
/// query's order and limit.
///
/// Without `order_by`, new documents are appended.
fn apply_changes(docs: &mut Vec<Document>, changes: Vec<DocumentChange>, query: &Query) {
    for change in changes {
        let position = docs.iter().position(|d| d.id == change.doc.id);
        match (change.kind, position) {
            (ChangeKind::Removed, Some(i)) => {
                docs.remove(i);
            }
            (ChangeKind::Removed, None) => {}
            (_, Some(i)) => docs[i] = change.doc,
            (_, None) => docs.push(change.doc),
        }
    }

    if !query.order_by.is_empty() {
        // Stable: ties keep their current relative order.
        docs.sort_by(|a, b| query.compare(&a.fields, &b.fields));
    }
    if let Some(limit) = query.limit {
        docs.truncate(limit as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, v: i64) -> Document {
        Document {
            id: id.to_string(),
            fields: json!({ "v": v }).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_apply_changes_keeps_order() {
        let mut docs = Vec::new();
        apply_changes(
            &mut docs,
            vec![
                DocumentChange { kind: ChangeKind::Added, doc: doc("b", 1) },
                DocumentChange { kind: ChangeKind::Added, doc: doc("a", 2) },
            ],
            &Query::default(),
        );
        apply_changes(
            &mut docs,
            vec![
                DocumentChange { kind: ChangeKind::Modified, doc: doc("b", 5) },
                DocumentChange { kind: ChangeKind::Removed, doc: doc("a", 2) },
                DocumentChange { kind: ChangeKind::Added, doc: doc("c", 3) },
            ],
            &Query::default(),
        );
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(docs[0], doc("b", 5));
    }

    #[test]
    fn test_apply_changes_reorders_by_query() {
        use crate::db::reference::Direction;

        let query = Query::new().order_by("v", Direction::Ascending).limit(2);
        let mut docs = Vec::new();
        apply_changes(
            &mut docs,
            vec![
                DocumentChange { kind: ChangeKind::Added, doc: doc("a", 2) },
                DocumentChange { kind: ChangeKind::Added, doc: doc("b", 4) },
            ],
            &query,
        );
        apply_changes(
            &mut docs,
            vec![DocumentChange { kind: ChangeKind::Added, doc: doc("c", 1) }],
            &query,
        );
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        apply_changes(
            &mut docs,
            vec![DocumentChange { kind: ChangeKind::Modified, doc: doc("c", 9) }],
            &query,
        );
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        let err = to_fields(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, DbError::InvalidData(_)));
        assert!(to_fields(&json!({"a": 1})).is_ok());
    }
}
