// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore implementation of the document backend.
//!
//! Paths are slash-separated as in the web SDK (`users/{uid}/subscriptions/{uid}`);
//! nested collections are addressed through their parent document path.
//! Timestamps are RFC 3339 strings taken from the process clock.

use async_trait::async_trait;
use firestore::{
    FirestoreListenEvent, FirestoreListenerTarget, FirestoreMemListenStateStorage,
    FirestoreQueryDirection, FirestoreWritePrecondition,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::backend::{
    BatchOp, ChangeKind, DbError, Document, DocumentBackend, DocumentChange, DocumentSnapshot,
    Fields, ListenerRx, ListenerTx,
};
use super::reference::{CollectionRef, Direction, DocumentRef, FieldFilter, FilterOp};

const LISTEN_TARGET: u32 = 1;

type ListenResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Firestore-backed [`DocumentBackend`].
#[derive(Clone)]
pub struct FirestoreBackend {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreBackend {
    /// Connect to Firestore.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, DbError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| DbError::Backend(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Emulator connection with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self, DbError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJzdHJlYW0ifQ."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            DbError::Backend(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore (Emulator)");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline backend: every operation fails.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, DbError> {
        self.client
            .as_ref()
            .ok_or_else(|| DbError::Backend("Database not connected (offline mode)".to_string()))
    }
}

/// Full parent path for the crate's `parent(...)` builders.
fn parent_path(client: &firestore::FirestoreDb, parent: Option<&str>) -> String {
    match parent {
        Some(parent) => format!("{}/{}", client.get_documents_path(), parent),
        None => client.get_documents_path().to_string(),
    }
}

fn split_doc(doc: &DocumentRef) -> Result<(Option<&str>, &str, &str), DbError> {
    doc.split()
        .ok_or_else(|| DbError::InvalidPath(doc.path().to_string()))
}

fn split_collection(collection: &CollectionRef) -> Result<(Option<&str>, &str), DbError> {
    collection
        .split()
        .ok_or_else(|| DbError::InvalidPath(collection.path().to_string()))
}

fn map_err(path: &str, err: firestore::errors::FirestoreError) -> DbError {
    if let firestore::errors::FirestoreError::DataNotFoundError(_) = err {
        return DbError::NotFound(path.to_string());
    }
    let message = err.to_string();
    if message.contains("PERMISSION_DENIED") || message.contains("PermissionDenied") {
        DbError::PermissionDenied(path.to_string())
    } else if message.contains("NOT_FOUND") || message.contains("NotFound") {
        DbError::NotFound(path.to_string())
    } else {
        DbError::Backend(message)
    }
}

/// Decode a raw Firestore document into id and JSON fields.
fn to_document(name: &str, fields: Value) -> Result<Document, DbError> {
    let id = name.rsplit('/').next().unwrap_or_default().to_string();
    match fields {
        Value::Object(mut fields) => {
            // Metadata the crate's deserializer injects.
            fields.retain(|key, _| !key.starts_with("_firestore"));
            Ok(Document { id, fields })
        }
        _ => Err(DbError::InvalidData(format!("document {} is not a map", name))),
    }
}

fn order_direction(direction: Direction) -> FirestoreQueryDirection {
    match direction {
        Direction::Ascending => FirestoreQueryDirection::Ascending,
        Direction::Descending => FirestoreQueryDirection::Descending,
    }
}

fn field_filter(
    q: &firestore::select_filter_builder::FirestoreQueryFilterBuilder,
    filter: &FieldFilter,
) -> Option<firestore::FirestoreQueryFilter> {
    let field = q.field(filter.field.as_str());
    let value = filter.value.clone();
    match filter.op {
        FilterOp::Equal => field.eq(value),
        FilterOp::NotEqual => field.neq(value),
        FilterOp::LessThan => field.less_than(value),
        FilterOp::LessThanOrEqual => field.less_than_or_equal(value),
        FilterOp::GreaterThan => field.greater_than(value),
        FilterOp::GreaterThanOrEqual => field.greater_than_or_equal(value),
        FilterOp::ArrayContains => field.array_contains(value),
    }
}

#[async_trait]
impl DocumentBackend for FirestoreBackend {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, DbError> {
        let client = self.get_client()?;
        let (parent, collection, id) = split_doc(doc)?;

        let found = client
            .fluent()
            .select()
            .by_id_in(collection)
            .parent(parent_path(client, parent))
            .one(id)
            .await
            .map_err(|e| map_err(doc.path(), e))?;

        match found {
            Some(raw) => {
                let fields: Value = firestore::FirestoreDb::deserialize_doc_to(&raw)
                    .map_err(|e| map_err(doc.path(), e))?;
                Ok(Some(to_document(&raw.name, fields)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), DbError> {
        let client = self.get_client()?;
        let (parent, collection, id) = split_doc(doc)?;

        let _: () = client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .parent(parent_path(client, parent))
            .object(&Value::Object(fields))
            .execute()
            .await
            .map_err(|e| map_err(doc.path(), e))?;
        Ok(())
    }

    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), DbError> {
        let client = self.get_client()?;
        let (parent, collection, id) = split_doc(doc)?;
        let mask: Vec<String> = fields.keys().cloned().collect();

        let _: () = client
            .fluent()
            .update()
            .fields(mask)
            .in_col(collection)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .parent(parent_path(client, parent))
            .object(&Value::Object(fields))
            .execute()
            .await
            .map_err(|e| map_err(doc.path(), e))?;
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> Result<(), DbError> {
        let client = self.get_client()?;
        let (parent, collection, id) = split_doc(doc)?;

        client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .parent(parent_path(client, parent))
            .execute()
            .await
            .map_err(|e| map_err(doc.path(), e))?;
        Ok(())
    }

    async fn commit(&self, ops: Vec<BatchOp>) -> Result<(), DbError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| DbError::Backend(format!("Failed to begin transaction: {}", e)))?;

        for op in &ops {
            let (parent, collection, id) = split_doc(op.doc())?;
            let parent = parent_path(client, parent);
            match op {
                BatchOp::Set { doc, fields } => {
                    client
                        .fluent()
                        .update()
                        .in_col(collection)
                        .document_id(id)
                        .parent(parent)
                        .object(&Value::Object(fields.clone()))
                        .add_to_transaction(&mut transaction)
                        .map_err(|e| {
                            DbError::Aborted(format!("Failed to add set of {}: {}", doc, e))
                        })?;
                }
                BatchOp::Delete { doc } => {
                    client
                        .fluent()
                        .delete()
                        .from(collection)
                        .document_id(id)
                        .parent(parent)
                        .add_to_transaction(&mut transaction)
                        .map_err(|e| {
                            DbError::Aborted(format!("Failed to add delete of {}: {}", doc, e))
                        })?;
                }
            }
        }

        transaction
            .commit()
            .await
            .map_err(|e| DbError::Aborted(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(ops = ops.len(), "Batch committed");
        Ok(())
    }

    fn listen_document(&self, doc: &DocumentRef) -> ListenerRx<DocumentSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.get_client() {
            Ok(client) => {
                let backend = self.clone();
                let client = client.clone();
                let doc = doc.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_document_listener(backend, client, doc, tx.clone()).await {
                        let _ = tx.send(Err(e));
                    }
                });
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        }
        rx
    }

    fn listen_collection(&self, collection: &CollectionRef) -> ListenerRx<Vec<DocumentChange>> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.get_client() {
            Ok(client) => {
                let client = client.clone();
                let collection = collection.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_collection_listener(client, collection, tx.clone()).await {
                        let _ = tx.send(Err(e));
                    }
                });
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        }
        rx
    }

    fn server_timestamp(&self) -> Value {
        Value::String(chrono::Utc::now().to_rfc3339())
    }
}

/// Emit the current snapshot, then every change until the receiver goes away.
async fn run_document_listener(
    backend: FirestoreBackend,
    client: firestore::FirestoreDb,
    doc: DocumentRef,
    tx: ListenerTx<DocumentSnapshot>,
) -> Result<(), DbError> {
    let (parent, collection, id) = split_doc(&doc)?;

    let mut listener = client
        .create_listener(FirestoreMemListenStateStorage::new())
        .await
        .map_err(|e| map_err(doc.path(), e))?;

    client
        .fluent()
        .select()
        .by_id_in(collection)
        .parent(parent_path(&client, parent))
        .batch_listen([id])
        .add_target(FirestoreListenerTarget::new(LISTEN_TARGET), &mut listener)
        .map_err(|e| map_err(doc.path(), e))?;

    // Firestore sends nothing for a missing document, so read it once first.
    if tx.send(Ok(backend.get(&doc).await?)).is_err() {
        return Ok(());
    }

    let sink = tx.clone();
    let path = doc.path().to_string();
    listener
        .start(move |event| {
            let sink = sink.clone();
            let path = path.clone();
            async move {
                match event {
                    FirestoreListenEvent::DocumentChange(change) => {
                        if let Some(raw) = change.document {
                            let snapshot = firestore::FirestoreDb::deserialize_doc_to::<Value>(&raw)
                                .map_err(|e| map_err(&path, e))
                                .and_then(|fields| to_document(&raw.name, fields))
                                .map(Some);
                            let _ = sink.send(snapshot);
                        }
                    }
                    FirestoreListenEvent::DocumentDelete(_)
                    | FirestoreListenEvent::DocumentRemove(_) => {
                        let _ = sink.send(Ok(None));
                    }
                    _ => {}
                }
                ListenResult::Ok(())
            }
        })
        .await
        .map_err(|e| map_err(doc.path(), e))?;

    tx.closed().await;
    listener
        .shutdown()
        .await
        .map_err(|e| map_err(doc.path(), e))?;
    tracing::debug!(path = %doc, "Document listener stopped");
    Ok(())
}

/// Emit the initial matching set, then one change batch per listen event.
async fn run_collection_listener(
    client: firestore::FirestoreDb,
    collection: CollectionRef,
    tx: ListenerTx<Vec<DocumentChange>>,
) -> Result<(), DbError> {
    let (parent, collection_id) = split_collection(&collection)?;
    let parent = parent_path(&client, parent);
    let query = collection.query().clone();
    let order: Vec<(String, FirestoreQueryDirection)> = query
        .order_by
        .iter()
        .map(|(field, direction)| (field.clone(), order_direction(*direction)))
        .collect();

    let filters = query.filters.clone();
    let select = client
        .fluent()
        .select()
        .from(collection_id)
        .parent(parent.clone())
        .filter(move |q| q.for_all(filters.iter().map(|f| field_filter(&q, f))))
        .order_by(order.clone());
    let initial = match query.limit {
        Some(limit) => select.limit(limit).query().await,
        None => select.query().await,
    }
    .map_err(|e| map_err(collection.path(), e))?;

    let mut changes = Vec::with_capacity(initial.len());
    for raw in &initial {
        let fields: Value = firestore::FirestoreDb::deserialize_doc_to(raw)
            .map_err(|e| map_err(collection.path(), e))?;
        changes.push(DocumentChange {
            kind: ChangeKind::Added,
            doc: to_document(&raw.name, fields)?,
        });
    }
    let known: Arc<Mutex<BTreeSet<String>>> = Arc::new(Mutex::new(
        changes.iter().map(|c| c.doc.id.clone()).collect(),
    ));
    if tx.send(Ok(changes)).is_err() {
        return Ok(());
    }

    let mut listener = client
        .create_listener(FirestoreMemListenStateStorage::new())
        .await
        .map_err(|e| map_err(collection.path(), e))?;

    let filters = query.filters.clone();
    let target = FirestoreListenerTarget::new(LISTEN_TARGET);
    let select = client
        .fluent()
        .select()
        .from(collection_id)
        .parent(parent)
        .filter(move |q| q.for_all(filters.iter().map(|f| field_filter(&q, f))))
        .order_by(order);
    match query.limit {
        Some(limit) => select.limit(limit).listen().add_target(target, &mut listener),
        None => select.listen().add_target(target, &mut listener),
    }
    .map_err(|e| map_err(collection.path(), e))?;

    let sink = tx.clone();
    let path = collection.path().to_string();
    listener
        .start(move |event| {
            let sink = sink.clone();
            let known = known.clone();
            let path = path.clone();
            async move {
                let change = match event {
                    FirestoreListenEvent::DocumentChange(change) => match change.document {
                        Some(raw) => firestore::FirestoreDb::deserialize_doc_to::<Value>(&raw)
                            .map_err(|e| map_err(&path, e))
                            .and_then(|fields| to_document(&raw.name, fields))
                            .map(|doc| {
                                let mut known =
                                    known.lock().unwrap_or_else(|p| p.into_inner());
                                let kind = if known.insert(doc.id.clone()) {
                                    ChangeKind::Added
                                } else {
                                    ChangeKind::Modified
                                };
                                Some(DocumentChange { kind, doc })
                            }),
                        None => Ok(None),
                    },
                    FirestoreListenEvent::DocumentDelete(deleted) => {
                        Ok(removed(&known, &deleted.document))
                    }
                    FirestoreListenEvent::DocumentRemove(gone) => Ok(removed(&known, &gone.document)),
                    _ => Ok(None),
                };
                match change {
                    Ok(Some(change)) => {
                        let _ = sink.send(Ok(vec![change]));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = sink.send(Err(e));
                    }
                }
                ListenResult::Ok(())
            }
        })
        .await
        .map_err(|e| map_err(collection.path(), e))?;

    tx.closed().await;
    listener
        .shutdown()
        .await
        .map_err(|e| map_err(collection.path(), e))?;
    tracing::debug!(path = %collection, "Collection listener stopped");
    Ok(())
}

fn removed(known: &Mutex<BTreeSet<String>>, name: &str) -> Option<DocumentChange> {
    let id = name.rsplit('/').next().unwrap_or_default().to_string();
    let mut known = known.lock().unwrap_or_else(|p| p.into_inner());
    if !known.remove(&id) {
        return None;
    }
    Some(DocumentChange {
        kind: ChangeKind::Removed,
        doc: Document {
            id,
            fields: Fields::new(),
        },
    })
}
