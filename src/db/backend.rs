// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! The hosted document database boundary.
//!
//! Everything behind [`DocumentBackend`] is treated as a black box: the
//! backend owns consistency, indexing, and security rules. The data-access
//! service only composes these primitives.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::reference::{CollectionRef, DocumentRef};

/// Document fields.
pub type Fields = Map<String, Value>;

/// Errors surfaced by the document database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid document data: {0}")]
    InvalidData(String),

    #[error("Failed to decode document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Batch commit aborted: {0}")]
    Aborted(String),

    #[error("Database error: {0}")]
    Backend(String),
}

/// A document as read from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Kind of change reported by a collection listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub doc: Document,
}

/// One write of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set { doc: DocumentRef, fields: Fields },
    Delete { doc: DocumentRef },
}

impl BatchOp {
    pub fn doc(&self) -> &DocumentRef {
        match self {
            BatchOp::Set { doc, .. } | BatchOp::Delete { doc } => doc,
        }
    }
}

/// Receiving end of a live listener.
///
/// Dropping (or closing) the receiver releases the backend listener.
pub type ListenerRx<E> = mpsc::UnboundedReceiver<Result<E, DbError>>;

/// Sending end used by backends to publish listener events.
pub type ListenerTx<E> = mpsc::UnboundedSender<Result<E, DbError>>;

/// Snapshot of a single document; `None` while it does not exist.
pub type DocumentSnapshot = Option<Document>;

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Point read.
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>, DbError>;

    /// Full replace (creates the document when missing).
    async fn set(&self, doc: &DocumentRef, fields: Fields) -> Result<(), DbError>;

    /// Top-level merge; fails with [`DbError::NotFound`] when missing.
    async fn update(&self, doc: &DocumentRef, fields: Fields) -> Result<(), DbError>;

    async fn delete(&self, doc: &DocumentRef) -> Result<(), DbError>;

    /// Apply every op or none of them.
    async fn commit(&self, ops: Vec<BatchOp>) -> Result<(), DbError>;

    /// Live snapshots of one document. The first event is the current state.
    fn listen_document(&self, doc: &DocumentRef) -> ListenerRx<DocumentSnapshot>;

    /// Live change batches for a collection query. The first batch reports
    /// every current match as [`ChangeKind::Added`].
    fn listen_collection(&self, collection: &CollectionRef) -> ListenerRx<Vec<DocumentChange>>;

    /// Timestamp value assigned by the backend for `createdAt`/`updatedAt`.
    fn server_timestamp(&self) -> Value;
}
