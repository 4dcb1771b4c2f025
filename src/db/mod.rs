// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data-access layer over the hosted document database.

pub mod auto_id;
pub mod backend;
pub mod firestore;
pub mod memory;
pub mod reference;
pub mod service;
pub mod subscription;

pub use backend::{DbError, Document, DocumentBackend, Fields};
pub use firestore::FirestoreBackend;
pub use memory::MemoryBackend;
pub use reference::{CollectionRef, Direction, DocumentRef, FilterOp, Query};
pub use service::{BatchMode, DatabaseService, Upserted, CREATED_AT, UPDATED_AT};
pub use subscription::{Subscription, WithId};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Per-user sub-collection holding the subscription marker.
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}
