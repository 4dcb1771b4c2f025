// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data-access service behaviour against the in-memory backend.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use stream_core::db::{
    BatchMode, DatabaseService, DbError, MemoryBackend, Query, Upserted, WithId, CREATED_AT,
    UPDATED_AT,
};

mod common;
use common::within;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    content: String,
}

fn note(content: &str) -> Note {
    Note {
        content: content.to_string(),
    }
}

/// Backend whose clock only moves when the test says so.
fn manual_clock() -> (Arc<MemoryBackend>, Arc<AtomicI64>) {
    let seconds = Arc::new(AtomicI64::new(1_700_000_000));
    let clock = seconds.clone();
    let backend = MemoryBackend::with_clock(move || {
        DateTime::<Utc>::from_timestamp(clock.load(Ordering::SeqCst), 0).unwrap()
    });
    (Arc::new(backend), seconds)
}

fn service(backend: &Arc<MemoryBackend>) -> DatabaseService {
    DatabaseService::new(backend.clone())
}

fn stamps(backend: &MemoryBackend, path: &str) -> (Value, Value) {
    let fields = backend.document(path).expect("document exists");
    (fields[CREATED_AT].clone(), fields[UPDATED_AT].clone())
}

// ─── Writes ──────────────────────────────────────────────────

#[tokio::test]
async fn test_upsert_missing_document_sets_both_stamps() {
    let (backend, _) = manual_clock();
    let db = service(&backend);

    let outcome = db.upsert("notes/a", &note("hello")).await.unwrap();

    assert_eq!(outcome, Upserted::Created);
    let (created, updated) = stamps(&backend, "notes/a");
    assert!(created.is_string());
    assert_eq!(created, updated);
    assert_eq!(backend.document("notes/a").unwrap()["content"], "hello");
}

#[tokio::test]
async fn test_upsert_existing_document_only_moves_updated_at() {
    let (backend, clock) = manual_clock();
    let db = service(&backend);

    db.upsert("notes/a", &note("first")).await.unwrap();
    let (created_before, _) = stamps(&backend, "notes/a");

    clock.fetch_add(60, Ordering::SeqCst);
    let outcome = db.upsert("notes/a", &note("second")).await.unwrap();

    assert_eq!(outcome, Upserted::Updated);
    let (created_after, updated_after) = stamps(&backend, "notes/a");
    assert_eq!(created_after, created_before);
    assert_ne!(updated_after, created_after);
    assert_eq!(backend.document("notes/a").unwrap()["content"], "second");
}

#[tokio::test]
async fn test_set_overwrites_caller_supplied_stamps() {
    let (backend, _) = manual_clock();
    let db = service(&backend);

    db.set(
        "notes/a",
        &json!({ "content": "x", "createdAt": "1999-01-01", "updatedAt": "1999-01-01" }),
    )
    .await
    .unwrap();

    let (created, updated) = stamps(&backend, "notes/a");
    assert_ne!(created, json!("1999-01-01"));
    assert_eq!(created, updated);
}

#[tokio::test]
async fn test_update_never_touches_created_at() {
    let (backend, clock) = manual_clock();
    let db = service(&backend);

    db.set("notes/a", &note("x")).await.unwrap();
    let (created_before, _) = stamps(&backend, "notes/a");

    clock.fetch_add(5, Ordering::SeqCst);
    db.update("notes/a", &json!({ "extra": 1, "createdAt": "forged" }))
        .await
        .unwrap();

    let fields = backend.document("notes/a").unwrap();
    assert_eq!(fields[CREATED_AT], created_before);
    assert_ne!(fields[UPDATED_AT], created_before);
    assert_eq!(fields["content"], "x");
    assert_eq!(fields["extra"], 1);
}

#[tokio::test]
async fn test_update_missing_document_fails() {
    let backend = Arc::new(MemoryBackend::new());
    let err = service(&backend)
        .update("notes/missing", &note("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[tokio::test]
async fn test_add_generates_id_and_stamps() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);

    let doc = db.add("notes", &note("added")).await.unwrap();

    assert_eq!(doc.id().len(), 20);
    assert_eq!(doc.path(), format!("notes/{}", doc.id()));
    let (created, updated) = stamps(&backend, doc.path());
    assert_eq!(created, updated);
}

#[tokio::test]
async fn test_new_key_writes_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);

    let first = db.new_key("notes").unwrap();
    let second = db.new_key("notes").unwrap();

    assert_ne!(first, second);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);

    db.set("notes/a", &note("x")).await.unwrap();
    db.delete("notes/a").await.unwrap();
    db.delete("notes/a").await.unwrap();
    assert!(backend.document("notes/a").is_none());
}

#[tokio::test]
async fn test_denied_write_surfaces_permission_error() {
    let backend = Arc::new(MemoryBackend::new());
    backend.deny_writes("locked");

    let err = service(&backend)
        .set("locked/a", &note("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::PermissionDenied(_)));
}

// ─── Batches ─────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_batch_applies_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    backend.deny_writes("zz-locked");
    let db = service(&backend);

    let mut updates = BTreeMap::new();
    updates.insert("notes/a".to_string(), json!({ "content": "a" }));
    updates.insert("notes/b".to_string(), json!({ "content": "b" }));
    // Sorts last: the rejected write is the final op of the batch.
    updates.insert("zz-locked/c".to_string(), json!({ "content": "c" }));

    let err = db.batch_write(updates, BatchMode::Set).await.unwrap_err();

    assert!(matches!(err, DbError::Aborted(_)));
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_rejected_delete_batch_keeps_every_document() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);
    db.set("notes/a", &note("a")).await.unwrap();
    db.set("notes/b", &note("b")).await.unwrap();
    db.set("zz-locked/c", &note("c")).await.unwrap();
    backend.deny_writes("zz-locked");

    let updates: BTreeMap<String, Value> = ["notes/a", "notes/b", "zz-locked/c"]
        .into_iter()
        .map(|path| (path.to_string(), Value::Null))
        .collect();
    assert!(db.batch_write(updates, BatchMode::Delete).await.is_err());
    assert_eq!(backend.len(), 3);
}

#[tokio::test]
async fn test_batch_writes_payloads_as_given() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);

    let mut updates = BTreeMap::new();
    updates.insert("notes/a".to_string(), json!({ "content": "a" }));
    updates.insert("users/u1/notes/b".to_string(), json!({ "content": "b" }));
    db.batch_write(updates, BatchMode::Set).await.unwrap();

    assert_eq!(
        backend.document("users/u1/notes/b").unwrap(),
        json!({ "content": "b" }).as_object().cloned().unwrap()
    );
    assert!(backend.document("notes/a").unwrap().get(CREATED_AT).is_none());
}

// ─── Live reads ──────────────────────────────────────────────

#[tokio::test]
async fn test_read_follows_document() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);

    let mut notes = db.read::<Note>("notes/a");
    assert_eq!(within(notes.next()).await.unwrap().unwrap(), None);

    db.set("notes/a", &note("one")).await.unwrap();
    assert_eq!(
        within(notes.next()).await.unwrap().unwrap(),
        Some(note("one"))
    );

    db.delete("notes/a").await.unwrap();
    assert_eq!(within(notes.next()).await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_unsubscribe_releases_listener() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);

    let mut doc = db.read::<Note>("notes/a");
    let collection = db.read_collection::<Note>("notes", None);
    assert_eq!(backend.active_listeners(), 2);

    doc.unsubscribe();
    assert!(!doc.is_active());
    assert!(doc.next().await.is_none());
    assert_eq!(backend.active_listeners(), 1);

    drop(collection);
    assert_eq!(backend.active_listeners(), 0);
}

#[tokio::test]
async fn test_collection_with_ids_tracks_changes() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);
    db.set("notes/a", &note("a")).await.unwrap();

    let mut notes = db.read_collection_with_ids::<Note>("notes", None);
    let initial = within(notes.next()).await.unwrap().unwrap();
    assert_eq!(
        initial,
        vec![WithId {
            id: "a".to_string(),
            data: note("a"),
        }]
    );

    db.set("notes/b", &note("b")).await.unwrap();
    let ids: Vec<String> = within(notes.next())
        .await
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    db.delete("notes/a").await.unwrap();
    let remaining = within(notes.next()).await.unwrap().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "b");
}

#[tokio::test]
async fn test_added_only_view_ignores_later_changes() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);
    db.set("notes/a", &note("a")).await.unwrap();

    let mut notes = db.read_collection_added_with_ids::<Note>("notes", None);
    assert_eq!(within(notes.next()).await.unwrap().unwrap().len(), 1);

    db.set("notes/b", &note("b")).await.unwrap();
    let after_add = within(notes.next()).await.unwrap().unwrap();
    assert_eq!(after_add.len(), 2);

    // Modification and removal still emit, but the accumulated view stands.
    db.update("notes/a", &note("edited")).await.unwrap();
    let after_edit = within(notes.next()).await.unwrap().unwrap();
    assert_eq!(after_edit[0].data, note("a"));

    db.delete("notes/b").await.unwrap();
    let after_delete = within(notes.next()).await.unwrap().unwrap();
    assert_eq!(after_delete.len(), 2);
}

#[tokio::test]
async fn test_collection_query_filters_and_orders() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);
    for (id, rank) in [("a", 3), ("b", 1), ("c", 2), ("d", 9)] {
        db.set(format!("items/{id}"), &json!({ "rank": rank }))
            .await
            .unwrap();
    }

    let query = Query::default()
        .filter("rank", stream_core::db::FilterOp::LessThan, json!(5))
        .order_by("rank", stream_core::db::Direction::Descending)
        .limit(2);
    let mut items = db.read_collection_with_ids::<Value>("items", Some(query));

    let ids: Vec<String> = within(items.next())
        .await
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[tokio::test]
async fn test_ordered_collection_stays_ordered_after_changes() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);
    db.set("items/a", &json!({ "rank": 2 })).await.unwrap();
    db.set("items/c", &json!({ "rank": 3 })).await.unwrap();

    let query = Query::default()
        .order_by("rank", stream_core::db::Direction::Ascending)
        .limit(2);
    let mut items = db.read_collection_with_ids::<Value>("items", Some(query));
    let ids = |batch: Vec<WithId<Value>>| -> Vec<String> {
        batch.into_iter().map(|item| item.id).collect()
    };

    assert_eq!(ids(within(items.next()).await.unwrap().unwrap()), vec!["a", "c"]);

    // Lower rank than everything already in view.
    db.set("items/b", &json!({ "rank": 1 })).await.unwrap();
    assert_eq!(ids(within(items.next()).await.unwrap().unwrap()), vec!["b", "a"]);

    // Moving an item past the others reorders it.
    db.update("items/b", &json!({ "rank": 5 })).await.unwrap();
    assert_eq!(ids(within(items.next()).await.unwrap().unwrap()), vec!["a", "c"]);
}

#[tokio::test]
async fn test_inspect_reports_elapsed_time() {
    let backend = Arc::new(MemoryBackend::new());
    let db = service(&backend);
    db.set("notes/a", &note("a")).await.unwrap();

    assert!(db.inspect_doc("notes/a").await.is_ok());
    assert!(db.inspect_col("notes").await.is_ok());
    assert_eq!(backend.active_listeners(), 0);
}
