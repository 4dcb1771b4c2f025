// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running, with
//! FIRESTORE_EMULATOR_HOST pointing at it.
//!
//! Every test writes under a fresh collection so runs do not interfere.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use stream_core::db::{BatchMode, DatabaseService, Upserted, CREATED_AT, UPDATED_AT};

mod common;
use common::{test_db, within};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    content: String,
}

/// Collection name unique to this test run.
fn unique_collection(prefix: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}-{nanos}")
}

async fn service() -> DatabaseService {
    DatabaseService::new(Arc::new(test_db().await))
}

#[tokio::test]
async fn test_upsert_keeps_created_at() {
    require_emulator!();

    let db = service().await;
    let path = format!("{}/a", unique_collection("notes"));

    let first = db
        .upsert(path.as_str(), &Note { content: "one".into() })
        .await
        .unwrap();
    assert_eq!(first, Upserted::Created);

    let mut reads = db.read::<Value>(path.as_str());
    let created = within(reads.next()).await.unwrap().unwrap().unwrap();

    let second = db
        .upsert(path.as_str(), &Note { content: "two".into() })
        .await
        .unwrap();
    assert_eq!(second, Upserted::Updated);

    let updated = loop {
        let doc = within(reads.next()).await.unwrap().unwrap().unwrap();
        if doc["content"] == "two" {
            break doc;
        }
    };
    assert_eq!(updated[CREATED_AT], created[CREATED_AT]);
    assert!(updated[UPDATED_AT].is_string());
}

#[tokio::test]
async fn test_update_missing_document_fails() {
    require_emulator!();

    let db = service().await;
    let path = format!("{}/missing", unique_collection("notes"));
    assert!(db
        .update(path.as_str(), &json!({ "content": "x" }))
        .await
        .is_err());
}

#[tokio::test]
async fn test_batch_and_collection_read() {
    require_emulator!();

    let db = service().await;
    let collection = unique_collection("items");

    let mut updates = BTreeMap::new();
    for id in ["a", "b", "c"] {
        updates.insert(format!("{collection}/{id}"), json!({ "content": id }));
    }
    db.batch_write(updates, BatchMode::Set).await.unwrap();

    let mut items = db.read_collection_with_ids::<Note>(collection.as_str(), None);
    let mut ids: Vec<String> = within(items.next())
        .await
        .unwrap()
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);
    items.unsubscribe();

    db.delete(format!("{collection}/b")).await.unwrap();
    let mut remaining = db.read_collection_with_ids::<Note>(collection.as_str(), None);
    let first = within(remaining.next()).await.unwrap().unwrap();
    assert_eq!(first.len(), 2);

    assert!(db.inspect_col(collection.as_str()).await.is_ok());
}
