// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stream_core::auth::MemoryIdentity;
use stream_core::config::Config;
use stream_core::core::{CoreDeps, CoreModule};
use stream_core::db::{FirestoreBackend, MemoryBackend};
use stream_core::middleware::session::SessionStore;
use stream_core::routes::create_router;
use stream_core::state::MemoryStorage;
use stream_core::AppState;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreBackend {
    FirestoreBackend::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Everything a test needs to drive the app and inspect its backends.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub backend: Arc<MemoryBackend>,
    pub identity: Arc<MemoryIdentity>,
    pub storage: Arc<MemoryStorage>,
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_backend(MemoryBackend::new())
}

#[allow(dead_code)]
pub fn create_test_app_with_backend(backend: MemoryBackend) -> TestApp {
    create_test_app_with_storage(backend, MemoryStorage::new())
}

/// Test app whose local storage already holds state from a previous run.
#[allow(dead_code)]
pub fn create_test_app_with_storage(backend: MemoryBackend, storage: MemoryStorage) -> TestApp {
    let backend = Arc::new(backend);
    let identity = Arc::new(MemoryIdentity::new());
    let storage = Arc::new(storage);

    let config = Config::test_default();
    let core = CoreModule::assemble(
        config.production,
        CoreDeps {
            backend: backend.clone(),
            identity: identity.clone(),
            storage: storage.clone(),
        },
    );

    let state = Arc::new(AppState {
        config,
        core,
        sessions: SessionStore::new(),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        backend,
        identity,
        storage,
    }
}

/// Await `fut`, failing the test after two seconds.
#[allow(dead_code)]
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}
