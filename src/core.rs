// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Core services, assembled once per process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::auth::{AuthService, IdentityProvider};
use crate::db::{DatabaseService, DocumentBackend};
use crate::navigation::RouteState;
use crate::state::{
    Action, AppStore, AuthAction, AuthEffects, Effect, LocalStorage, RootState, StoreConfig,
};

static LOADED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Core module is already loaded; load it once at startup")]
    AlreadyLoaded,
}

/// External systems the core services talk to.
pub struct CoreDeps {
    pub backend: Arc<dyn DocumentBackend>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn LocalStorage>,
}

pub struct CoreModule {
    pub db: DatabaseService,
    pub auth: Arc<AuthService>,
    pub store: Arc<AppStore>,
    pub routes: Arc<RouteState>,
    pub storage: Arc<dyn LocalStorage>,
    bridge: JoinHandle<()>,
}

impl CoreModule {
    /// Assemble the core services. Fails if they were already loaded in
    /// this process.
    pub fn load(production: bool, deps: CoreDeps) -> Result<Self, CoreError> {
        if LOADED.swap(true, Ordering::SeqCst) {
            return Err(CoreError::AlreadyLoaded);
        }
        tracing::info!(production, "Loading core module");
        Ok(Self::assemble(production, deps))
    }

    /// Assemble without the once-per-process check.
    ///
    /// For tests that build several independent instances.
    pub fn assemble(production: bool, deps: CoreDeps) -> Self {
        let CoreDeps {
            backend,
            identity,
            storage,
        } = deps;

        let routes = Arc::new(RouteState::new());
        let db = DatabaseService::new(backend);
        let auth = Arc::new(AuthService::new(identity, db.clone(), routes.clone()));

        let effects: Vec<Arc<dyn Effect<RootState, Action>>> =
            vec![Arc::new(AuthEffects::new(storage.clone()))];
        let store = Arc::new(StoreConfig::for_environment(production, storage.clone()).build(effects));

        let bridge = tokio::spawn(bridge_auth_to_store(auth.clone(), store.clone()));

        Self {
            db,
            auth,
            store,
            routes,
            storage,
            bridge,
        }
    }
}

impl Drop for CoreModule {
    fn drop(&mut self) {
        self.bridge.abort();
    }
}

/// Keep the store's auth flag in step with the derived user.
async fn bridge_auth_to_store(auth: Arc<AuthService>, store: Arc<AppStore>) {
    let mut user = auth.user();
    loop {
        let signed_in = user.borrow_and_update().is_some();
        if signed_in != store.snapshot().auth.is_authenticated {
            let action = if signed_in {
                AuthAction::Login
            } else {
                AuthAction::Logout
            };
            store.dispatch(Action::Auth(action));
        }
        if user.changed().await.is_err() {
            break;
        }
    }
}
