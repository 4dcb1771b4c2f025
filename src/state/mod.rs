// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Global application state.
//!
//! A single [`Store`] holds a [`RootState`]. Which meta-reducers wrap the
//! root reducer is decided once, by [`StoreConfig::for_environment`].

pub mod auth;
pub mod local_storage;
pub mod meta;
pub mod store;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use auth::{auth_reducer, AuthAction, AuthEffects, AuthState, AUTH_KEY};
pub use local_storage::{
    load_initial_state, FileStorage, LocalStorage, MemoryStorage, StorageError, APP_PREFIX,
};
pub use meta::InitAction;
pub use store::{compose, Effect, MetaReducer, Reducer, Store};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootState {
    #[serde(default)]
    pub auth: AuthState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Dispatched once when the store is created.
    Init,
    Auth(AuthAction),
}

impl InitAction for Action {
    fn is_init(&self) -> bool {
        matches!(self, Action::Init)
    }
}

pub fn root_reducer(state: &RootState, action: &Action) -> RootState {
    match action {
        Action::Init => state.clone(),
        Action::Auth(auth) => RootState {
            auth: auth_reducer(&state.auth, auth),
        },
    }
}

pub type AppStore = Store<RootState, Action>;

/// Meta-reducers for the root store, fixed at startup.
pub struct StoreConfig {
    pub meta_reducers: Vec<MetaReducer<RootState, Action>>,
}

impl StoreConfig {
    /// Rehydration always; debug logging outermost outside production.
    pub fn for_environment(production: bool, storage: Arc<dyn LocalStorage>) -> Self {
        let mut meta_reducers = Vec::with_capacity(2);
        if !production {
            meta_reducers.push(meta::debug());
        }
        meta_reducers.push(meta::init_state_from_local_storage(storage));
        Self { meta_reducers }
    }

    /// Build the root store with `effects` and dispatch [`Action::Init`].
    pub fn build(&self, effects: Vec<Arc<dyn Effect<RootState, Action>>>) -> AppStore {
        let reducer: Reducer<RootState, Action> = Arc::new(root_reducer);
        let mut store = Store::new(RootState::default(), reducer, &self.meta_reducers);
        for effect in effects {
            store = store.with_effect(effect);
        }
        store.dispatch(Action::Init);
        store
    }
}
