// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication slice of the global state.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::local_storage::LocalStorage;
use super::store::Effect;
use super::{Action, RootState};

/// Storage key (unprefixed) for the persisted auth slice.
pub const AUTH_KEY: &str = "AUTH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Logout,
}

pub fn auth_reducer(_state: &AuthState, action: &AuthAction) -> AuthState {
    match action {
        AuthAction::Login => AuthState {
            is_authenticated: true,
        },
        AuthAction::Logout => AuthState {
            is_authenticated: false,
        },
    }
}

/// Persists the auth flag on every login and logout.
pub struct AuthEffects {
    storage: Arc<dyn LocalStorage>,
}

impl AuthEffects {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }
}

impl Effect<RootState, Action> for AuthEffects {
    fn on_action(&self, action: &Action, state: &RootState) {
        let Action::Auth(auth) = action else {
            return;
        };
        let value = json!({ "isAuthenticated": state.auth.is_authenticated });
        if let Err(e) = self.storage.set_item(AUTH_KEY, value) {
            tracing::error!(error = %e, action = ?auth, "Failed to persist auth state");
        }
    }
}
