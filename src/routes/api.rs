// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session and profile routes.

use crate::auth::AuthPhase;
use crate::error::{AppError, Result};
use crate::middleware::session::SessionUser;
use crate::models::UserProfile;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/me", get(get_me))
}

// ─── Session ─────────────────────────────────────────────────

/// What the client should show right now.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SessionResponse {
    pub route: String,
    /// `signed_out`, `pending_profile`, or `signed_in`
    pub phase: String,
    /// Auth flag held in the global store
    pub is_authenticated: bool,
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionResponse> {
    let auth = &state.core.auth;
    let phase = match &*auth.phase().borrow() {
        AuthPhase::SignedOut => "signed_out",
        AuthPhase::PendingProfile { .. } => "pending_profile",
        AuthPhase::SignedIn(_) => "signed_in",
    };

    Json(SessionResponse {
        route: state.core.routes.current(),
        phase: phase.to_string(),
        is_authenticated: state.core.store.snapshot().auth.is_authenticated,
        uid: auth.uid(),
        display_name: auth.display_name(),
        photo_url: auth.photo_url(),
    })
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<UserProfile> for UserResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            uid: profile.uid,
            email: profile.email,
            display_name: profile.display_name,
            photo_url: profile.photo_url,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

/// Get the signed-in user's profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .core
        .auth
        .profile()
        .filter(|p| p.uid == session.uid)
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(profile.into()))
}
