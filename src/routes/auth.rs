// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in and sign-out routes.
//!
//! Federated providers: the client completes the provider's consent flow
//! itself and posts the resulting credential to `/auth/oauth/{provider}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::auth::{AuthError, IdpCredential, OAuthProvider, ProviderUser};
use crate::error::{AppError, Result};
use crate::middleware::session::SessionUser;
use crate::models::ProfileSeed;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/anonymous", post(anonymous))
        .route("/auth/email/signup", post(email_sign_up))
        .route("/auth/email/login", post(email_login))
        .route("/auth/password-reset", post(password_reset))
        .route("/auth/oauth/{provider}", post(oauth))
}

/// Routes that require the session token.
pub fn session_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/signout", post(sign_out))
}

/// Result of a successful sign-in.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SignInResponse {
    pub uid: String,
    pub anonymous: bool,
    /// Bearer token for the session routes; replaces any earlier one.
    pub session_token: String,
}

/// Failed sign-ins are logged by the auth service; the client only learns
/// that it did not work.
fn signed_in(state: &AppState, user: Option<ProviderUser>) -> Result<Json<SignInResponse>> {
    let user = user.ok_or(AppError::Unauthorized)?;
    let session_token = state.sessions.issue(&user.uid)?;
    Ok(Json(SignInResponse {
        uid: user.uid,
        anonymous: user.is_anonymous,
        session_token,
    }))
}

async fn anonymous(State(state): State<Arc<AppState>>) -> Result<Json<SignInResponse>> {
    let user = state.core.auth.anonymous_login().await;
    signed_in(&state, user)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCredentials {
    email: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl EmailCredentials {
    fn seed(&self) -> Option<ProfileSeed> {
        self.display_name.as_ref().map(|name| ProfileSeed {
            display_name: Some(name.clone()),
        })
    }
}

async fn email_sign_up(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailCredentials>,
) -> Result<Json<SignInResponse>> {
    let seed = body.seed();
    let user = state
        .core
        .auth
        .email_sign_up(&body.email, &body.password, seed.as_ref())
        .await;
    signed_in(&state, user)
}

async fn email_login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailCredentials>,
) -> Result<Json<SignInResponse>> {
    let seed = body.seed();
    let user = state
        .core
        .auth
        .email_login(&body.email, &body.password, seed.as_ref())
        .await;
    signed_in(&state, user)
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PasswordResetResponse {
    pub sent: bool,
}

async fn password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PasswordResetRequest>,
) -> Json<PasswordResetResponse> {
    let sent = state.core.auth.reset_password(&body.email).await;
    Json(PasswordResetResponse { sent })
}

async fn oauth(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Json(credential): Json<IdpCredential>,
) -> Result<Json<SignInResponse>> {
    let provider: OAuthProvider = provider
        .parse()
        .map_err(|e: AuthError| AppError::BadRequest(e.to_string()))?;
    tracing::info!(provider = %provider, "Federated sign-in");
    let user = state.core.auth.oauth_login(provider, &credential).await;
    signed_in(&state, user)
}

async fn sign_out(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
) -> StatusCode {
    tracing::info!(uid = %session.uid, "Signing out");
    state.sessions.revoke();
    state.core.auth.sign_out().await;
    StatusCode::NO_CONTENT
}
