// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session token middleware.
//!
//! The shell serves a single signed-in user. Each successful sign-in issues
//! a fresh bearer token and revokes the previous one; session routes accept
//! only the current token.

use crate::db::auto_id::auto_id;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::{Arc, Mutex};

/// Caller identity established by [`require_session`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub uid: String,
}

#[derive(Debug)]
struct Session {
    token: String,
    uid: String,
}

/// The one live session token, if any.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: Mutex<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for `uid`, replacing any earlier one.
    pub fn issue(&self, uid: &str) -> anyhow::Result<String> {
        let token = format!("{}{}", auto_id()?, auto_id()?);
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = Some(Session {
            token: token.clone(),
            uid: uid.to_string(),
        });
        tracing::debug!(uid = %uid, "Session issued");
        Ok(token)
    }

    /// The uid `token` was issued for, if it is the live token.
    pub fn verify(&self, token: &str) -> Option<String> {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        current
            .as_ref()
            .filter(|s| {
                ring::constant_time::verify_slices_are_equal(s.token.as_bytes(), token.as_bytes())
                    .is_ok()
            })
            .map(|s| s.uid.clone())
    }

    pub fn revoke(&self) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = None;
    }
}

/// Middleware that requires the live session token as a bearer token.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let uid = state
        .sessions
        .verify(token)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(SessionUser { uid });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_revokes_previous_token() {
        let sessions = SessionStore::new();
        let first = sessions.issue("alice").unwrap();
        assert_eq!(first.len(), 40);
        assert_eq!(sessions.verify(&first), Some("alice".to_string()));

        let second = sessions.issue("bob").unwrap();
        assert_eq!(sessions.verify(&first), None);
        assert_eq!(sessions.verify(&second), Some("bob".to_string()));

        sessions.revoke();
        assert_eq!(sessions.verify(&second), None);
        assert_eq!(sessions.verify(""), None);
    }
}
