// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication client (Identity Toolkit REST API).
//!
//! Handles:
//! - Anonymous and email/password accounts
//! - Federated sign-in with a credential the client obtained from the provider
//! - Password reset emails
//!
//! Sign-in state lives in this process only; signing out just forgets the
//! current user.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::provider::{AuthError, IdentityProvider, IdpCredential, OAuthProvider, ProviderUser};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Firebase Authentication client.
pub struct FirebaseIdentity {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Request URI reported to the platform for federated sign-in.
    request_uri: String,
    state: watch::Sender<Option<ProviderUser>>,
}

impl FirebaseIdentity {
    /// Create a client for the project owning `api_key`.
    ///
    /// For local development with emulator, set FIREBASE_AUTH_EMULATOR_HOST.
    pub fn new(api_key: String, request_uri: String) -> Self {
        let base_url = match std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            Ok(host) => format!("http://{}/identitytoolkit.googleapis.com/v1", host),
            Err(_) => IDENTITY_TOOLKIT_URL.to_string(),
        };
        Self::with_base_url(api_key, request_uri, base_url)
    }

    pub fn with_base_url(api_key: String, request_uri: String, base_url: String) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            request_uri,
            state,
        }
    }

    /// POST a JSON body to an `accounts:*` endpoint.
    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, method);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Transport(format!("Invalid response from {}: {}", method, e)))
    }

    /// Fetch the full account for a fresh session token.
    async fn lookup(&self, id_token: &str) -> Result<AccountInfo, AuthError> {
        let response: LookupResponse = self
            .post("lookup", &serde_json::json!({ "idToken": id_token }))
            .await?;
        response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::provider("USER_NOT_FOUND", "Account lookup returned no user"))
    }

    fn signed_in(&self, user: ProviderUser) -> ProviderUser {
        tracing::info!(uid = %user.uid, anonymous = user.is_anonymous, "Signed in");
        self.state.send_replace(Some(user.clone()));
        user
    }
}

/// Parse `{"error": {"code": 400, "message": "EMAIL_EXISTS"}}`.
///
/// Some messages carry detail after the code: `WEAK_PASSWORD : Password should be...`.
fn parse_error(status: u16, body: &str) -> AuthError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let message = parsed.error.message;
            match message.split_once(" : ") {
                Some((code, detail)) => AuthError::provider(code.trim(), detail.trim()),
                None => AuthError::provider(message.clone(), message),
            }
        }
        Err(_) => AuthError::Transport(format!("HTTP {}: {}", status, body)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    local_id: String,
    id_token: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

/// Form-encoded `postBody` for `accounts:signInWithIdp`.
fn idp_post_body(provider: OAuthProvider, credential: &IdpCredential) -> String {
    let mut parts = vec![format!("providerId={}", provider.provider_id())];
    if let Some(token) = &credential.id_token {
        parts.push(format!("id_token={}", urlencoding::encode(token)));
    }
    if let Some(token) = &credential.access_token {
        parts.push(format!("access_token={}", urlencoding::encode(token)));
    }
    if let Some(secret) = &credential.oauth_token_secret {
        parts.push(format!("oauth_token_secret={}", urlencoding::encode(secret)));
    }
    parts.join("&")
}

fn user_from_account(account: AccountInfo, id_token: String, is_anonymous: bool) -> ProviderUser {
    ProviderUser {
        uid: account.local_id,
        email: account.email,
        display_name: account.display_name,
        photo_url: account.photo_url,
        is_anonymous,
        id_token: Some(id_token),
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    fn auth_state(&self) -> watch::Receiver<Option<ProviderUser>> {
        self.state.subscribe()
    }

    async fn sign_in_with_idp(
        &self,
        provider: OAuthProvider,
        credential: &IdpCredential,
    ) -> Result<ProviderUser, AuthError> {
        if credential.id_token.is_none() && credential.access_token.is_none() {
            return Err(AuthError::provider(
                "INVALID_IDP_RESPONSE",
                format!("No {} credential supplied", provider),
            ));
        }

        let request = IdpRequest {
            post_body: idp_post_body(provider, credential),
            request_uri: &self.request_uri,
            return_idp_credential: true,
            return_secure_token: true,
        };
        let session: SessionResponse = self.post("signInWithIdp", &request).await?;

        Ok(self.signed_in(ProviderUser {
            uid: session.local_id,
            email: session.email,
            display_name: session.display_name,
            photo_url: session.photo_url,
            is_anonymous: false,
            id_token: Some(session.id_token),
        }))
    }

    async fn sign_in_anonymously(&self) -> Result<ProviderUser, AuthError> {
        let session: SessionResponse = self
            .post("signUp", &serde_json::json!({ "returnSecureToken": true }))
            .await?;

        Ok(self.signed_in(ProviderUser {
            uid: session.local_id,
            email: None,
            display_name: None,
            photo_url: None,
            is_anonymous: true,
            id_token: Some(session.id_token),
        }))
    }

    async fn create_user_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let session: SessionResponse = self.post("signUp", &request).await?;
        let account = self.lookup(&session.id_token).await?;
        Ok(self.signed_in(user_from_account(account, session.id_token, false)))
    }

    async fn sign_in_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, AuthError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let session: SessionResponse = self.post("signInWithPassword", &request).await?;
        let account = self.lookup(&session.id_token).await?;
        Ok(self.signed_in(user_from_account(account, session.id_token, false)))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let _: serde_json::Value = self
            .post(
                "sendOobCode",
                &serde_json::json!({ "requestType": "PASSWORD_RESET", "email": email }),
            )
            .await?;
        tracing::info!("Password reset email requested");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // Only a real sign-out notifies auth-state watchers.
        let signed_out = self.state.send_if_modified(|current| current.take().is_some());
        if signed_out {
            tracing::info!("Signed out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_with_detail() {
        let body = r#"{"error":{"code":400,"message":"WEAK_PASSWORD : Password should be at least 6 characters"}}"#;
        match parse_error(400, body) {
            AuthError::Provider { code, message } => {
                assert_eq!(code, "WEAK_PASSWORD");
                assert_eq!(message, "Password should be at least 6 characters");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_bare_code() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_EXISTS"}}"#;
        assert_eq!(parse_error(400, body).code(), Some("EMAIL_EXISTS"));
    }

    #[test]
    fn test_parse_error_not_json() {
        assert!(matches!(
            parse_error(502, "Bad Gateway"),
            AuthError::Transport(_)
        ));
    }

    #[test]
    fn test_idp_post_body_encodes_tokens() {
        let credential = IdpCredential {
            id_token: Some("a+b/c".to_string()),
            access_token: None,
            oauth_token_secret: None,
        };
        assert_eq!(
            idp_post_body(OAuthProvider::Google, &credential),
            "providerId=google.com&id_token=a%2Bb%2Fc"
        );
    }

    #[tokio::test]
    async fn test_sign_out_clears_auth_state() {
        let identity = FirebaseIdentity::with_base_url(
            "key".to_string(),
            "http://localhost".to_string(),
            "http://127.0.0.1:9".to_string(),
        );
        let rx = identity.auth_state();
        identity.signed_in(ProviderUser {
            uid: "u1".to_string(),
            email: None,
            display_name: None,
            photo_url: None,
            is_anonymous: true,
            id_token: None,
        });
        assert!(rx.borrow().is_some());

        identity.sign_out().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
