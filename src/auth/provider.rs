// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity-provider boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

use crate::db::DbError;

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Rejected by the identity platform.
    #[error("{code}: {message}")]
    Provider { code: String, message: String },

    #[error("Identity provider unreachable: {0}")]
    Transport(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl AuthError {
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Machine-readable code, when there is one.
    pub fn code(&self) -> Option<&str> {
        match self {
            AuthError::Provider { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub is_anonymous: bool,
    /// Session token issued by the provider, when it issues one.
    #[serde(skip)]
    pub id_token: Option<String>,
}

/// Federated OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
    Facebook,
    Twitter,
}

impl OAuthProvider {
    /// Provider id used by the identity platform.
    pub fn provider_id(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google.com",
            OAuthProvider::GitHub => "github.com",
            OAuthProvider::Facebook => "facebook.com",
            OAuthProvider::Twitter => "twitter.com",
        }
    }

    /// Extra authorization parameters for the provider's consent screen.
    pub fn custom_parameters(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            OAuthProvider::Google => &[("prompt", "select_account")],
            _ => &[],
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
            OAuthProvider::Facebook => "facebook",
            OAuthProvider::Twitter => "twitter",
        };
        f.write_str(name)
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::GitHub),
            "facebook" => Ok(OAuthProvider::Facebook),
            "twitter" => Ok(OAuthProvider::Twitter),
            other => Err(AuthError::provider(
                "INVALID_PROVIDER_ID",
                format!("Unsupported provider: {}", other),
            )),
        }
    }
}

/// Credential obtained from the federated provider's consent flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdpCredential {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// OAuth 1.0 token secret (Twitter).
    #[serde(default)]
    pub oauth_token_secret: Option<String>,
}

/// The identity platform.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current user, updated on every sign-in and sign-out.
    fn auth_state(&self) -> watch::Receiver<Option<ProviderUser>>;

    async fn sign_in_with_idp(
        &self,
        provider: OAuthProvider,
        credential: &IdpCredential,
    ) -> Result<ProviderUser, AuthError>;

    async fn sign_in_anonymously(&self) -> Result<ProviderUser, AuthError>;

    async fn create_user_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, AuthError>;

    async fn sign_in_with_email(&self, email: &str, password: &str)
        -> Result<ProviderUser, AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}
