// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory identity provider for tests and local development.
//!
//! Mirrors the identity platform's error codes so callers see the same
//! failures they would in production.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;

use super::provider::{AuthError, IdentityProvider, IdpCredential, OAuthProvider, ProviderUser};
use crate::db::auto_id::auto_id;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    password: String,
    display_name: Option<String>,
    photo_url: Option<String>,
}

/// In-memory [`IdentityProvider`].
pub struct MemoryIdentity {
    accounts: DashMap<String, Account>,
    /// Federated users keyed by `(provider id, token)`.
    idp_users: DashMap<(String, String), ProviderUser>,
    reset_requests: DashMap<String, u32>,
    state: watch::Sender<Option<ProviderUser>>,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: DashMap::new(),
            idp_users: DashMap::new(),
            reset_requests: DashMap::new(),
            state,
        }
    }

    /// Make `token` a valid credential for `provider`, resolving to `user`.
    ///
    /// Registering again replaces the user, as a provider-side profile edit would.
    pub fn register_idp_user(&self, provider: OAuthProvider, token: &str, user: ProviderUser) {
        self.idp_users
            .insert((provider.provider_id().to_string(), token.to_string()), user);
    }

    /// Change the profile the provider reports for an email account.
    pub fn set_profile(&self, email: &str, display_name: Option<&str>, photo_url: Option<&str>) {
        if let Some(mut account) = self.accounts.get_mut(email) {
            account.display_name = display_name.map(str::to_string);
            account.photo_url = photo_url.map(str::to_string);
        }
    }

    /// Number of password reset emails requested for `email`.
    pub fn reset_requests(&self, email: &str) -> u32 {
        self.reset_requests.get(email).map(|n| *n).unwrap_or(0)
    }

    fn signed_in(&self, user: ProviderUser) -> ProviderUser {
        self.state.send_replace(Some(user.clone()));
        user
    }

    fn new_uid() -> Result<String, AuthError> {
        auto_id().map_err(|e| AuthError::Transport(e.to_string()))
    }
}

fn email_user(email: &str, account: &Account) -> ProviderUser {
    ProviderUser {
        uid: account.uid.clone(),
        email: Some(email.to_string()),
        display_name: account.display_name.clone(),
        photo_url: account.photo_url.clone(),
        is_anonymous: false,
        id_token: None,
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    fn auth_state(&self) -> watch::Receiver<Option<ProviderUser>> {
        self.state.subscribe()
    }

    async fn sign_in_with_idp(
        &self,
        provider: OAuthProvider,
        credential: &IdpCredential,
    ) -> Result<ProviderUser, AuthError> {
        let token = credential
            .id_token
            .as_ref()
            .or(credential.access_token.as_ref())
            .ok_or_else(|| {
                AuthError::provider("INVALID_IDP_RESPONSE", format!("No {} credential supplied", provider))
            })?;

        let user = self
            .idp_users
            .get(&(provider.provider_id().to_string(), token.clone()))
            .map(|u| u.clone())
            .ok_or_else(|| {
                AuthError::provider("INVALID_IDP_RESPONSE", "The supplied auth credential is malformed or has expired")
            })?;

        Ok(self.signed_in(user))
    }

    async fn sign_in_anonymously(&self) -> Result<ProviderUser, AuthError> {
        Ok(self.signed_in(ProviderUser {
            uid: Self::new_uid()?,
            email: None,
            display_name: None,
            photo_url: None,
            is_anonymous: true,
            id_token: None,
        }))
    }

    async fn create_user_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, AuthError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::provider(
                "WEAK_PASSWORD",
                "Password should be at least 6 characters",
            ));
        }

        let account = match self.accounts.entry(email.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AuthError::provider(
                    "EMAIL_EXISTS",
                    "The email address is already in use by another account",
                ));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => slot
                .insert(Account {
                    uid: Self::new_uid()?,
                    password: password.to_string(),
                    display_name: None,
                    photo_url: None,
                })
                .clone(),
        };

        Ok(self.signed_in(email_user(email, &account)))
    }

    async fn sign_in_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, AuthError> {
        let account = self
            .accounts
            .get(email)
            .map(|a| a.clone())
            .ok_or_else(|| {
                AuthError::provider("EMAIL_NOT_FOUND", "There is no user record for this email")
            })?;

        if account.password != password {
            return Err(AuthError::provider(
                "INVALID_PASSWORD",
                "The password is invalid",
            ));
        }

        Ok(self.signed_in(email_user(email, &account)))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if !self.accounts.contains_key(email) {
            return Err(AuthError::provider(
                "EMAIL_NOT_FOUND",
                "There is no user record for this email",
            ));
        }
        *self.reset_requests.entry(email.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state.send_if_modified(|current| current.take().is_some());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let identity = MemoryIdentity::new();
        identity
            .create_user_with_email("a@example.com", "secret1")
            .await
            .unwrap();
        let err = identity
            .create_user_with_email("a@example.com", "secret2")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("EMAIL_EXISTS"));
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let identity = MemoryIdentity::new();
        identity
            .create_user_with_email("a@example.com", "secret1")
            .await
            .unwrap();
        let err = identity
            .sign_in_with_email("a@example.com", "nope")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("INVALID_PASSWORD"));
    }

    #[tokio::test]
    async fn test_sign_in_updates_auth_state() {
        let identity = MemoryIdentity::new();
        let rx = identity.auth_state();
        let user = identity.sign_in_anonymously().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.uid.clone()), Some(user.uid));

        identity.sign_out().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_unknown_idp_token_is_rejected() {
        let identity = MemoryIdentity::new();
        let credential = IdpCredential {
            id_token: Some("bogus".to_string()),
            ..Default::default()
        };
        let err = identity
            .sign_in_with_idp(OAuthProvider::GitHub, &credential)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("INVALID_IDP_RESPONSE"));
    }
}
