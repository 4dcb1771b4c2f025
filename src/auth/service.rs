// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication service.
//!
//! Wraps the identity provider's sign-in flows, keeps the user's profile
//! document in step with the provider account, and publishes the current
//! profile derived from the provider's auth state.

use futures_util::StreamExt;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::provider::{AuthError, IdentityProvider, IdpCredential, OAuthProvider, ProviderUser};
use crate::db::collections::{SUBSCRIPTIONS, USERS};
use crate::db::{DatabaseService, DbError, Subscription, Upserted};
use crate::models::{ProfileSeed, SubscriptionMarker, UserProfile, DEFAULT_PHOTO_URL};
use crate::navigation::{Navigator, LOGIN_ROUTE};

/// Where the current session stands.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthPhase {
    SignedOut,
    /// Provider user present, profile document not (yet) there.
    PendingProfile { uid: String },
    SignedIn(UserProfile),
}

/// Identity fields cached from the last non-null profile.
#[derive(Debug, Default)]
struct IdentityCache {
    details: Option<UserProfile>,
}

pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    db: DatabaseService,
    cache: Arc<RwLock<IdentityCache>>,
    user: watch::Receiver<Option<UserProfile>>,
    phase: watch::Receiver<AuthPhase>,
    driver: JoinHandle<()>,
}

impl AuthService {
    /// Subscribe to the provider's auth state and start tracking the profile.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        db: DatabaseService,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let cache = Arc::new(RwLock::new(IdentityCache::default()));
        let (user_tx, user) = watch::channel(None);
        let (phase_tx, phase) = watch::channel(AuthPhase::SignedOut);

        let sync = ProfileSync {
            db: db.clone(),
            navigator,
            cache: Arc::clone(&cache),
            user_tx,
            phase_tx,
        };
        let driver = tokio::spawn(sync.run(identity.auth_state()));

        Self {
            identity,
            db,
            cache,
            user,
            phase,
            driver,
        }
    }

    /// The derived profile: `None` while signed out.
    pub fn user(&self) -> watch::Receiver<Option<UserProfile>> {
        self.user.clone()
    }

    pub fn phase(&self) -> watch::Receiver<AuthPhase> {
        self.phase.clone()
    }

    // ─── Cached accessors ────────────────────────────────────────

    fn with_cache<R>(&self, f: impl FnOnce(&IdentityCache) -> R) -> R {
        let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
        f(&cache)
    }

    pub fn authenticated(&self) -> bool {
        self.with_cache(|c| c.details.is_some())
    }

    /// Cached uid; empty when signed out.
    pub fn uid(&self) -> String {
        self.with_cache(|c| {
            c.details
                .as_ref()
                .map(|d| d.uid.clone())
                .unwrap_or_default()
        })
    }

    /// Display name, falling back to the email address.
    pub fn display_name(&self) -> Option<String> {
        self.with_cache(|c| {
            c.details
                .as_ref()
                .and_then(|d| d.display_name.clone().or_else(|| d.email.clone()))
        })
    }

    /// Photo URL; empty when the profile has none.
    pub fn photo_url(&self) -> Option<String> {
        self.with_cache(|c| {
            c.details
                .as_ref()
                .map(|d| d.photo_url.clone().unwrap_or_default())
        })
    }

    /// The cached profile, if any.
    pub fn profile(&self) -> Option<UserProfile> {
        self.with_cache(|c| c.details.clone())
    }

    // ─── Sign-in flows ───────────────────────────────────────────

    pub async fn google_login(&self, credential: &IdpCredential) -> Option<ProviderUser> {
        self.oauth_login(OAuthProvider::Google, credential).await
    }

    pub async fn github_login(&self, credential: &IdpCredential) -> Option<ProviderUser> {
        self.oauth_login(OAuthProvider::GitHub, credential).await
    }

    pub async fn facebook_login(&self, credential: &IdpCredential) -> Option<ProviderUser> {
        self.oauth_login(OAuthProvider::Facebook, credential).await
    }

    pub async fn twitter_login(&self, credential: &IdpCredential) -> Option<ProviderUser> {
        self.oauth_login(OAuthProvider::Twitter, credential).await
    }

    pub async fn oauth_login(
        &self,
        provider: OAuthProvider,
        credential: &IdpCredential,
    ) -> Option<ProviderUser> {
        let signed_in = self.identity.sign_in_with_idp(provider, credential).await;
        self.complete_sign_in(signed_in, None).await
    }

    pub async fn anonymous_login(&self) -> Option<ProviderUser> {
        let signed_in = self.identity.sign_in_anonymously().await;
        self.complete_sign_in(signed_in, None).await
    }

    pub async fn email_sign_up(
        &self,
        email: &str,
        password: &str,
        seed: Option<&ProfileSeed>,
    ) -> Option<ProviderUser> {
        let signed_in = self.identity.create_user_with_email(email, password).await;
        self.complete_sign_in(signed_in, seed).await
    }

    pub async fn email_login(
        &self,
        email: &str,
        password: &str,
        seed: Option<&ProfileSeed>,
    ) -> Option<ProviderUser> {
        let signed_in = self.identity.sign_in_with_email(email, password).await;
        self.complete_sign_in(signed_in, seed).await
    }

    /// Request a password reset email. Returns whether it was sent.
    pub async fn reset_password(&self, email: &str) -> bool {
        match self.identity.send_password_reset(email).await {
            Ok(()) => {
                tracing::info!("Password update email sent");
                true
            }
            Err(e) => {
                log_auth_error(&e);
                false
            }
        }
    }

    pub async fn sign_out(&self) {
        if let Err(e) = self.identity.sign_out().await {
            log_auth_error(&e);
        }
    }

    async fn complete_sign_in(
        &self,
        signed_in: Result<ProviderUser, AuthError>,
        seed: Option<&ProfileSeed>,
    ) -> Option<ProviderUser> {
        let result = match signed_in {
            Ok(user) => self.upsert_user_data(&user, seed).await.map(|_| user),
            Err(e) => Err(e),
        };
        match result {
            Ok(user) => Some(user),
            Err(e) => {
                log_auth_error(&e);
                None
            }
        }
    }

    // ─── Profile record ──────────────────────────────────────────

    /// Create or merge the profile for `user`, plus its subscription marker.
    ///
    /// The display name comes from the provider, else from `seed`. With
    /// neither, the profile is stored without one and a stored name from an
    /// earlier sign-in is kept.
    pub async fn upsert_user_data(
        &self,
        user: &ProviderUser,
        seed: Option<&ProfileSeed>,
    ) -> Result<(), AuthError> {
        let display_name = non_empty(&user.display_name)
            .or_else(|| seed.and_then(|s| non_empty(&s.display_name)));
        if display_name.is_none() {
            tracing::warn!(uid = %user.uid, "No display name from provider or caller");
        }

        let profile = UserProfile {
            uid: user.uid.clone(),
            email: non_empty(&user.email),
            photo_url: Some(
                non_empty(&user.photo_url).unwrap_or_else(|| DEFAULT_PHOTO_URL.to_string()),
            ),
            display_name,
            created_at: None,
            updated_at: None,
        };
        let marker = SubscriptionMarker {
            uid: user.uid.clone(),
        };

        let profile_path = format!("{}/{}", USERS, user.uid);
        let marker_path = format!("{}/{}/{}", profile_path, SUBSCRIPTIONS, user.uid);

        let (_, profile_write) = tokio::try_join!(
            self.db.upsert(&marker_path, &marker),
            self.db.upsert(&profile_path, &profile),
        )?;

        tracing::info!(
            uid = %user.uid,
            created = profile_write == Upserted::Created,
            "User profile upserted"
        );
        Ok(())
    }
}

impl Drop for AuthService {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn log_auth_error(error: &AuthError) {
    match error {
        AuthError::Provider { code, message } => {
            tracing::error!(code = %code, message = %message, "Authentication failed");
        }
        other => tracing::error!(error = %other, "Authentication failed"),
    }
}

/// Driver state: follows the auth state and keeps one profile read open.
struct ProfileSync {
    db: DatabaseService,
    navigator: Arc<dyn Navigator>,
    cache: Arc<RwLock<IdentityCache>>,
    user_tx: watch::Sender<Option<UserProfile>>,
    phase_tx: watch::Sender<AuthPhase>,
}

type ProfileRead = Subscription<Option<UserProfile>>;

impl ProfileSync {
    async fn run(self, mut auth: watch::Receiver<Option<ProviderUser>>) {
        let mut profile: Option<ProfileRead> = None;

        let initial = auth.borrow_and_update().clone();
        self.switch(initial, &mut profile);

        loop {
            tokio::select! {
                changed = auth.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Auth state closed, stopping profile sync");
                        break;
                    }
                    let user = auth.borrow_and_update().clone();
                    self.switch(user, &mut profile);
                }
                Some(event) = next_profile(&mut profile) => self.on_profile(event),
            }
        }
    }

    /// Replace the profile read for a new auth state.
    fn switch(&self, user: Option<ProviderUser>, profile: &mut Option<ProfileRead>) {
        // Cancel before subscribing so a stale read can never emit.
        if let Some(mut previous) = profile.take() {
            previous.unsubscribe();
        }

        match user {
            Some(user) => {
                tracing::debug!(uid = %user.uid, "Following profile");
                self.forget_other_than(&user.uid);
                *profile = Some(self.db.read::<UserProfile>(format!("{}/{}", USERS, user.uid)));
                self.phase_tx
                    .send_replace(AuthPhase::PendingProfile { uid: user.uid });
            }
            None => self.publish(None),
        }
    }

    fn on_profile(&self, event: Result<Option<UserProfile>, DbError>) {
        match event {
            Ok(Some(details)) => self.publish(Some(details)),
            // The provider user exists but the profile write has not landed.
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Profile read failed"),
        }
    }

    /// Drop a cached profile that belongs to another account. The provider
    /// user is present, so this does not navigate.
    fn forget_other_than(&self, uid: &str) {
        let stale = {
            let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
            let stale = cache.details.as_ref().is_some_and(|d| d.uid != uid);
            if stale {
                cache.details = None;
            }
            stale
        };
        if stale {
            tracing::debug!(uid = %uid, "Account changed, clearing previous profile");
            self.user_tx.send_replace(None);
        }
    }

    fn publish(&self, details: Option<UserProfile>) {
        {
            let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
            cache.details = details.clone();
        }

        // Phase goes last: once it reads signed out, navigation has happened.
        match details {
            Some(details) => {
                self.user_tx.send_replace(Some(details.clone()));
                self.phase_tx.send_replace(AuthPhase::SignedIn(details));
            }
            None => {
                self.user_tx.send_replace(None);
                self.navigator.navigate(LOGIN_ROUTE);
                self.phase_tx.send_replace(AuthPhase::SignedOut);
            }
        }
    }
}

/// Next event of the open profile read; pending forever when there is none.
async fn next_profile(
    profile: &mut Option<ProfileRead>,
) -> Option<Result<Option<UserProfile>, DbError>> {
    match profile {
        Some(read) => {
            let event = read.next().await;
            if event.is_none() {
                *profile = None;
            }
            event
        }
        None => std::future::pending().await,
    }
}
