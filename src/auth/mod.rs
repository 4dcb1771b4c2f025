// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication: identity providers and the profile-tracking service.

pub mod firebase;
pub mod memory;
pub mod provider;
pub mod service;

pub use firebase::FirebaseIdentity;
pub use memory::MemoryIdentity;
pub use provider::{AuthError, IdentityProvider, IdpCredential, OAuthProvider, ProviderUser};
pub use service::{AuthPhase, AuthService};
