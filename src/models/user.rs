// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile model for storage and API.

use serde::{Deserialize, Serialize};

/// Placeholder photo for accounts the provider gives none.
pub const DEFAULT_PHOTO_URL: &str = "https://goo.gl/Fz9nrQ";

/// User profile stored at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Provider-assigned id (also the document id)
    pub uid: String,
    /// Email address; stored as null when the provider has none
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Stamped by the data-access layer, never written by callers
    #[serde(default, skip_serializing)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<String>,
}

/// Marker upserted at `users/{uid}/subscriptions/{uid}` alongside the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMarker {
    pub uid: String,
}

/// Caller-supplied profile data used when the provider lacks it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSeed {
    #[serde(default)]
    pub display_name: Option<String>,
}
