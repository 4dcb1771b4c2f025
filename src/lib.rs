// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Stream: application core for a hosted document database and identity
//! platform.
//!
//! This crate provides the data-access layer, the authentication service
//! that keeps user profiles in step with sign-ins, the global state store,
//! and the HTTP shell that exposes them.

pub mod auth;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod navigation;
pub mod routes;
pub mod state;

use config::Config;
use crate::core::CoreModule;
use middleware::session::SessionStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub core: CoreModule,
    pub sessions: SessionStore,
}
