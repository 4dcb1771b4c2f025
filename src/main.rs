// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stream API Server
//!
//! Assembles the core services against Firestore and Firebase
//! Authentication (or in-memory stand-ins) and serves the HTTP shell.

use std::sync::Arc;
use stream_core::{
    auth::{FirebaseIdentity, IdentityProvider, MemoryIdentity},
    config::{Backend, Config},
    core::{CoreDeps, CoreModule},
    db::{DocumentBackend, FirestoreBackend, MemoryBackend},
    middleware::session::SessionStore,
    state::{FileStorage, LocalStorage},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        app = %config.app_name,
        env = %config.env_name,
        production = config.production,
        version = Config::versions().app,
        port = config.port,
        "Starting Stream API"
    );

    let (backend, identity): (Arc<dyn DocumentBackend>, Arc<dyn IdentityProvider>) =
        match config.backend {
            Backend::Firestore => {
                let db = FirestoreBackend::new(&config.firebase.project_id)
                    .await
                    .expect("Failed to connect to Firestore");
                let request_uri = format!("https://{}", config.firebase.auth_domain);
                let identity =
                    FirebaseIdentity::new(config.firebase.api_key.clone(), request_uri);
                let backend: Arc<dyn DocumentBackend> = Arc::new(db);
                let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
                (backend, identity)
            }
            Backend::Memory => {
                tracing::warn!("Using in-memory backend; data is lost on restart");
                let backend: Arc<dyn DocumentBackend> = Arc::new(MemoryBackend::new());
                let identity: Arc<dyn IdentityProvider> = Arc::new(MemoryIdentity::new());
                (backend, identity)
            }
        };

    let storage: Arc<dyn LocalStorage> = Arc::new(
        FileStorage::open(&config.state_file).expect("Failed to open local state file"),
    );
    tracing::info!(path = %config.state_file, "Local state loaded");

    let core = CoreModule::load(
        config.production,
        CoreDeps {
            backend,
            identity,
            storage,
        },
    )
    .expect("Core module loaded twice");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        core,
        sessions: SessionStore::new(),
    });

    // Build router
    let app = stream_core::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stream_core=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
