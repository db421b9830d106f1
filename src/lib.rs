// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Social-Connect: one session and profile model over many social platforms
//!
//! This crate decides, per linked remote account, whether a usable
//! authenticated client exists, rebuilds it from persisted credentials or asks
//! the caller to send the user through the provider's login flow, and maps
//! each provider's native data into canonical profiles and groups.
//!
//! Wire clients for the remote platforms are injected through
//! [`services::ClientConnector`].

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::{Config, StorageBackend};
use db::{CredentialStore, FirestoreDb, MemoryDb, PlatformStore};
use error::Result;
use services::{AccountService, ClientConnector, ContextStore, ContinuationSigner, SocialServices};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub services: Arc<SocialServices>,
    pub contexts: ContextStore,
    pub signer: ContinuationSigner,
}

impl AppState {
    pub fn new(
        config: Config,
        platforms: Arc<dyn PlatformStore>,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn ClientConnector>,
    ) -> Self {
        let accounts = AccountService::new(platforms.clone(), credentials);
        let signer = ContinuationSigner::new(
            config.continuation_signing_key.clone(),
            config.continuation_ttl_secs,
        );
        let contexts = ContextStore::new(config.context_ttl_secs);

        Self {
            config,
            services: Arc::new(SocialServices::new(platforms, accounts, connector)),
            contexts,
            signer,
        }
    }

    /// Build state over the storage backend named in `config`.
    pub async fn from_config(config: Config, connector: Arc<dyn ClientConnector>) -> Result<Self> {
        match config.storage {
            StorageBackend::Memory => {
                let db = MemoryDb::new();
                tracing::info!("Using in-memory store");
                Ok(Self::new(
                    config,
                    Arc::new(db.clone()),
                    Arc::new(db),
                    connector,
                ))
            }
            StorageBackend::Firestore => {
                let db = FirestoreDb::new(&config.gcp_project_id).await?;
                Ok(Self::new(
                    config,
                    Arc::new(db.clone()),
                    Arc::new(db),
                    connector,
                ))
            }
        }
    }
}

/// Initialize structured JSON logging (GCP-compliant).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("social_connect=debug,info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .try_init();
}
