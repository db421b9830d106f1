// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

/// Where providers and credentials are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Firestore,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "firestore" => Ok(StorageBackend::Firestore),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL providers send the user back to after login
    pub public_base_url: String,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore backend only)
    pub gcp_project_id: String,
    pub storage: StorageBackend,

    // --- Secrets ---
    /// JWT signing key identifying local callers (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key sealing redirect continuations (raw bytes)
    pub continuation_signing_key: Vec<u8>,
    /// Lifetime of a sealed continuation, in seconds
    pub continuation_ttl_secs: i64,
    /// Idle time after which a cached session context is dropped, in seconds
    pub context_ttl_secs: i64,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            storage: StorageBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            continuation_signing_key: b"test_continuation_key_32_bytes!!".to_vec(),
            continuation_ttl_secs: 900,
            context_ttl_secs: 1800,
        }
    }
}

impl Config {
    /// Config for tests.
    pub fn test_default() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file is read first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Memory,
        };

        let continuation_ttl_secs = match env::var("CONTINUATION_TTL_SECS") {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("CONTINUATION_TTL_SECS", value))?,
            Err(_) => 900,
        };

        let context_ttl_secs = match env::var("CONTEXT_TTL_SECS") {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("CONTEXT_TTL_SECS", value))?,
            Err(_) => 1800,
        };

        Ok(Self {
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            storage,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            continuation_signing_key: env::var("CONTINUATION_SIGNING_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("CONTINUATION_SIGNING_KEY"))?
                .into_bytes(),
            continuation_ttl_secs,
            context_ttl_secs,
        })
    }

    /// Where a provider should send the user back to for `provider_id`.
    pub fn callback_url(&self, provider_id: &str) -> String {
        format!(
            "{}/api/social/{}/callback",
            self.public_base_url,
            urlencoding::encode(provider_id)
        )
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
