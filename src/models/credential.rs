// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persisted per-user, per-provider authentication material.

use crate::models::provider::{ProviderFlavor, ProviderId};
use crate::time_utils::{format_utc_rfc3339, now_unix};
use serde::{Deserialize, Serialize};

/// Local user identifier.
pub type UserId = String;

/// Token material issued by a provider.
///
/// An `expires_at` of 0 means the token never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenMaterial {
    Session {
        token: String,
        expires_at: i64,
    },
    #[serde(rename = "oauth")]
    OAuth {
        token: String,
        secret: String,
        expires_at: i64,
    },
}

impl TokenMaterial {
    pub fn token(&self) -> &str {
        match self {
            TokenMaterial::Session { token, .. } | TokenMaterial::OAuth { token, .. } => token,
        }
    }

    pub fn expires_at(&self) -> i64 {
        match self {
            TokenMaterial::Session { expires_at, .. } | TokenMaterial::OAuth { expires_at, .. } => {
                *expires_at
            }
        }
    }

    pub fn flavor(&self) -> ProviderFlavor {
        match self {
            TokenMaterial::Session { .. } => ProviderFlavor::TokenSession,
            TokenMaterial::OAuth { .. } => ProviderFlavor::OAuth,
        }
    }

    /// True if the token is present and unexpired at `now` (unix seconds).
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.token().is_empty() && (self.expires_at() == 0 || self.expires_at() > now)
    }
}

/// A user's linked account on a remote provider.
///
/// Token fields are cleared (not deleted) on invalidation; the record lives
/// until the user unlinks the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: UserId,
    pub provider_id: ProviderId,
    /// The user's id on the remote provider
    pub remote_id: String,
    pub is_active: bool,
    /// `None` once invalidated
    pub tokens: Option<TokenMaterial>,
    /// When the account was first linked (ISO 8601)
    pub created_at: String,
    /// Last token update (ISO 8601)
    pub updated_at: String,
}

impl Credential {
    pub fn new(
        user_id: impl Into<String>,
        provider_id: impl Into<String>,
        remote_id: impl Into<String>,
        tokens: TokenMaterial,
    ) -> Self {
        let now = format_utc_rfc3339(chrono::Utc::now());
        Self {
            user_id: user_id.into(),
            provider_id: provider_id.into(),
            remote_id: remote_id.into(),
            is_active: true,
            tokens: Some(tokens),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether the persisted tokens can be used to build a live client right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_unix())
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.tokens.as_ref().is_some_and(|t| t.is_valid_at(now))
    }

    /// Replace token material and bump `updated_at`.
    pub fn set_tokens(&mut self, tokens: Option<TokenMaterial>) {
        self.tokens = tokens;
        self.updated_at = format_utc_rfc3339(chrono::Utc::now());
    }
}

/// Public view of a linked account (no token material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LinkedAccount {
    pub user_id: UserId,
    pub provider_id: ProviderId,
    pub remote_id: String,
    pub is_active: bool,
    pub linked_at: String,
}

impl From<&Credential> for LinkedAccount {
    fn from(credential: &Credential) -> Self {
        Self {
            user_id: credential.user_id.clone(),
            provider_id: credential.provider_id.clone(),
            remote_id: credential.remote_id.clone(),
            is_active: credential.is_active,
            linked_at: credential.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str, expires_at: i64) -> Credential {
        Credential::new(
            "alice",
            "fb",
            "1234",
            TokenMaterial::Session {
                token: token.to_string(),
                expires_at,
            },
        )
    }

    #[test]
    fn test_empty_token_is_never_valid() {
        assert!(!session("", 0).is_valid_at(1_000));
        assert!(!session("", i64::MAX).is_valid_at(1_000));
    }

    #[test]
    fn test_zero_expiry_never_expires() {
        let credential = session("abc", 0);
        assert!(credential.is_valid_at(0));
        assert!(credential.is_valid_at(i64::MAX));
    }

    #[test]
    fn test_expiry_is_exclusive() {
        let credential = session("abc", 1_000);
        assert!(credential.is_valid_at(999));
        assert!(!credential.is_valid_at(1_000));
        assert!(!credential.is_valid_at(1_001));
    }

    #[test]
    fn test_cleared_tokens_invalid() {
        let mut credential = session("abc", 0);
        credential.set_tokens(None);
        assert!(!credential.is_valid());
        assert_eq!(credential.remote_id, "1234");
    }

    #[test]
    fn test_oauth_material_validity() {
        let tokens = TokenMaterial::OAuth {
            token: "tok".to_string(),
            secret: "sec".to_string(),
            expires_at: 50,
        };
        assert!(tokens.is_valid_at(10));
        assert!(!tokens.is_valid_at(60));
        assert_eq!(tokens.flavor(), ProviderFlavor::OAuth);
    }
}
