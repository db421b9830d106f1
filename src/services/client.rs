// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider clients.
//!
//! Handles:
//! - The wire-client traits each platform integration implements
//! - Live (authenticated) client handles and their expiry
//! - Uniform friends/profile/groups/publish/notify calls over both variants
//! - Classification of provider errors (auth, feed limit, other)

use crate::error::{AppError, ProviderError, Result};
use crate::models::{
    CanonicalField, ErrorClass, OAuthSettings, Provider, ProviderFlavor, ProviderKind, RawAttributes,
    TokenMaterial, TokenSessionSettings,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Provider-native calls of a token-session platform, bound to one session.
#[async_trait]
pub trait TokenSessionApi: Send + Sync {
    /// Remote user id the session belongs to.
    fn uid(&self) -> &str;
    fn session_key(&self) -> &str;
    /// Unix seconds, 0 for a session that never expires.
    fn session_expires(&self) -> i64;

    async fn friends_get(&self) -> std::result::Result<Vec<String>, ProviderError>;
    async fn users_get_info(
        &self,
        uids: &[String],
        fields: &[String],
    ) -> std::result::Result<Vec<RawAttributes>, ProviderError>;
    async fn groups_get(&self, uid: &str) -> std::result::Result<Vec<RawAttributes>, ProviderError>;
    async fn feed_publish_user_action(
        &self,
        template_id: &str,
        template_data: &Value,
        target_ids: &[String],
    ) -> std::result::Result<Value, ProviderError>;
    async fn notifications_send(
        &self,
        uids: &[String],
        text: &str,
        kind: &str,
    ) -> std::result::Result<Value, ProviderError>;
}

/// Provider-native calls of an OAuth platform, bound to one access token.
#[async_trait]
pub trait OAuthApi: Send + Sync {
    fn token(&self) -> &str;
    fn token_secret(&self) -> &str;
    /// Unix seconds, 0 for a token that never expires.
    fn token_expires(&self) -> i64;

    /// Remote id of the token owner.
    async fn get_uid(&self) -> std::result::Result<String, ProviderError>;
    /// Friends with their full records.
    async fn get_friends(
        &self,
        fields: &[String],
    ) -> std::result::Result<Vec<RawAttributes>, ProviderError>;
    async fn get_users_profile(
        &self,
        ids: &[String],
        fields: &[String],
    ) -> std::result::Result<Vec<RawAttributes>, ProviderError>;
    async fn get_groups(&self) -> std::result::Result<Vec<RawAttributes>, ProviderError>;
    async fn create_activity(
        &self,
        template_id: &str,
        template_data: &Value,
        target_ids: &[String],
    ) -> std::result::Result<Value, ProviderError>;
    async fn send_message(
        &self,
        ids: &[String],
        text: &str,
        kind: &str,
    ) -> std::result::Result<Value, ProviderError>;
}

/// Builds authenticated wire clients from persisted token material.
///
/// Timeouts and transport settings belong to the implementation.
#[async_trait]
pub trait ClientConnector: Send + Sync {
    async fn token_session(
        &self,
        provider: &Provider,
        settings: &TokenSessionSettings,
        session_key: &str,
        expires_at: i64,
        uid: &str,
    ) -> Result<Arc<dyn TokenSessionApi>>;

    async fn oauth(
        &self,
        provider: &Provider,
        settings: &OAuthSettings,
        token: &str,
        secret: &str,
        expires_at: i64,
    ) -> Result<Arc<dyn OAuthApi>>;
}

/// An authenticated client handle, bound to its own expiry.
#[derive(Clone)]
pub enum LiveClient {
    TokenSession(Arc<dyn TokenSessionApi>),
    OAuth(Arc<dyn OAuthApi>),
}

impl std::fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveClient")
            .field("flavor", &self.flavor())
            .field("expires_at", &self.expires_at())
            .finish()
    }
}

impl LiveClient {
    /// Rebuild a live client from persisted token material.
    pub async fn connect(
        connector: &dyn ClientConnector,
        provider: &Provider,
        tokens: &TokenMaterial,
        remote_id: &str,
    ) -> Result<Self> {
        match (&provider.kind, tokens) {
            (
                ProviderKind::TokenSession(settings),
                TokenMaterial::Session { token, expires_at },
            ) => Ok(LiveClient::TokenSession(
                connector
                    .token_session(provider, settings, token, *expires_at, remote_id)
                    .await?,
            )),
            (
                ProviderKind::OAuth(settings),
                TokenMaterial::OAuth {
                    token,
                    secret,
                    expires_at,
                },
            ) => Ok(LiveClient::OAuth(
                connector
                    .oauth(provider, settings, token, secret, *expires_at)
                    .await?,
            )),
            (kind, tokens) => Err(AppError::Internal(anyhow::anyhow!(
                "Token material {:?} does not match provider {} ({:?})",
                tokens.flavor(),
                provider.id,
                kind.flavor()
            ))),
        }
    }

    pub fn flavor(&self) -> ProviderFlavor {
        match self {
            LiveClient::TokenSession(_) => ProviderFlavor::TokenSession,
            LiveClient::OAuth(_) => ProviderFlavor::OAuth,
        }
    }

    pub fn expires_at(&self) -> i64 {
        match self {
            LiveClient::TokenSession(api) => api.session_expires(),
            LiveClient::OAuth(api) => api.token_expires(),
        }
    }

    /// True while the handle's own expiry has not passed.
    pub fn is_live_at(&self, now: i64) -> bool {
        let expires_at = self.expires_at();
        expires_at == 0 || expires_at > now
    }

    /// Identity reported by the session itself, without a network call.
    pub fn session_identity(&self) -> Option<&str> {
        match self {
            LiveClient::TokenSession(api) => Some(api.uid()),
            LiveClient::OAuth(_) => None,
        }
    }

    /// Remote id of the authenticated user, asking the provider if needed.
    pub async fn resolve_remote_id(&self, provider: &Provider) -> Result<String> {
        match self {
            LiveClient::TokenSession(api) => Ok(api.uid().to_string()),
            LiveClient::OAuth(api) => api.get_uid().await.map_err(|e| classify(provider, e)),
        }
    }

    /// Copy of the handle's current token material, for persisting.
    pub fn token_material(&self) -> TokenMaterial {
        match self {
            LiveClient::TokenSession(api) => TokenMaterial::Session {
                token: api.session_key().to_string(),
                expires_at: api.session_expires(),
            },
            LiveClient::OAuth(api) => TokenMaterial::OAuth {
                token: api.token().to_string(),
                secret: api.token_secret().to_string(),
                expires_at: api.token_expires(),
            },
        }
    }
}

/// Friends of the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawFriends {
    Ids(Vec<String>),
    Records(Vec<RawAttributes>),
}

/// Result of a publish call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published { response: Value },
    /// Rejected by a feed/rate limit; nothing was published.
    Suppressed { code: Option<i64>, reason: String },
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }
}

/// Provider acknowledgement of a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryReceipt {
    pub recipients: Vec<String>,
    pub kind: String,
    pub response: Value,
}

/// Map a wire error into the shared taxonomy.
pub fn classify(provider: &Provider, err: ProviderError) -> AppError {
    match provider.classify(&err) {
        ErrorClass::Auth => AppError::ProviderAuth(err),
        ErrorClass::Transient => AppError::ProviderTransient(err),
        ErrorClass::Other => AppError::Provider(err),
    }
}

/// Remote ids of provider-native records. Records without an id are skipped.
pub fn record_ids(provider: &Provider, records: &[RawAttributes]) -> Vec<String> {
    let id_key = provider.fields.native(CanonicalField::Id);
    records
        .iter()
        .filter_map(|r| match r.get(id_key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Uniform capability calls over a live client.
///
/// Holds no state of its own; every call is one or two outbound requests.
pub struct ProviderClient<'a> {
    provider: &'a Provider,
    live: &'a LiveClient,
}

impl<'a> ProviderClient<'a> {
    pub fn new(provider: &'a Provider, live: &'a LiveClient) -> Self {
        Self { provider, live }
    }

    fn classify(&self, err: ProviderError) -> AppError {
        classify(self.provider, err)
    }

    /// Friends of the authenticated user.
    ///
    /// Token-session: one call for ids, a second batch call when profiles
    /// are wanted. OAuth: the native call already returns records, so
    /// ids-only is a local projection.
    pub async fn get_friends(&self, fields: &[String], with_profiles: bool) -> Result<RawFriends> {
        match self.live {
            LiveClient::TokenSession(api) => {
                let ids = api.friends_get().await.map_err(|e| self.classify(e))?;
                if !with_profiles {
                    return Ok(RawFriends::Ids(ids));
                }
                if ids.is_empty() {
                    return Ok(RawFriends::Records(Vec::new()));
                }
                let records = api
                    .users_get_info(&ids, fields)
                    .await
                    .map_err(|e| self.classify(e))?;
                Ok(RawFriends::Records(records))
            }
            LiveClient::OAuth(api) => {
                let records = api.get_friends(fields).await.map_err(|e| self.classify(e))?;
                if with_profiles {
                    return Ok(RawFriends::Records(records));
                }
                Ok(RawFriends::Ids(record_ids(self.provider, &records)))
            }
        }
    }

    pub async fn get_users_profile(
        &self,
        ids: &[String],
        fields: &[String],
    ) -> Result<Vec<RawAttributes>> {
        let result = match self.live {
            LiveClient::TokenSession(api) => api.users_get_info(ids, fields).await,
            LiveClient::OAuth(api) => api.get_users_profile(ids, fields).await,
        };
        result.map_err(|e| self.classify(e))
    }

    /// Profile of the authenticated user.
    pub async fn get_profile(&self, fields: &[String]) -> Result<RawAttributes> {
        let me = match self.live {
            LiveClient::TokenSession(api) => api.uid().to_string(),
            LiveClient::OAuth(_) => "@me".to_string(),
        };

        self.get_users_profile(&[me], fields)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Provider(ProviderError::new(None, "Empty profile response")))
    }

    pub async fn get_groups(&self) -> Result<Vec<RawAttributes>> {
        let result = match self.live {
            LiveClient::TokenSession(api) => api.groups_get(api.uid()).await,
            LiveClient::OAuth(api) => api.get_groups().await,
        };
        result.map_err(|e| self.classify(e))
    }

    /// Publish an action from a template.
    ///
    /// Feed/rate-limit errors downgrade to [`PublishOutcome::Suppressed`].
    pub async fn publish_user_action(
        &self,
        template_id: &str,
        template_data: &Value,
        target_ids: &[String],
    ) -> Result<PublishOutcome> {
        let result = match self.live {
            LiveClient::TokenSession(api) => {
                api.feed_publish_user_action(template_id, template_data, target_ids)
                    .await
            }
            LiveClient::OAuth(api) => {
                api.create_activity(template_id, template_data, target_ids)
                    .await
            }
        };

        match result.map_err(|e| self.classify(e)) {
            Ok(response) => Ok(PublishOutcome::Published { response }),
            Err(AppError::ProviderTransient(err)) => {
                tracing::info!(
                    provider_id = %self.provider.id,
                    code = ?err.code,
                    "Publish suppressed by provider limit"
                );
                Ok(PublishOutcome::Suppressed {
                    code: err.code,
                    reason: err.message,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn send_notifications(
        &self,
        ids: &[String],
        text: &str,
        kind: &str,
    ) -> Result<DeliveryReceipt> {
        let result = match self.live {
            LiveClient::TokenSession(api) => api.notifications_send(ids, text, kind).await,
            LiveClient::OAuth(api) => api.send_message(ids, text, kind).await,
        };

        let response = result.map_err(|e| self.classify(e))?;
        Ok(DeliveryReceipt {
            recipients: ids.to_vec(),
            kind: kind.to_string(),
            response,
        })
    }
}
