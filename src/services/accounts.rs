// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential lifecycle.
//!
//! Handles:
//! - Linking a remote account on first successful authentication
//! - Persisting refreshed token material from a live client
//! - Invalidating tokens after the provider rejects a session
//! - Unlinking and listing linked accounts

use crate::db::{CredentialStore, PlatformStore};
use crate::error::{AppError, Result};
use crate::models::{
    Credential, LinkedAccount, Provider, ProviderFlavor, Task, TokenMaterial,
};
use crate::services::client::LiveClient;
use std::sync::Arc;

/// Credential operations over the injected stores.
#[derive(Clone)]
pub struct AccountService {
    platforms: Arc<dyn PlatformStore>,
    credentials: Arc<dyn CredentialStore>,
}

impl AccountService {
    pub fn new(platforms: Arc<dyn PlatformStore>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            platforms,
            credentials,
        }
    }

    pub async fn find(&self, user_id: &str, provider_id: &str) -> Result<Option<Credential>> {
        self.credentials.find(user_id, provider_id).await
    }

    /// Link `remote_id` to the user, or update the existing link's tokens.
    ///
    /// Token-session providers bind a session to one remote account, so an
    /// existing link to a different remote id is an identity mismatch. OAuth
    /// providers keep the existing record and only replace tokens.
    pub async fn link(
        &self,
        user_id: &str,
        provider: &Provider,
        remote_id: &str,
        tokens: TokenMaterial,
    ) -> Result<Credential> {
        if let Some(existing) = self.credentials.find(user_id, &provider.id).await? {
            if provider.flavor() == ProviderFlavor::TokenSession && existing.remote_id != remote_id
            {
                tracing::warn!(
                    user_id,
                    provider_id = %provider.id,
                    expected = %existing.remote_id,
                    actual = remote_id,
                    "Authenticated as a different remote account"
                );
                return Err(AppError::IdentityMismatch {
                    provider: provider.name.clone(),
                    expected: existing.remote_id,
                    actual: remote_id.to_string(),
                });
            }

            return self
                .store_tokens(user_id, &provider.id, Some(tokens))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("credential for {}", provider.id)));
        }

        let credential = Credential::new(user_id, &provider.id, remote_id, tokens);
        self.credentials.save(&credential).await?;

        tracing::info!(
            user_id,
            provider_id = %provider.id,
            remote_id,
            "Linked remote account"
        );

        Ok(credential)
    }

    /// Copy the live client's current token material into the credential
    /// and persist it immediately.
    pub async fn refresh(&self, credential: &Credential, live: &LiveClient) -> Result<Credential> {
        let updated = self
            .store_tokens(
                &credential.user_id,
                &credential.provider_id,
                Some(live.token_material()),
            )
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("credential for {}", credential.provider_id))
            })?;

        tracing::debug!(
            user_id = %credential.user_id,
            provider_id = %credential.provider_id,
            expires_at = live.expires_at(),
            "Credential refreshed"
        );

        Ok(updated)
    }

    /// Clear token material, keeping the record and its remote id.
    pub async fn invalidate(&self, credential: &Credential) -> Result<()> {
        self.store_tokens(&credential.user_id, &credential.provider_id, None)
            .await?;

        tracing::info!(
            user_id = %credential.user_id,
            provider_id = %credential.provider_id,
            "Credential invalidated"
        );

        Ok(())
    }

    /// Remove the link entirely. Returns whether one existed.
    pub async fn unlink(&self, user_id: &str, provider_id: &str) -> Result<bool> {
        let removed = self.credentials.delete(user_id, provider_id).await?;
        if removed {
            tracing::info!(user_id, provider_id, "Unlinked remote account");
        }
        Ok(removed)
    }

    async fn store_tokens(
        &self,
        user_id: &str,
        provider_id: &str,
        tokens: Option<TokenMaterial>,
    ) -> Result<Option<Credential>> {
        self.credentials
            .update_tokens(user_id, provider_id, tokens)
            .await
    }

    pub async fn linked_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>> {
        Ok(self
            .credentials
            .list_for_user(user_id)
            .await?
            .iter()
            .map(LinkedAccount::from)
            .collect())
    }

    /// Providers the user has linked that also support `task`.
    pub async fn linked_providers(&self, user_id: &str, task: Task) -> Result<Vec<Provider>> {
        let linked = self.credentials.list_for_user(user_id).await?;
        let providers = self.platforms.list_by_capability(task).await?;

        Ok(providers
            .into_iter()
            .filter(|p| linked.iter().any(|c| c.provider_id == p.id))
            .collect())
    }

    /// Local accounts on `provider_id` owning any of `remote_ids`.
    pub async fn matched_accounts(
        &self,
        provider_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<LinkedAccount>> {
        Ok(self
            .credentials
            .find_by_remote_ids(provider_id, remote_ids)
            .await?
            .iter()
            .map(LinkedAccount::from)
            .collect())
    }
}
