// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store backed by concurrent maps.
//!
//! Token updates go through the map's per-entry write lock, so concurrent
//! refreshes of one credential never interleave. Linking takes a per-provider
//! lock so the remote-id uniqueness check and the insert happen together.

use crate::db::{CredentialStore, PlatformStore};
use crate::error::{AppError, Result};
use crate::models::{Credential, Provider, ProviderId, Task, TokenMaterial, UserId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory provider catalog and credential store.
#[derive(Clone, Default)]
pub struct MemoryDb {
    providers: Arc<DashMap<ProviderId, Provider>>,
    credentials: Arc<DashMap<(UserId, ProviderId), Credential>>,
    /// Per-provider mutex serializing link operations.
    link_locks: Arc<DashMap<ProviderId, Arc<Mutex<()>>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a provider (configuration update).
    pub fn upsert_provider(&self, provider: Provider) {
        self.providers.insert(provider.id.clone(), provider);
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    fn link_lock(&self, provider_id: &str) -> Arc<Mutex<()>> {
        self.link_locks
            .entry(provider_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl PlatformStore for MemoryDb {
    async fn get_by_id(&self, id: &str) -> Result<Option<Provider>> {
        Ok(self.providers.get(id).map(|p| p.clone()))
    }

    async fn list_by_capability(&self, task: Task) -> Result<Vec<Provider>> {
        let mut providers: Vec<Provider> = self
            .providers
            .iter()
            .filter(|p| p.is_active && p.supports(task))
            .map(|p| p.clone())
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(providers)
    }
}

#[async_trait]
impl CredentialStore for MemoryDb {
    async fn find(&self, user_id: &str, provider_id: &str) -> Result<Option<Credential>> {
        Ok(self
            .credentials
            .get(&(user_id.to_string(), provider_id.to_string()))
            .map(|c| c.clone()))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let lock = self.link_lock(&credential.provider_id);
        let _guard = lock.lock().await;

        let owner = self
            .credentials
            .iter()
            .find(|entry| {
                entry.provider_id == credential.provider_id
                    && entry.remote_id == credential.remote_id
                    && entry.user_id != credential.user_id
            })
            .map(|entry| entry.user_id.clone());

        if let Some(existing_owner) = owner {
            return Err(AppError::AccountAlreadyLinked {
                provider: credential.provider_id.clone(),
                remote_id: credential.remote_id.clone(),
                existing_owner,
            });
        }

        self.credentials.insert(
            (credential.user_id.clone(), credential.provider_id.clone()),
            credential.clone(),
        );
        Ok(())
    }

    async fn update_tokens(
        &self,
        user_id: &str,
        provider_id: &str,
        tokens: Option<TokenMaterial>,
    ) -> Result<Option<Credential>> {
        // The RefMut holds the shard write lock for the whole read-modify-write.
        let updated = self
            .credentials
            .get_mut(&(user_id.to_string(), provider_id.to_string()))
            .map(|mut entry| {
                entry.set_tokens(tokens);
                entry.clone()
            });
        Ok(updated)
    }

    async fn delete(&self, user_id: &str, provider_id: &str) -> Result<bool> {
        Ok(self
            .credentials
            .remove(&(user_id.to_string(), provider_id.to_string()))
            .is_some())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Credential>> {
        let mut credentials: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        credentials.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        Ok(credentials)
    }

    async fn find_by_remote_ids(
        &self,
        provider_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<Credential>> {
        let mut credentials: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.provider_id == provider_id && remote_ids.contains(&c.remote_id))
            .map(|c| c.clone())
            .collect();
        credentials.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(credentials)
    }
}
