// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage collaborators.
//!
//! The core only needs two narrow interfaces: a read-only provider catalog and
//! a credential store. Two implementations are provided: an in-process store
//! and a Firestore-backed one.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::{Credential, Provider, Task, TokenMaterial};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const PROVIDERS: &str = "providers";
    pub const CREDENTIALS: &str = "credentials";
    /// One document per linked `(provider, remote_id)`, naming its owner.
    pub const REMOTE_IDS: &str = "remote_ids";
}

/// Document ID of a credential.
///
/// Both parts are percent-encoded, so the `:` separator is unambiguous.
pub fn credential_doc_id(user_id: &str, provider_id: &str) -> String {
    format!(
        "{}:{}",
        urlencoding::encode(user_id),
        urlencoding::encode(provider_id)
    )
}

/// Document ID of the owner record of a remote account.
pub fn remote_id_doc_id(provider_id: &str, remote_id: &str) -> String {
    format!(
        "{}:{}",
        urlencoding::encode(provider_id),
        urlencoding::encode(remote_id)
    )
}

/// Read-only provider catalog.
#[async_trait]
pub trait PlatformStore: Send + Sync {
    /// Look up a provider by id, active or not.
    async fn get_by_id(&self, id: &str) -> Result<Option<Provider>>;

    /// Active providers supporting `task`.
    async fn list_by_capability(&self, task: Task) -> Result<Vec<Provider>>;
}

/// Persisted credentials, one per (user, provider).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, user_id: &str, provider_id: &str) -> Result<Option<Credential>>;

    /// Insert or replace a credential.
    ///
    /// Fails with `AccountAlreadyLinked` without touching the store if another
    /// user already owns `(provider_id, remote_id)`.
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Atomically replace the token material of an existing credential.
    ///
    /// `None` clears the tokens. Returns the updated record, or `None` if
    /// there is no credential for the pair.
    async fn update_tokens(
        &self,
        user_id: &str,
        provider_id: &str,
        tokens: Option<TokenMaterial>,
    ) -> Result<Option<Credential>>;

    /// Remove the credential record entirely. Returns whether one existed.
    async fn delete(&self, user_id: &str, provider_id: &str) -> Result<bool>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Credential>>;

    /// Credentials on `provider_id` whose remote id is in `remote_ids`.
    async fn find_by_remote_ids(
        &self,
        provider_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<Credential>>;
}
