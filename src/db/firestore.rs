// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Providers (read-only platform catalog)
//! - Credentials (per-user, per-provider token material)
//! - Remote account owners (at most one user per provider and remote id)

use crate::db::{
    collections, credential_doc_id, remote_id_doc_id, CredentialStore, PlatformStore,
};
use crate::error::{AppError, Result};
use crate::models::{Credential, Provider, ProviderId, Task, TokenMaterial, UserId};
use async_trait::async_trait;
use firestore::{FirestoreConsistencySelector, FirestoreTransaction};
use serde::{Deserialize, Serialize};

/// Owner of a linked remote account.
///
/// Keyed by `(provider_id, remote_id)` so that two links of the same remote
/// account touch the same document and conflict inside their transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RemoteIdOwner {
    provider_id: ProviderId,
    remote_id: String,
    user_id: UserId,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Provider Operations ─────────────────────────────────────

    /// Create or update a provider (configuration update).
    pub async fn upsert_provider(&self, provider: &Provider) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PROVIDERS)
            .document_id(&provider.id)
            .object(provider)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Transaction Helpers ─────────────────────────────────────

    async fn begin(&self) -> Result<(firestore::FirestoreDb, FirestoreTransaction<'_>)> {
        let client = self.get_client()?;
        let transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reads through this client are part of the transaction, so a
        // concurrent write to any document read here aborts one side.
        let reader = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );
        Ok((reader, transaction))
    }

    async fn read_credential_in(
        reader: &firestore::FirestoreDb,
        doc_id: &str,
    ) -> Result<Option<Credential>> {
        reader
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read credential in transaction: {}", e))
            })
    }

    async fn read_owner_in(
        reader: &firestore::FirestoreDb,
        doc_id: &str,
    ) -> Result<Option<RemoteIdOwner>> {
        reader
            .fluent()
            .select()
            .by_id_in(collections::REMOTE_IDS)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to read remote id owner in transaction: {}", e))
            })
    }

    fn delete_in(
        &self,
        transaction: &mut FirestoreTransaction<'_>,
        collection: &str,
        doc_id: &str,
    ) -> Result<()> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collection)
            .document_id(doc_id)
            .add_to_transaction(transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add delete to transaction: {}", e))
            })?;
        Ok(())
    }

    async fn commit(transaction: FirestoreTransaction<'_>) -> Result<()> {
        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl PlatformStore for FirestoreDb {
    async fn get_by_id(&self, id: &str) -> Result<Option<Provider>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PROVIDERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_by_capability(&self, task: Task) -> Result<Vec<Provider>> {
        let providers: Vec<Provider> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PROVIDERS)
            .filter(|q| q.for_all([q.field("is_active").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(providers.into_iter().filter(|p| p.supports(task)).collect())
    }
}

#[async_trait]
impl CredentialStore for FirestoreDb {
    async fn find(&self, user_id: &str, provider_id: &str) -> Result<Option<Credential>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(&credential_doc_id(user_id, provider_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// The owner record of `(provider_id, remote_id)` is read and written in
    /// the same transaction as the credential, so two users linking the same
    /// remote account concurrently cannot both commit.
    async fn save(&self, credential: &Credential) -> Result<()> {
        let client = self.get_client()?;
        let doc_id = credential_doc_id(&credential.user_id, &credential.provider_id);
        let owner_id = remote_id_doc_id(&credential.provider_id, &credential.remote_id);

        let (reader, mut transaction) = self.begin().await?;

        let owner = Self::read_owner_in(&reader, &owner_id).await?;
        if let Some(owner) = owner.filter(|o| o.user_id != credential.user_id) {
            let _ = transaction.rollback().await;
            return Err(AppError::AccountAlreadyLinked {
                provider: credential.provider_id.clone(),
                remote_id: credential.remote_id.clone(),
                existing_owner: owner.user_id,
            });
        }

        // Replacing a link to another remote account releases the old one.
        if let Some(previous) = Self::read_credential_in(&reader, &doc_id).await? {
            if previous.remote_id != credential.remote_id {
                self.delete_in(
                    &mut transaction,
                    collections::REMOTE_IDS,
                    &remote_id_doc_id(&previous.provider_id, &previous.remote_id),
                )?;
            }
        }

        client
            .fluent()
            .update()
            .in_col(collections::REMOTE_IDS)
            .document_id(&owner_id)
            .object(&RemoteIdOwner {
                provider_id: credential.provider_id.clone(),
                remote_id: credential.remote_id.clone(),
                user_id: credential.user_id.clone(),
            })
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add owner to transaction: {}", e))
            })?;

        client
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(&doc_id)
            .object(credential)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add credential to transaction: {}", e))
            })?;

        Self::commit(transaction).await
    }

    /// Single-document transactional read-modify-write of the token fields.
    ///
    /// The read is part of the transaction, so an unlink that lands before
    /// the commit aborts it instead of being overwritten.
    async fn update_tokens(
        &self,
        user_id: &str,
        provider_id: &str,
        tokens: Option<TokenMaterial>,
    ) -> Result<Option<Credential>> {
        let client = self.get_client()?;
        let doc_id = credential_doc_id(user_id, provider_id);

        let (reader, mut transaction) = self.begin().await?;

        let Some(mut credential) = Self::read_credential_in(&reader, &doc_id).await? else {
            let _ = transaction.rollback().await;
            return Ok(None);
        };

        credential.set_tokens(tokens);

        client
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(&doc_id)
            .object(&credential)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add credential to transaction: {}", e))
            })?;

        Self::commit(transaction).await?;
        Ok(Some(credential))
    }

    /// Removes the credential and releases its remote account in one transaction.
    async fn delete(&self, user_id: &str, provider_id: &str) -> Result<bool> {
        let doc_id = credential_doc_id(user_id, provider_id);

        let (reader, mut transaction) = self.begin().await?;

        let Some(credential) = Self::read_credential_in(&reader, &doc_id).await? else {
            let _ = transaction.rollback().await;
            return Ok(false);
        };

        self.delete_in(&mut transaction, collections::CREDENTIALS, &doc_id)?;

        let owner_id = remote_id_doc_id(provider_id, &credential.remote_id);
        if Self::read_owner_in(&reader, &owner_id)
            .await?
            .is_some_and(|o| o.user_id == user_id)
        {
            self.delete_in(&mut transaction, collections::REMOTE_IDS, &owner_id)?;
        }

        Self::commit(transaction).await?;
        Ok(true)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Credential>> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CREDENTIALS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_remote_ids(
        &self,
        provider_id: &str,
        remote_ids: &[String],
    ) -> Result<Vec<Credential>> {
        if remote_ids.is_empty() {
            return Ok(Vec::new());
        }

        let credentials: Vec<Credential> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CREDENTIALS)
            .filter(|q| q.for_all([q.field("provider_id").eq(provider_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(credentials
            .into_iter()
            .filter(|c| remote_ids.contains(&c.remote_id))
            .collect())
    }
}
