// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-(user, provider) session state machine.
//!
//! Every capability-gated call goes through the same steps:
//! 1. Re-read the provider and check it supports the task (local, no I/O)
//! 2. Reuse a bound live client if it has not expired
//! 3. Otherwise rebuild one from the persisted credential, or raise
//!    `NeedsRedirect` with a typed continuation before any provider call
//! 4. Dispatch through [`ProviderClient`] and normalize the result
//!
//! Auth-class provider errors never reach the caller: the credential is
//! invalidated and the call turns into `NeedsRedirect`.

use crate::db::PlatformStore;
use crate::error::{AppError, ProviderError, Result};
use crate::models::{
    Credential, FriendsView, Group, LinkedAccount, PendingContinuation, PendingOperation, Profile,
    Provider, UserId,
};
use crate::services::accounts::AccountService;
use crate::services::client::{
    ClientConnector, DeliveryReceipt, LiveClient, ProviderClient, PublishOutcome, RawFriends,
    record_ids,
};
use crate::services::normalizer;
use crate::time_utils::now_unix;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Collaborators shared by every session.
pub struct SocialServices {
    pub platforms: Arc<dyn PlatformStore>,
    pub accounts: AccountService,
    pub connector: Arc<dyn ClientConnector>,
}

impl SocialServices {
    pub fn new(
        platforms: Arc<dyn PlatformStore>,
        accounts: AccountService,
        connector: Arc<dyn ClientConnector>,
    ) -> Self {
        Self {
            platforms,
            accounts,
            connector,
        }
    }

    /// Active provider by id.
    pub async fn provider(&self, provider_id: &str) -> Result<Provider> {
        match self.platforms.get_by_id(provider_id).await? {
            Some(provider) if provider.is_active => Ok(provider),
            _ => Err(AppError::NotFound(format!("provider {}", provider_id))),
        }
    }
}

/// Where a context stands after its last transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    NoCredential,
    /// A credential exists but no usable live client is bound.
    CredentialStale,
    Live,
    /// The last call asked the caller to send the user to the provider.
    NeedsRedirect,
}

/// Friends in the representation the caller asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", content = "friends", rename_all = "snake_case")]
pub enum Friends {
    Ids(Vec<String>),
    Profiles(Vec<Profile>),
    Matched(Vec<LinkedAccount>),
}

/// Result of a replayed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", content = "data", rename_all = "snake_case")]
pub enum OperationOutput {
    Synced(LinkedAccount),
    Profile(Profile),
    Friends(Friends),
    Groups(Vec<Group>),
    Published(PublishOutcome),
    Notified(DeliveryReceipt),
}

/// Session of one user against one provider.
///
/// Not shared between concurrent callers; see [`ContextStore`].
pub struct SessionContext {
    user_id: UserId,
    provider: Provider,
    live: Option<LiveClient>,
    state: ContextState,
    services: Arc<SocialServices>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user_id", &self.user_id)
            .field("provider_id", &self.provider.id)
            .field("state", &self.state)
            .field("live", &self.live)
            .finish()
    }
}

impl SessionContext {
    /// Resolve the provider and the initial state for `user_id`.
    pub async fn open(
        services: Arc<SocialServices>,
        user_id: impl Into<String>,
        provider_id: &str,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let provider = services.provider(provider_id).await?;

        let state = match services.accounts.find(&user_id, provider_id).await? {
            Some(_) => ContextState::CredentialStale,
            None => ContextState::NoCredential,
        };

        Ok(Self {
            user_id,
            provider,
            live: None,
            state,
            services,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn provider_id(&self) -> &str {
        &self.provider.id
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| live.is_live_at(now_unix()))
    }

    fn transition(&mut self, state: ContextState, operation: &PendingOperation) {
        if self.state != state {
            tracing::debug!(
                user_id = %self.user_id,
                provider_id = %self.provider.id,
                from = ?self.state,
                to = ?state,
                operation = operation.name(),
                "Session state change"
            );
        }
        self.state = state;
    }

    /// Re-read provider configuration. A flavor change drops the live client.
    async fn reload_provider(&mut self) -> Result<()> {
        let provider = self.services.provider(&self.provider.id).await?;
        if provider.flavor() != self.provider.flavor() {
            self.live = None;
        }
        self.provider = provider;
        Ok(())
    }

    fn redirect(&mut self, operation: &PendingOperation) -> AppError {
        self.transition(ContextState::NeedsRedirect, operation);
        tracing::info!(
            user_id = %self.user_id,
            provider_id = %self.provider.id,
            operation = operation.name(),
            "Provider authentication required"
        );
        AppError::NeedsRedirect(Box::new(PendingContinuation::new(
            &self.provider.id,
            &self.user_id,
            operation.clone(),
        )))
    }

    /// Capability check, then make sure a live client is bound.
    async fn prepare(&mut self, operation: &PendingOperation) -> Result<LiveClient> {
        self.reload_provider().await?;

        if let Some(task) = operation.task() {
            if !self.provider.supports(task) {
                return Err(AppError::UnsupportedOperation {
                    provider: self.provider.id.clone(),
                    task,
                });
            }
        }

        self.validate(operation).await
    }

    async fn validate(&mut self, operation: &PendingOperation) -> Result<LiveClient> {
        let now = now_unix();

        // The credential may have been unlinked or invalidated by another
        // request since the live client was bound.
        let Some(credential) = self
            .services
            .accounts
            .find(&self.user_id, &self.provider.id)
            .await?
        else {
            self.live = None;
            self.transition(ContextState::NoCredential, operation);
            return Err(self.redirect(operation));
        };

        if let Some(live) = &self.live {
            if live.is_live_at(now) && credential.is_valid_at(now) {
                let live = live.clone();
                self.transition(ContextState::Live, operation);
                return Ok(live);
            }
            tracing::debug!(
                user_id = %self.user_id,
                provider_id = %self.provider.id,
                "Dropping live client"
            );
            self.live = None;
        }

        self.transition(ContextState::CredentialStale, operation);

        let tokens = match &credential.tokens {
            Some(tokens) if tokens.is_valid_at(now) => tokens,
            _ => return Err(self.redirect(operation)),
        };

        let connected = LiveClient::connect(
            self.services.connector.as_ref(),
            &self.provider,
            tokens,
            &credential.remote_id,
        )
        .await;
        let live = match connected {
            Ok(live) => live,
            Err(AppError::ProviderAuth(err)) => {
                return Err(self.handle_auth_error(&credential, err, operation).await)
            }
            Err(e) => return Err(e),
        };

        if let Some(actual) = live.session_identity() {
            if actual != credential.remote_id {
                tracing::warn!(
                    user_id = %self.user_id,
                    provider_id = %self.provider.id,
                    expected = %credential.remote_id,
                    actual,
                    "Live session belongs to another remote account"
                );
                let err = AppError::IdentityMismatch {
                    provider: self.provider.name.clone(),
                    expected: credential.remote_id.clone(),
                    actual: actual.to_string(),
                };
                self.live = None;
                return Err(err);
            }
        }

        // The connector may have renewed the session while rebuilding it.
        if live.token_material() != *tokens {
            self.services.accounts.refresh(&credential, &live).await?;
        }

        self.live = Some(live.clone());
        self.transition(ContextState::Live, operation);
        Ok(live)
    }

    async fn handle_auth_error(
        &mut self,
        credential: &Credential,
        err: ProviderError,
        operation: &PendingOperation,
    ) -> AppError {
        tracing::warn!(
            user_id = %self.user_id,
            provider_id = %self.provider.id,
            code = ?err.code,
            error = %err.message,
            "Provider rejected session"
        );
        self.live = None;

        if let Err(e) = self.services.accounts.invalidate(credential).await {
            return e;
        }
        self.redirect(operation)
    }

    /// Turn an auth-class provider error into invalidation + redirect.
    async fn settle<T>(&mut self, result: Result<T>, operation: &PendingOperation) -> Result<T> {
        match result {
            Err(AppError::ProviderAuth(err)) => {
                let credential = self
                    .services
                    .accounts
                    .find(&self.user_id, &self.provider.id)
                    .await?;
                match credential {
                    Some(credential) => {
                        Err(self.handle_auth_error(&credential, err, operation).await)
                    }
                    None => {
                        self.live = None;
                        Err(self.redirect(operation))
                    }
                }
            }
            other => other,
        }
    }

    // ─── Operations ─────────────────────────────────────────────

    /// Make sure the account is usable without calling any capability.
    pub async fn sync_account(&mut self) -> Result<LinkedAccount> {
        let operation = PendingOperation::SyncAccount;
        self.prepare(&operation).await?;

        let credential = self
            .services
            .accounts
            .find(&self.user_id, &self.provider.id)
            .await?;

        match credential {
            Some(credential) => Ok(LinkedAccount::from(&credential)),
            None => Err(self.redirect(&operation)),
        }
    }

    pub async fn get_profile(&mut self) -> Result<Profile> {
        let operation = PendingOperation::GetProfile;
        let live = self.prepare(&operation).await?;

        let client = ProviderClient::new(&self.provider, &live);
        let result = match client.get_profile(&self.provider.fields.native_fields()).await {
            Ok(raw) => normalizer::normalize(self.provider.flavor(), &self.provider.fields, &raw),
            Err(e) => Err(e),
        };

        self.settle(result, &operation).await
    }

    pub async fn get_friends(&mut self, view: FriendsView) -> Result<Friends> {
        let operation = PendingOperation::GetFriends { view };
        let live = self.prepare(&operation).await?;

        let result = self.fetch_friends(&live, view).await;
        self.settle(result, &operation).await
    }

    async fn fetch_friends(&self, live: &LiveClient, view: FriendsView) -> Result<Friends> {
        let client = ProviderClient::new(&self.provider, live);
        let fields = self.provider.fields.native_fields();
        let with_profiles = view == FriendsView::Profiles;

        let raw = client.get_friends(&fields, with_profiles).await?;

        match (view, raw) {
            (FriendsView::Profiles, RawFriends::Records(records)) => {
                Ok(Friends::Profiles(normalizer::normalize_all(
                    self.provider.flavor(),
                    &self.provider.fields,
                    &records,
                )?))
            }
            (FriendsView::Profiles, RawFriends::Ids(ids)) => {
                let records = client.get_users_profile(&ids, &fields).await?;
                Ok(Friends::Profiles(normalizer::normalize_all(
                    self.provider.flavor(),
                    &self.provider.fields,
                    &records,
                )?))
            }
            (FriendsView::Ids, raw) => Ok(Friends::Ids(self.friend_ids(raw))),
            (FriendsView::Matched, raw) => {
                let ids = self.friend_ids(raw);
                let matched = self
                    .services
                    .accounts
                    .matched_accounts(&self.provider.id, &ids)
                    .await?;
                Ok(Friends::Matched(matched))
            }
        }
    }

    fn friend_ids(&self, raw: RawFriends) -> Vec<String> {
        match raw {
            RawFriends::Ids(ids) => ids,
            RawFriends::Records(records) => record_ids(&self.provider, &records),
        }
    }

    pub async fn get_groups(&mut self) -> Result<Vec<Group>> {
        let operation = PendingOperation::GetGroups;
        let live = self.prepare(&operation).await?;

        let client = ProviderClient::new(&self.provider, &live);
        let flavor = self.provider.flavor();
        let result: Result<Vec<Group>> = match client.get_groups().await {
            Ok(records) => records
                .into_iter()
                .map(|raw| normalizer::normalize_group(flavor, raw))
                .collect(),
            Err(e) => Err(e),
        };

        self.settle(result, &operation).await
    }

    pub async fn publish_user_action(
        &mut self,
        template_id: &str,
        template_data: &Value,
        target_ids: &[String],
    ) -> Result<PublishOutcome> {
        let operation = PendingOperation::PublishUserAction {
            template_id: template_id.to_string(),
            template_data: template_data.clone(),
            target_ids: target_ids.to_vec(),
        };
        let live = self.prepare(&operation).await?;

        let result = ProviderClient::new(&self.provider, &live)
            .publish_user_action(template_id, template_data, target_ids)
            .await;

        self.settle(result, &operation).await
    }

    pub async fn send_notifications(
        &mut self,
        ids: &[String],
        text: &str,
        kind: &str,
    ) -> Result<DeliveryReceipt> {
        let operation = PendingOperation::SendNotifications {
            ids: ids.to_vec(),
            text: text.to_string(),
            kind: kind.to_string(),
        };
        let live = self.prepare(&operation).await?;

        let result = ProviderClient::new(&self.provider, &live)
            .send_notifications(ids, text, kind)
            .await;

        self.settle(result, &operation).await
    }

    /// Run an operation by value.
    pub async fn execute(&mut self, operation: PendingOperation) -> Result<OperationOutput> {
        match operation {
            PendingOperation::SyncAccount => self.sync_account().await.map(OperationOutput::Synced),
            PendingOperation::GetProfile => self.get_profile().await.map(OperationOutput::Profile),
            PendingOperation::GetFriends { view } => {
                self.get_friends(view).await.map(OperationOutput::Friends)
            }
            PendingOperation::GetGroups => self.get_groups().await.map(OperationOutput::Groups),
            PendingOperation::PublishUserAction {
                template_id,
                template_data,
                target_ids,
            } => self
                .publish_user_action(&template_id, &template_data, &target_ids)
                .await
                .map(OperationOutput::Published),
            PendingOperation::SendNotifications { ids, text, kind } => self
                .send_notifications(&ids, &text, &kind)
                .await
                .map(OperationOutput::Notified),
        }
    }

    /// Replay a continuation issued by this user against this provider.
    pub async fn resume(&mut self, continuation: PendingContinuation) -> Result<OperationOutput> {
        if continuation.user_id != self.user_id || continuation.target_provider != self.provider.id
        {
            return Err(AppError::BadRequest(
                "Continuation does not belong to this session".to_string(),
            ));
        }

        tracing::info!(
            user_id = %self.user_id,
            provider_id = %self.provider.id,
            operation = continuation.resume_operation(),
            "Resuming operation"
        );

        self.execute(continuation.operation).await
    }

    /// After-login step: link or update the credential from a freshly
    /// authenticated client and bind it to this context.
    pub async fn complete_authentication(&mut self, live: LiveClient) -> Result<Credential> {
        let operation = PendingOperation::SyncAccount;
        self.reload_provider().await?;

        if live.flavor() != self.provider.flavor() {
            return Err(AppError::BadRequest(format!(
                "Client does not match provider {}",
                self.provider.id
            )));
        }

        let remote_id = match live.resolve_remote_id(&self.provider).await {
            Ok(remote_id) => remote_id,
            Err(AppError::ProviderAuth(_)) => {
                self.live = None;
                return Err(self.redirect(&operation));
            }
            Err(e) => return Err(e),
        };

        let linked = self
            .services
            .accounts
            .link(
                &self.user_id,
                &self.provider,
                &remote_id,
                live.token_material(),
            )
            .await;

        match linked {
            Ok(credential) => {
                self.live = Some(live);
                self.transition(ContextState::Live, &operation);
                Ok(credential)
            }
            Err(e) => {
                self.live = None;
                Err(e)
            }
        }
    }
}

/// Per-user context reuse across the requests of one interaction.
///
/// A checked-out context is removed from the store, so two concurrent
/// requests never hold the same one. Contexts idle for longer than the
/// store's TTL are dropped together with their live clients.
#[derive(Clone)]
pub struct ContextStore {
    contexts: Arc<DashMap<UserId, CachedContext>>,
    ttl_secs: i64,
}

struct CachedContext {
    context: SessionContext,
    /// Unix seconds of the last checkin
    last_used: i64,
}

impl ContextStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            contexts: Arc::new(DashMap::new()),
            ttl_secs,
        }
    }

    /// Take the user's context for `provider_id`, opening a fresh one if the
    /// cached context is missing, idle too long or bound to another provider.
    pub async fn checkout(
        &self,
        services: &Arc<SocialServices>,
        user_id: &str,
        provider_id: &str,
    ) -> Result<SessionContext> {
        self.evict_idle(now_unix());

        if let Some((_, cached)) = self.contexts.remove(user_id) {
            if cached.context.provider_id() == provider_id {
                return Ok(cached.context);
            }
            tracing::debug!(
                user_id,
                from = cached.context.provider_id(),
                to = provider_id,
                "Replacing session context"
            );
        }

        SessionContext::open(services.clone(), user_id, provider_id).await
    }

    pub fn checkin(&self, context: SessionContext) {
        self.contexts.insert(
            context.user_id.clone(),
            CachedContext {
                context,
                last_used: now_unix(),
            },
        );
    }

    /// Drop contexts last checked in `ttl_secs` or more before `now`.
    /// Returns how many were dropped.
    pub fn evict_idle(&self, now: i64) -> usize {
        let before = self.contexts.len();
        self.contexts
            .retain(|_, cached| now - cached.last_used < self.ttl_secs);
        let evicted = before.saturating_sub(self.contexts.len());

        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle session contexts");
        }
        evicted
    }

    /// Drop the cached context of `user_id` if it is bound to `provider_id`.
    pub fn discard(&self, user_id: &str, provider_id: &str) {
        self.contexts
            .remove_if(user_id, |_, cached| cached.context.provider_id() == provider_id);
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
