// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Social API routes for authenticated users.
//!
//! A call that needs the user to log in at the provider answers
//! `303 See Other` with the provider login URL and a sealed continuation.
//! The caller posts the continuation back to `/callback` together with the
//! token material it obtained, and the original operation is replayed.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{
    Capabilities, FriendsView, LinkedAccount, PendingContinuation, ProviderFlavor, ProviderKind,
    Task, TokenMaterial, USER_TO_USER,
};
use crate::services::{LiveClient, OperationOutput, SessionContext};
use crate::time_utils::now_unix;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Social routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/platforms", get(list_platforms))
        .route("/api/accounts", get(list_accounts))
        .route("/api/social/{provider}", delete(unlink))
        .route("/api/social/{provider}/sync", post(sync_account))
        .route("/api/social/{provider}/profile", get(get_profile))
        .route("/api/social/{provider}/friends", get(get_friends))
        .route("/api/social/{provider}/groups", get(get_groups))
        .route("/api/social/{provider}/publish", post(publish))
        .route("/api/social/{provider}/notifications", post(send_notifications))
        .route("/api/social/{provider}/callback", post(callback))
}

// ─── Responses ───────────────────────────────────────────────

/// Body of a `303 See Other` sent when provider login is required.
#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RedirectResponse {
    pub error: String,
    pub provider: String,
    pub login_url: String,
    pub resume_operation: String,
    /// Opaque token to post back to the callback endpoint
    pub continuation: String,
}

fn redirect_response(state: &AppState, login_url: String, continuation: &PendingContinuation) -> Response {
    let sealed = match state.signer.seal(continuation) {
        Ok(sealed) => sealed,
        Err(e) => return e.into_response(),
    };

    let body = RedirectResponse {
        error: "redirect_required".to_string(),
        provider: continuation.target_provider.clone(),
        login_url: login_url.clone(),
        resume_operation: continuation.resume_operation().to_string(),
        continuation: sealed,
    };

    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, login_url)],
        Json(body),
    )
        .into_response()
}

/// Login URL for the context's provider, pointing back at our callback.
fn login_url(state: &AppState, context: &SessionContext) -> String {
    context
        .provider()
        .login_url(&state.config.callback_url(context.provider_id()))
}

/// Serialize a result, turning `NeedsRedirect` into a redirect response.
fn respond<T: Serialize>(state: &AppState, login_url: String, result: Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(AppError::NeedsRedirect(continuation)) => {
            redirect_response(state, login_url, &continuation)
        }
        Err(e) => e.into_response(),
    }
}

// ─── Platforms & Accounts ────────────────────────────────────

#[derive(Deserialize)]
pub struct PlatformsQuery {
    pub task: Task,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub id: String,
    pub name: String,
    pub kind: ProviderFlavor,
    pub capabilities: Capabilities,
    /// Whether the caller has linked an account on this platform
    pub linked: bool,
}

/// Active platforms supporting a task.
async fn list_platforms(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PlatformsQuery>,
) -> Result<Json<Vec<PlatformSummary>>> {
    let providers = state.services.platforms.list_by_capability(query.task).await?;
    let linked = state
        .services
        .accounts
        .linked_providers(&user.user_id, query.task)
        .await?;

    Ok(Json(
        providers
            .into_iter()
            .map(|p| PlatformSummary {
                linked: linked.iter().any(|l| l.id == p.id),
                kind: p.flavor(),
                capabilities: p.capabilities,
                id: p.id,
                name: p.name,
            })
            .collect(),
    ))
}

async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LinkedAccount>>> {
    Ok(Json(
        state.services.accounts.linked_accounts(&user.user_id).await?,
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlinkResponse {
    pub success: bool,
}

async fn unlink(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
) -> Result<Json<UnlinkResponse>> {
    state.contexts.discard(&user.user_id, &provider_id);

    if !state
        .services
        .accounts
        .unlink(&user.user_id, &provider_id)
        .await?
    {
        return Err(AppError::NotFound(format!("No linked {} account", provider_id)));
    }

    Ok(Json(UnlinkResponse { success: true }))
}

// ─── Session Operations ──────────────────────────────────────

async fn sync_account(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
) -> Result<Response> {
    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;

    let result = context.sync_account().await;
    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
) -> Result<Response> {
    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;

    let result = context.get_profile().await;
    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}

#[derive(Deserialize)]
pub struct FriendsQuery {
    #[serde(default)]
    pub view: FriendsView,
}

async fn get_friends(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
    Query(query): Query<FriendsQuery>,
) -> Result<Response> {
    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;

    let result = context.get_friends(query.view).await;
    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}

async fn get_groups(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
) -> Result<Response> {
    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;

    let result = context.get_groups().await;
    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub template_id: String,
    #[serde(default)]
    pub template_data: Value,
    #[serde(default)]
    pub target_ids: Vec<String>,
}

async fn publish(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
    Json(body): Json<PublishRequest>,
) -> Result<Response> {
    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;

    let result = context
        .publish_user_action(&body.template_id, &body.template_data, &body.target_ids)
        .await;
    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}

#[derive(Debug, Deserialize)]
pub struct NotificationsRequest {
    pub ids: Vec<String>,
    pub text: String,
    #[serde(default)]
    pub kind: Option<String>,
}

async fn send_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
    Json(body): Json<NotificationsRequest>,
) -> Result<Response> {
    if body.ids.is_empty() {
        return Err(AppError::BadRequest("No recipients".to_string()));
    }

    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;

    let kind = body.kind.as_deref().unwrap_or(USER_TO_USER);
    let result = context.send_notifications(&body.ids, &body.text, kind).await;
    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}

// ─── Authentication Callback ─────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    /// Token material obtained from the provider's login/consent exchange
    pub tokens: TokenMaterial,
    /// Remote user id the session was issued for (token-session providers)
    #[serde(default)]
    pub remote_id: Option<String>,
    /// Sealed continuation from the redirect response
    #[serde(default)]
    pub continuation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub account: LinkedAccount,
    /// Output of the replayed operation, when a continuation was given
    pub resumed: Option<OperationOutput>,
}

/// Complete provider authentication and replay the pending operation.
async fn callback(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(provider_id): Path<String>,
    Json(body): Json<CallbackRequest>,
) -> Result<Response> {
    let continuation = body
        .continuation
        .as_deref()
        .map(|sealed| state.signer.open(sealed))
        .transpose()?;

    if let Some(continuation) = &continuation {
        if continuation.user_id != user.user_id || continuation.target_provider != provider_id {
            tracing::warn!(
                user_id = %user.user_id,
                provider_id,
                "Continuation issued for another session"
            );
            return Err(AppError::BadRequest(
                "Continuation does not match this request".to_string(),
            ));
        }
    }

    let mut context = state
        .contexts
        .checkout(&state.services, &user.user_id, &provider_id)
        .await?;
    let provider = context.provider().clone();

    let mut tokens = body.tokens;
    // OAuth access tokens carry no expiry of their own; apply the configured lifetime.
    if let (ProviderKind::OAuth(settings), TokenMaterial::OAuth { expires_at, .. }) =
        (&provider.kind, &mut tokens)
    {
        if *expires_at == 0 && settings.token_validity_secs > 0 {
            *expires_at = now_unix() + settings.token_validity_secs;
        }
    }

    let remote_id = match (provider.flavor(), body.remote_id) {
        (_, Some(remote_id)) => remote_id,
        (ProviderFlavor::OAuth, None) => String::new(),
        (ProviderFlavor::TokenSession, None) => {
            state.contexts.checkin(context);
            return Err(AppError::BadRequest("remote_id is required".to_string()));
        }
    };

    let result: Result<CallbackResponse> = async {
        let live = LiveClient::connect(
            state.services.connector.as_ref(),
            &provider,
            &tokens,
            &remote_id,
        )
        .await?;
        let credential = context.complete_authentication(live).await?;

        let resumed = match continuation {
            Some(continuation) => Some(context.resume(continuation).await?),
            None => None,
        };

        Ok(CallbackResponse {
            account: LinkedAccount::from(&credential),
            resumed,
        })
    }
    .await;

    let login_url = login_url(&state, &context);
    state.contexts.checkin(context);

    Ok(respond(&state, login_url, result))
}
