// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::models::{PendingContinuation, Task};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error reported by an injected provider wire client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code:?})")]
pub struct ProviderError {
    /// Provider-native error code, when the provider reports one
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Provider {provider} does not support {task}")]
    UnsupportedOperation { provider: String, task: Task },

    /// Not a failure: the end user must authenticate with the provider first.
    #[error("Authentication with provider {} required to {}", .0.target_provider, .0.resume_operation())]
    NeedsRedirect(Box<PendingContinuation>),

    #[error("The {provider} account you are logged into is not your linked account")]
    IdentityMismatch {
        provider: String,
        expected: String,
        actual: String,
    },

    #[error("{provider} account already linked to another user")]
    AccountAlreadyLinked {
        provider: String,
        remote_id: String,
        existing_owner: String,
    },

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Session/token rejected by the provider. Handled inside the session layer.
    #[error("Provider rejected session: {0}")]
    ProviderAuth(ProviderError),

    #[error("Provider limit reached: {0}")]
    ProviderTransient(ProviderError),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for provider errors meaning the session/token is no longer usable.
    pub fn is_provider_auth_error(&self) -> bool {
        matches!(self, AppError::ProviderAuth(_))
    }

    /// The pending continuation, if this is a redirect signal.
    pub fn continuation(&self) -> Option<&PendingContinuation> {
        match self {
            AppError::NeedsRedirect(continuation) => Some(&**continuation),
            _ => None,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::UnsupportedOperation { .. } => (
                StatusCode::BAD_REQUEST,
                "unsupported_operation",
                Some(self.to_string()),
            ),
            AppError::NeedsRedirect(_) => (
                StatusCode::UNAUTHORIZED,
                "redirect_required",
                Some(self.to_string()),
            ),
            AppError::IdentityMismatch { .. } => (
                StatusCode::CONFLICT,
                "identity_mismatch",
                Some(format!("{}. Please log out of it and try again.", self)),
            ),
            AppError::AccountAlreadyLinked { .. } => (
                StatusCode::CONFLICT,
                "account_already_linked",
                Some(self.to_string()),
            ),
            AppError::MissingRequiredField(_) => {
                tracing::warn!(error = %self, "Malformed provider data");
                (
                    StatusCode::BAD_GATEWAY,
                    "malformed_provider_data",
                    Some(self.to_string()),
                )
            }
            AppError::ProviderAuth(_) => (StatusCode::UNAUTHORIZED, "provider_session_invalid", None),
            AppError::ProviderTransient(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "provider_limit",
                Some(err.to_string()),
            ),
            AppError::Provider(err) => (
                StatusCode::BAD_GATEWAY,
                "provider_error",
                Some(err.to_string()),
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
