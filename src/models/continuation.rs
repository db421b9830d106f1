// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed redirect continuations.
//!
//! When an operation cannot proceed until the end user has visited the
//! provider's login/consent page, the session layer returns a
//! [`PendingContinuation`] instead of performing any provider call. The caller
//! keeps it across the external round trip and replays it afterwards.

use crate::models::credential::UserId;
use crate::models::provider::{ProviderId, Task};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which friends representation the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendsView {
    /// Remote ids only
    Ids,
    /// Normalized profiles
    #[default]
    Profiles,
    /// Local accounts linked to the friends' remote ids
    Matched,
}

/// Default notification type.
pub const USER_TO_USER: &str = "user_to_user";

fn default_notification_kind() -> String {
    USER_TO_USER.to_string()
}

/// An operation together with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum PendingOperation {
    SyncAccount,
    GetProfile,
    GetFriends {
        view: FriendsView,
    },
    GetGroups,
    PublishUserAction {
        template_id: String,
        #[serde(default)]
        template_data: Value,
        #[serde(default)]
        target_ids: Vec<String>,
    },
    SendNotifications {
        ids: Vec<String>,
        text: String,
        #[serde(default = "default_notification_kind")]
        kind: String,
    },
}

impl PendingOperation {
    /// Operation name as exposed to callers.
    pub fn name(&self) -> &'static str {
        match self {
            PendingOperation::SyncAccount => "syncAccount",
            PendingOperation::GetProfile => "getProfile",
            PendingOperation::GetFriends { .. } => "getFriends",
            PendingOperation::GetGroups => "getGroups",
            PendingOperation::PublishUserAction { .. } => "publishUserAction",
            PendingOperation::SendNotifications { .. } => "sendNotifications",
        }
    }

    /// Capability required by this operation, if any.
    pub fn task(&self) -> Option<Task> {
        match self {
            PendingOperation::SyncAccount => None,
            PendingOperation::GetProfile | PendingOperation::GetFriends { .. } => {
                Some(Task::People)
            }
            PendingOperation::GetGroups => Some(Task::Groups),
            PendingOperation::PublishUserAction { .. } => Some(Task::ActivitiesPush),
            PendingOperation::SendNotifications { .. } => Some(Task::Notifications),
        }
    }
}

/// Payload of a redirect signal: what to resume, for whom, against which provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingContinuation {
    pub target_provider: ProviderId,
    pub user_id: UserId,
    #[serde(flatten)]
    pub operation: PendingOperation,
    /// Unix seconds
    pub created_at: i64,
}

impl PendingContinuation {
    pub fn new(
        target_provider: impl Into<String>,
        user_id: impl Into<String>,
        operation: PendingOperation,
    ) -> Self {
        Self {
            target_provider: target_provider.into(),
            user_id: user_id.into(),
            operation,
            created_at: crate::time_utils::now_unix(),
        }
    }

    pub fn resume_operation(&self) -> &'static str {
        self.operation.name()
    }

    pub fn is_expired(&self, ttl_secs: i64, now: i64) -> bool {
        now - self.created_at > ttl_secs
    }
}
