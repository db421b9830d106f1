// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote platform configuration.
//!
//! A provider is either a token-session platform (single session key issued
//! after a login redirect) or an OAuth platform (token + secret pair issued by
//! a consent flow). Variant-specific settings live inside [`ProviderKind`].

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Provider identifier (also used as document ID).
pub type ProviderId = String;

/// Tasks a provider may support. Capability checks are keyed by these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    People,
    Groups,
    ActivitiesPush,
    ActivitiesPull,
    Notifications,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::People => "people",
            Task::Groups => "groups",
            Task::ActivitiesPush => "activities_push",
            Task::ActivitiesPull => "activities_pull",
            Task::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "people" => Ok(Task::People),
            "groups" => Ok(Task::Groups),
            "activities_push" => Ok(Task::ActivitiesPush),
            "activities_pull" => Ok(Task::ActivitiesPull),
            "notifications" => Ok(Task::Notifications),
            other => Err(format!("unknown task: {}", other)),
        }
    }
}

/// Capability flags declared by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub people: bool,
    #[serde(default)]
    pub groups: bool,
    #[serde(default)]
    pub activities_push: bool,
    #[serde(default)]
    pub activities_pull: bool,
    #[serde(default)]
    pub notifications: bool,
}

impl Capabilities {
    pub fn supports(&self, task: Task) -> bool {
        match task {
            Task::People => self.people,
            Task::Groups => self.groups,
            Task::ActivitiesPush => self.activities_push,
            Task::ActivitiesPull => self.activities_pull,
            Task::Notifications => self.notifications,
        }
    }
}

/// Canonical profile fields understood by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Id,
    DisplayName,
    ProfileUrl,
    Birthday,
    Gender,
    AboutMe,
    Emails,
    Address,
    Photo,
    WorkHistory,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 10] = [
        CanonicalField::Id,
        CanonicalField::DisplayName,
        CanonicalField::ProfileUrl,
        CanonicalField::Birthday,
        CanonicalField::Gender,
        CanonicalField::AboutMe,
        CanonicalField::Emails,
        CanonicalField::Address,
        CanonicalField::Photo,
        CanonicalField::WorkHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Id => "id",
            CanonicalField::DisplayName => "displayName",
            CanonicalField::ProfileUrl => "profileUrl",
            CanonicalField::Birthday => "birthday",
            CanonicalField::Gender => "gender",
            CanonicalField::AboutMe => "aboutMe",
            CanonicalField::Emails => "emails",
            CanonicalField::Address => "address",
            CanonicalField::Photo => "photo",
            CanonicalField::WorkHistory => "workHistory",
        }
    }
}

/// Which family of provider a record belongs to, without its settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFlavor {
    TokenSession,
    OAuth,
}

/// Translation from canonical field names to provider-native names.
///
/// Always holds an entry for every canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap(BTreeMap<CanonicalField, String>);

impl FieldMap {
    /// Default native names for a provider flavor.
    pub fn defaults(flavor: ProviderFlavor) -> Self {
        let names: [&str; 10] = match flavor {
            ProviderFlavor::TokenSession => [
                "uid",
                "name",
                "profile_url",
                "birthday",
                "sex",
                "about_me",
                "email_hashes",
                "current_location",
                "pic",
                "work_history",
            ],
            ProviderFlavor::OAuth => [
                "id",
                "displayName",
                "profileUrl",
                "birthday",
                "gender",
                "aboutMe",
                "emails",
                "addresses",
                "thumbnailUrl",
                "organizations",
            ],
        };

        Self(
            CanonicalField::ALL
                .iter()
                .zip(names)
                .map(|(field, name)| (*field, name.to_string()))
                .collect(),
        )
    }

    /// Apply non-empty overrides on top of this map.
    pub fn with_overrides(mut self, overrides: &HashMap<CanonicalField, String>) -> Self {
        for (field, name) in overrides {
            let name = name.trim();
            if !name.is_empty() {
                self.0.insert(*field, name.to_string());
            }
        }
        self
    }

    /// Native name for a canonical field.
    pub fn native(&self, field: CanonicalField) -> &str {
        self.0.get(&field).map(String::as_str).unwrap_or(field.as_str())
    }

    /// All native names, in canonical order. This is the field list sent to providers.
    pub fn native_fields(&self) -> Vec<String> {
        CanonicalField::ALL
            .iter()
            .map(|f| self.native(*f).to_string())
            .collect()
    }
}

/// Provider error codes that need special handling.
///
/// These depend on the remote API version, so they are configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCodes {
    /// Codes meaning the session or token is invalid/expired.
    pub auth: Vec<i64>,
    /// Codes meaning a publish was rejected by a feed/rate limit.
    pub suppressed: Vec<i64>,
}

impl ErrorCodes {
    pub fn defaults(flavor: ProviderFlavor) -> Self {
        match flavor {
            ProviderFlavor::TokenSession => Self {
                auth: vec![101, 102],
                suppressed: vec![340, 341],
            },
            ProviderFlavor::OAuth => Self {
                auth: vec![100],
                suppressed: vec![],
            },
        }
    }
}

/// How a provider error should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    Transient,
    Other,
}

/// OAuth request signing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureMethod {
    HmacSha1,
    Plaintext,
}

/// Settings for a token-session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSessionSettings {
    /// Where the end user is sent to log in
    pub login_url: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_api_version() -> String {
    "1.0".to_string()
}

/// Settings for an OAuth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSettings {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub request_token_url: String,
    pub authorization_url: String,
    pub access_token_url: String,
    /// Lifetime of an access token in seconds
    pub token_validity_secs: i64,
    pub signature_method: SignatureMethod,
}

/// Variant tag plus variant-specific settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    TokenSession(TokenSessionSettings),
    #[serde(rename = "oauth")]
    OAuth(OAuthSettings),
}

impl ProviderKind {
    pub fn flavor(&self) -> ProviderFlavor {
        match self {
            ProviderKind::TokenSession(_) => ProviderFlavor::TokenSession,
            ProviderKind::OAuth(_) => ProviderFlavor::OAuth,
        }
    }
}

/// A configured remote social platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    /// Entry point of the provider REST API
    pub api_url: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub capabilities: Capabilities,
    #[serde(flatten)]
    pub kind: ProviderKind,
    pub fields: FieldMap,
    pub error_codes: ErrorCodes,
}

fn default_active() -> bool {
    true
}

impl Provider {
    /// Build a provider with the default field map and error codes for its flavor.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_url: impl Into<String>,
        capabilities: Capabilities,
        kind: ProviderKind,
    ) -> Self {
        let flavor = kind.flavor();
        Self {
            id: id.into(),
            name: name.into(),
            api_url: api_url.into(),
            is_active: true,
            capabilities,
            kind,
            fields: FieldMap::defaults(flavor),
            error_codes: ErrorCodes::defaults(flavor),
        }
    }

    pub fn flavor(&self) -> ProviderFlavor {
        self.kind.flavor()
    }

    pub fn supports(&self, task: Task) -> bool {
        self.capabilities.supports(task)
    }

    /// URL the end user must visit to log in / grant consent.
    ///
    /// `next` is where the provider should send the user back to.
    pub fn login_url(&self, next: &str) -> String {
        match &self.kind {
            ProviderKind::TokenSession(settings) => format!(
                "{}?api_key={}&v={}&next={}",
                settings.login_url,
                urlencoding::encode(&settings.api_key),
                urlencoding::encode(&settings.api_version),
                urlencoding::encode(next)
            ),
            ProviderKind::OAuth(settings) => format!(
                "{}?oauth_callback={}",
                settings.authorization_url,
                urlencoding::encode(next)
            ),
        }
    }

    /// Classify a provider error using this provider's configured codes.
    pub fn classify(&self, err: &ProviderError) -> ErrorClass {
        match err.code {
            Some(code) if self.error_codes.auth.contains(&code) => ErrorClass::Auth,
            Some(code) if self.error_codes.suppressed.contains(&code) => ErrorClass::Transient,
            _ => ErrorClass::Other,
        }
    }
}
