// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canonical profile and group entities.
//!
//! These are built fresh from provider responses on every call and are never
//! persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider-native attribute bag, keyed by native field name.
pub type RawAttributes = serde_json::Map<String, Value>;

/// Normalized gender. `X` means unknown or unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    M,
    F,
    X,
}

/// Birthday as a calendar date, or the provider's raw string when it
/// could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Birthday {
    Date(NaiveDate),
    Raw(String),
}

impl Birthday {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Birthday::Date(date) => Some(*date),
            Birthday::Raw(_) => None,
        }
    }
}

/// Canonical person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub given_name: String,
    pub family_name: String,
    pub profile_url: Option<String>,
    pub birthday: Option<Birthday>,
    pub gender: Gender,
    pub about_me: Option<String>,
    pub emails: Option<Value>,
    pub address: Option<Value>,
    pub photo: Option<String>,
    pub work_history: Option<Value>,
}

/// Canonical group record. Unmapped attributes are kept as returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: Option<String>,
    pub attributes: RawAttributes,
}
