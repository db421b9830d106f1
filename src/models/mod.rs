// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod continuation;
pub mod credential;
pub mod profile;
pub mod provider;

pub use continuation::{FriendsView, PendingContinuation, PendingOperation, USER_TO_USER};
pub use credential::{Credential, LinkedAccount, TokenMaterial, UserId};
pub use profile::{Birthday, Gender, Group, Profile, RawAttributes};
pub use provider::{
    Capabilities, CanonicalField, ErrorClass, ErrorCodes, FieldMap, OAuthSettings, Provider,
    ProviderFlavor, ProviderId, ProviderKind, SignatureMethod, Task, TokenSessionSettings,
};
