// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accounts;
pub mod client;
pub mod continuation;
pub mod normalizer;
pub mod session;

pub use accounts::AccountService;
pub use client::{
    ClientConnector, DeliveryReceipt, LiveClient, OAuthApi, ProviderClient, PublishOutcome,
    RawFriends, TokenSessionApi,
};
pub use continuation::ContinuationSigner;
pub use session::{
    ContextState, ContextStore, Friends, OperationOutput, SessionContext, SocialServices,
};
