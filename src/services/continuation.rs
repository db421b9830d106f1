// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sealed redirect continuations.
//!
//! A continuation leaves the process while the end user is away at the
//! provider's login page, so it is handed out as an opaque token:
//! `base64url(json) "." hex(hmac_sha256(json))`.

use crate::error::{AppError, Result};
use crate::models::PendingContinuation;
use crate::time_utils::now_unix;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies continuation tokens.
#[derive(Clone)]
pub struct ContinuationSigner {
    key: Vec<u8>,
    ttl_secs: i64,
}

impl ContinuationSigner {
    pub fn new(key: impl Into<Vec<u8>>, ttl_secs: i64) -> Self {
        Self {
            key: key.into(),
            ttl_secs,
        }
    }

    fn mac(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid continuation key: {}", e)))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    pub fn seal(&self, continuation: &PendingContinuation) -> Result<String> {
        let payload = serde_json::to_vec(continuation)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Serialize continuation: {}", e)))?;
        let signature = self.mac(&payload)?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            hex::encode(signature)
        ))
    }

    /// Verify and decode a sealed continuation.
    pub fn open(&self, sealed: &str) -> Result<PendingContinuation> {
        self.open_at(sealed, now_unix())
    }

    pub fn open_at(&self, sealed: &str, now: i64) -> Result<PendingContinuation> {
        let invalid = || AppError::BadRequest("Invalid continuation".to_string());

        let (encoded, signature_hex) = sealed.split_once('.').ok_or_else(invalid)?;
        let payload = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
        let signature = hex::decode(signature_hex).map_err(|_| invalid())?;

        let expected = self.mac(&payload)?;
        if !bool::from(expected.as_slice().ct_eq(signature.as_slice())) {
            tracing::warn!("Continuation signature mismatch");
            return Err(invalid());
        }

        let continuation: PendingContinuation =
            serde_json::from_slice(&payload).map_err(|_| invalid())?;

        if continuation.is_expired(self.ttl_secs, now) {
            return Err(AppError::BadRequest("Continuation expired".to_string()));
        }

        Ok(continuation)
    }
}
