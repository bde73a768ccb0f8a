// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-token value type with self-described expiry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Current time as epoch seconds.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// An access token together with the expiry parsed out of it.
///
/// Constructed fresh whenever a new raw token string is obtained and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    raw: String,
    expires_at: u64,
}

impl TokenData {
    /// Parse a raw JWT access token, reading the `exp` claim for expiry.
    pub fn parse(raw: impl Into<String>) -> anyhow::Result<Self> {
        let raw = raw.into();
        let expires_at = decode_exp(&raw)?;
        Ok(Self { raw, expires_at })
    }

    /// The raw token string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Expiry as epoch seconds.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Whether the token has expired as of now.
    pub fn is_expired(&self) -> bool {
        epoch_secs() >= self.expires_at
    }

    /// Remaining lifetime, zero once expired.
    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.expires_at.saturating_sub(epoch_secs()))
    }
}

/// Read the `exp` claim from a JWT payload without verifying the
/// signature. Signature and claims validation belong to the external
/// OIDC collaborator; the manager only needs the expiry.
fn decode_exp(raw: &str) -> anyhow::Result<u64> {
    let payload = raw
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("access token is not a JWT"))?;
    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes)?;
    claims
        .get("exp")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| anyhow::anyhow!("access token has no numeric exp claim"))
}

/// Build an unsigned JWT with the given expiry.
#[cfg(test)]
pub(crate) fn forge_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload =
        URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp, "sub": "tester" }).to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
