// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OIDC exchange collaborator: trait seam plus wire types.

pub mod pkce;
pub mod standard;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConnectionDetails;

pub use standard::StandardOidcClient;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// A prepared interactive login: where to send the user, plus the
/// verification state needed later to process the redirect payload.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub authorization_url: String,
    pub state: LoginState,
}

/// Internal verification state for one in-flight authorization-code flow.
#[derive(Debug, Clone)]
pub struct LoginState {
    pub state: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub token_url: String,
    pub client_id: String,
}

/// External OIDC protocol collaborator.
///
/// Implementations own the wire exchange (authorization request
/// construction, code-for-token exchange, refresh grant); the manager
/// only sequences calls. Failures degrade to the next acquisition
/// strategy, they are never surfaced to the manager's caller directly.
#[async_trait]
pub trait OidcClient: Send + Sync {
    /// Prepare an interactive login request for `details`, carrying any
    /// caller-supplied extra query parameters.
    async fn prepare_login(
        &self,
        details: &ConnectionDetails,
        extra: &[(String, String)],
    ) -> anyhow::Result<LoginRequest>;

    /// Exchange a captured redirect payload (query string for a GET
    /// redirect, form body for a POST one) for tokens, verifying it
    /// against `state`.
    async fn process_login_response(
        &self,
        payload: &str,
        state: &LoginState,
    ) -> anyhow::Result<TokenResponse>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(
        &self,
        details: &ConnectionDetails,
        refresh_token: &str,
    ) -> anyhow::Result<TokenResponse>;
}
