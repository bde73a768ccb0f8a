// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-name connection configuration and manager options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity-server connection parameters for one token name.
///
/// Registered via `TokenManager::add_server_details`; re-registering
/// under the same name replaces the details wholesale (last write wins,
/// no merge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDetails {
    /// Authorization endpoint URL.
    pub auth_url: String,
    /// Token endpoint URL.
    pub token_url: String,
    /// OAuth client identifier.
    pub client_id: String,
    /// Loopback redirect URI the local receiver binds to.
    pub redirect_uri: String,
    /// Requested scopes, space separated.
    pub scope: String,
    /// Whether a successful refresh grant overwrites the stored refresh token.
    #[serde(default)]
    pub replace_refresh_token: bool,
    /// HTML shown in the browser after interactive sign-in completes.
    /// Falls back to a built-in "please return to the app" page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_in_html: Option<String>,
}

/// Tunable manager behavior.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// How far before expiry a token is renewed. Adjustable at runtime
    /// via `TokenManager::setup_refresh_time_span`.
    pub refresh_time_span: Duration,
    /// How long an interactive sign-in waits for the browser redirect
    /// before the attempt is abandoned.
    pub signin_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            refresh_time_span: Duration::from_secs(300),
            signin_timeout: Duration::from_secs(300),
        }
    }
}
