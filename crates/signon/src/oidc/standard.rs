// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundled reqwest-based OIDC exchange client.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConnectionDetails;
use crate::oidc::{pkce, LoginRequest, LoginState, OidcClient, TokenResponse};

/// Authorization-code + PKCE client speaking plain OAuth2 endpoints.
pub struct StandardOidcClient {
    http: reqwest::Client,
}

impl StandardOidcClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for StandardOidcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OidcClient for StandardOidcClient {
    async fn prepare_login(
        &self,
        details: &ConnectionDetails,
        extra: &[(String, String)],
    ) -> anyhow::Result<LoginRequest> {
        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::compute_code_challenge(&code_verifier);
        let state = pkce::generate_state();

        let authorization_url = pkce::build_auth_url(
            &details.auth_url,
            &details.client_id,
            &details.redirect_uri,
            &details.scope,
            &code_challenge,
            &state,
            extra,
        );

        Ok(LoginRequest {
            authorization_url,
            state: LoginState {
                state,
                code_verifier,
                redirect_uri: details.redirect_uri.clone(),
                token_url: details.token_url.clone(),
                client_id: details.client_id.clone(),
            },
        })
    }

    async fn process_login_response(
        &self,
        payload: &str,
        login: &LoginState,
    ) -> anyhow::Result<TokenResponse> {
        let returned_state = query_param(payload, "state")
            .ok_or_else(|| anyhow::anyhow!("redirect payload has no state parameter"))?;
        if returned_state != login.state {
            anyhow::bail!("redirect state does not match the login request");
        }
        if let Some(err) = query_param(payload, "error") {
            anyhow::bail!("authorization server returned error: {err}");
        }
        let code = query_param(payload, "code")
            .ok_or_else(|| anyhow::anyhow!("redirect payload has no authorization code"))?;

        let resp = self
            .http
            .post(&login.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", login.client_id.as_str()),
                ("code", code.as_str()),
                ("redirect_uri", login.redirect_uri.as_str()),
                ("code_verifier", login.code_verifier.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("token exchange failed ({status}): {text}");
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }

    async fn refresh(
        &self,
        details: &ConnectionDetails,
        refresh_token: &str,
    ) -> anyhow::Result<TokenResponse> {
        let resp = self
            .http
            .post(&details.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", details.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("refresh failed ({status}): {text}");
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token)
    }
}

/// Extract and percent-decode one parameter from a raw query/form payload.
fn query_param(payload: &str, key: &str) -> Option<String> {
    payload
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| percent_decode(v))
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
#[path = "standard_tests.rs"]
mod tests;
