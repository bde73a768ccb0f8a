// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end token lifecycle tests.
//!
//! Runs a stub OIDC identity server over loopback HTTP and provides
//! browser stand-ins that complete (or ignore) the interactive
//! authorization-code flow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio_util::sync::CancellationToken;

use signon::launch::UserAgent;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls and a tracing
/// subscriber honoring `RUST_LOG`. Safe to call multiple times; only
/// the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Current time as epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Build an unsigned JWT with the given expiry.
pub fn forge_jwt(exp: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload =
        URL_SAFE_NO_PAD.encode(serde_json::json!({ "exp": exp, "sub": "tester" }).to_string());
    format!("{header}.{payload}.sig")
}

/// Extract and percent-decode one parameter from a query or form payload.
pub fn query_value(input: &str, key: &str) -> Option<String> {
    let query = input.split_once('?').map(|(_, q)| q).unwrap_or(input);
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| percent_decode(v))
}

pub fn percent_decode(s: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
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

/// What the stub identity server hands out.
pub struct IdpBehavior {
    /// Access token returned by every successful grant.
    pub access_token: String,
    /// Refresh token included in successful grant responses.
    pub refresh_token: Option<String>,
    /// Whether refresh grants succeed. Code exchanges always succeed
    /// as long as the request is well formed.
    pub accept_refresh: bool,
}

struct StubState {
    behavior: IdpBehavior,
    refresh_requests: AtomicUsize,
    code_requests: AtomicUsize,
}

/// A loopback identity server speaking just enough OAuth2 for the
/// lifecycle tests: a single `POST /token` endpoint handling the
/// `refresh_token` and `authorization_code` grants.
pub struct StubIdp {
    auth_url: String,
    token_url: String,
    state: Arc<StubState>,
    shutdown: CancellationToken,
}

impl StubIdp {
    pub async fn start(behavior: IdpBehavior) -> anyhow::Result<Self> {
        ensure_crypto();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(StubState {
            behavior,
            refresh_requests: AtomicUsize::new(0),
            code_requests: AtomicUsize::new(0),
        });
        let app = Router::new().route("/token", post(token_grant)).with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned())
                .await;
        });

        Ok(Self {
            auth_url: format!("http://{addr}/authorize"),
            token_url: format!("http://{addr}/token"),
            state,
            shutdown,
        })
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn refresh_requests(&self) -> usize {
        self.state.refresh_requests.load(Ordering::SeqCst)
    }

    pub fn code_requests(&self) -> usize {
        self.state.code_requests.load(Ordering::SeqCst)
    }
}

impl Drop for StubIdp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn token_grant(
    State(state): State<Arc<StubState>>,
    body: String,
) -> (StatusCode, Json<serde_json::Value>) {
    let grant_type = query_value(&body, "grant_type").unwrap_or_default();
    match grant_type.as_str() {
        "refresh_token" => {
            state.refresh_requests.fetch_add(1, Ordering::SeqCst);
            if !state.behavior.accept_refresh || query_value(&body, "refresh_token").is_none() {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "invalid_grant" })),
                );
            }
            (StatusCode::OK, Json(grant_response(&state.behavior)))
        }
        "authorization_code" => {
            state.code_requests.fetch_add(1, Ordering::SeqCst);
            if query_value(&body, "code").is_none() || query_value(&body, "code_verifier").is_none()
            {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "invalid_request" })),
                );
            }
            (StatusCode::OK, Json(grant_response(&state.behavior)))
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unsupported_grant_type" })),
        ),
    }
}

fn grant_response(behavior: &IdpBehavior) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": behavior.access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(ref refresh_token) = behavior.refresh_token {
        body["refresh_token"] = serde_json::Value::String(refresh_token.clone());
    }
    body
}

/// Browser stand-in that "signs the user in" by following the redirect
/// URI out of the real authorization URL and hitting it with a code.
pub struct RedirectBrowser;

impl UserAgent for RedirectBrowser {
    fn launch(&self, url: &str) {
        let Some(redirect_uri) = query_value(url, "redirect_uri") else {
            return;
        };
        let Some(state) = query_value(url, "state") else {
            return;
        };
        tokio::spawn(async move {
            let Some(rest) = redirect_uri.strip_prefix("http://") else {
                return;
            };
            let (authority, path) = match rest.split_once('/') {
                Some((authority, path)) => (authority.to_owned(), format!("/{path}")),
                None => (rest.to_owned(), "/".to_owned()),
            };
            for _ in 0..20 {
                if let Ok(mut stream) = tokio::net::TcpStream::connect(&authority).await {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let request = format!(
                        "GET {path}?code=stub-code&state={state} HTTP/1.1\r\nHost: {authority}\r\nConnection: close\r\n\r\n"
                    );
                    let _ = stream.write_all(request.as_bytes()).await;
                    let _ = stream.flush().await;
                    // Read the response before closing; dropping the
                    // socket immediately can make the server discard
                    // the not-yet-processed request.
                    let mut response = Vec::new();
                    let _ = stream.read_to_end(&mut response).await;
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        });
    }
}

/// Browser stand-in that never completes a sign-in.
pub struct NoBrowser;

impl UserAgent for NoBrowser {
    fn launch(&self, _url: &str) {}
}
