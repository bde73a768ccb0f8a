// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local redirect receiver for the interactive sign-in flow.
//!
//! Binds a short-lived loopback HTTP endpoint at the connection's
//! redirect URI, delivers the first callback payload (query string for
//! a GET redirect, body for a POST one), answers the browser with a
//! landing page, and shuts down gracefully when stopped.

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::Method;
use axum::response::Html;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shown to the user when no custom landing page is configured.
pub const DEFAULT_LANDING_HTML: &str =
    "<html><body><p>Sign-in complete. Please return to the application.</p></body></html>";

struct ListenerState {
    payload_tx: mpsc::Sender<String>,
    landing_html: String,
}

/// A bound one-shot redirect receiver.
pub struct RedirectListener {
    payload_rx: mpsc::Receiver<String>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RedirectListener {
    /// Bind the receiver at `redirect_uri`. Bind failure is fatal for
    /// the sign-in attempt.
    pub async fn bind(redirect_uri: &str, landing_html: Option<String>) -> anyhow::Result<Self> {
        let (addr, path) = parse_redirect_uri(redirect_uri)?;
        let listener = TcpListener::bind(&addr).await?;

        let (payload_tx, payload_rx) = mpsc::channel(1);
        let state = Arc::new(ListenerState {
            payload_tx,
            landing_html: landing_html.unwrap_or_else(|| DEFAULT_LANDING_HTML.to_owned()),
        });

        let router = Router::new().route(&path, any(capture_callback)).with_state(state);

        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned())
                .await
            {
                tracing::warn!(err = %e, "redirect listener terminated abnormally");
            }
        });

        Ok(Self { payload_rx, shutdown, task })
    }

    /// Await the single inbound callback payload.
    pub async fn recv(&mut self, timeout: std::time::Duration) -> anyhow::Result<String> {
        match tokio::time::timeout(timeout, self.payload_rx.recv()).await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => anyhow::bail!("redirect listener closed before a callback arrived"),
            Err(_) => anyhow::bail!("timed out waiting for the sign-in redirect"),
        }
    }

    /// Stop serving and join the server task.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

/// Capture the redirect payload and answer with the landing page.
/// Only the first payload is delivered; later requests still get the
/// page but are otherwise ignored.
async fn capture_callback(
    State(state): State<Arc<ListenerState>>,
    method: Method,
    RawQuery(query): RawQuery,
    body: String,
) -> Html<String> {
    let payload = if method == Method::POST { body } else { query.unwrap_or_default() };
    let _ = state.payload_tx.try_send(payload);
    Html(state.landing_html.clone())
}

/// Split a redirect URI into a bindable `host:port` and a route path.
fn parse_redirect_uri(uri: &str) -> anyhow::Result<(String, String)> {
    let rest = uri.strip_prefix("http://").ok_or_else(|| {
        anyhow::anyhow!("redirect URI must be an http:// loopback address: {uri}")
    })?;
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, "/".to_owned()),
    };
    if authority.is_empty() {
        anyhow::bail!("redirect URI has no host: {uri}");
    }
    let addr =
        if authority.contains(':') { authority.to_owned() } else { format!("{authority}:80") };
    Ok((addr, path))
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
