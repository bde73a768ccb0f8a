// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive authorization-code sign-in orchestration.

use std::time::Duration;

use crate::config::ConnectionDetails;
use crate::launch::UserAgent;
use crate::listener::RedirectListener;
use crate::oidc::{OidcClient, TokenResponse};

/// Run one interactive sign-in for `details`: bind the loopback
/// receiver, prepare the login request, hand the user off to the
/// browser, await the redirect, and exchange the captured payload for
/// tokens.
///
/// The listener is stopped on every exit path. Errors here are logged
/// by the caller and surface as a missing token, never as a hard
/// failure of the acquisition call.
pub(crate) async fn interactive_signin(
    details: &ConnectionDetails,
    oidc: &dyn OidcClient,
    browser: &dyn UserAgent,
    extra: &[(String, String)],
    timeout: Duration,
) -> anyhow::Result<TokenResponse> {
    let mut listener =
        RedirectListener::bind(&details.redirect_uri, details.signed_in_html.clone()).await?;

    let result = run_flow(&mut listener, details, oidc, browser, extra, timeout).await;
    listener.stop().await;
    result
}

async fn run_flow(
    listener: &mut RedirectListener,
    details: &ConnectionDetails,
    oidc: &dyn OidcClient,
    browser: &dyn UserAgent,
    extra: &[(String, String)],
    timeout: Duration,
) -> anyhow::Result<TokenResponse> {
    let login = oidc.prepare_login(details, extra).await?;

    // Does not block on user completion; the redirect arrives on the
    // listener whenever the user finishes.
    browser.launch(&login.authorization_url);

    let payload = listener.recv(timeout).await?;
    oidc.process_login_response(&payload, &login.state).await
}
