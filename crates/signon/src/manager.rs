// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token manager facade: per-name serialization, the acquisition
//! pipeline (cache, silent refresh, interactive sign-in), and
//! background refresh scheduling.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectionDetails, ManagerOptions};
use crate::error::TokenError;
use crate::events::TokenEvent;
use crate::launch::UserAgent;
use crate::oidc::{OidcClient, TokenResponse};
use crate::signin;
use crate::storage::TokenStorage;
use crate::token::{epoch_secs, TokenData};

/// A scheduled background refresh for one name.
struct ScheduledRefresh {
    cancel: CancellationToken,
    /// Expiry of the token the timer was armed against.
    expires_at: u64,
}

/// Multi-tenant access-token lifecycle manager.
///
/// One instance serves any number of registered token names. Work for
/// the same name is serialized through a lazily-created per-name mutex;
/// different names proceed fully in parallel. Background timer fires go
/// through the same per-name mutex as caller-driven acquisition, so a
/// timer never races a concurrent `check_signin` on cache, storage, or
/// timer state.
pub struct TokenManager {
    connections: RwLock<HashMap<String, ConnectionDetails>>,
    access_tokens: RwLock<HashMap<String, TokenData>>,
    refresh_tokens: RwLock<HashMap<String, String>>,
    /// Per-name mutexes, created on first use and never removed.
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    /// At most one live timer per name holding a valid token.
    timers: RwLock<HashMap<String, ScheduledRefresh>>,
    refresh_time_span: RwLock<Duration>,
    signin_timeout: Duration,
    oidc: Arc<dyn OidcClient>,
    storage: Arc<dyn TokenStorage>,
    browser: Arc<dyn UserAgent>,
    event_tx: broadcast::Sender<TokenEvent>,
    /// Handle timer tasks use to re-enter the manager. Weak, so a
    /// dropped manager silences its timers instead of being kept alive
    /// by them.
    weak_self: Weak<Self>,
}

impl TokenManager {
    /// Create a manager with default options.
    pub fn new(
        oidc: Arc<dyn OidcClient>,
        storage: Arc<dyn TokenStorage>,
        browser: Arc<dyn UserAgent>,
    ) -> Arc<Self> {
        Self::with_options(oidc, storage, browser, ManagerOptions::default())
    }

    pub fn with_options(
        oidc: Arc<dyn OidcClient>,
        storage: Arc<dyn TokenStorage>,
        browser: Arc<dyn UserAgent>,
        options: ManagerOptions,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new_cyclic(|weak| Self {
            connections: RwLock::new(HashMap::new()),
            access_tokens: RwLock::new(HashMap::new()),
            refresh_tokens: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
            refresh_time_span: RwLock::new(options.refresh_time_span),
            signin_timeout: options.signin_timeout,
            oidc,
            storage,
            browser,
            event_tx,
            weak_self: weak.clone(),
        })
    }

    /// Subscribe to background-refresh notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.event_tx.subscribe()
    }

    /// Register (or replace) connection details for `name`. Held under
    /// the per-name lock so it cannot race a concurrent acquisition.
    pub async fn add_server_details(&self, name: &str, details: ConnectionDetails) {
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;
        self.connections.write().await.insert(name.to_owned(), details);
    }

    /// Names with registered connection details.
    pub async fn server_detail_keys(&self) -> HashSet<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// The current global refresh lead time.
    pub async fn refresh_time_span(&self) -> Duration {
        *self.refresh_time_span.read().await
    }

    /// Produce a currently-valid access token for `name`.
    ///
    /// Strategies are tried in order under the name's lock: the cached
    /// token (returned only while its remaining lifetime exceeds the
    /// refresh lead time), a silent refresh, and finally an interactive
    /// sign-in. `Ok(None)` means every strategy failed and the user
    /// must be re-engaged; only an unregistered name is an error.
    pub async fn check_signin(
        &self,
        name: &str,
        extra: &[(String, String)],
    ) -> Result<Option<TokenData>, TokenError> {
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        let details = match self.connections.read().await.get(name) {
            Some(details) => details.clone(),
            None => return Err(TokenError::NotConfigured(name.to_owned())),
        };

        // 1. Cached token, if comfortably outside the renewal window.
        if let Some(token) = self.cached_access_token(name).await {
            if !token.is_expired() && token.remaining() > self.refresh_time_span().await {
                self.arm(name, token.expires_at()).await;
                return Ok(Some(token));
            }
        }

        // 2. Silent refresh.
        if let Some(refresh_token) = self.cached_refresh_token(name).await {
            match self.oidc.refresh(&details, &refresh_token).await {
                Ok(response) => match self.store_refresh_outcome(name, &details, &response).await {
                    Ok(token) => {
                        self.arm(name, token.expires_at()).await;
                        return Ok(Some(token));
                    }
                    Err(e) => {
                        tracing::error!(name = %name, err = %e, "refresh produced an unusable token");
                    }
                },
                Err(e) => {
                    tracing::error!(name = %name, err = %e, "token refresh failed, falling back to interactive sign-in");
                }
            }
        }

        // 3. Interactive sign-in (terminal strategy).
        let outcome = signin::interactive_signin(
            &details,
            self.oidc.as_ref(),
            self.browser.as_ref(),
            extra,
            self.signin_timeout,
        )
        .await;
        match outcome {
            Ok(response) => match self.store_signin_outcome(name, &response).await {
                Ok(token) => {
                    self.arm(name, token.expires_at()).await;
                    Ok(Some(token))
                }
                Err(e) => {
                    tracing::error!(name = %name, err = %e, "Error occurred during user authentication.");
                    Ok(None)
                }
            },
            Err(e) => {
                tracing::error!(name = %name, err = %e, "Error occurred during user authentication.");
                Ok(None)
            }
        }
    }

    /// Change the global refresh lead time and re-derive every live
    /// timer's schedule against it. Names whose tokens are now inside
    /// the renewal window are refreshed immediately.
    pub async fn setup_refresh_time_span(&self, span: Duration) {
        *self.refresh_time_span.write().await = span;

        let snapshot: Vec<(String, u64)> = {
            let timers = self.timers.read().await;
            timers.iter().map(|(name, timer)| (name.clone(), timer.expires_at)).collect()
        };

        let now = epoch_secs();
        for (name, expires_at) in snapshot {
            if expires_at.saturating_sub(now) > span.as_secs() {
                self.arm_with_lead(&name, expires_at, span).await;
            } else {
                let lock = self.name_lock(&name).await;
                let _guard = lock.lock().await;
                if let Some(timer) = self.timers.write().await.remove(&name) {
                    timer.cancel.cancel();
                }
                self.refresh_and_rearm(&name).await;
            }
        }
    }

    /// The per-name mutex, created on first use.
    async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(name) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(name.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Cached access token: memory first, then the storage collaborator
    /// (populating memory so repeated calls perform no further loads).
    /// Storage failures read as a cache miss.
    async fn cached_access_token(&self, name: &str) -> Option<TokenData> {
        if let Some(token) = self.access_tokens.read().await.get(name) {
            return Some(token.clone());
        }
        match self.storage.load_access_token(name).await {
            Ok(Some(token)) => {
                self.access_tokens.write().await.insert(name.to_owned(), token.clone());
                Some(token)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(name = %name, err = %e, "failed to load stored access token");
                None
            }
        }
    }

    /// Cached refresh token: memory first, then storage.
    async fn cached_refresh_token(&self, name: &str) -> Option<String> {
        if let Some(token) = self.refresh_tokens.read().await.get(name) {
            return Some(token.clone());
        }
        match self.storage.load_refresh_token(name).await {
            Ok(Some(token)) => {
                self.refresh_tokens.write().await.insert(name.to_owned(), token.clone());
                Some(token)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(name = %name, err = %e, "failed to load stored refresh token");
                None
            }
        }
    }

    /// Cache and persist the outcome of a refresh grant. The stored
    /// refresh token is replaced only when the connection opts in.
    async fn store_refresh_outcome(
        &self,
        name: &str,
        details: &ConnectionDetails,
        response: &TokenResponse,
    ) -> anyhow::Result<TokenData> {
        let token = TokenData::parse(response.access_token.clone())?;
        self.access_tokens.write().await.insert(name.to_owned(), token.clone());
        if let Err(e) = self.storage.save_access_token(name, &token).await {
            tracing::warn!(name = %name, err = %e, "failed to persist access token");
        }
        if details.replace_refresh_token {
            if let Some(ref refresh_token) = response.refresh_token {
                self.refresh_tokens.write().await.insert(name.to_owned(), refresh_token.clone());
                if let Err(e) = self.storage.save_refresh_token(name, refresh_token).await {
                    tracing::warn!(name = %name, err = %e, "failed to persist refresh token");
                }
            }
        }
        Ok(token)
    }

    /// Cache and persist the outcome of an interactive sign-in: both
    /// tokens are always stored.
    async fn store_signin_outcome(
        &self,
        name: &str,
        response: &TokenResponse,
    ) -> anyhow::Result<TokenData> {
        let token = TokenData::parse(response.access_token.clone())?;
        if let Some(ref refresh_token) = response.refresh_token {
            self.refresh_tokens.write().await.insert(name.to_owned(), refresh_token.clone());
            if let Err(e) = self.storage.save_refresh_token(name, refresh_token).await {
                tracing::warn!(name = %name, err = %e, "failed to persist refresh token");
            }
        }
        self.access_tokens.write().await.insert(name.to_owned(), token.clone());
        if let Err(e) = self.storage.save_access_token(name, &token).await {
            tracing::warn!(name = %name, err = %e, "failed to persist access token");
        }
        Ok(token)
    }

    /// Schedule a background refresh to fire one lead time before
    /// `expires_at`. A token already inside the renewal window is not
    /// scheduled; its holder refreshes synchronously instead.
    // Returns a boxed future to break the `arm` -> `timer_fire` ->
    // `refresh_and_rearm` -> `arm` async cycle so the spawned timer
    // future can be proven `Send`.
    fn arm<'a>(
        &'a self,
        name: &'a str,
        expires_at: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let lead = self.refresh_time_span().await;
            self.arm_with_lead(name, expires_at, lead).await;
        })
    }

    async fn arm_with_lead(&self, name: &str, expires_at: u64, lead: Duration) {
        let now = epoch_secs();
        let remaining = expires_at.saturating_sub(now);
        if remaining <= lead.as_secs() {
            return;
        }
        let fire_in = Duration::from_secs(remaining - lead.as_secs());

        let cancel = CancellationToken::new();
        {
            let mut timers = self.timers.write().await;
            if let Some(old) = timers
                .insert(name.to_owned(), ScheduledRefresh { cancel: cancel.clone(), expires_at })
            {
                old.cancel.cancel();
            }
        }

        let weak = self.weak_self.clone();
        let timer_name = name.to_owned();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(fire_in) => {
                    if let Some(manager) = weak.upgrade() {
                        manager.timer_fire(&timer_name, cancel.clone()).await;
                    }
                }
            }
        });
    }

    /// Background refresh, routed through the same per-name lock as
    /// caller-driven acquisition. `fired` is the elapsed timer's own
    /// cancellation token: a caller-driven refresh that ran while this
    /// fire waited on the name lock has already cancelled it via the
    /// `arm_with_lead` replacement, so a cancelled token means the
    /// fire was superseded and must leave the successor's table entry
    /// untouched.
    async fn timer_fire(&self, name: &str, fired: CancellationToken) {
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        if fired.is_cancelled() {
            return;
        }
        self.timers.write().await.remove(name);
        self.refresh_and_rearm(name).await;
    }

    /// Silent refresh for `name`: cache and persist the new token,
    /// re-arm the schedule, broadcast on success. On failure nothing
    /// is rescheduled; the next explicit `check_signin` re-arms. The
    /// caller must hold the name's lock.
    async fn refresh_and_rearm(&self, name: &str) {
        let details = match self.connections.read().await.get(name) {
            Some(details) => details.clone(),
            None => return,
        };
        let Some(refresh_token) = self.cached_refresh_token(name).await else {
            tracing::warn!(name = %name, "background refresh skipped: no refresh token");
            return;
        };

        match self.oidc.refresh(&details, &refresh_token).await {
            Ok(response) => match self.store_refresh_outcome(name, &details, &response).await {
                Ok(token) => {
                    self.arm(name, token.expires_at()).await;
                    let _ = self
                        .event_tx
                        .send(TokenEvent::Refreshed { name: name.to_owned(), token });
                    tracing::info!(name = %name, "access token refreshed in the background");
                }
                Err(e) => {
                    tracing::warn!(name = %name, err = %e, "background refresh produced an unusable token");
                }
            },
            Err(e) => {
                tracing::warn!(name = %name, err = %e, "background token refresh failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
