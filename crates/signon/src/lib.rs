// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-tenant access-token lifecycle management for OIDC-style
//! authentication.
//!
//! Given a registered token name, [`TokenManager::check_signin`] produces
//! a currently-valid access token: from the in-memory cache, via a
//! silent refresh grant, or by running the interactive authorization-code
//! flow against a short-lived loopback redirect receiver. Tokens are
//! renewed in the background ahead of expiry. Work for the same name is
//! serialized; different names proceed in parallel.
//!
//! The protocol exchange, token persistence, and browser launch are
//! collaborator seams ([`oidc::OidcClient`], [`storage::TokenStorage`],
//! [`launch::UserAgent`]); production implementations of each are
//! bundled.

pub mod config;
pub mod error;
pub mod events;
pub mod launch;
pub mod listener;
pub mod manager;
pub mod oidc;
mod signin;
pub mod storage;
pub mod token;

pub use config::{ConnectionDetails, ManagerOptions};
pub use error::TokenError;
pub use events::TokenEvent;
pub use manager::TokenManager;
pub use token::TokenData;
