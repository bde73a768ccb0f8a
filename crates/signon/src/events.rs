// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast notifications for background token refreshes.

use crate::token::TokenData;

/// Events emitted by the token manager.
///
/// Delivered over a bounded broadcast channel; a slow subscriber lags
/// and misses events rather than delaying the refresh scheduler.
#[derive(Debug, Clone)]
pub enum TokenEvent {
    /// A background refresh produced a new access token for `name`.
    Refreshed { name: String, token: TokenData },
}
