// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing errors.

use std::fmt;

/// Errors surfaced from the token manager facade.
///
/// Every other failure mode (refresh, sign-in, storage) degrades to a
/// `None` result plus a log entry; only a token request for a name that
/// was never registered is an error the caller must handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// No connection details were registered for the requested name.
    NotConfigured(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured(name) => {
                write!(f, "no server details configured for '{name}'")
            }
        }
    }
}

impl std::error::Error for TokenError {}
