// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-launch collaborator for opening the user's browser.

use std::process::{Command, Stdio};

/// Launches an external user agent at a URL.
///
/// Fire-and-forget: the call must not block on user completion, and
/// launch failures are not awaited or surfaced by the sign-in flow.
pub trait UserAgent: Send + Sync {
    fn launch(&self, url: &str);
}

/// Opens the system default browser via the platform opener command.
pub struct SystemBrowser;

impl UserAgent for SystemBrowser {
    fn launch(&self, url: &str) {
        let result = if cfg!(target_os = "macos") {
            Command::new("open").arg(url).stdout(Stdio::null()).stderr(Stdio::null()).spawn()
        } else if cfg!(target_os = "windows") {
            Command::new("cmd")
                .args(["/C", "start", "", url])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
        } else {
            Command::new("xdg-open").arg(url).stdout(Stdio::null()).stderr(Stdio::null()).spawn()
        };

        if let Err(e) = result {
            tracing::warn!(err = %e, "failed to launch browser");
        }
    }
}
