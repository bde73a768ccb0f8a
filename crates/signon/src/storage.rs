// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token persistence collaborator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::token::TokenData;

/// Durable token storage.
///
/// All operations are best-effort from the manager's point of view:
/// load failures read as "nothing stored" and save failures are logged,
/// never fatal to the token-acquisition call.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    async fn load_access_token(&self, name: &str) -> anyhow::Result<Option<TokenData>>;
    async fn load_refresh_token(&self, name: &str) -> anyhow::Result<Option<String>>;
    async fn save_access_token(&self, name: &str, token: &TokenData) -> anyhow::Result<()>;
    async fn save_refresh_token(&self, name: &str, token: &str) -> anyhow::Result<()>;
}

/// Persisted tokens for a single name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// JSON-file storage keyed by token name.
pub struct FileTokenStorage {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: tokio::sync::Mutex::new(()) }
    }

    fn read_all(&self) -> anyhow::Result<HashMap<String, PersistedEntry>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let entries: HashMap<String, PersistedEntry> = serde_json::from_str(&contents)?;
        Ok(entries)
    }

    /// Write atomically (unique tmp + rename). Uses a PID + counter tmp
    /// filename so concurrent saves cannot leave trailing bytes from a
    /// longer previous write.
    fn write_all(&self, entries: &HashMap<String, PersistedEntry>) -> anyhow::Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    async fn update(&self, name: &str, apply: impl FnOnce(&mut PersistedEntry)) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all()?;
        apply(entries.entry(name.to_owned()).or_default());
        self.write_all(&entries)
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn load_access_token(&self, name: &str) -> anyhow::Result<Option<TokenData>> {
        let _guard = self.lock.lock().await;
        match self.read_all()?.get(name).and_then(|e| e.access_token.clone()) {
            Some(raw) => Ok(Some(TokenData::parse(raw)?)),
            None => Ok(None),
        }
    }

    async fn load_refresh_token(&self, name: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all()?.get(name).and_then(|e| e.refresh_token.clone()))
    }

    async fn save_access_token(&self, name: &str, token: &TokenData) -> anyhow::Result<()> {
        let raw = token.as_str().to_owned();
        self.update(name, move |entry| entry.access_token = Some(raw)).await
    }

    async fn save_refresh_token(&self, name: &str, token: &str) -> anyhow::Result<()> {
        let raw = token.to_owned();
        self.update(name, move |entry| entry.refresh_token = Some(raw)).await
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
