//! Durable local storage for client state.
//!
//! Every persisted record lives under a single key and is owned by exactly
//! one component:
//! - `user_data`: the session record, written by the session store
//! - `push_token`: the raw device push token, written by the push coordinator
//! - `notification_list`: the notification inbox
//!
//! ## Design
//! - `FileStore` keeps one file per key inside the app data directory and
//!   replaces files atomically (write to a temp file, then rename)
//! - `MemoryStore` backs tests and ephemeral sessions

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Key of the persisted session record.
pub const SESSION_KEY: &str = "user_data";

/// Key of the persisted device push token.
pub const DEVICE_TOKEN_KEY: &str = "push_token";

/// Key of the persisted notification inbox.
pub const NOTIFICATIONS_KEY: &str = "notification_list";

/// Every key this crate writes. Used by explicit data reset.
pub const ALL_KEYS: [&str; 3] = [SESSION_KEY, DEVICE_TOKEN_KEY, NOTIFICATIONS_KEY];

/// Async key/value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (or replace) a value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every record this crate owns.
    async fn clear_all(&self) -> Result<()> {
        for key in ALL_KEYS {
            self.remove(key).await?;
        }
        Ok(())
    }
}

// ── File-backed store ───────────────────────────────────────────

/// One file per key under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            bail!("Invalid storage key '{key}'");
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let dir = self.dir.clone();
        let value = value.to_owned();

        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Storage write task panicked")?
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

// ── In-memory store ─────────────────────────────────────────────

/// Volatile store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, handy in assertions.
    pub fn snapshot(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
