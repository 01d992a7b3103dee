//! Durable storage for the token record.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use crate::BoxFuture;
use crate::error::{AuthError, AuthResult};
use crate::token::TokenRecord;

/// Persisted token store.
///
/// Only the token manager writes to a store; everything else reads
/// tokens through the manager.
pub trait TokenStore: Send + Sync {
    /// Reads the stored record. A missing record is `Ok(None)`.
    fn load(&self) -> BoxFuture<'_, AuthResult<Option<TokenRecord>>>;

    /// Writes the record, creating any missing parent location.
    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<()>>;

    /// Removes the stored record. Removing nothing is not an error.
    fn clear(&self) -> BoxFuture<'_, AuthResult<()>>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// JSON file store.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write never leaves a truncated token file behind.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, record: &TokenRecord) -> AuthResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuthError::persistence(format!(
                    "failed to create token directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| AuthError::persistence(format!("failed to serialize tokens: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content.as_bytes())
            .await
            .map_err(|e| AuthError::persistence(format!("failed to write token file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = tokio::fs::set_permissions(&temp_path, perms).await;
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| AuthError::persistence(format!("failed to replace token file: {}", e)))?;

        debug!("saved tokens to {}", self.path.display());
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> BoxFuture<'_, AuthResult<Option<TokenRecord>>> {
        Box::pin(async move {
            let content = match tokio::fs::read_to_string(&self.path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("no token file at {}", self.path.display());
                    return Ok(None);
                }
                Err(e) => {
                    return Err(AuthError::persistence(format!(
                        "failed to read token file {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            };

            let record = serde_json::from_str(&content).map_err(|e| {
                AuthError::persistence(format!(
                    "failed to parse token file {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            info!("loaded tokens from {}", self.path.display());
            Ok(Some(record))
        })
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(self.write(record))
    }

    fn clear(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {
                    info!("removed token file {}", self.path.display());
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AuthError::persistence(format!(
                    "failed to remove token file: {}",
                    e
                ))),
            }
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store with write counters, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
    saves: AtomicUsize,
    clears: AtomicUsize,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with a record.
    pub fn with_record(record: TokenRecord) -> Self {
        let store = Self::default();
        *store.slot() = Some(record);
        store
    }

    /// Returns the currently stored record.
    pub fn snapshot(&self) -> Option<TokenRecord> {
        self.slot().clone()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `clear` calls.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Makes subsequent `save` calls fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<TokenRecord>> {
        self.record
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> BoxFuture<'_, AuthResult<Option<TokenRecord>>> {
        let record = self.snapshot();
        Box::pin(async move { Ok(record) })
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(async move {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(AuthError::persistence("store is read-only"));
            }
            *self.slot() = Some(record.clone());
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn clear(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            *self.slot() = None;
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
