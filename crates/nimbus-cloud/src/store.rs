//! Credential store: cached authentication contexts
//!
//! Every client owns a [`MemoryStore`]. An external store (for example a
//! [`FileStore`] on a shared volume) can be layered in front of it so that
//! independently running clients reuse one session.

use crate::credentials::{Credentials, ScopeOptions};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

/// Per-process counter giving every write its own temporary file
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Result of a successful authentication handshake
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    pub token: String,
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    /// Raw service catalog as returned by the identity service
    #[serde(default)]
    pub catalog: serde_json::Value,
}

impl AuthContext {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires: None,
            user: None,
            catalog: serde_json::Value::Null,
        }
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_user(mut self, user: serde_json::Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_catalog(mut self, catalog: serde_json::Value) -> Self {
        self.catalog = catalog;
        self
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &"***")
            .field("expires", &self.expires)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Deterministic cache key for one identity against one auth endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        auth_url: &str,
        protocol: &str,
        credentials: &Credentials,
        scope: &ScopeOptions,
    ) -> Self {
        let scope_kind = scope.token_scope.to_string();
        let secret_digest = hex::encode(Sha256::digest(credentials.secret().as_bytes()));
        let mut hasher = Sha256::new();
        for part in [
            auth_url.trim_end_matches('/'),
            protocol,
            credentials.user_id(),
            secret_digest.as_str(),
            scope_kind.as_str(),
            scope.domain_name.as_str(),
            scope.tenant_name.as_deref().unwrap_or(""),
            scope.tenant_domain_id.as_str(),
        ] {
            hasher.update(part.as_bytes());
            // separator keeps ("ab", "c") and ("a", "bc") apart
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pluggable cache of authentication contexts
///
/// External implementations must be safe for concurrent and cross-process
/// use themselves; the core performs no locking around them.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<AuthContext>>;

    async fn put(&self, key: &CacheKey, context: AuthContext) -> Result<()>;

    /// Remove an entry. Clearing an absent key is not an error.
    async fn clear(&self, key: &CacheKey) -> Result<()>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, AuthContext>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<AuthContext>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, context: AuthContext) -> Result<()> {
        self.entries.lock().insert(key.clone(), context);
        Ok(())
    }

    async fn clear(&self, key: &CacheKey) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store keeping one JSON file per key in a directory
///
/// Meant to be shared by several processes on one host. Each write goes
/// through its own temporary file and a rename, so a reader sees either the
/// old or the new context and concurrent writers never clobber each other's
/// temporary file. The last rename wins.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(io_error)
    }

    fn tmp_path(&self, key: &CacheKey) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(".{}.{}.{}.tmp", key.as_str(), std::process::id(), seq))
    }
}

fn io_error(err: std::io::Error) -> CloudError {
    CloudError::Store(err.to_string())
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<AuthContext>> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };

        match serde_json::from_str::<AuthContext>(&content) {
            Ok(context) => Ok(Some(context)),
            Err(e) => {
                // a corrupt entry behaves like a miss; the next put overwrites it
                tracing::warn!("Ignoring unreadable token cache entry {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, context: AuthContext) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.entry_path(key);
        let tmp = self.tmp_path(key);
        let content =
            serde_json::to_string_pretty(&context).map_err(|e| CloudError::Store(e.to_string()))?;

        fs::write(&tmp, content).await.map_err(io_error)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(e));
        }

        tracing::debug!("Stored token cache entry {}", key);
        Ok(())
    }

    async fn clear(&self, key: &CacheKey) -> Result<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => {
                tracing::debug!("Removed token cache entry {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TokenScope;
    use tempfile::tempdir;

    fn key() -> CacheKey {
        CacheKey::new(
            "https://identity.example.com:5000",
            "3.x_password",
            &Credentials::new("admin", "secret"),
            &ScopeOptions::default().with_tenant("demo"),
        )
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        assert_eq!(key(), key());
        assert_eq!(key().as_str().len(), 64);
    }

    #[test]
    fn test_cache_key_varies_with_secret_and_scope() {
        let base = key();
        let trailing_slash = CacheKey::new(
            "https://identity.example.com:5000/",
            "3.x_password",
            &Credentials::new("admin", "secret"),
            &ScopeOptions::default().with_tenant("demo"),
        );
        assert_eq!(base, trailing_slash);

        let other_secret = CacheKey::new(
            "https://identity.example.com:5000",
            "3.x_password",
            &Credentials::new("admin", "rotated"),
            &ScopeOptions::default().with_tenant("demo"),
        );
        assert_ne!(base, other_secret);

        let domain_scoped = CacheKey::new(
            "https://identity.example.com:5000",
            "3.x_password",
            &Credentials::new("admin", "secret"),
            &ScopeOptions::default()
                .with_tenant("demo")
                .with_scope(TokenScope::Domain),
        );
        assert_ne!(base, domain_scoped);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_idempotent_clear() {
        let store = MemoryStore::new();
        let key = key();

        assert!(store.get(&key).await.unwrap().is_none());
        store.put(&key, AuthContext::new("T1")).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap().token, "T1");

        store.clear(&key).await.unwrap();
        store.clear(&key).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_shared_between_instances() {
        let temp_dir = tempdir().unwrap();
        let writer = FileStore::new(temp_dir.path().join("tokens"));
        let reader = FileStore::new(temp_dir.path().join("tokens"));
        let key = key();

        let context = AuthContext::new("T1")
            .with_expires(Utc::now() + chrono::Duration::hours(1))
            .with_catalog(serde_json::json!([{"type": "compute"}]));
        writer.put(&key, context.clone()).await.unwrap();

        assert_eq!(reader.get(&key).await.unwrap(), Some(context));

        reader.clear(&key).await.unwrap();
        assert!(writer.get(&key).await.unwrap().is_none());
        // clearing again is a no-op
        writer.clear(&key).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_puts_last_write_wins() {
        let temp_dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FileStore::new(temp_dir.path().join("tokens")));
        let key = key();

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    store.put(&key, AuthContext::new(format!("T{}", i))).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get(&key).await.unwrap().unwrap();
        assert!(stored.token.starts_with('T'));

        // no temporary files are left behind
        let leftovers = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_entry_is_a_miss() {
        let temp_dir = tempdir().unwrap();
        let store = FileStore::new(temp_dir.path());
        let key = key();

        std::fs::write(temp_dir.path().join(format!("{}.json", key)), "{not json").unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
