//! Persistent key-value store for session data.
//!
//! A [`Store`] is an explicitly constructed handle shared (cheaply cloned)
//! between the HTTP client and the session manager. Initialization is
//! lazy and memoized: the first operation awaits a single open future and
//! every concurrent caller waits on that same future.
//!
//! The file backend keeps one JSON object on disk, written atomically with
//! owner-only permissions (0600). Tokens are never logged.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};

/// Key holding the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Key holding the serialized user.
pub const USER_KEY: &str = "user";

type Entries = Map<String, Value>;

/// Categories of storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The backing store could not be opened.
    Unavailable,
    /// Reading or writing the backing file failed.
    Io,
    /// The entries could not be serialized.
    Serialize,
}

/// Error raised by store operations.
#[derive(Debug, Clone)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage error: {}", self.message)
    }
}

impl std::error::Error for StorageError {}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug)]
enum Backend {
    File(PathBuf),
    Memory(Entries),
}

#[derive(Debug)]
struct Inner {
    backend: Backend,
    entries: OnceCell<Mutex<Entries>>,
    #[cfg(test)]
    opens: std::sync::atomic::AtomicUsize,
    #[cfg(test)]
    mutations: std::sync::atomic::AtomicUsize,
}

/// Async key-value store handle.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Store persisted to a JSON file at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(Backend::File(path.into()))
    }

    /// Empty in-process store.
    pub fn memory() -> Self {
        Self::with_backend(Backend::Memory(Entries::new()))
    }

    /// In-process store seeded with `entries`.
    pub fn memory_with<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let seed = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::with_backend(Backend::Memory(seed))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                entries: OnceCell::new(),
                #[cfg(test)]
                opens: std::sync::atomic::AtomicUsize::new(0),
                #[cfg(test)]
                mutations: std::sync::atomic::AtomicUsize::new(0),
            }),
        }
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened.
    pub async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let entries = self.entries().await?.lock().await;
        Ok(entries.get(key).cloned())
    }

    /// Returns the value under `key` if it is a non-empty string.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened.
    pub async fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(match self.get(key).await? {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        })
    }

    /// Stores `value` under `key`.
    ///
    /// The write is durable before this returns. On failure the in-memory
    /// view is left unchanged.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or written.
    pub async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
        .await
    }

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or written.
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
        .await
    }

    /// Removes every key.
    ///
    /// # Errors
    /// Returns an error if the store cannot be opened or written.
    pub async fn clear(&self) -> StorageResult<()> {
        self.mutate(Entries::clear).await
    }

    async fn mutate(&self, apply: impl FnOnce(&mut Entries)) -> StorageResult<()> {
        let mut entries = self.entries().await?.lock().await;
        let mut next = entries.clone();
        apply(&mut next);

        #[cfg(test)]
        self.inner
            .mutations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if let Backend::File(path) = &self.inner.backend {
            write_entries(path, &next).await?;
        }
        *entries = next;
        Ok(())
    }

    async fn entries(&self) -> StorageResult<&Mutex<Entries>> {
        self.inner
            .entries
            .get_or_try_init(|| self.inner.open())
            .await
    }

    #[cfg(test)]
    pub(crate) fn mutation_count(&self) -> usize {
        self.inner
            .mutations
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Inner {
    async fn open(&self) -> StorageResult<Mutex<Entries>> {
        #[cfg(test)]
        self.opens.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let entries = match &self.backend {
            Backend::Memory(seed) => seed.clone(),
            Backend::File(path) => read_entries(path).await?,
        };
        Ok(Mutex::new(entries))
    }
}

async fn read_entries(path: &Path) -> StorageResult<Entries> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => {
            return Err(StorageError::new(
                StorageErrorKind::Unavailable,
                format!("failed to open {}: {e}", path.display()),
            ));
        }
    };

    match serde_json::from_str::<Entries>(&contents) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding unreadable store file");
            Ok(Entries::new())
        }
    }
}

async fn write_entries(path: &Path, entries: &Entries) -> StorageResult<()> {
    let io_err = |action: &str, e: std::io::Error| {
        StorageError::new(
            StorageErrorKind::Io,
            format!("failed to {action} {}: {e}", path.display()),
        )
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_err("create directory for", e))?;
    }

    let contents = serde_json::to_vec_pretty(entries)
        .map_err(|e| StorageError::new(StorageErrorKind::Serialize, e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&tmp).await.map_err(|e| io_err("open", e))?;
    file.write_all(&contents)
        .await
        .map_err(|e| io_err("write", e))?;
    file.sync_all().await.map_err(|e| io_err("sync", e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err("replace", e))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_remove_clear() {
        let store = Store::memory();
        assert_eq!(store.get(TOKEN_KEY).await.unwrap(), None);

        store.set(TOKEN_KEY, json!("t1")).await.unwrap();
        store.set(USER_KEY, json!({"id": "u1"})).await.unwrap();
        assert_eq!(store.get_string(TOKEN_KEY).await.unwrap().as_deref(), Some("t1"));
        assert_eq!(store.get(USER_KEY).await.unwrap(), Some(json!({"id": "u1"})));

        store.remove(TOKEN_KEY).await.unwrap();
        assert_eq!(store.get(TOKEN_KEY).await.unwrap(), None);

        store.clear().await.unwrap();
        assert_eq!(store.get(USER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_string_ignores_non_strings() {
        let store = Store::memory_with([(TOKEN_KEY, json!(42)), (USER_KEY, json!(""))]);
        assert_eq!(store.get_string(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(store.get_string(USER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("storage.json");

        let store = Store::file(&path);
        store.set(TOKEN_KEY, json!("t1")).await.unwrap();
        store.set(USER_KEY, json!({"id": "u1", "nombre": "Ana"})).await.unwrap();

        let reopened = Store::file(&path);
        assert_eq!(reopened.get_string(TOKEN_KEY).await.unwrap().as_deref(), Some("t1"));
        assert_eq!(
            reopened.get(USER_KEY).await.unwrap(),
            Some(json!({"id": "u1", "nombre": "Ana"}))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        Store::file(&path).set(TOKEN_KEY, json!("t1")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = Store::file(&path);
        assert_eq!(store.get(TOKEN_KEY).await.unwrap(), None);

        store.set(TOKEN_KEY, json!("t2")).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("t2"));
    }

    #[tokio::test]
    async fn test_unopenable_file_reports_unavailable() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "plain file").unwrap();

        let store = Store::file(blocker.join("storage.json"));
        let err = store.get(TOKEN_KEY).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Unavailable);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_opens_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{"token":"t1"}"#).unwrap();
        let store = Store::file(&path);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.get_string(TOKEN_KEY).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_deref(), Some("t1"));
        }

        assert_eq!(store.inner.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_view_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = Store::file(&path);
        store.set(TOKEN_KEY, json!("t1")).await.unwrap();

        // Replace the target with a directory so the rename fails.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let err = store.set(TOKEN_KEY, json!("t2")).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Io);
        assert_eq!(store.get_string(TOKEN_KEY).await.unwrap().as_deref(), Some("t1"));
    }
}
