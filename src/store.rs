//! Persistent storage for the session's tokens and the retry flag.
//!
//! A [`TokenStore`] exposes three named slots (see [`StoreKey`]). The access and
//! refresh tokens are expected to outlive a single request and, for
//! [`FileTokenStore`], a single process. The retry flag is transient: the client
//! clears it when it is constructed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Literal left behind by stores that serialized a missing value.
const NULL_SENTINEL: &str = "null";

/// Errors raised by a [`TokenStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The backing file does not contain valid token JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The named slots of a [`TokenStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Bearer credential sent with every request.
    AccessToken,
    /// Credential used only to obtain a new access token.
    RefreshToken,
    /// Set while a recovery retry is outstanding.
    RetryFlag,
}

impl StoreKey {
    /// The key under which the slot is persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::AccessToken => "aero.token",
            StoreKey::RefreshToken => "aero.refreshToken",
            StoreKey::RetryFlag => "aero.retryFlag",
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value storage backing a client session.
///
/// Implementations must make each individual operation atomic; the client never
/// holds a store-level lock across an await point.
///
/// # Examples
///
/// ```
/// use aeroclient::store::{MemoryTokenStore, StoreKey, TokenStore};
///
/// let store = MemoryTokenStore::new();
/// store.set(StoreKey::RefreshToken, "abc").unwrap();
/// assert_eq!(store.get(StoreKey::RefreshToken).unwrap().as_deref(), Some("abc"));
/// ```
pub trait TokenStore: Send + Sync {
    /// Returns the value stored in `key`, if any.
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;

    /// Stores `value` in `key`, replacing any previous value.
    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: StoreKey) -> Result<(), StoreError>;

    /// Returns `true` if `key` holds a value.
    fn contains(&self, key: StoreKey) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Filters out empty values and the `"null"` serialization artifact.
///
/// A value equal to or containing the literal `null` is treated as absent.
pub(crate) fn usable_token(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty() && !v.contains(NULL_SENTINEL))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A process-wide, in-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with a token pair.
    pub fn with_tokens(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let store = Self::new();
        {
            let mut entries = lock(&store.entries);
            entries.insert(StoreKey::AccessToken, access_token.into());
            entries.insert(StoreKey::RefreshToken, refresh_token.into());
        }
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        lock(&self.entries).insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        lock(&self.entries).remove(&key);
        Ok(())
    }
}

/// On-disk token file format.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// A [`TokenStore`] that persists the token pair to a JSON file.
///
/// Tokens survive process restarts. The retry flag is kept in memory only.
#[derive(Debug)]
pub struct FileTokenStore {
    file_path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    file_lock: Mutex<()>,
    retry_flag: Mutex<Option<String>>,
}

impl FileTokenStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: path.into(),
            file_lock: Mutex::new(()),
            retry_flag: Mutex::new(None),
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn read_file(&self) -> Result<TokenFile, StoreError> {
        if !self.file_path.exists() {
            return Ok(TokenFile::default());
        }

        let content = fs::read_to_string(&self.file_path)?;
        if content.trim().is_empty() {
            return Ok(TokenFile::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_file(&self, file: &TokenFile) -> Result<(), StoreError> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.file_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.file_path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut TokenFile)) -> Result<(), StoreError> {
        let _guard = lock(&self.file_lock);
        let mut file = self.read_file()?;
        f(&mut file);
        self.write_file(&file)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        if key == StoreKey::RetryFlag {
            return Ok(lock(&self.retry_flag).clone());
        }

        let _guard = lock(&self.file_lock);
        let file = self.read_file()?;
        Ok(match key {
            StoreKey::AccessToken => file.access_token,
            _ => file.refresh_token,
        })
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        match key {
            StoreKey::RetryFlag => {
                *lock(&self.retry_flag) = Some(value.to_string());
                Ok(())
            }
            StoreKey::AccessToken => self.update(|f| f.access_token = Some(value.to_string())),
            StoreKey::RefreshToken => self.update(|f| f.refresh_token = Some(value.to_string())),
        }
    }

    fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        match key {
            StoreKey::RetryFlag => {
                lock(&self.retry_flag).take();
                Ok(())
            }
            StoreKey::AccessToken => self.update(|f| f.access_token = None),
            StoreKey::RefreshToken => self.update(|f| f.refresh_token = None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_token_filters_null_sentinel() {
        assert_eq!(usable_token(None), None);
        assert_eq!(usable_token(Some(String::new())), None);
        assert_eq!(usable_token(Some("null".to_string())), None);
        assert_eq!(usable_token(Some("\"null\"".to_string())), None);
        assert_eq!(usable_token(Some("abc".to_string())), Some("abc".to_string()));
    }

    #[test]
    fn test_memory_store_slots_are_independent() {
        let store = MemoryTokenStore::with_tokens("access", "refresh");
        store.set(StoreKey::RetryFlag, "1").unwrap();
        store.remove(StoreKey::AccessToken).unwrap();

        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
        assert_eq!(
            store.get(StoreKey::RefreshToken).unwrap().as_deref(),
            Some("refresh")
        );
        assert!(store.contains(StoreKey::RetryFlag).unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tokens.json");

        let store = FileTokenStore::new(&path);
        store.set(StoreKey::AccessToken, "access").unwrap();
        store.set(StoreKey::RefreshToken, "refresh").unwrap();
        store.set(StoreKey::RetryFlag, "1").unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(
            reopened.get(StoreKey::AccessToken).unwrap().as_deref(),
            Some("access")
        );
        assert_eq!(
            reopened.get(StoreKey::RefreshToken).unwrap().as_deref(),
            Some("refresh")
        );
        assert!(!reopened.contains(StoreKey::RetryFlag).unwrap());
    }

    #[test]
    fn test_file_store_remove_keeps_other_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        store.set(StoreKey::AccessToken, "access").unwrap();
        store.set(StoreKey::RefreshToken, "refresh").unwrap();

        store.remove(StoreKey::AccessToken).unwrap();

        assert_eq!(store.get(StoreKey::AccessToken).unwrap(), None);
        assert_eq!(
            store.get(StoreKey::RefreshToken).unwrap().as_deref(),
            Some("refresh")
        );
    }

    #[test]
    fn test_file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(matches!(
            store.get(StoreKey::AccessToken),
            Err(StoreError::Json(_))
        ));
    }
}
