//! Bearer credential and its best-effort persistent storage
//!
//! The store keeps one credential in a JSON file so a restarted application can
//! resume its session without a fresh login. Writes use temp-file + rename so a
//! crash never leaves a truncated file. Storage is strictly best-effort: a
//! missing, unreadable or corrupt file opens as an empty store and the user
//! re-authenticates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A bearer token with its absolute expiry.
///
/// `expires_at` is a unix timestamp in milliseconds, computed when the token
/// is obtained (see `token::expiry_for`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    /// Refresh token, when the login flow issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    pub expires_at: u64,
}

impl Credential {
    pub fn new(token: impl Into<String>, refresh: Option<String>, expires_at: u64) -> Self {
        Self {
            token: token.into(),
            refresh,
            expires_at,
        }
    }

    /// Whether the credential is due for renewal at `now_ms`, treating it as
    /// expired `skew` before its literal expiry.
    pub fn is_expired(&self, now_ms: u64, skew: Duration) -> bool {
        now_ms.saturating_add(skew.as_millis() as u64) >= self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Single-credential store, optionally backed by a file.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<Option<Credential>>,
}

impl CredentialStore {
    /// Memory-only store, used when no persistent location is configured.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(None),
        }
    }

    /// Open a file-backed store.
    ///
    /// Never fails: read or parse errors are logged and the store starts
    /// empty. The file is only created on the first `save()`.
    pub async fn open(path: PathBuf) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<Credential>(&contents) {
                Ok(credential) => {
                    info!(path = %path.display(), "loaded stored credential");
                    Some(credential)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "stored credential is corrupt, ignoring");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no stored credential");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "credential file unreadable, starting empty");
                None
            }
        };

        Self {
            path: Some(path),
            state: Mutex::new(state),
        }
    }

    /// Whether writes reach disk.
    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub async fn get(&self) -> Option<Credential> {
        self.state.lock().await.clone()
    }

    /// Replace the stored credential.
    ///
    /// The in-memory copy is always updated; a disk failure is reported so the
    /// caller can log it, but the session continues.
    pub async fn save(&self, credential: Credential) -> Result<()> {
        let mut state = self.state.lock().await;
        let written = match &self.path {
            Some(path) => write_atomic(path, &credential).await,
            None => Ok(()),
        };
        *state = Some(credential);
        written
    }

    /// Drop the stored credential and delete the backing file.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = None;
        let Some(path) = &self.path else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed stored credential");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("removing credential file: {e}"))),
        }
    }
}

/// Write the credential to a file atomically with 0600 permissions.
async fn write_atomic(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_string_pretty(credential)
        .map_err(|e| Error::Malformed(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credential(suffix: &str) -> Credential {
        Credential::new(
            format!("at_{suffix}"),
            Some(format!("rt_{suffix}")),
            4_102_444_800_000,
        )
    }

    #[test]
    fn expiry_honours_skew() {
        let credential = Credential::new("at", None, 100_000);
        assert!(!credential.is_expired(30_000, Duration::from_secs(60)));
        assert!(credential.is_expired(40_000, Duration::from_secs(60)));
        assert!(credential.is_expired(100_000, Duration::ZERO));
        assert!(!credential.is_expired(99_999, Duration::ZERO));
    }

    #[test]
    fn debug_redacts_tokens() {
        let debug = format!("{:?}", test_credential("secret"));
        assert!(!debug.contains("at_secret"), "got: {debug}");
        assert!(!debug.contains("rt_secret"), "got: {debug}");
        assert!(debug.contains("expires_at"));
    }

    #[tokio::test]
    async fn roundtrip_save_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::open(path.clone()).await;
        assert!(store.get().await.is_none());
        store.save(test_credential("1")).await.unwrap();

        let reopened = CredentialStore::open(path).await;
        assert_eq!(reopened.get().await, Some(test_credential("1")));
    }

    #[tokio::test]
    async fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = CredentialStore::open(path).await;
        assert!(store.get().await.is_none());
    }

    #[tokio::test]
    async fn unwritable_location_keeps_memory_copy() {
        let store = CredentialStore::open(PathBuf::from("/")).await;
        let result = store.save(test_credential("1")).await;
        assert!(result.is_err());
        assert_eq!(store.get().await, Some(test_credential("1")));
    }

    #[tokio::test]
    async fn clear_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::open(path.clone()).await;
        store.save(test_credential("1")).await.unwrap();
        assert!(path.exists());

        store.clear().await.unwrap();
        assert!(!path.exists());
        assert!(store.get().await.is_none());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_store_never_touches_disk() {
        let store = CredentialStore::in_memory();
        assert!(!store.is_persistent());
        store.save(test_credential("m")).await.unwrap();
        assert_eq!(store.get().await.unwrap().token, "at_m");
        store.clear().await.unwrap();
        assert!(store.get().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::open(path.clone()).await;
        store.save(test_credential("1")).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }
}
