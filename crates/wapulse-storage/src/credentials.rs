// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk credential blobs, one directory per session.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use wapulse_core::{SessionKey, SessionStore, WapulseError};

const CREDS_FILE: &str = "creds.bin";
const CREDS_TMP: &str = "creds.bin.tmp";

/// Stores each session's credential blob under `<root>/<session>/creds.bin`.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// previous blob, so a crash mid-write never leaves a truncated blob.
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the session's blob (`session_<id>` or `system`).
    pub fn session_dir(&self, key: &SessionKey) -> PathBuf {
        self.root.join(key.storage_name())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, WapulseError> {
        match tokio::fs::read(self.session_dir(key).join(CREDS_FILE)).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WapulseError::storage(e)),
        }
    }

    async fn save(&self, key: &SessionKey, blob: &[u8]) -> Result<(), WapulseError> {
        let dir = self.session_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(WapulseError::storage)?;

        let tmp = dir.join(CREDS_TMP);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(WapulseError::storage)?;
        file.write_all(blob).await.map_err(WapulseError::storage)?;
        file.sync_all().await.map_err(WapulseError::storage)?;
        drop(file);

        tokio::fs::rename(&tmp, dir.join(CREDS_FILE))
            .await
            .map_err(WapulseError::storage)?;

        // Persist the rename itself. Not every platform can open a directory.
        if let Ok(handle) = tokio::fs::File::open(&dir).await {
            let _ = handle.sync_all().await;
        }

        debug!(session = %key, bytes = blob.len(), "credentials persisted");
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), WapulseError> {
        match tokio::fs::remove_dir_all(self.session_dir(key)).await {
            Ok(()) => {
                debug!(session = %key, "credentials deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WapulseError::storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wapulse_core::TenantId;

    fn tenant_key(id: &str) -> SessionKey {
        SessionKey::Tenant(TenantId::parse(id).unwrap())
    }

    #[tokio::test]
    async fn save_load_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let key = tenant_key("42");

        assert_eq!(store.load(&key).await.unwrap(), None);
        store.save(&key, b"first").await.unwrap();
        store.save(&key, b"second").await.unwrap();
        assert_eq!(store.load(&key).await.unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!store.session_dir(&key).join(CREDS_TMP).exists());

        store.delete(&key).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), None);
        assert!(!store.session_dir(&key).exists());
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.delete(&SessionKey::System).await.unwrap();
    }

    #[tokio::test]
    async fn sessions_do_not_share_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save(&SessionKey::System, b"sys").await.unwrap();
        store.save(&tenant_key("1"), b"one").await.unwrap();
        store.delete(&tenant_key("1")).await.unwrap();
        assert_eq!(
            store.load(&SessionKey::System).await.unwrap().as_deref(),
            Some(&b"sys"[..])
        );
    }
}
