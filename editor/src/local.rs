use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use carebridge_common::{DraftKey, DraftSnapshot};
use tokio::fs;
use tokio::sync::RwLock;

use crate::error::LocalStoreError;

/// Ephemeral client-resident store of unsaved drafts, one entry per [`DraftKey`].
///
/// Entries are serialized snapshots. Reading an entry that no longer
/// deserializes reports [`LocalStoreError::Corrupt`].
pub trait LocalDraftStore: Clone + Send + Sync + 'static {
    fn get(
        &self,
        key: &DraftKey,
    ) -> impl Future<Output = Result<Option<DraftSnapshot>, LocalStoreError>> + Send;

    fn set(
        &self,
        key: &DraftKey,
        snapshot: &DraftSnapshot,
    ) -> impl Future<Output = Result<(), LocalStoreError>> + Send;

    /// Removing a missing entry is not an error
    fn clear(&self, key: &DraftKey) -> impl Future<Output = Result<(), LocalStoreError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDraftStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryDraftStore {
    /// Stores raw text under a key, bypassing serialization
    pub async fn put_raw(&self, key: &DraftKey, raw: &str) {
        self.entries
            .write()
            .await
            .insert(key.storage_key(), raw.to_string());
    }

    pub async fn contains(&self, key: &DraftKey) -> bool {
        self.entries.read().await.contains_key(&key.storage_key())
    }
}

impl LocalDraftStore for InMemoryDraftStore {
    async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, LocalStoreError> {
        let entries = self.entries.read().await;
        entries
            .get(&key.storage_key())
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(LocalStoreError::from)
    }

    async fn set(&self, key: &DraftKey, snapshot: &DraftSnapshot) -> Result<(), LocalStoreError> {
        let raw = serde_json::to_string(snapshot)?;
        self.entries.write().await.insert(key.storage_key(), raw);
        Ok(())
    }

    async fn clear(&self, key: &DraftKey) -> Result<(), LocalStoreError> {
        self.entries.write().await.remove(&key.storage_key());
        Ok(())
    }
}

/// Keeps each draft as a JSON file in one directory.
///
/// Writes go to a temporary file that is then renamed into place.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    directory: PathBuf,
}

impl FileDraftStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, key: &DraftKey) -> PathBuf {
        self.directory.join(format!("{}.json", key.storage_key()))
    }
}

impl LocalDraftStore for FileDraftStore {
    async fn get(&self, key: &DraftKey) -> Result<Option<DraftSnapshot>, LocalStoreError> {
        let raw = match fs::read_to_string(self.path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn set(&self, key: &DraftKey, snapshot: &DraftSnapshot) -> Result<(), LocalStoreError> {
        let raw = serde_json::to_vec(snapshot)?;
        fs::create_dir_all(&self.directory).await?;

        let path = self.path(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, raw).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn clear(&self, key: &DraftKey) -> Result<(), LocalStoreError> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
