//! # Blob Storage
//!
//! Durable key/value layer underneath the content store.
//!
//! ## Backends
//!
//! ```text
//! MemoryBlobStorage   Arc<DashMap<key, bytes>>, cloned handles share one map
//! FileBlobStorage     <root>/blobs/<shard>/<key>
//!                     shard = last two characters of the key
//! ```
//!
//! File writes go to a hidden `.tmp` sibling first and are renamed into place,
//! so a crash never leaves a half-written blob under its final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use cairn_core::error::{Error, Result};

const BLOBS_DIR: &str = "blobs";
const TMP_SUFFIX: &str = ".tmp";

/// Listing entry for a stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub key: String,
    pub length: u64,
}

/// Durable blob storage
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put_blob(&self, key: &str, data: Bytes) -> Result<()>;

    /// Read a blob; `None` if it does not exist
    async fn get_blob(&self, key: &str) -> Result<Option<Bytes>>;

    /// Blobs whose key starts with `prefix`, sorted by key
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobMetadata>>;

    /// Remove a blob; removing a missing blob is not an error
    async fn delete_blob(&self, key: &str) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
    {
        return Err(Error::Store {
            message: format!("invalid blob key {:?}", key),
        });
    }
    Ok(())
}

/// In-memory blob storage.
///
/// Cloning yields another handle onto the same map, which is how tests model
/// several processes sharing one repository.
#[derive(Clone, Default)]
pub struct MemoryBlobStorage {
    blobs: Arc<DashMap<String, Bytes>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn put_blob(&self, key: &str, data: Bytes) -> Result<()> {
        validate_key(key)?;
        self.blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobMetadata>> {
        let mut out: Vec<BlobMetadata> = self
            .blobs
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| BlobMetadata {
                key: e.key().clone(),
                length: e.value().len() as u64,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn delete_blob(&self, key: &str) -> Result<()> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// Filesystem blob storage
pub struct FileBlobStorage {
    root: PathBuf,
    sync_writes: bool,
}

impl FileBlobStorage {
    /// Open (creating if needed) a blob directory under `root`
    pub async fn open(root: impl AsRef<Path>, sync_writes: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(BLOBS_DIR)).await?;
        debug!("Opened blob storage at {:?}", root);
        Ok(Self { root, sync_writes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, key: &str) -> PathBuf {
        let shard = if key.len() >= 2 { &key[key.len() - 2..] } else { "00" };
        self.root.join(BLOBS_DIR).join(shard)
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.shard_dir(key).join(key)
    }
}

#[async_trait]
impl BlobStorage for FileBlobStorage {
    async fn put_blob(&self, key: &str, data: Bytes) -> Result<()> {
        validate_key(key)?;

        let dir = self.shard_dir(key);
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = dir.join(key);
        let tmp_path = dir.join(format!(".{}{}", key, TMP_SUFFIX));

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&data).await?;
        if self.sync_writes {
            file.sync_all().await?;
        }
        drop(file);

        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> Result<Option<Bytes>> {
        validate_key(key)?;
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobMetadata>> {
        let mut out = Vec::new();
        let mut shards = tokio::fs::read_dir(self.root.join(BLOBS_DIR)).await?;

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = match file.file_name().into_string() {
                    Ok(name) => name,
                    Err(_) => continue,
                };
                // In-flight or abandoned temporary files
                if name.starts_with('.') || name.ends_with(TMP_SUFFIX) {
                    continue;
                }
                if !name.starts_with(prefix) {
                    continue;
                }
                let length = file.metadata().await?.len();
                out.push(BlobMetadata { key: name, length });
            }
        }

        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn delete_blob(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_handles_share_state() {
        let a = MemoryBlobStorage::new();
        let b = a.clone();

        a.put_blob("mabc", Bytes::from_static(b"one")).await.unwrap();
        assert_eq!(b.get_blob("mabc").await.unwrap().unwrap(), Bytes::from_static(b"one"));

        b.delete_blob("mabc").await.unwrap();
        assert!(a.is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_roundtrip_and_listing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileBlobStorage::open(temp_dir.path(), false).await.unwrap();

        storage.put_blob("m01", Bytes::from_static(b"first")).await.unwrap();
        storage.put_blob("m02", Bytes::from_static(b"second")).await.unwrap();
        storage.put_blob("0af", Bytes::from_static(b"data")).await.unwrap();

        let listed = storage.list_blobs("m").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["m01", "m02"]);
        assert_eq!(listed[1].length, 6);

        storage.delete_blob("m01").await.unwrap();
        storage.delete_blob("m01").await.unwrap();
        assert!(storage.get_blob("m01").await.unwrap().is_none());
        assert_eq!(storage.list_blobs("").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let storage = MemoryBlobStorage::new();
        let err = storage
            .put_blob("../etc", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { .. }));
    }
}
