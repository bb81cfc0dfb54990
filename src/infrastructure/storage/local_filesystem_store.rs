use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::ports::{BlobReader, BlobStore, StagedBlob, StorageError};
use crate::domain::value_objects::Fingerprint;
use crate::infrastructure::storage::{ContentHasher, PathBuilder};

/// Local filesystem blob store.
///
/// Layout: `<root>/staging/<uuid>` for in-flight writes and
/// `<root>/sha256/<prefix>/<hex>` for published blobs. Publication is an
/// atomic rename, so a blob is either fully present at its final path or
/// not there at all.
pub struct LocalFilesystemStore {
    path_builder: PathBuilder,
    durable_writes: bool,
    precreate_dirs: bool,
}

impl LocalFilesystemStore {
    pub fn new(root: PathBuf) -> Self {
        Self::with_options(root, true, true)
    }

    pub fn with_options(root: PathBuf, durable_writes: bool, precreate_dirs: bool) -> Self {
        Self {
            path_builder: PathBuilder::new(root),
            durable_writes,
            precreate_dirs,
        }
    }

    /// Initialize storage directories
    pub async fn init(&self) -> Result<(), StorageError> {
        let root = self.path_builder.root();
        fs::create_dir_all(root.join("staging")).await?;

        let sha256_root = root.join("sha256");
        fs::create_dir_all(&sha256_root).await?;

        // Pre-create all 256 hex prefix directories so publish never has to.
        // One-time startup cost that keeps the write path to a single rename.
        if self.precreate_dirs {
            for i in 0..=255 {
                let prefix = format!("{:02x}", i);
                fs::create_dir_all(sha256_root.join(prefix)).await?;
            }
        }

        Ok(())
    }

    async fn sync_parent_dir(&self, path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            match File::open(parent).await {
                Ok(parent_file) => {
                    if let Err(e) = parent_file.sync_all().await {
                        // Rename already happened; log but don't fail
                        warn!("Failed to sync parent directory after rename: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to open parent directory for sync: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for LocalFilesystemStore {
    async fn stage(
        &self,
        reader: BlobReader,
        max_bytes: u64,
    ) -> Result<StagedBlob, StorageError> {
        let temp_path = self.path_builder.staging_path(Uuid::new_v4());

        debug!("Staging blob at {:?}", temp_path);
        match ContentHasher::write_and_hash(&temp_path, reader, max_bytes, self.durable_writes)
            .await
        {
            Ok((fingerprint, size_bytes)) => {
                debug!(
                    "Blob staged: fingerprint={}, size={}",
                    fingerprint, size_bytes
                );
                Ok(StagedBlob::new(fingerprint, size_bytes, temp_path))
            }
            Err(e) => {
                // The hasher removes the artifact on size rejection; cover
                // the plain I/O failure paths here as well
                let _ = fs::remove_file(&temp_path).await;
                warn!("Failed to stage blob at {:?}: {}", temp_path, e);
                Err(e)
            }
        }
    }

    async fn publish(&self, staged: &StagedBlob) -> Result<String, StorageError> {
        let final_path = self.path_builder.final_path(staged.fingerprint());
        let location = self.path_builder.storage_location(staged.fingerprint());

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if fs::metadata(&final_path).await.is_ok() {
            // Identical bytes already published by a concurrent ingestion;
            // keep the existing file and drop the staged copy
            debug!("Blob already published: {}", staged.fingerprint());
            let _ = fs::remove_file(staged.temp_path()).await;
            return Ok(location);
        }

        debug!("Publishing blob to {:?}", final_path);
        if let Err(e) = fs::rename(staged.temp_path(), &final_path).await {
            let _ = fs::remove_file(staged.temp_path()).await;
            return Err(StorageError::WriteFailed(format!(
                "rename to {:?} failed: {}",
                final_path, e
            )));
        }

        if self.durable_writes {
            self.sync_parent_dir(&final_path).await;
        }

        Ok(location)
    }

    async fn discard(&self, staged: &StagedBlob) -> Result<(), StorageError> {
        match fs::remove_file(staged.temp_path()).await {
            Ok(()) => Ok(()),
            // Already gone (published, or a prior rollback got here first)
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn discard_path(&self, path: &std::path::Path) -> Result<(), StorageError> {
        if !self.path_builder.is_staging_path(path) {
            return Err(StorageError::Internal(format!(
                "{:?} is not a staging path",
                path
            )));
        }

        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn read(&self, fingerprint: &Fingerprint) -> Result<BlobReader, StorageError> {
        let path = self.path_builder.final_path(fingerprint);

        let file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(fingerprint.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;

        Ok(Box::pin(BufReader::new(file)))
    }

    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, StorageError> {
        let path = self.path_builder.final_path(fingerprint);
        Ok(fs::metadata(&path).await.is_ok())
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<(), StorageError> {
        let path = self.path_builder.final_path(fingerprint);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting an absent blob is success: retries must be safe
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    const MAX: u64 = 1024 * 1024;

    async fn test_store() -> (TempDir, LocalFilesystemStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalFilesystemStore::with_options(dir.path().to_path_buf(), false, false);
        store.init().await.unwrap();
        (dir, store)
    }

    fn reader_for(content: &[u8]) -> BlobReader {
        Box::pin(Cursor::new(content.to_vec()))
    }

    #[tokio::test]
    async fn test_init_creates_directories() {
        let (dir, _store) = test_store().await;
        assert!(dir.path().join("staging").exists());
        assert!(dir.path().join("sha256").exists());
    }

    #[tokio::test]
    async fn test_stage_publish_read_round_trip() {
        let (_dir, store) = test_store().await;

        let content = b"Hello, World!";
        let staged = store.stage(reader_for(content), MAX).await.unwrap();
        assert_eq!(staged.size_bytes(), content.len() as u64);

        let fingerprint = staged.fingerprint().clone();
        store.publish(&staged).await.unwrap();
        assert!(store.exists(&fingerprint).await.unwrap());

        let mut reader = store.read(&fingerprint).await.unwrap();
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();
        assert_eq!(buffer, content);
    }

    #[tokio::test]
    async fn test_publish_tolerates_existing_blob() {
        let (_dir, store) = test_store().await;

        let staged1 = store.stage(reader_for(b"duplicate"), MAX).await.unwrap();
        let staged2 = store.stage(reader_for(b"duplicate"), MAX).await.unwrap();
        assert_eq!(staged1.fingerprint(), staged2.fingerprint());

        let loc1 = store.publish(&staged1).await.unwrap();
        let loc2 = store.publish(&staged2).await.unwrap();
        assert_eq!(loc1, loc2);

        // The second staged copy was cleaned up
        assert!(!staged2.temp_path().exists());
    }

    #[tokio::test]
    async fn test_discard_is_idempotent() {
        let (_dir, store) = test_store().await;

        let staged = store.stage(reader_for(b"discard me"), MAX).await.unwrap();
        store.discard(&staged).await.unwrap();
        assert!(!staged.temp_path().exists());

        // Second discard of the same staged blob is a no-op
        store.discard(&staged).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = test_store().await;

        let staged = store.stage(reader_for(b"to be deleted"), MAX).await.unwrap();
        let fingerprint = staged.fingerprint().clone();
        store.publish(&staged).await.unwrap();

        store.delete(&fingerprint).await.unwrap();
        assert!(!store.exists(&fingerprint).await.unwrap());

        // Deleting an already-absent blob is success
        store.delete(&fingerprint).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_path_refuses_non_staging_paths() {
        let (dir, store) = test_store().await;

        let outside = dir.path().join("sha256").join("aa").join("victim");
        let err = store.discard_path(&outside).await.unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));

        let staged = store.stage(reader_for(b"recoverable"), MAX).await.unwrap();
        store.discard_path(staged.temp_path()).await.unwrap();
        assert!(!staged.temp_path().exists());
    }

    #[tokio::test]
    async fn test_stage_rejects_oversize_payload() {
        let (_dir, store) = test_store().await;

        let err = store
            .stage(reader_for(&vec![0u8; 2048]), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PayloadTooLarge { .. }));
    }
}
