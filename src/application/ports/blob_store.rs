use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::domain::value_objects::Fingerprint;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Payload size exceeds maximum allowed: {size} > {max}")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Type alias for async reader
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Handle to bytes written to a staging location but not yet published.
///
/// The fingerprint and size are final (computed while streaming); only the
/// physical location is provisional. Discarding a staged blob is always
/// safe and idempotent.
#[derive(Debug, Clone)]
pub struct StagedBlob {
    fingerprint: Fingerprint,
    size_bytes: u64,
    temp_path: PathBuf,
}

impl StagedBlob {
    pub fn new(fingerprint: Fingerprint, size_bytes: u64, temp_path: PathBuf) -> Self {
        Self {
            fingerprint,
            size_bytes,
            temp_path,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}

/// Port for physical blob storage operations.
///
/// Publication is a two-phase write: bytes land in a staging path first
/// (`stage`), then move atomically to their content-addressed final path
/// (`publish`). No partially written blob is ever visible at a final path.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream bytes to a staging path, computing the fingerprint during the
    /// write. Rejects streams longer than `max_bytes` and removes the
    /// staging artifact on any failure.
    async fn stage(&self, reader: BlobReader, max_bytes: u64)
        -> Result<StagedBlob, StorageError>;

    /// Atomically move a staged blob to its final content-addressed path
    /// and return the storage location. If the final path already exists
    /// (concurrent ingestion of identical bytes) the staged copy is
    /// discarded and the existing location returned.
    async fn publish(&self, staged: &StagedBlob) -> Result<String, StorageError>;

    /// Remove a staged blob. Idempotent: discarding an already-removed
    /// staging file is success.
    async fn discard(&self, staged: &StagedBlob) -> Result<(), StorageError>;

    /// Remove a staging artifact by recorded path (crash recovery, where
    /// only the path survived). Implementations must refuse paths outside
    /// their staging area. Idempotent.
    async fn discard_path(&self, path: &Path) -> Result<(), StorageError>;

    /// Read blob by fingerprint
    async fn read(&self, fingerprint: &Fingerprint) -> Result<BlobReader, StorageError>;

    /// Check if blob exists at its final path
    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, StorageError>;

    /// Delete published blob bytes. Idempotent: deleting an absent blob is
    /// success (retry safety). Callers must have observed a zero reference
    /// count under the per-fingerprint lock first.
    async fn delete(&self, fingerprint: &Fingerprint) -> Result<(), StorageError>;
}
