use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::application::ports::StorageError;
use crate::domain::value_objects::Fingerprint;

/// Buffer size for I/O operations. 256KB provides good throughput for
/// sequential streaming while keeping memory usage bounded.
const BUFFER_SIZE: usize = 256 * 1024;

/// Utility for computing SHA-256 content fingerprints.
///
/// SHA-256 is the de facto standard for content-addressable storage (Git,
/// IPFS, Docker): collision probability is cryptographically negligible and
/// the fixed 32-byte output drives the directory fan-out layout. Hashing
/// happens in the same pass that streams bytes to the staging file, so the
/// data is never read twice.
pub struct ContentHasher;

impl ContentHasher {
    /// Stream to `dest_path` and compute the SHA-256 fingerprint in one pass.
    ///
    /// The stream is rejected with `PayloadTooLarge` as soon as it passes
    /// `max_bytes`; the partially written file is removed before returning.
    /// When `durable` is set the file is fsynced before the fingerprint is
    /// reported.
    ///
    /// Returns `(Fingerprint, size_bytes)` on success.
    pub async fn write_and_hash(
        dest_path: &Path,
        mut reader: impl AsyncRead + Unpin,
        max_bytes: u64,
        durable: bool,
    ) -> Result<(Fingerprint, u64), StorageError> {
        // 2x buffer capacity on the writer side to minimize syscalls
        let mut file =
            tokio::io::BufWriter::with_capacity(BUFFER_SIZE * 2, File::create(dest_path).await?);

        let mut hasher = Sha256::new();
        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > max_bytes {
                // Abort the stream before more bytes land on disk
                drop(file);
                let _ = tokio::fs::remove_file(dest_path).await;
                return Err(StorageError::PayloadTooLarge {
                    size: total_bytes,
                    max: max_bytes,
                });
            }

            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await?;
        }

        file.flush().await?;

        if durable {
            file.get_mut().sync_all().await?;
        }

        let digest: [u8; 32] = hasher.finalize().into();
        Ok((Fingerprint::from_digest(&digest), total_bytes))
    }

    /// Compute the SHA-256 fingerprint of a byte slice without touching disk
    pub fn hash_bytes(bytes: &[u8]) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest: [u8; 32] = hasher.finalize().into();
        Fingerprint::from_digest(&digest)
    }
}
