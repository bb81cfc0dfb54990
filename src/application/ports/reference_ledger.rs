use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};
use thiserror::Error;

use crate::domain::entities::{ContentBlob, Reference};
use crate::domain::value_objects::{Fingerprint, OwnerId};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Benign uniqueness race: the row already exists. Callers on the
    /// create path convert this into the attach path, never surface it.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Reference-count bookkeeping contradicts the reference rows. Always
    /// a bug signal: logged at error severity and failed closed, never
    /// silently repaired.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of detaching an owner's reference
#[derive(Debug)]
pub enum DetachOutcome {
    /// Other owners still reference the blob
    Remaining {
        reference: Reference,
        ref_count: i64,
    },
    /// The last reference was removed; the blob row is gone and the caller
    /// must remove the physical bytes
    BlobDropped {
        reference: Reference,
        blob: ContentBlob,
    },
}

/// Port for reference counting operations.
///
/// Every mutation is a single atomic unit at the storage layer: a reference
/// row is never visible without its corresponding count change, and vice
/// versa. Insert-then-increment as two independent calls is exactly the
/// failure mode this contract forbids.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReferenceLedger: Send + Sync {
    /// Insert a new blob row (ref_count = 1) together with its creating
    /// reference in one transaction. Fails with `AlreadyExists` when the
    /// fingerprint is already present; callers fall through to `attach`.
    async fn create_blob(
        &self,
        blob: &ContentBlob,
        reference: &Reference,
    ) -> Result<(), LedgerError>;

    /// Insert a reference row and increment the blob's ref_count in one
    /// transaction. `NotFound` when the blob row is absent, `AlreadyExists`
    /// when the owner already holds a reference.
    async fn attach(&self, reference: &Reference) -> Result<(), LedgerError>;

    /// Remove the owner's reference and decrement ref_count in one
    /// transaction. Drops the blob row in the same transaction when the
    /// count reaches zero.
    async fn detach(&self, owner_id: &OwnerId) -> Result<DetachOutcome, LedgerError>;

    /// Find blob metadata by fingerprint
    async fn find_blob(&self, fingerprint: &Fingerprint)
        -> Result<Option<ContentBlob>, LedgerError>;

    /// Find the reference held by an owner
    async fn find_reference(&self, owner_id: &OwnerId) -> Result<Option<Reference>, LedgerError>;

    /// Read-only reference count, for diagnostics and audit tooling
    async fn reference_count(&self, fingerprint: &Fingerprint) -> Result<i64, LedgerError>;

    /// Find blob rows with zero references (crash backstop for the reaper;
    /// detach normally drops these inline)
    async fn find_orphaned(&self, limit: i64) -> Result<Vec<ContentBlob>, LedgerError>;

    /// Delete a blob row only if it still has zero references. Returns
    /// whether the row was deleted.
    async fn delete_blob_if_unreferenced(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<bool, LedgerError>;
}
