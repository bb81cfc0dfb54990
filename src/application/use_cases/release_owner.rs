use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::application::locks::FingerprintLockMap;
use crate::application::ports::{
    BlobStore, DetachOutcome, LedgerError, QuotaAccountant, QuotaError, ReferenceLedger,
    StorageError,
};
use crate::domain::value_objects::OwnerId;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Quota accounting error: {0}")]
    Quota(#[from] QuotaError),
}

impl From<LedgerError> for ReleaseError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::IntegrityViolation(msg) => ReleaseError::IntegrityViolation(msg),
            other => ReleaseError::Ledger(other),
        }
    }
}

/// Outcome of a release, for callers that report on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The reference was removed; the blob survives with other owners
    Detached,
    /// The reference was the last one; blob row and bytes are gone
    BlobRemoved,
    /// The owner held no reference (repeat release, or never ingested)
    NoReference,
}

/// Use case: release an owner's claim on stored content.
///
/// Idempotent end to end: releasing an owner that holds no reference is a
/// success, so callers can retry on any transport failure without
/// double-crediting quota.
pub struct ReleaseUseCase {
    ledger: Arc<dyn ReferenceLedger>,
    blob_store: Arc<dyn BlobStore>,
    quota: Arc<dyn QuotaAccountant>,
    locks: Arc<FingerprintLockMap>,
}

impl ReleaseUseCase {
    pub fn new(
        ledger: Arc<dyn ReferenceLedger>,
        blob_store: Arc<dyn BlobStore>,
        quota: Arc<dyn QuotaAccountant>,
        locks: Arc<FingerprintLockMap>,
    ) -> Self {
        Self {
            ledger,
            blob_store,
            quota,
            locks,
        }
    }

    pub async fn execute(&self, owner_id: &str) -> Result<ReleaseOutcome, ReleaseError> {
        let owner_id = OwnerId::from_string(owner_id)
            .map_err(|e| ReleaseError::InvalidRequest(e.to_string()))?;

        // Resolve the fingerprint first so the lock is taken before the
        // detach transaction touches the count
        let Some(reference) = self.ledger.find_reference(&owner_id).await? else {
            debug!(owner_id = %owner_id, "release of absent reference, nothing to do");
            return Ok(ReleaseOutcome::NoReference);
        };

        let _guard = self.locks.lock(reference.fingerprint()).await;

        let outcome = match self.ledger.detach(&owner_id).await {
            Ok(outcome) => outcome,
            // Raced with another release of the same owner; the other call
            // did the work
            Err(LedgerError::NotFound(_)) => {
                debug!(owner_id = %owner_id, "reference vanished between lookup and detach");
                return Ok(ReleaseOutcome::NoReference);
            }
            Err(e) => return Err(e.into()),
        };

        match outcome {
            DetachOutcome::Remaining {
                reference,
                ref_count,
            } => {
                self.credit(&reference).await?;
                info!(
                    owner_id = %owner_id,
                    fingerprint = %reference.fingerprint(),
                    ref_count,
                    "reference released, blob retained"
                );
                Ok(ReleaseOutcome::Detached)
            }
            DetachOutcome::BlobDropped { reference, blob } => {
                // The blob row is already gone; any concurrent ingest of the
                // same bytes waits on our lock and will create a fresh row
                // after the physical delete below.
                if let Err(e) = self.blob_store.delete(blob.fingerprint()).await {
                    // The row is dropped either way; orphaned bytes are
                    // invisible to lookups and cost only disk
                    error!(
                        fingerprint = %blob.fingerprint(),
                        "failed to delete blob bytes after last release: {}", e
                    );
                }
                self.credit(&reference).await?;
                info!(
                    owner_id = %owner_id,
                    fingerprint = %blob.fingerprint(),
                    size_bytes = blob.size_bytes(),
                    "last reference released, blob removed"
                );
                Ok(ReleaseOutcome::BlobRemoved)
            }
        }
    }

    /// Credit back exactly what this reference was charged at ingest time,
    /// read from the reference row itself
    async fn credit(&self, reference: &crate::domain::entities::Reference) -> Result<(), ReleaseError> {
        if reference.charged_bytes() > 0 {
            self.quota
                .credit(reference.tenant_id(), reference.charged_bytes())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        MockBlobStore, MockQuotaAccountant, MockReferenceLedger,
    };
    use crate::domain::entities::{ContentBlob, Reference};
    use crate::domain::value_objects::{Fingerprint, TenantId};
    use std::str::FromStr;
    use uuid::Uuid;

    fn test_fingerprint() -> Fingerprint {
        Fingerprint::from_str(&"c".repeat(64)).unwrap()
    }

    fn test_reference(owner_id: OwnerId, charged_bytes: u64) -> Reference {
        Reference::new(owner_id, test_fingerprint(), TenantId::new(Uuid::new_v4()), charged_bytes)
    }

    fn use_case(
        ledger: MockReferenceLedger,
        store: MockBlobStore,
        quota: MockQuotaAccountant,
    ) -> ReleaseUseCase {
        ReleaseUseCase::new(
            Arc::new(ledger),
            Arc::new(store),
            Arc::new(quota),
            Arc::new(FingerprintLockMap::new()),
        )
    }

    #[tokio::test]
    async fn test_release_with_remaining_owners_credits_charged_bytes() {
        let owner_id = OwnerId::generate();
        let mut ledger = MockReferenceLedger::new();
        let store = MockBlobStore::new(); // delete must not be called
        let mut quota = MockQuotaAccountant::new();

        ledger
            .expect_find_reference()
            .returning(move |id| Ok(Some(test_reference(*id, 100))));
        ledger.expect_detach().times(1).returning(|id| {
            Ok(DetachOutcome::Remaining {
                reference: test_reference(*id, 100),
                ref_count: 1,
            })
        });
        quota
            .expect_credit()
            .withf(|_, bytes| *bytes == 100)
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = use_case(ledger, store, quota)
            .execute(&owner_id.to_string())
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::Detached);
    }

    #[tokio::test]
    async fn test_last_release_removes_blob_bytes() {
        let owner_id = OwnerId::generate();
        let mut ledger = MockReferenceLedger::new();
        let mut store = MockBlobStore::new();
        let mut quota = MockQuotaAccountant::new();

        ledger
            .expect_find_reference()
            .returning(move |id| Ok(Some(test_reference(*id, 100))));
        ledger.expect_detach().times(1).returning(|id| {
            Ok(DetachOutcome::BlobDropped {
                reference: test_reference(*id, 100),
                blob: ContentBlob::reconstruct(
                    test_fingerprint(),
                    100,
                    "sha256/cc/x".to_string(),
                    0,
                    chrono::Utc::now(),
                ),
            })
        });
        store.expect_delete().times(1).returning(|_| Ok(()));
        quota
            .expect_credit()
            .withf(|_, bytes| *bytes == 100)
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = use_case(ledger, store, quota)
            .execute(&owner_id.to_string())
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::BlobRemoved);
    }

    #[tokio::test]
    async fn test_quota_free_reference_credits_nothing() {
        let owner_id = OwnerId::generate();
        let mut ledger = MockReferenceLedger::new();
        let store = MockBlobStore::new();
        let quota = MockQuotaAccountant::new(); // credit must not be called

        ledger
            .expect_find_reference()
            .returning(move |id| Ok(Some(test_reference(*id, 0))));
        ledger.expect_detach().times(1).returning(|id| {
            Ok(DetachOutcome::Remaining {
                reference: test_reference(*id, 0),
                ref_count: 2,
            })
        });

        let outcome = use_case(ledger, store, quota)
            .execute(&owner_id.to_string())
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::Detached);
    }

    #[tokio::test]
    async fn test_release_of_unknown_owner_is_success() {
        let mut ledger = MockReferenceLedger::new();
        ledger.expect_find_reference().returning(|_| Ok(None));

        let outcome = use_case(ledger, MockBlobStore::new(), MockQuotaAccountant::new())
            .execute(&OwnerId::generate().to_string())
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::NoReference);
    }

    #[tokio::test]
    async fn test_detach_race_is_success() {
        let owner_id = OwnerId::generate();
        let mut ledger = MockReferenceLedger::new();

        ledger
            .expect_find_reference()
            .returning(move |id| Ok(Some(test_reference(*id, 100))));
        ledger
            .expect_detach()
            .times(1)
            .returning(|id| Err(LedgerError::NotFound(id.to_string())));

        let outcome = use_case(ledger, MockBlobStore::new(), MockQuotaAccountant::new())
            .execute(&owner_id.to_string())
            .await
            .unwrap();
        assert_eq!(outcome, ReleaseOutcome::NoReference);
    }

    #[tokio::test]
    async fn test_invalid_owner_id_rejected() {
        let err = use_case(
            MockReferenceLedger::new(),
            MockBlobStore::new(),
            MockQuotaAccountant::new(),
        )
        .execute("not-a-uuid")
        .await
        .unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidRequest(_)));
    }
}
