use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::dto::{IngestReceipt, IngestRequest};
use crate::application::locks::FingerprintLockMap;
use crate::application::ports::{
    BlobReader, BlobStore, CompensationLog, CompensationLogError, IntentId, LedgerError,
    QuotaAccountant, QuotaError, ReferenceLedger, StagedBlob, StorageError,
};
use crate::domain::entities::{ContentBlob, Reference};
use crate::domain::value_objects::{Fingerprint, OwnerId, TenantId};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Payload size exceeds maximum allowed: {size} > {max}")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Ingestion deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Quota accounting error: {0}")]
    Quota(QuotaError),

    #[error("Compensation log error: {0}")]
    CompensationLog(#[from] CompensationLogError),
}

impl From<StorageError> for IngestError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::PayloadTooLarge { size, max } => IngestError::PayloadTooLarge { size, max },
            StorageError::WriteFailed(msg) => IngestError::WriteFailed(msg),
            StorageError::Io(e) => IngestError::WriteFailed(e.to_string()),
            other => IngestError::Storage(other),
        }
    }
}

impl From<LedgerError> for IngestError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::IntegrityViolation(msg) => IngestError::IntegrityViolation(msg),
            other => IngestError::Ledger(other),
        }
    }
}

impl From<QuotaError> for IngestError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded { .. } => IngestError::QuotaExceeded(e.to_string()),
            other => IngestError::Quota(other),
        }
    }
}

/// Policy knobs read by the ingestion transaction.
///
/// `charge_dedup_references` is the single flag deciding whether a
/// deduplicated reference consumes tenant quota; it is read at exactly one
/// site, never re-derived elsewhere.
#[derive(Debug, Clone)]
pub struct IngestPolicy {
    pub max_payload_bytes: u64,
    pub charge_dedup_references: bool,
    pub timeout: Duration,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            max_payload_bytes: 256 * 1024 * 1024,
            charge_dedup_references: false,
            timeout: Duration::from_secs(60),
        }
    }
}

/// What the forward path has done so far, for the rollback path to undo
/// in strict reverse order
#[derive(Default)]
struct IngestProgress {
    staged: Option<StagedBlob>,
    published: Option<Fingerprint>,
    attached: bool,
}

/// Use case: ingest a byte stream, deduplicating against stored content.
///
/// States: Hashing -> Lookup -> (CreateNew | AttachExisting) -> Committed,
/// with a rollback path reachable from every state after hashing. The
/// caller sees all-or-nothing: either a receipt or a typed failure, never
/// partial success.
pub struct IngestUseCase {
    ledger: Arc<dyn ReferenceLedger>,
    blob_store: Arc<dyn BlobStore>,
    quota: Arc<dyn QuotaAccountant>,
    compensation_log: Arc<dyn CompensationLog>,
    locks: Arc<FingerprintLockMap>,
    policy: IngestPolicy,
}

impl IngestUseCase {
    pub fn new(
        ledger: Arc<dyn ReferenceLedger>,
        blob_store: Arc<dyn BlobStore>,
        quota: Arc<dyn QuotaAccountant>,
        compensation_log: Arc<dyn CompensationLog>,
        locks: Arc<FingerprintLockMap>,
        policy: IngestPolicy,
    ) -> Self {
        Self {
            ledger,
            blob_store,
            quota,
            compensation_log,
            locks,
            policy,
        }
    }

    /// Execute the ingestion transaction
    pub async fn execute(
        &self,
        request: IngestRequest,
        reader: BlobReader,
    ) -> Result<IngestReceipt, IngestError> {
        let tenant_id = TenantId::from_string(&request.tenant_id)
            .map_err(|e| IngestError::InvalidRequest(e.to_string()))?;
        let owner_id = OwnerId::from_string(&request.owner_id)
            .map_err(|e| IngestError::InvalidRequest(e.to_string()))?;

        let declared = request.declared_size_bytes;
        if declared > self.policy.max_payload_bytes {
            return Err(IngestError::PayloadTooLarge {
                size: declared,
                max: self.policy.max_payload_bytes,
            });
        }

        // Write-ahead the rollback intent before the reservation it covers,
        // so the reaper can complete the compensation if the process dies
        let intent_id = self.compensation_log.record(&tenant_id, declared).await?;

        if let Err(e) = self.quota.reserve(&tenant_id, declared).await {
            // Nothing was reserved; the intent has nothing to cover
            let _ = self.compensation_log.clear(&intent_id).await;
            return Err(e.into());
        }

        let mut progress = IngestProgress::default();
        let outcome = tokio::time::timeout(
            self.policy.timeout,
            self.forward(&tenant_id, &owner_id, declared, &intent_id, reader, &mut progress),
        )
        .await;

        match outcome {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(err)) => {
                self.roll_back(&tenant_id, &owner_id, declared, &intent_id, &progress)
                    .await;
                Err(err)
            }
            Err(_elapsed) => {
                // The forward future was dropped mid-step; rollback itself
                // is not cancellable and runs to completion
                self.roll_back(&tenant_id, &owner_id, declared, &intent_id, &progress)
                    .await;
                Err(IngestError::Timeout(self.policy.timeout))
            }
        }
    }

    async fn forward(
        &self,
        tenant_id: &TenantId,
        owner_id: &OwnerId,
        declared: u64,
        intent_id: &IntentId,
        reader: BlobReader,
        progress: &mut IngestProgress,
    ) -> Result<IngestReceipt, IngestError> {
        let staged = self
            .blob_store
            .stage(reader, self.policy.max_payload_bytes)
            .await?;
        self.compensation_log
            .mark_staged(intent_id, staged.temp_path())
            .await?;
        progress.staged = Some(staged.clone());

        let fingerprint = staged.fingerprint().clone();
        let actual_size = staged.size_bytes();

        let _guard = self.locks.lock(&fingerprint).await;

        let deduplicated = match self.ledger.find_blob(&fingerprint).await? {
            None => {
                let location = self.blob_store.publish(&staged).await?;
                progress.published = Some(fingerprint.clone());
                let blob = ContentBlob::new(fingerprint.clone(), actual_size, location);
                let reference =
                    Reference::new(*owner_id, fingerprint.clone(), *tenant_id, actual_size);

                match self.ledger.create_blob(&blob, &reference).await {
                    Ok(()) => {
                        progress.attached = true;
                        false
                    }
                    Err(LedgerError::AlreadyExists(_)) => {
                        // Lost the creation race to another process. The
                        // published bytes are shared now; fall through to
                        // the attach path rather than erroring.
                        debug!(%fingerprint, "creation race lost, attaching instead");
                        self.attach_existing(&fingerprint, owner_id, tenant_id, actual_size)
                            .await?;
                        progress.attached = true;
                        true
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(_) => {
                self.attach_existing(&fingerprint, owner_id, tenant_id, actual_size)
                    .await?;
                progress.attached = true;

                // The staged duplicate is removed only after the attach has
                // committed. It was never charged to quota, so its removal
                // moves no accounting.
                if let Err(e) = self.blob_store.discard(&staged).await {
                    warn!(%fingerprint, "failed to discard staged duplicate: {}", e);
                }
                true
            }
        };

        // Settle the reservation: commit what this reference actually
        // costs, return the rest of the declared amount to headroom
        let charged = if deduplicated {
            self.dedup_charge(actual_size)
        } else {
            actual_size
        };
        self.quota.commit(tenant_id, declared, charged).await?;

        if let Err(e) = self.compensation_log.clear(intent_id).await {
            // Ingestion already succeeded; a stale intent is for the reaper
            error!(%intent_id, "failed to clear compensation intent: {}", e);
        }

        info!(
            %fingerprint,
            owner_id = %owner_id,
            deduplicated,
            size_bytes = actual_size,
            "ingest committed"
        );

        Ok(IngestReceipt {
            fingerprint: fingerprint.to_string(),
            deduplicated,
            owner_id: owner_id.to_string(),
        })
    }

    async fn attach_existing(
        &self,
        fingerprint: &Fingerprint,
        owner_id: &OwnerId,
        tenant_id: &TenantId,
        actual_size: u64,
    ) -> Result<(), IngestError> {
        let reference = Reference::new(
            *owner_id,
            fingerprint.clone(),
            *tenant_id,
            self.dedup_charge(actual_size),
        );
        self.ledger.attach(&reference).await?;
        Ok(())
    }

    /// The one site where the dedup quota policy is read
    fn dedup_charge(&self, actual_size: u64) -> u64 {
        if self.policy.charge_dedup_references {
            actual_size
        } else {
            0
        }
    }

    /// Undo partial side effects in strict reverse order. Every step is
    /// idempotent and tolerates "nothing to roll back"; failures here are
    /// logged but never replace the original error the caller sees.
    async fn roll_back(
        &self,
        tenant_id: &TenantId,
        owner_id: &OwnerId,
        declared: u64,
        intent_id: &IntentId,
        progress: &IngestProgress,
    ) {
        if progress.attached {
            match self.ledger.detach(owner_id).await {
                Ok(crate::application::ports::DetachOutcome::BlobDropped { blob, .. }) => {
                    let _guard = self.locks.lock(blob.fingerprint()).await;
                    if let Err(e) = self.blob_store.delete(blob.fingerprint()).await {
                        error!(fingerprint = %blob.fingerprint(),
                            "rollback: failed to delete unpublished blob: {}", e);
                    }
                }
                Ok(_) => {}
                Err(LedgerError::NotFound(_)) => {}
                Err(e) => error!(owner_id = %owner_id, "rollback: detach failed: {}", e),
            }
        }

        if !progress.attached {
            if let Some(fingerprint) = &progress.published {
                // Published bytes with no ledger row are invisible to the
                // orphan sweep; remove them here unless a concurrent ingest
                // has claimed the fingerprint since.
                let _guard = self.locks.lock(fingerprint).await;
                match self.ledger.find_blob(fingerprint).await {
                    Ok(None) => {
                        if let Err(e) = self.blob_store.delete(fingerprint).await {
                            error!(%fingerprint,
                                "rollback: failed to delete published blob: {}", e);
                        }
                    }
                    Ok(Some(_)) => {}
                    Err(e) => error!(%fingerprint, "rollback: blob lookup failed: {}", e),
                }
            }
        }

        if let Some(staged) = &progress.staged {
            if let Err(e) = self.blob_store.discard(staged).await {
                error!(path = ?staged.temp_path(), "rollback: failed to discard staged bytes: {}", e);
            }
        }

        // Release exactly what was reserved, never a corrected amount
        if let Err(e) = self.quota.release(tenant_id, declared).await {
            error!(tenant_id = %tenant_id, "rollback: failed to release reservation: {}", e);
        }

        if let Err(e) = self.compensation_log.clear(intent_id).await {
            error!(%intent_id, "rollback: failed to clear compensation intent: {}", e);
        }
    }
}
