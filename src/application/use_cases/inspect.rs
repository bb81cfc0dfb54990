use std::sync::Arc;
use thiserror::Error;

use crate::application::ports::{
    BlobReader, BlobStore, LedgerError, QuotaAccountant, QuotaError, ReferenceLedger, StorageError,
};
use crate::domain::entities::QuotaLedgerEntry;
use crate::domain::value_objects::{Fingerprint, OwnerId, TenantId};

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Quota accounting error: {0}")]
    Quota(#[from] QuotaError),
}

/// Metadata view of a stored blob
#[derive(Debug, Clone)]
pub struct BlobInfo {
    pub fingerprint: String,
    pub size_bytes: u64,
    pub ref_count: i64,
    pub storage_location: String,
}

/// Use case: read-only access to stored content and accounting state.
pub struct InspectUseCase {
    ledger: Arc<dyn ReferenceLedger>,
    blob_store: Arc<dyn BlobStore>,
    quota: Arc<dyn QuotaAccountant>,
}

impl InspectUseCase {
    pub fn new(
        ledger: Arc<dyn ReferenceLedger>,
        blob_store: Arc<dyn BlobStore>,
        quota: Arc<dyn QuotaAccountant>,
    ) -> Self {
        Self {
            ledger,
            blob_store,
            quota,
        }
    }

    /// Look up blob metadata by fingerprint
    pub async fn blob_info(&self, fingerprint: &str) -> Result<Option<BlobInfo>, InspectError> {
        let fingerprint = parse_fingerprint(fingerprint)?;
        Ok(self.ledger.find_blob(&fingerprint).await?.map(|blob| BlobInfo {
            fingerprint: blob.fingerprint().to_string(),
            size_bytes: blob.size_bytes(),
            ref_count: blob.ref_count(),
            storage_location: blob.storage_location().to_string(),
        }))
    }

    /// Open a stream over an owner's content. The owner's reference row is
    /// the access check: no reference, no bytes.
    pub async fn read(&self, owner_id: &str) -> Result<BlobReader, InspectError> {
        let owner_id = OwnerId::from_string(owner_id)
            .map_err(|e| InspectError::InvalidRequest(e.to_string()))?;

        let reference = self
            .ledger
            .find_reference(&owner_id)
            .await?
            .ok_or_else(|| InspectError::NotFound(owner_id.to_string()))?;

        self.blob_store
            .read(reference.fingerprint())
            .await
            .map_err(|e| match e {
                StorageError::NotFound(msg) => InspectError::NotFound(msg),
                other => InspectError::Storage(other),
            })
    }

    /// Read-only reference count for a fingerprint
    pub async fn reference_count(&self, fingerprint: &str) -> Result<i64, InspectError> {
        let fingerprint = parse_fingerprint(fingerprint)?;
        Ok(self.ledger.reference_count(&fingerprint).await?)
    }

    /// A tenant's quota ledger entry, if the tenant has ingested anything
    pub async fn quota_entry(
        &self,
        tenant_id: &str,
    ) -> Result<Option<QuotaLedgerEntry>, InspectError> {
        let tenant_id = TenantId::from_string(tenant_id)
            .map_err(|e| InspectError::InvalidRequest(e.to_string()))?;
        Ok(self.quota.entry(&tenant_id).await?)
    }
}

fn parse_fingerprint(raw: &str) -> Result<Fingerprint, InspectError> {
    raw.parse::<Fingerprint>()
        .map_err(|e| InspectError::InvalidRequest(e.to_string()))
}
