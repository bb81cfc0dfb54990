use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};
use thiserror::Error;

use crate::domain::entities::QuotaLedgerEntry;
use crate::domain::value_objects::TenantId;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Quota exceeded for tenant {tenant_id}: requested {requested} bytes")]
    Exceeded { tenant_id: String, requested: u64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Port for tenant storage quota accounting.
///
/// All arithmetic happens as atomic increments/decrements at the storage
/// layer. Reservations are made with the declared size before any byte is
/// written; settlement either commits the actual size or releases exactly
/// the reserved amount — never a later-corrected figure.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuotaAccountant: Send + Sync {
    /// Reserve headroom for an ingestion. Fails with `Exceeded` when
    /// consumed + reserved + bytes would pass the tenant's limit. Creates
    /// the tenant's ledger row on first use.
    async fn reserve(&self, tenant_id: &TenantId, bytes: u64) -> Result<(), QuotaError>;

    /// Return reserved bytes without consuming them (rollback path)
    async fn release(&self, tenant_id: &TenantId, bytes: u64) -> Result<(), QuotaError>;

    /// Settle a reservation: drop `reserved` bytes from the reservation
    /// column and add `charged` bytes to consumption, in one atomic update.
    /// `charged` may be less than `reserved` (stream shorter than declared,
    /// or a quota-free deduplicated reference); the delta returns to
    /// headroom exactly once.
    async fn commit(
        &self,
        tenant_id: &TenantId,
        reserved: u64,
        charged: u64,
    ) -> Result<(), QuotaError>;

    /// Credit previously consumed bytes back (reference released)
    async fn credit(&self, tenant_id: &TenantId, bytes: u64) -> Result<(), QuotaError>;

    /// Read a tenant's ledger entry, if the tenant has one
    async fn entry(&self, tenant_id: &TenantId) -> Result<Option<QuotaLedgerEntry>, QuotaError>;
}
