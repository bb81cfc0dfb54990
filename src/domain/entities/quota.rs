use serde::{Deserialize, Serialize};

use crate::domain::value_objects::TenantId;

/// QuotaLedgerEntry entity - one tenant's storage accounting.
///
/// `bytes_reserved` is in-flight ingestion headroom; `bytes_consumed` is
/// settled usage. The invariant `consumed + reserved <= limit` is enforced
/// atomically at the storage layer, never by read-then-write arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLedgerEntry {
    tenant_id: TenantId,
    bytes_consumed: u64,
    bytes_reserved: u64,
    quota_limit: u64,
}

impl QuotaLedgerEntry {
    pub fn reconstruct(
        tenant_id: TenantId,
        bytes_consumed: u64,
        bytes_reserved: u64,
        quota_limit: u64,
    ) -> Self {
        Self {
            tenant_id,
            bytes_consumed,
            bytes_reserved,
            quota_limit,
        }
    }

    /// Bytes still available for new reservations
    pub fn available(&self) -> u64 {
        self.quota_limit
            .saturating_sub(self.bytes_consumed)
            .saturating_sub(self.bytes_reserved)
    }

    // Getters
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    pub fn bytes_reserved(&self) -> u64 {
        self.bytes_reserved
    }

    pub fn quota_limit(&self) -> u64 {
        self.quota_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_available_headroom() {
        let entry =
            QuotaLedgerEntry::reconstruct(TenantId::new(Uuid::new_v4()), 600, 300, 1000);
        assert_eq!(entry.available(), 100);
    }

    #[test]
    fn test_available_saturates_at_zero() {
        let entry =
            QuotaLedgerEntry::reconstruct(TenantId::new(Uuid::new_v4()), 900, 300, 1000);
        assert_eq!(entry.available(), 0);
    }
}
