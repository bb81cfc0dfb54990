use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Fingerprint, OwnerId, TenantId};

/// Reference entity - one logical owner's claim on a ContentBlob.
///
/// `charged_bytes` records what this reference cost the owning tenant at
/// ingest time (the actual stored size, or zero when the dedup policy makes
/// references quota-free). Release credits exactly this amount back, so
/// charge and credit can never diverge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    owner_id: OwnerId,
    fingerprint: Fingerprint,
    tenant_id: TenantId,
    charged_bytes: u64,
    created_at: DateTime<Utc>,
}

impl Reference {
    pub fn new(
        owner_id: OwnerId,
        fingerprint: Fingerprint,
        tenant_id: TenantId,
        charged_bytes: u64,
    ) -> Self {
        Self {
            owner_id,
            fingerprint,
            tenant_id,
            charged_bytes,
            created_at: Utc::now(),
        }
    }

    /// Reconstruct from storage
    pub fn reconstruct(
        owner_id: OwnerId,
        fingerprint: Fingerprint,
        tenant_id: TenantId,
        charged_bytes: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id,
            fingerprint,
            tenant_id,
            charged_bytes,
            created_at,
        }
    }

    // Getters
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn charged_bytes(&self) -> u64 {
        self.charged_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
