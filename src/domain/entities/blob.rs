use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Fingerprint;

/// ContentBlob entity - one physical stored object with ref counting.
///
/// Exactly one blob exists per unique fingerprint. The physical bytes may
/// only be removed once the reference count has reached zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlob {
    fingerprint: Fingerprint,
    size_bytes: u64,
    storage_location: String,
    ref_count: i64,
    created_at: DateTime<Utc>,
}

impl ContentBlob {
    /// Create new blob with ref_count = 1 (the creating owner's reference)
    pub fn new(fingerprint: Fingerprint, size_bytes: u64, storage_location: String) -> Self {
        Self {
            fingerprint,
            size_bytes,
            storage_location,
            ref_count: 1,
            created_at: Utc::now(),
        }
    }

    /// Reconstruct from storage
    pub fn reconstruct(
        fingerprint: Fingerprint,
        size_bytes: u64,
        storage_location: String,
        ref_count: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            size_bytes,
            storage_location,
            ref_count,
            created_at,
        }
    }

    /// Check if blob can be physically removed
    pub fn is_unreferenced(&self) -> bool {
        self.ref_count == 0
    }

    // Getters
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn storage_location(&self) -> &str {
        &self.storage_location
    }

    pub fn ref_count(&self) -> i64 {
        self.ref_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
