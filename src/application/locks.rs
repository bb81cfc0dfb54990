use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::value_objects::Fingerprint;

/// Per-fingerprint mutual exclusion for combined ledger + filesystem
/// mutations.
///
/// Physical deletion and publication of the same fingerprint must not
/// interleave, and the database transaction alone cannot cover the
/// filesystem half. Different fingerprints are fully independent: no
/// global lock.
#[derive(Default)]
pub struct FingerprintLockMap {
    locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
}

impl FingerprintLockMap {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub async fn lock(&self, fingerprint: &Fingerprint) -> OwnedMutexGuard<()> {
        let lock = {
            // Clone out of the map entry so the shard guard is released
            // before awaiting the mutex
            let entry = self
                .locks
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        lock.lock_owned().await
    }
}
