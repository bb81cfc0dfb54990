use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::locks::FingerprintLockMap;
use crate::application::ports::{
    BlobStore, CompensationLog, IngestIntent, QuotaAccountant, ReferenceLedger,
};
use crate::application::reaper::ReaperConfig;

/// What a single reaper pass accomplished
#[derive(Debug, Default, Clone, Copy)]
pub struct ReaperReport {
    pub intents_completed: u64,
    pub blobs_reaped: u64,
}

/// Background worker that finishes interrupted ingestions and removes
/// orphaned blobs.
///
/// A crash can leave behind a reserved quota amount, a staging file, or
/// (rarely) an unreferenced blob row whose physical delete never ran. The
/// compensation log records the first two; the ledger's orphan scan covers
/// the third. Every step the reaper takes is idempotent, so overlapping
/// passes or reaper crashes mid-pass are harmless.
pub struct Reaper {
    ledger: Arc<dyn ReferenceLedger>,
    blob_store: Arc<dyn BlobStore>,
    quota: Arc<dyn QuotaAccountant>,
    compensation_log: Arc<dyn CompensationLog>,
    locks: Arc<FingerprintLockMap>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(
        ledger: Arc<dyn ReferenceLedger>,
        blob_store: Arc<dyn BlobStore>,
        quota: Arc<dyn QuotaAccountant>,
        compensation_log: Arc<dyn CompensationLog>,
        locks: Arc<FingerprintLockMap>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            ledger,
            blob_store,
            quota,
            compensation_log,
            locks,
            config,
        }
    }

    /// Run passes forever at the configured interval. Spawn on the runtime;
    /// dropping the task handle stops the reaper.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval = ?self.config.interval, "reaper started");
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report)
                    if report.intents_completed > 0 || report.blobs_reaped > 0 =>
                {
                    info!(
                        intents_completed = report.intents_completed,
                        blobs_reaped = report.blobs_reaped,
                        "reaper pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!("reaper pass failed: {}", e),
            }
        }
    }

    /// One full pass: complete stale intents, then sweep orphaned blobs.
    pub async fn run_once(&self) -> Result<ReaperReport, Box<dyn std::error::Error + Send + Sync>> {
        let mut report = ReaperReport::default();

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stale_intent_age)
                .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let stale = self
            .compensation_log
            .find_stale(cutoff, self.config.batch_size)
            .await?;

        for intent in stale {
            if self.complete_intent(&intent).await {
                report.intents_completed += 1;
            }
        }

        let orphaned = self.ledger.find_orphaned(self.config.batch_size).await?;
        for blob in orphaned {
            // Re-check under the fingerprint lock: a concurrent ingest may
            // have attached to the blob since the scan
            let _guard = self.locks.lock(blob.fingerprint()).await;
            match self
                .ledger
                .delete_blob_if_unreferenced(blob.fingerprint())
                .await
            {
                Ok(true) => {
                    if let Err(e) = self.blob_store.delete(blob.fingerprint()).await {
                        error!(
                            fingerprint = %blob.fingerprint(),
                            "failed to delete orphaned blob bytes: {}", e
                        );
                        continue;
                    }
                    report.blobs_reaped += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(
                    fingerprint = %blob.fingerprint(),
                    "orphan re-check failed: {}", e
                ),
            }
        }

        Ok(report)
    }

    /// Finish a crashed ingestion the way its own rollback would have:
    /// drop the staging artifact, release the reservation, clear the
    /// intent. The intent is cleared last so a reaper crash mid-compensation
    /// retries the whole sequence.
    async fn complete_intent(&self, intent: &IngestIntent) -> bool {
        if let Some(path) = &intent.staged_path {
            if let Err(e) = self.blob_store.discard_path(path).await {
                // Leave the intent in place; the next pass retries
                warn!(intent_id = %intent.id, path = ?path,
                    "failed to discard staged artifact: {}", e);
                return false;
            }
        }

        if let Err(e) = self
            .quota
            .release(&intent.tenant_id, intent.reserved_bytes)
            .await
        {
            warn!(intent_id = %intent.id, "failed to release stale reservation: {}", e);
            return false;
        }

        if let Err(e) = self.compensation_log.clear(&intent.id).await {
            // Reservation release saturates at zero, so a retried release
            // after this failure cannot drive the ledger negative
            warn!(intent_id = %intent.id, "failed to clear completed intent: {}", e);
            return false;
        }

        info!(
            intent_id = %intent.id,
            tenant_id = %intent.tenant_id,
            reserved_bytes = intent.reserved_bytes,
            "completed stale ingestion intent"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        IntentId, MockBlobStore, MockCompensationLog, MockQuotaAccountant, MockReferenceLedger,
        StorageError,
    };
    use crate::domain::entities::ContentBlob;
    use crate::domain::value_objects::{Fingerprint, TenantId};
    use std::path::PathBuf;
    use std::str::FromStr;
    use uuid::Uuid;

    fn reaper(
        ledger: MockReferenceLedger,
        store: MockBlobStore,
        quota: MockQuotaAccountant,
        log: MockCompensationLog,
    ) -> Reaper {
        Reaper::new(
            Arc::new(ledger),
            Arc::new(store),
            Arc::new(quota),
            Arc::new(log),
            Arc::new(FingerprintLockMap::new()),
            ReaperConfig::default(),
        )
    }

    fn stale_intent(staged_path: Option<PathBuf>) -> IngestIntent {
        IngestIntent {
            id: IntentId::generate(),
            tenant_id: TenantId::new(Uuid::new_v4()),
            reserved_bytes: 512,
            staged_path,
            created_at: Utc::now() - chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_stale_intent_is_fully_compensated() {
        let mut ledger = MockReferenceLedger::new();
        let mut store = MockBlobStore::new();
        let mut quota = MockQuotaAccountant::new();
        let mut log = MockCompensationLog::new();

        log.expect_find_stale()
            .times(1)
            .returning(|_, _| Ok(vec![stale_intent(Some(PathBuf::from("/data/staging/x")))]));
        store.expect_discard_path().times(1).returning(|_| Ok(()));
        quota
            .expect_release()
            .withf(|_, bytes| *bytes == 512)
            .times(1)
            .returning(|_, _| Ok(()));
        log.expect_clear().times(1).returning(|_| Ok(()));
        ledger.expect_find_orphaned().returning(|_| Ok(vec![]));

        let report = reaper(ledger, store, quota, log).run_once().await.unwrap();
        assert_eq!(report.intents_completed, 1);
        assert_eq!(report.blobs_reaped, 0);
    }

    #[tokio::test]
    async fn test_intent_without_staged_path_skips_discard() {
        let mut ledger = MockReferenceLedger::new();
        let store = MockBlobStore::new(); // discard_path must not be called
        let mut quota = MockQuotaAccountant::new();
        let mut log = MockCompensationLog::new();

        log.expect_find_stale()
            .times(1)
            .returning(|_, _| Ok(vec![stale_intent(None)]));
        quota.expect_release().times(1).returning(|_, _| Ok(()));
        log.expect_clear().times(1).returning(|_| Ok(()));
        ledger.expect_find_orphaned().returning(|_| Ok(vec![]));

        let report = reaper(ledger, store, quota, log).run_once().await.unwrap();
        assert_eq!(report.intents_completed, 1);
    }

    #[tokio::test]
    async fn test_discard_failure_leaves_intent_for_retry() {
        let mut ledger = MockReferenceLedger::new();
        let mut store = MockBlobStore::new();
        let quota = MockQuotaAccountant::new(); // release must not be called
        let mut log = MockCompensationLog::new(); // clear must not be called

        log.expect_find_stale()
            .times(1)
            .returning(|_, _| Ok(vec![stale_intent(Some(PathBuf::from("/data/staging/x")))]));
        store
            .expect_discard_path()
            .times(1)
            .returning(|_| Err(StorageError::Internal("disk unhappy".to_string())));
        ledger.expect_find_orphaned().returning(|_| Ok(vec![]));

        let report = reaper(ledger, store, quota, log).run_once().await.unwrap();
        assert_eq!(report.intents_completed, 0);
    }

    #[tokio::test]
    async fn test_orphaned_blob_is_reaped_after_recheck() {
        let mut ledger = MockReferenceLedger::new();
        let mut store = MockBlobStore::new();
        let quota = MockQuotaAccountant::new();
        let mut log = MockCompensationLog::new();

        log.expect_find_stale().returning(|_, _| Ok(vec![]));
        let fingerprint = Fingerprint::from_str(&"e".repeat(64)).unwrap();
        let orphan = ContentBlob::reconstruct(
            fingerprint.clone(),
            64,
            "sha256/ee/x".to_string(),
            0,
            Utc::now(),
        );
        ledger
            .expect_find_orphaned()
            .times(1)
            .returning(move |_| Ok(vec![orphan.clone()]));
        ledger
            .expect_delete_blob_if_unreferenced()
            .times(1)
            .returning(|_| Ok(true));
        store.expect_delete().times(1).returning(|_| Ok(()));

        let report = reaper(ledger, store, quota, log).run_once().await.unwrap();
        assert_eq!(report.blobs_reaped, 1);
    }

    #[tokio::test]
    async fn test_reattached_blob_is_spared() {
        let mut ledger = MockReferenceLedger::new();
        let store = MockBlobStore::new(); // delete must not be called
        let quota = MockQuotaAccountant::new();
        let mut log = MockCompensationLog::new();

        log.expect_find_stale().returning(|_, _| Ok(vec![]));
        let fingerprint = Fingerprint::from_str(&"e".repeat(64)).unwrap();
        let orphan = ContentBlob::reconstruct(
            fingerprint.clone(),
            64,
            "sha256/ee/x".to_string(),
            0,
            Utc::now(),
        );
        ledger
            .expect_find_orphaned()
            .times(1)
            .returning(move |_| Ok(vec![orphan.clone()]));
        // Someone attached between scan and re-check
        ledger
            .expect_delete_blob_if_unreferenced()
            .times(1)
            .returning(|_| Ok(false));

        let report = reaper(ledger, store, quota, log).run_once().await.unwrap();
        assert_eq!(report.blobs_reaped, 0);
    }
}
