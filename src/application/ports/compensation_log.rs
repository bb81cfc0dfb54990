use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::{automock, predicate::*};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::TenantId;

#[derive(Debug, Error)]
pub enum CompensationLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Identifier of a recorded compensation intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntentId(Uuid);

impl IntentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Durable record of what an abandoned ingestion would need rolled back:
/// the quota reservation to release and the staging file to unlink.
#[derive(Debug, Clone)]
pub struct IngestIntent {
    pub id: IntentId,
    pub tenant_id: TenantId,
    pub reserved_bytes: u64,
    pub staged_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// Port for the write-ahead compensation log.
///
/// The intent is recorded *before* the risky forward operation and cleared
/// only on confirmed success or completed rollback, so the reaper can
/// finish compensations for transactions the process never got to unwind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompensationLog: Send + Sync {
    /// Record a pending rollback intent for a reservation about to be made
    async fn record(
        &self,
        tenant_id: &TenantId,
        reserved_bytes: u64,
    ) -> Result<IntentId, CompensationLogError>;

    /// Attach the staging path once bytes have landed on disk
    async fn mark_staged(&self, id: &IntentId, path: &Path) -> Result<(), CompensationLogError>;

    /// Clear an intent after confirmed success or completed rollback.
    /// Idempotent: clearing an absent intent is success.
    async fn clear(&self, id: &IntentId) -> Result<(), CompensationLogError>;

    /// Find intents older than `older_than` for the reaper to complete
    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IngestIntent>, CompensationLogError>;
}
