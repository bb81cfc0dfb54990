use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use crate::application::{
    locks::FingerprintLockMap,
    ports::{BlobStore, CompensationLog, QuotaAccountant, ReferenceLedger},
    reaper::Reaper,
    use_cases::{IngestUseCase, InspectUseCase, ReleaseUseCase},
};
use crate::config::Config;
use crate::infrastructure::{
    persistence::{
        connect, SqliteCompensationLog, SqliteQuotaAccountant, SqliteReferenceLedger,
    },
    storage::LocalFilesystemStore,
};

/// Fully wired application: use cases plus the background reaper
pub struct Application {
    pub ingest: Arc<IngestUseCase>,
    pub release: Arc<ReleaseUseCase>,
    pub inspect: Arc<InspectUseCase>,
    pub reaper: Arc<Reaper>,
}

/// Application builder for clean dependency injection and setup
pub struct ApplicationBuilder {
    config: Config,
    pool: Option<SqlitePool>,
    ledger: Option<Arc<dyn ReferenceLedger>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    quota: Option<Arc<dyn QuotaAccountant>>,
    compensation_log: Option<Arc<dyn CompensationLog>>,
}

impl ApplicationBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pool: None,
            ledger: None,
            blob_store: None,
            quota: None,
            compensation_log: None,
        }
    }

    /// Open the ledger database and apply the schema
    pub async fn with_database(mut self) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Opening ledger database: {:?}", self.config.database_path);
        let pool = connect(&self.config.database_path).await?;
        self.pool = Some(pool);
        Ok(self)
    }

    /// Initialize infrastructure layer (ledger adapters and blob storage)
    pub async fn with_infrastructure(mut self) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = self.pool.as_ref().ok_or("Database pool not initialized")?;

        let ledger: Arc<dyn ReferenceLedger> =
            Arc::new(SqliteReferenceLedger::new(pool.clone()));
        let quota: Arc<dyn QuotaAccountant> = Arc::new(SqliteQuotaAccountant::new(
            pool.clone(),
            self.config.default_quota_limit_bytes,
        ));
        let compensation_log: Arc<dyn CompensationLog> =
            Arc::new(SqliteCompensationLog::new(pool.clone()));

        let blob_store = Arc::new(LocalFilesystemStore::with_options(
            self.config.storage_root.clone(),
            self.config.durable_writes,
            true, // precreate_dirs
        ));
        blob_store.init().await?;
        let blob_store: Arc<dyn BlobStore> = blob_store;

        self.ledger = Some(ledger);
        self.quota = Some(quota);
        self.compensation_log = Some(compensation_log);
        self.blob_store = Some(blob_store);

        info!("Infrastructure layer initialized");
        Ok(self)
    }

    /// Build the application with all use cases and the reaper
    pub fn build(self) -> Result<Application, Box<dyn std::error::Error>> {
        let ledger = self.ledger.ok_or("Reference ledger not initialized")?;
        let blob_store = self.blob_store.ok_or("Blob store not initialized")?;
        let quota = self.quota.ok_or("Quota accountant not initialized")?;
        let compensation_log = self
            .compensation_log
            .ok_or("Compensation log not initialized")?;

        // One lock map shared by everything that touches ledger + filesystem
        // for the same fingerprint
        let locks = Arc::new(FingerprintLockMap::new());

        let ingest = Arc::new(IngestUseCase::new(
            Arc::clone(&ledger),
            Arc::clone(&blob_store),
            Arc::clone(&quota),
            Arc::clone(&compensation_log),
            Arc::clone(&locks),
            self.config.ingest_policy(),
        ));

        let release = Arc::new(ReleaseUseCase::new(
            Arc::clone(&ledger),
            Arc::clone(&blob_store),
            Arc::clone(&quota),
            Arc::clone(&locks),
        ));

        let inspect = Arc::new(InspectUseCase::new(
            Arc::clone(&ledger),
            Arc::clone(&blob_store),
            Arc::clone(&quota),
        ));

        let reaper = Arc::new(Reaper::new(
            ledger,
            blob_store,
            quota,
            compensation_log,
            locks,
            self.config.reaper_config(),
        ));

        info!("Application layer initialized");

        Ok(Application {
            ingest,
            release,
            inspect,
            reaper,
        })
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
