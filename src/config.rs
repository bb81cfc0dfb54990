use std::path::PathBuf;
use std::time::Duration;

use crate::application::reaper::ReaperConfig;
use crate::application::use_cases::IngestPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub storage_root: PathBuf,
    pub max_payload_bytes: u64,
    pub default_quota_limit_bytes: u64,
    /// Whether a deduplicated reference counts against tenant quota
    pub charge_dedup_references: bool,
    pub ingest_timeout_secs: u64,
    pub durable_writes: bool,
    // Reaper settings
    pub reaper_interval_secs: u64,
    pub reaper_batch_size: i64,
    pub stale_intent_age_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/ledger.db")),
            storage_root: std::env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/blobs")),
            max_payload_bytes: std::env::var("MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256 * 1024 * 1024), // 256 MiB
            default_quota_limit_bytes: std::env::var("DEFAULT_QUOTA_LIMIT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10 * 1024 * 1024 * 1024), // 10 GiB
            charge_dedup_references: std::env::var("CHARGE_DEDUP_REFERENCES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            ingest_timeout_secs: std::env::var("INGEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            durable_writes: std::env::var("DURABLE_WRITES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            reaper_interval_secs: std::env::var("REAPER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            reaper_batch_size: std::env::var("REAPER_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            stale_intent_age_secs: std::env::var("STALE_INTENT_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(900), // 15 minutes
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_payload_bytes == 0 {
            return Err("MAX_PAYLOAD_BYTES must be positive".to_string());
        }

        if self.ingest_timeout_secs == 0 {
            return Err("INGEST_TIMEOUT_SECS must be positive".to_string());
        }

        if self.reaper_interval_secs < 10 {
            return Err("REAPER_INTERVAL_SECS must be at least 10 seconds".to_string());
        }

        if self.reaper_batch_size < 1 || self.reaper_batch_size > 1000 {
            return Err("REAPER_BATCH_SIZE must be between 1 and 1000".to_string());
        }

        // A fresh intent always belongs to a transaction that may still be
        // running; the reaper must only ever see truly abandoned ones
        if self.stale_intent_age_secs <= self.ingest_timeout_secs {
            return Err(
                "STALE_INTENT_AGE_SECS must exceed INGEST_TIMEOUT_SECS".to_string(),
            );
        }

        Ok(())
    }

    pub fn ingest_policy(&self) -> IngestPolicy {
        IngestPolicy {
            max_payload_bytes: self.max_payload_bytes,
            charge_dedup_references: self.charge_dedup_references,
            timeout: Duration::from_secs(self.ingest_timeout_secs),
        }
    }

    pub fn reaper_config(&self) -> ReaperConfig {
        ReaperConfig {
            interval: Duration::from_secs(self.reaper_interval_secs),
            batch_size: self.reaper_batch_size,
            stale_intent_age: Duration::from_secs(self.stale_intent_age_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_path: PathBuf::from("/tmp/ledger.db"),
            storage_root: PathBuf::from("/tmp/blobs"),
            max_payload_bytes: 1024,
            default_quota_limit_bytes: 4096,
            charge_dedup_references: false,
            ingest_timeout_secs: 60,
            durable_writes: false,
            reaper_interval_secs: 300,
            reaper_batch_size: 100,
            stale_intent_age_secs: 900,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_stale_age_must_exceed_ingest_timeout() {
        let config = Config {
            stale_intent_age_secs: 30,
            ingest_timeout_secs: 60,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_payload_rejected() {
        let config = Config {
            max_payload_bytes: 0,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }
}
