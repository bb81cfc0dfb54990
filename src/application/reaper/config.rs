use std::time::Duration;

/// Configuration for the background reaper
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often a pass runs
    pub interval: Duration,
    /// Maximum stale intents / orphaned blobs processed per pass
    pub batch_size: i64,
    /// Age after which an uncleared ingestion intent is presumed crashed.
    /// Must comfortably exceed the ingestion timeout, or the reaper would
    /// compensate transactions that are still running.
    pub stale_intent_age: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 100,
            stale_intent_age: Duration::from_secs(900),
        }
    }
}
