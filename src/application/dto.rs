use serde::{Deserialize, Serialize};

/// DTO for an ingestion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub tenant_id: String,
    pub owner_id: String,
    /// Size the caller claims the stream has; quota is reserved against
    /// this before any byte is written. The actual streamed size settles
    /// the charge.
    pub declared_size_bytes: u64,
}

/// DTO for a completed ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub fingerprint: String,
    pub deduplicated: bool,
    pub owner_id: String,
}
