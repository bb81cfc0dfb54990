use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid fingerprint: expected {expected}, got {actual}")]
    InvalidFingerprint { expected: String, actual: String },

    #[error("Invalid tenant ID: {0}")]
    InvalidTenantId(String),

    #[error("Invalid owner ID: {0}")]
    InvalidOwnerId(String),

    #[error("Payload size exceeds maximum allowed: {size} > {max}")]
    PayloadTooLarge { size: u64, max: u64 },
}
