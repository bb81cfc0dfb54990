use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

/// SHA-256 content fingerprint (32 bytes = 64 hex chars).
///
/// Serves as the content-addressable primary key: byte-identical payloads
/// always map to the same fingerprint, which is what makes deduplication
/// and reference counting possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Create from validated hex string
    pub fn from_hex(hex: String) -> Result<Self, DomainError> {
        if hex.len() != 64 {
            return Err(DomainError::InvalidFingerprint {
                expected: "64 hex characters".to_string(),
                actual: format!("{} characters", hex.len()),
            });
        }

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidFingerprint {
                expected: "hex characters only".to_string(),
                actual: hex,
            });
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Create from a raw 32-byte digest
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    /// Get hex string representation
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Get first 2 characters for directory fan-out
    pub fn prefix(&self) -> &str {
        &self.0[0..2]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.to_string())
    }
}
