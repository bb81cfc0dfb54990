use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainError;

/// Validated owner identifier.
///
/// An owner is the logical record (catalog entry, document, upload) that
/// claims stored content. One owner holds at most one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, DomainError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidOwnerId(e.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OwnerId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_round_trip() {
        let owner = OwnerId::generate();
        let parsed = OwnerId::from_string(&owner.to_string()).unwrap();
        assert_eq!(parsed, owner);
    }

    #[test]
    fn test_owner_id_rejects_garbage() {
        assert!(OwnerId::from_string("not-a-uuid").is_err());
    }
}
