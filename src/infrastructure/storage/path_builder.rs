use std::path::PathBuf;

use crate::domain::value_objects::Fingerprint;

/// Utility for generating storage paths
pub struct PathBuilder {
    root: PathBuf,
}

impl PathBuilder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Generate staging path: <root>/staging/{uuid}
    pub fn staging_path(&self, id: uuid::Uuid) -> PathBuf {
        self.root.join("staging").join(id.to_string())
    }

    /// Whether a path points directly into this root's staging directory
    pub fn is_staging_path(&self, path: &std::path::Path) -> bool {
        path.parent() == Some(self.root.join("staging").as_path())
    }

    /// Generate final content-addressable path: <root>/sha256/{prefix}/{hex}
    pub fn final_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join("sha256")
            .join(fingerprint.prefix())
            .join(fingerprint.as_hex())
    }

    /// Storage location string recorded in the ledger, relative to the root
    pub fn storage_location(&self, fingerprint: &Fingerprint) -> String {
        format!("sha256/{}/{}", fingerprint.prefix(), fingerprint.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_final_path_fans_out_by_prefix() {
        let builder = PathBuilder::new(PathBuf::from("/data"));
        let fingerprint = Fingerprint::from_str(&("ab".to_string() + &"0".repeat(62))).unwrap();

        let path = builder.final_path(&fingerprint);
        assert!(path.starts_with("/data/sha256/ab"));
        assert!(path.ends_with(fingerprint.as_hex()));
    }

    #[test]
    fn test_storage_location_matches_final_path() {
        let builder = PathBuilder::new(PathBuf::from("/data"));
        let fingerprint = Fingerprint::from_str(&"c".repeat(64)).unwrap();

        let location = builder.storage_location(&fingerprint);
        assert_eq!(builder.final_path(&fingerprint), builder.root().join(location));
    }
}
