//! Store configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning for [`FileStore`](crate::store::FileStore)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Compress records with zstd
    pub compression: bool,
    /// zstd level
    pub compression_level: i32,
    /// Records shorter than this are stored raw
    pub compression_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            compression: true,
            compression_level: 3,
            compression_threshold: 64,
        }
    }
}

impl StoreConfig {
    /// Store every record raw
    pub fn uncompressed() -> Self {
        StoreConfig {
            compression: false,
            ..Default::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.compression);
        assert_eq!(config.compression_level, 3);
        assert!(!StoreConfig::uncompressed().compression);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{ "compression_level": 19 }"#).unwrap();

        let config = StoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.compression_level, 19);
        assert!(config.compression);
        assert_eq!(config.compression_threshold, 64);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StoreConfig::from_json_file(&path),
            Err(crate::Error::Json(_))
        ));
    }
}
