//! Index manager configuration

use crate::container::DEFAULT_CHUNK_LIMIT;
use crate::error::{IndexError, Result};
use crate::index::IndexLocation;
use serde::{Deserialize, Serialize};

/// Configuration for a [`FeatureIndexManager`](crate::FeatureIndexManager).
///
/// # Examples
///
/// ```rust
/// use gpkg_index::{IndexConfig, IndexLocation};
///
/// let config = IndexConfig::default()
///     .with_location(IndexLocation::RangeTree)
///     .with_chunk_limit(250);
/// assert_eq!(config.chunk_limit, 250);
///
/// let parsed = IndexConfig::from_json_str(r#"{"location": "none"}"#).unwrap();
/// assert_eq!(parsed.location, IndexLocation::None);
/// assert!(!parsed.continue_on_error);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index location selected when the manager is created
    pub location: IndexLocation,

    /// Rows read per lock acquisition while scanning a table
    pub chunk_limit: usize,

    /// Log and skip rows that fail to index instead of aborting the rebuild
    pub continue_on_error: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            location: IndexLocation::default(),
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            continue_on_error: false,
        }
    }
}

impl IndexConfig {
    pub fn with_location(mut self, location: IndexLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_chunk_limit(mut self, chunk_limit: usize) -> Self {
        self.chunk_limit = chunk_limit;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_limit == 0 {
            return Err(IndexError::Config(
                "chunk_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| IndexError::Config(e.to_string()))
    }

    /// Parse from TOML. Missing fields take their defaults.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| IndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.location, IndexLocation::ExtensionTable);
        assert_eq!(config.chunk_limit, DEFAULT_CHUNK_LIMIT);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_json_round_trip() {
        let config = IndexConfig::default()
            .with_location(IndexLocation::RangeTree)
            .with_continue_on_error(true);
        let json = config.to_json_string().unwrap();
        assert_eq!(IndexConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            IndexConfig::from_json_str(r#"{"chunk_limit": 0}"#),
            Err(IndexError::Config(_))
        ));
        assert!(matches!(
            IndexConfig::from_json_str(r#"{"location": "btree"}"#),
            Err(IndexError::Config(_))
        ));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml() {
        let config = IndexConfig::from_toml_str(
            r#"
            location = "range_tree"
            chunk_limit = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.location, IndexLocation::RangeTree);
        assert_eq!(config.chunk_limit, 64);
    }
}
