// shelfbase-core/src/config.rs
//! Layered configuration: defaults, then a TOML file, then environment

use crate::error::{Result, ShelfError};
use crate::logging::LogLevel;
use crate::store::StoreUri;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ENV_URI: &str = "SHELFBASE_URI";
pub const ENV_COLLECTION: &str = "SHELFBASE_COLLECTION";
pub const ENV_LOG: &str = "SHELFBASE_LOG";

pub const DEFAULT_URI: &str = "memory://";
pub const DEFAULT_COLLECTION: &str = "books";

/// Settings needed to reach the catalog
///
/// ```toml
/// uri = "file://./books.json"
/// collection = "books"
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShelfConfig {
    pub uri: String,
    pub collection: String,
    pub log_level: LogLevel,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        ShelfConfig {
            uri: DEFAULT_URI.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            log_level: LogLevel::Warn,
        }
    }
}

impl ShelfConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ShelfError::InvalidArgument(format!("Failed to parse config: {}", e)))
    }

    /// Defaults overlaid with `path` (when given) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    ShelfError::InvalidArgument(format!(
                        "cannot read config {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from an environment lookup; empty values are ignored
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(uri) = get(ENV_URI) {
            self.uri = uri;
        }
        if let Some(collection) = get(ENV_COLLECTION) {
            self.collection = collection;
        }
        if let Some(level) = get(ENV_LOG) {
            self.log_level = level.parse()?;
        }
        Ok(())
    }

    pub fn store_uri(&self) -> Result<StoreUri> {
        self.uri.parse()
    }

    pub fn validate(&self) -> Result<()> {
        self.store_uri()?;
        if self.collection.trim().is_empty() {
            return Err(ShelfError::InvalidArgument(
                "collection name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ShelfConfig::default();
        assert_eq!(config.uri, "memory://");
        assert_eq!(config.collection, "books");
        assert_eq!(config.log_level, LogLevel::Warn);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ShelfConfig::from_toml_str("log_level = \"debug\"\n").unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.collection, "books");

        assert!(ShelfConfig::from_toml_str("colection = \"x\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shelfbase.toml");
        fs::write(&path, "uri = \"memory://file\"\ncollection = \"library\"\n").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut config = ShelfConfig::from_toml_str(&content).unwrap();
        let env: HashMap<&str, &str> = [(ENV_COLLECTION, "archive"), (ENV_LOG, "INFO"), (ENV_URI, "")]
            .into_iter()
            .collect();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.uri, "memory://file");
        assert_eq!(config.collection, "archive");
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_bad_env_level_is_rejected() {
        let mut config = ShelfConfig::default();
        let err = config
            .apply_env(|key| (key == ENV_LOG).then(|| "loud".to_string()))
            .unwrap_err();
        assert!(matches!(err, ShelfError::InvalidArgument(_)));
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        assert!(ShelfConfig::load(Some(temp.path().join("absent.toml").as_path())).is_err());
    }

    #[test]
    fn test_validate_uri() {
        let config = ShelfConfig {
            uri: "postgres://db".to_string(),
            ..ShelfConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
