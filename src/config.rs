//! Process-level configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional JSON file, then `VECTRA_*` environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::vector::core::distance::DistanceMetric;
use crate::vector::index::config::HnswIndexConfig;

/// Default dimension for indexes created without an explicit one.
pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding index snapshots.
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| VectraError::invalid_config(format!("Unknown log level: {}", self.level)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectraConfig {
    /// Defaults for newly created vector indexes.
    #[serde(default = "default_vector_search")]
    pub vector_search: HnswIndexConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_vector_search() -> HnswIndexConfig {
    HnswIndexConfig::new(DEFAULT_DIMENSION)
}

impl Default for VectraConfig {
    fn default() -> Self {
        Self {
            vector_search: default_vector_search(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl VectraConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VectraError::invalid_config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `VECTRA_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let search = &mut self.vector_search;
        if let Some(value) = lookup("VECTRA_VECTOR_DIMENSION") {
            search.dimension = parse_env("VECTRA_VECTOR_DIMENSION", &value)?;
        }
        if let Some(value) = lookup("VECTRA_HNSW_M") {
            search.m = parse_env("VECTRA_HNSW_M", &value)?;
        }
        if let Some(value) = lookup("VECTRA_HNSW_EF_CONSTRUCTION") {
            search.ef_construction = parse_env("VECTRA_HNSW_EF_CONSTRUCTION", &value)?;
        }
        if let Some(value) = lookup("VECTRA_HNSW_EF") {
            search.ef_search = parse_env("VECTRA_HNSW_EF", &value)?;
        }
        if let Some(value) = lookup("VECTRA_DISTANCE_METRIC") {
            search.distance_metric = DistanceMetric::parse_str(&value)?;
        }
        if let Some(value) = lookup("VECTRA_MAX_ELEMENTS") {
            search.max_elements = Some(parse_env("VECTRA_MAX_ELEMENTS", &value)?);
        }
        if let Some(value) = lookup("VECTRA_SEARCH_THREADS") {
            search.search_threads = parse_env("VECTRA_SEARCH_THREADS", &value)?;
        }
        if let Some(value) = lookup("VECTRA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("VECTRA_LOG_LEVEL") {
            self.logging.level = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.vector_search.validate()?;
        self.logging.level_filter()?;
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VectraError::invalid_config(format!("Invalid value '{value}' for {key}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = VectraConfig::default();
        assert_eq!(config.vector_search.dimension, 384);
        assert_eq!(config.vector_search.m, 16);
        assert_eq!(config.vector_search.ef_construction, 200);
        assert_eq!(config.vector_search.ef_search, 50);
        assert_eq!(config.vector_search.distance_metric, DistanceMetric::Cosine);
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = VectraConfig::default();
        config
            .apply_env(env_of(&[
                ("VECTRA_VECTOR_DIMENSION", "768"),
                ("VECTRA_HNSW_M", "32"),
                ("VECTRA_DISTANCE_METRIC", "l2"),
                ("VECTRA_DATA_DIR", "/var/lib/vectra"),
                ("VECTRA_LOG_LEVEL", "debug"),
            ]))
            .unwrap();

        assert_eq!(config.vector_search.dimension, 768);
        assert_eq!(config.vector_search.m, 32);
        assert_eq!(config.vector_search.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/vectra"));
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = VectraConfig::default();
        assert!(matches!(
            config.apply_env(env_of(&[("VECTRA_HNSW_M", "many")])),
            Err(VectraError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            config.apply_env(env_of(&[("VECTRA_DISTANCE_METRIC", "hamming")])),
            Err(VectraError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"vector_search":{{"dimension":8,"m":4,"ef_construction":16,"ef_search":8,"distance_metric":"manhattan"}},"logging":{{"level":"warn"}}}}"#
        )
        .unwrap();

        let config = VectraConfig::from_file(file.path()).unwrap();
        assert_eq!(config.vector_search.dimension, 8);
        assert_eq!(config.vector_search.distance_metric, DistanceMetric::Manhattan);
        assert_eq!(config.storage, StorageSettings::default());
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::Warn);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = VectraConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
