//! # Configuration
//!
//! `cohort.toml` with environment and command-line overrides.
//!
//! ```toml
//! types_file = "demos/types.json"
//!
//! [repository]
//! metadata_collection_id = "cohort-local"
//! metadata_collection_name = "Local Cohort Member"
//! read_only = false
//!
//! [storage]
//! backend = "redb"      # memory | file | redb
//! path = "cohort.db"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! rate_limit = 100
//! ```
//!
//! Precedence, lowest first: built-in defaults, the file, `COHORT_*`
//! environment variables, command-line flags.

use cohort_core::{CohortError, MetadataCollectionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "cohort.toml";

/// Largest config file accepted (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CohortConfig {
    pub repository: RepositoryConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    /// JSON type definitions loaded into the type registry.
    pub types_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    pub metadata_collection_id: String,
    pub metadata_collection_name: Option<String>,
    /// Serve only reads and reference-copy saves.
    pub read_only: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            metadata_collection_id: "cohort-local".to_string(),
            metadata_collection_name: None,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redb,
            path: PathBuf::from("cohort.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: 100,
        }
    }
}

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Where instances live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing persisted.
    Memory,
    /// In-memory store saved as a postcard snapshot file.
    File,
    /// ACID redb database.
    #[default]
    Redb,
}

impl StorageBackend {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Redb => "redb",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StorageBackend {
    type Err = CohortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "redb" => Ok(Self::Redb),
            other => Err(CohortError::InvalidParameter(format!(
                "Unknown storage backend '{other}' (expected memory, file or redb)"
            ))),
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl CohortConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, CohortError> {
        toml::from_str(text)
            .map_err(|e| CohortError::InvalidParameter(format!("Invalid configuration: {e}")))
    }

    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `cohort.toml` in the working
    /// directory is used when present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CohortError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    tracing::debug!("No {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            CohortError::Repository(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(CohortError::InvalidParameter(format!(
                "Config file size {} bytes exceeds maximum allowed {MAX_CONFIG_FILE_SIZE} bytes",
                metadata.len()
            )));
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            CohortError::Repository(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Apply `COHORT_*` environment overrides.
    ///
    /// - `COHORT_METADATA_COLLECTION_ID`
    /// - `COHORT_BACKEND`
    /// - `COHORT_DATABASE`
    /// - `COHORT_TYPES_FILE`
    /// - `COHORT_RATE_LIMIT`
    pub fn apply_env(&mut self) -> Result<(), CohortError> {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), CohortError> {
        if let Some(id) = lookup("COHORT_METADATA_COLLECTION_ID") {
            self.repository.metadata_collection_id = id;
        }
        if let Some(backend) = lookup("COHORT_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(path) = lookup("COHORT_DATABASE") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(path) = lookup("COHORT_TYPES_FILE") {
            self.types_file = Some(PathBuf::from(path));
        }
        if let Some(limit) = lookup("COHORT_RATE_LIMIT") {
            self.server.rate_limit = limit.parse().map_err(|_| {
                CohortError::InvalidParameter(format!("COHORT_RATE_LIMIT '{limit}' is not a number"))
            })?;
        }
        Ok(())
    }

    /// Reject configurations the repository cannot start with.
    pub fn validate(&self) -> Result<(), CohortError> {
        if self.repository.metadata_collection_id.trim().is_empty() {
            return Err(CohortError::InvalidParameter(
                "repository.metadata_collection_id must not be blank".to_string(),
            ));
        }
        if self.storage.backend != StorageBackend::Memory
            && self.storage.path.as_os_str().is_empty()
        {
            return Err(CohortError::InvalidParameter(format!(
                "storage.path is required for the {} backend",
                self.storage.backend
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn metadata_collection_id(&self) -> MetadataCollectionId {
        MetadataCollectionId::new(self.repository.metadata_collection_id.clone())
    }

    /// Display name, defaulting to the collection id.
    #[must_use]
    pub fn metadata_collection_name(&self) -> String {
        self.repository
            .metadata_collection_name
            .clone()
            .unwrap_or_else(|| self.repository.metadata_collection_id.clone())
    }

    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn empty_document_gives_defaults() {
        let config = CohortConfig::from_toml("").expect("parse");
        assert_eq!(config, CohortConfig::default());
        assert_eq!(config.storage.backend, StorageBackend::Redb);
        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn sections_parse() {
        let config = CohortConfig::from_toml(
            r#"
            types_file = "types.json"

            [repository]
            metadata_collection_id = "peer-7"
            read_only = true

            [storage]
            backend = "file"
            path = "peer.snapshot"

            [server]
            port = 9090
            "#,
        )
        .expect("parse");
        assert_eq!(config.metadata_collection_id().as_str(), "peer-7");
        assert_eq!(config.metadata_collection_name(), "peer-7");
        assert!(config.repository.read_only);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.types_file, Some(PathBuf::from("types.json")));
    }

    #[test]
    fn demo_config_parses() {
        let config = CohortConfig::from_toml(include_str!("../../../demos/cohort.toml"))
            .expect("demo config");
        assert_eq!(config.metadata_collection_name(), "Local Cohort Member");
        assert_eq!(config.types_file, Some(PathBuf::from("demos/types.json")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(CohortConfig::from_toml("[storage]\nengine = \"redb\"").is_err());
        assert!(CohortConfig::from_toml("[storage]\nbackend = \"sqlite\"").is_err());
    }

    #[test]
    fn overrides_apply() {
        let vars: BTreeMap<&str, &str> = [
            ("COHORT_BACKEND", "memory"),
            ("COHORT_RATE_LIMIT", "0"),
            ("COHORT_METADATA_COLLECTION_ID", "override"),
        ]
        .into_iter()
        .collect();
        let mut config = CohortConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()))
            .expect("overrides");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.server.rate_limit, 0);
        assert_eq!(config.repository.metadata_collection_id, "override");

        let mut config = CohortConfig::default();
        assert!(
            config
                .apply_overrides(|key| (key == "COHORT_RATE_LIMIT").then(|| "fast".to_string()))
                .is_err()
        );
    }

    #[test]
    fn validation() {
        let mut config = CohortConfig::default();
        assert!(config.validate().is_ok());
        config.repository.metadata_collection_id = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = CohortConfig::default();
        config.storage.path = PathBuf::new();
        assert!(config.validate().is_err());
        config.storage.backend = StorageBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backend_names_roundtrip() {
        for backend in [StorageBackend::Memory, StorageBackend::File, StorageBackend::Redb] {
            assert_eq!(backend.name().parse::<StorageBackend>().ok(), Some(backend));
        }
        assert!("REDB".parse::<StorageBackend>().is_ok());
    }
}
