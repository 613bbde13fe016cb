//! # Repository Node
//!
//! Opens the configured store, loads type definitions and wires the
//! repository together for the CLI and the HTTP server.

use crate::audit::TracingAuditSink;
use crate::config::{CohortConfig, StorageBackend};
use cohort_core::{
    CapabilitySet, CohortError, MemoryStore, MetadataCollection, RedbStore, Repository,
    TypeRegistry, store_from_bytes, store_to_bytes,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Largest type definition file accepted (10 MB).
const MAX_TYPES_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Largest snapshot file accepted (500 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// A repository opened from configuration.
pub struct CohortNode {
    collection: Arc<dyn MetadataCollection>,
    /// Set for the file backend, which saves the in-memory store explicitly.
    snapshot: Option<(Arc<Repository<MemoryStore>>, PathBuf)>,
    backend: StorageBackend,
}

impl std::fmt::Debug for CohortNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CohortNode")
            .field("metadata_collection_id", self.collection.metadata_collection_id())
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl CohortNode {
    /// Open the repository described by `config`.
    pub fn open(config: &CohortConfig) -> Result<Self, CohortError> {
        config.validate()?;
        let types = Arc::new(load_types(config.types_file.as_deref())?);
        let id = config.metadata_collection_id();
        let capabilities = if config.repository.read_only {
            CapabilitySet::read_only()
        } else {
            CapabilitySet::full()
        };

        let path = &config.storage.path;
        let node = match config.storage.backend {
            StorageBackend::Memory => {
                let repo = configure(
                    Repository::new(MemoryStore::new(), id, types)?,
                    config,
                    capabilities,
                );
                Self {
                    collection: Arc::new(repo),
                    snapshot: None,
                    backend: StorageBackend::Memory,
                }
            }
            StorageBackend::File => {
                let store = read_snapshot(path)?;
                let repo = Arc::new(configure(
                    Repository::new(store, id, types)?,
                    config,
                    capabilities,
                ));
                Self {
                    collection: repo.clone(),
                    snapshot: Some((repo, path.clone())),
                    backend: StorageBackend::File,
                }
            }
            StorageBackend::Redb => {
                let mut store = RedbStore::open(path)?;
                store.bind_collection_id(&id)?;
                let repo = configure(
                    Repository::new(store, id, types)?,
                    config,
                    capabilities,
                );
                Self {
                    collection: Arc::new(repo),
                    snapshot: None,
                    backend: StorageBackend::Redb,
                }
            }
        };

        tracing::info!(
            metadata_collection_id = %node.collection.metadata_collection_id(),
            backend = %node.backend,
            read_only = config.repository.read_only,
            "Repository opened"
        );
        Ok(node)
    }

    /// Wrap an already-built in-memory repository.
    #[must_use]
    pub fn in_memory(repo: Repository<MemoryStore>) -> Self {
        Self {
            collection: Arc::new(repo),
            snapshot: None,
            backend: StorageBackend::Memory,
        }
    }

    #[must_use]
    pub fn collection(&self) -> Arc<dyn MetadataCollection> {
        self.collection.clone()
    }

    #[must_use]
    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    /// Persist pending state. Only the file backend has anything to do.
    pub fn save(&self) -> Result<(), CohortError> {
        let Some((repo, path)) = &self.snapshot else {
            return Ok(());
        };
        let bytes = repo.with_store(store_to_bytes)?;

        // Write beside the target, then rename over it.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)
            .map_err(|e| CohortError::Repository(format!("Write snapshot: {e}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| CohortError::Repository(format!("Replace snapshot: {e}")))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Snapshot saved");
        Ok(())
    }
}

fn configure<S: cohort_core::InstanceStore>(
    repo: Repository<S>,
    config: &CohortConfig,
    capabilities: CapabilitySet,
) -> Repository<S> {
    repo.with_name(config.metadata_collection_name())
        .with_capabilities(capabilities)
        .with_audit(Arc::new(TracingAuditSink))
}

/// Load type definitions, or an empty registry when no file is configured.
pub fn load_types(path: Option<&Path>) -> Result<TypeRegistry, CohortError> {
    let Some(path) = path else {
        tracing::warn!("No types_file configured; every typed operation will fail with TypeError");
        return Ok(TypeRegistry::new());
    };
    check_file_size(path, MAX_TYPES_FILE_SIZE)?;
    let text = std::fs::read_to_string(path).map_err(|e| {
        CohortError::Repository(format!("Read types file '{}': {e}", path.display()))
    })?;
    let registry = TypeRegistry::from_json(&text)?;
    tracing::info!(path = %path.display(), types = registry.len(), "Type definitions loaded");
    Ok(registry)
}

fn read_snapshot(path: &Path) -> Result<MemoryStore, CohortError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No snapshot yet, starting empty");
        return Ok(MemoryStore::new());
    }
    check_file_size(path, MAX_SNAPSHOT_FILE_SIZE)?;
    let bytes = std::fs::read(path)
        .map_err(|e| CohortError::Repository(format!("Read snapshot: {e}")))?;
    store_from_bytes(&bytes)
}

pub(crate) fn check_file_size(path: &Path, max_size: u64) -> Result<(), CohortError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        CohortError::Repository(format!("Cannot read file metadata '{}': {e}", path.display()))
    })?;
    if metadata.len() > max_size {
        return Err(CohortError::InvalidParameter(format!(
            "File size {} bytes exceeds maximum allowed {max_size} bytes",
            metadata.len()
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cohort_core::{InstanceProperties, PropertyValue};

    const TYPES: &str = r#"[
        {"guid": "t-asset", "name": "Asset", "kind": "ENTITY",
         "attributes": [{"name": "qualifiedName", "kind": "string", "required": true, "unique": true}]}
    ]"#;

    fn config_in(dir: &Path, backend: StorageBackend, file: &str) -> CohortConfig {
        let types = dir.join("types.json");
        std::fs::write(&types, TYPES).expect("write types");
        let mut config = CohortConfig::default();
        config.types_file = Some(types);
        config.storage.backend = backend;
        config.storage.path = dir.join(file);
        config
    }

    fn add(node: &CohortNode, name: &str) -> cohort_core::Guid {
        let props = InstanceProperties::from([(
            "qualifiedName".to_string(),
            PropertyValue::from(name),
        )]);
        node.collection()
            .add_entity("tester", "t-asset", props, Vec::new(), None)
            .expect("add")
            .header
            .guid
    }

    #[test]
    fn file_backend_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path(), StorageBackend::File, "cohort.snapshot");

        let node = CohortNode::open(&config).expect("open");
        let guid = add(&node, "orders");
        node.save().expect("save");
        drop(node);

        let node = CohortNode::open(&config).expect("reopen");
        let entity = node
            .collection()
            .get_entity_detail("tester", &guid)
            .expect("entity survives");
        assert_eq!(entity.header.version, 1);
    }

    #[test]
    fn redb_backend_survives_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path(), StorageBackend::Redb, "cohort.db");

        let guid = {
            let node = CohortNode::open(&config).expect("open");
            add(&node, "orders")
        };

        let node = CohortNode::open(&config).expect("reopen");
        assert!(node.collection().get_entity_detail("tester", &guid).is_ok());
    }

    #[test]
    fn redb_database_bound_to_its_collection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config_in(dir.path(), StorageBackend::Redb, "cohort.db");
        drop(CohortNode::open(&config).expect("open"));

        config.repository.metadata_collection_id = "someone-else".to_string();
        assert!(CohortNode::open(&config).is_err());
    }

    #[test]
    fn read_only_node_refuses_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = config_in(dir.path(), StorageBackend::Memory, "unused");
        config.repository.read_only = true;

        let node = CohortNode::open(&config).expect("open");
        let err = node
            .collection()
            .add_entity("tester", "t-asset", InstanceProperties::new(), Vec::new(), None)
            .expect_err("read only");
        assert!(err.is_not_supported());
    }

    #[test]
    fn missing_types_file_gives_empty_registry() {
        let registry = load_types(None).expect("empty registry");
        assert!(registry.is_empty());
        assert!(load_types(Some(Path::new("/nonexistent/types.json"))).is_err());
    }
}
