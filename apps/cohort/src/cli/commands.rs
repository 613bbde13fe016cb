//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::{CohortConfig, StorageBackend};
use crate::node::{CohortNode, check_file_size, load_types};
use cohort_core::{
    CohortError, Guid, InstanceArchive, archive_crypto_hash, export_archive, load_archive,
    verify_archive_hash,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum archive size accepted by `load` (500 MB).
const MAX_ARCHIVE_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CohortError> {
    let canonical = path.canonicalize().map_err(|e| {
        CohortError::InvalidParameter(format!("Invalid file path '{}': {e}", path.display()))
    })?;

    if !canonical.is_file() {
        return Err(CohortError::InvalidParameter(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require it to be a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, CohortError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        CohortError::InvalidParameter(format!(
            "Invalid output directory '{}': {e}",
            parent.display()
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(CohortError::InvalidParameter(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| CohortError::InvalidParameter("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CohortError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CohortError::Repository(format!("Encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &CohortConfig) -> Result<(), CohortError> {
    let node = CohortNode::open(config)?;
    let addr = config.server_addr();

    println!("Cohort Repository Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Collection: {}", config.repository.metadata_collection_id);
    println!("  Listen:     {addr}");
    println!("  Backend:    {}", config.storage.backend);
    println!("  Store:      {}", config.storage.path.display());
    println!("  Read only:  {}", config.repository.read_only);
    println!();
    println!("Endpoints:");
    println!("  GET  /health                      - Health check");
    println!("  GET  /status                      - Identity, capabilities, metrics");
    println!("  *    /users/{{user}}/entities/...   - Entity lifecycle");
    println!("  *    /users/{{user}}/relationships/... - Relationship lifecycle");
    println!("  POST /users/{{user}}/reference-copies/... - Reference copies");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&addr, node, config.server.rate_limit).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show repository identity, capabilities and metrics.
pub fn cmd_status(config: &CohortConfig, json_mode: bool) -> Result<(), CohortError> {
    let node = CohortNode::open(config)?;
    let collection = node.collection();
    let metrics = collection.metrics()?;
    let capabilities = collection.capabilities();

    if json_mode {
        let output = serde_json::json!({
            "metadata_collection_id": collection.metadata_collection_id(),
            "metadata_collection_name": collection.metadata_collection_name(),
            "backend": config.storage.backend,
            "store": config.storage.path.to_string_lossy(),
            "capabilities": capabilities.iter().map(|op| op.name()).collect::<Vec<_>>(),
            "metrics": metrics,
        });
        return print_json(&output);
    }

    println!("Cohort Repository Status");
    println!("========================");
    println!(
        "Collection:   {} ({})",
        collection.metadata_collection_id(),
        collection.metadata_collection_name()
    );
    println!("Backend:      {}", config.storage.backend);
    println!("Store:        {}", config.storage.path.display());
    println!();
    println!(
        "Entities:      {} ({} deleted)",
        metrics.entity_count, metrics.deleted_entity_count
    );
    println!(
        "Relationships: {} ({} deleted)",
        metrics.relationship_count, metrics.deleted_relationship_count
    );
    println!("Proxies:       {}", metrics.proxy_count);
    println!("Ref copies:    {}", metrics.reference_copy_count);
    println!("Retired guids: {}", metrics.retired_count);
    println!();
    let unsupported: Vec<&str> = capabilities.unsupported().map(|op| op.name()).collect();
    if unsupported.is_empty() {
        println!("Capabilities: all operations supported");
    } else {
        println!("Capabilities: {} supported", capabilities.len());
        println!("Unsupported:  {}", unsupported.join(", "));
    }

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty store.
pub fn cmd_init(config: &CohortConfig, force: bool) -> Result<(), CohortError> {
    let path = &config.storage.path;
    if config.storage.backend == StorageBackend::Memory {
        println!("Memory backend keeps nothing on disk; nothing to initialize");
        return Ok(());
    }

    if path.exists() {
        if !force {
            return Err(CohortError::InvalidParameter(
                "Store already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path)
            .map_err(|e| CohortError::Repository(format!("Remove existing store: {e}")))?;
    }

    let node = CohortNode::open(config)?;
    node.save()?;
    println!(
        "Initialized new {} store at {}",
        config.storage.backend,
        path.display()
    );
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load an archive through the reference-copy path, then persist.
pub fn cmd_load(
    config: &CohortConfig,
    json_mode: bool,
    file: &Path,
    user: &str,
    expected_hash: Option<&str>,
) -> Result<(), CohortError> {
    tracing::info!("Loading archive from {:?}", file);

    let validated_path = validate_file_path(file)?;
    check_file_size(&validated_path, MAX_ARCHIVE_FILE_SIZE)?;
    let text = std::fs::read_to_string(&validated_path)
        .map_err(|e| CohortError::Repository(format!("Read archive: {e}")))?;
    let archive = InstanceArchive::from_json(&text)?;

    if let Some(expected) = expected_hash
        && !verify_archive_hash(&archive, expected)
    {
        return Err(CohortError::InvalidParameter(format!(
            "Archive '{}' does not match the expected BLAKE3 hash",
            archive.header.name
        )));
    }

    let node = CohortNode::open(config)?;
    let report = load_archive(node.collection().as_ref(), user, &archive)?;
    node.save()?;

    if json_mode {
        return print_json(&report);
    }

    println!("Loaded archive '{}'", archive.header.name);
    println!(
        "  Entities:      {} stored, {} ignored",
        report.entities_admitted, report.entities_ignored
    );
    println!(
        "  Relationships: {} stored, {} ignored",
        report.relationships_admitted, report.relationships_ignored
    );
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Export every non-deleted instance to a JSON archive.
pub fn cmd_export(
    config: &CohortConfig,
    output: &Path,
    name: &str,
    description: Option<&str>,
) -> Result<(), CohortError> {
    let validated_output = validate_output_path(output)?;

    let node = CohortNode::open(config)?;
    let archive = export_archive(node.collection().as_ref(), name, description)?;
    let data = archive.to_json_pretty()?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| CohortError::Repository(format!("Write file: {e}")))?;

    println!("Checksum: {}", archive.checksum());
    println!("BLAKE3:   {}", archive_crypto_hash(&archive)?);
    println!(
        "Exported {} instances ({} bytes) to {:?}",
        archive.instance_count(),
        data.len(),
        validated_output
    );
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Print an entity or relationship by guid.
pub fn cmd_show(config: &CohortConfig, guid: &str, user: &str) -> Result<(), CohortError> {
    let node = CohortNode::open(config)?;
    let collection = node.collection();
    let guid = Guid::new(guid);

    if let Some(entity) = collection.is_entity_known(user, &guid)? {
        return print_json(&entity);
    }
    if let Some(relationship) = collection.is_relationship_known(user, &guid)? {
        return print_json(&relationship);
    }
    match collection.instance_status(user, &guid)? {
        Some(status) => {
            println!("Instance {guid} is {status}");
            Ok(())
        }
        None => Err(CohortError::EntityNotKnown {
            guid: guid.to_string(),
        }),
    }
}

// =============================================================================
// TYPES COMMAND
// =============================================================================

/// List type definitions from the configured types file.
pub fn cmd_types(config: &CohortConfig, json_mode: bool) -> Result<(), CohortError> {
    let registry = load_types(config.types_file.as_deref())?;

    if json_mode {
        let defs: Vec<_> = registry.types().collect();
        return print_json(&defs);
    }

    if registry.is_empty() {
        println!("No type definitions loaded");
        return Ok(());
    }
    println!("{:<24} {:<14} {:<20} SUPERTYPE", "NAME", "KIND", "GUID");
    for def in registry.types() {
        println!(
            "{:<24} {:<14} {:<20} {}",
            def.name,
            def.kind.to_string(),
            def.guid,
            def.super_type.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
