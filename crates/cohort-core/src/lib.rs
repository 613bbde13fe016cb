//! # cohort-core
//!
//! The repository instance store for Cohort - THE LOGIC.
//!
//! A cohort is a set of peer repositories, each holding part of a shared
//! graph of typed entities, relationships and classifications. Every instance
//! has exactly one **home** repository; other peers hold **reference copies**.
//!
//! This crate implements:
//! - the instance lifecycle (create, update, soft-delete, purge, restore)
//! - identity reassignment (re-identify, re-type, re-home)
//! - the provenance gate deciding which reference copies are stored
//! - capability negotiation (`CapabilitySet`) and restricted variants
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Deterministic storage order: `BTreeMap` only
//! - Integer arithmetic only
//! - Type validation and auditing are injected collaborators, never globals

// =============================================================================
// MODULES
// =============================================================================

pub mod archive;
pub mod audit;
pub mod capability;
pub mod formats;
mod identity;
pub mod instance;
mod lifecycle;
pub mod locks;
pub mod memory;
pub mod primitives;
pub mod provenance;
pub mod repository;
pub mod restricted;
pub mod storage;
pub mod store;
pub mod system;
pub mod typedef;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ClassificationOrigin, CohortError, ErrorCategory, Guid, InstanceKind, InstanceProperties,
    InstanceProvenanceType, InstanceStatus, InstanceType, MetadataCollectionId, PropertyKind,
    PropertyValue,
};

// =============================================================================
// RE-EXPORTS: Instance Model
// =============================================================================

pub use instance::{
    Classification, ClassificationRequest, EntityDetail, EntityProxy, EntityReference,
    InstanceHeader, Relationship,
};

// =============================================================================
// RE-EXPORTS: Repository
// =============================================================================

pub use archive::{ArchiveHeader, ArchiveLoadReport, InstanceArchive, export_archive, load_archive};
pub use audit::{AuditEvent, AuditSeverity, AuditSink, MemoryAuditSink, NullAuditSink};
pub use capability::{CapabilitySet, Operation};
pub use memory::{MemoryStore, SerializableStore};
pub use provenance::ProvenanceGate;
pub use repository::{MetadataCollection, Repository};
pub use restricted::RestrictedRepository;
pub use storage::RedbStore;
pub use store::{Change, ChangeSet, InstanceStore};
pub use typedef::{AttributeDef, TypeDef, TypeRegistry, TypeValidator};

#[cfg(feature = "crypto-hash")]
pub use archive::{archive_crypto_hash, verify_archive_hash};

// =============================================================================
// RE-EXPORTS: Formats and System
// =============================================================================

pub use formats::{PersistenceHeader, store_from_bytes, store_to_bytes};
pub use system::RepositoryMetrics;
