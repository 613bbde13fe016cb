//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Cohort instance store:
//! - Identifiers (`Guid`, `MetadataCollectionId`)
//! - Header enumerations (`InstanceStatus`, `InstanceProvenanceType`,
//!   `ClassificationOrigin`, `InstanceKind`)
//! - Typed property values (`PropertyValue`, `InstanceProperties`)
//! - Error types (`CohortError`, `ErrorCategory`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they are used as `BTreeMap`/`BTreeSet` keys

use crate::capability::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Globally unique identifier of an instance (entity, relationship or proxy).
///
/// Guids arriving from peers are arbitrary strings; guids minted locally are
/// random UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Wrap an existing guid string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Mint a fresh random guid.
    ///
    /// Callers that must avoid retired guids go through
    /// `InstanceStore::is_retired` as well; see `Repository`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the guid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the guid carries no characters (a structural defect).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a metadata collection (the home of an instance).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataCollectionId(String);

impl MetadataCollectionId {
    /// Create a collection id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MetadataCollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetadataCollectionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// HEADER ENUMERATIONS
// =============================================================================

/// Lifecycle status of an instance.
///
/// PURGED is not a status: a purged instance is simply absent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Draft,
    Prepared,
    #[default]
    Active,
    Deleted,
}

impl InstanceStatus {
    /// Get the status name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Prepared => "PREPARED",
            Self::Active => "ACTIVE",
            Self::Deleted => "DELETED",
        }
    }

    /// Position in the forward lifecycle (DRAFT < PREPARED < ACTIVE).
    #[must_use]
    pub const fn ordinal(&self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Prepared => 1,
            Self::Active => 2,
            Self::Deleted => 3,
        }
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared origin/authority class of an instance or classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceProvenanceType {
    LocalCohort,
    ExportArchive,
    ContentPack,
    Deduplicated,
    Configuration,
    ExternalSource,
    #[default]
    Unknown,
}

impl InstanceProvenanceType {
    /// Get the provenance name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalCohort => "LOCAL_COHORT",
            Self::ExportArchive => "EXPORT_ARCHIVE",
            Self::ContentPack => "CONTENT_PACK",
            Self::Deduplicated => "DEDUPLICATED",
            Self::Configuration => "CONFIGURATION",
            Self::ExternalSource => "EXTERNAL_SOURCE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Archive-sourced provenance vouches for itself, independent of home.
    #[must_use]
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::ContentPack | Self::ExportArchive)
    }
}

impl fmt::Display for InstanceProvenanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a classification came to be attached to an entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationOrigin {
    #[default]
    Assigned,
    Propagated,
}

/// The kind of instance a TypeDef describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceKind {
    Entity,
    Relationship,
    Classification,
}

impl InstanceKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Relationship => "relationship",
            Self::Classification => "classification",
        }
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type information carried in every instance header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceType {
    pub type_def_guid: String,
    pub type_def_name: String,
    pub category: InstanceKind,
}

impl InstanceType {
    #[must_use]
    pub fn new(
        type_def_guid: impl Into<String>,
        type_def_name: impl Into<String>,
        category: InstanceKind,
    ) -> Self {
        Self {
            type_def_guid: type_def_guid.into(),
            type_def_name: type_def_name.into(),
            category,
        }
    }

    /// True when the caller-asserted guid and name both match this type.
    #[must_use]
    pub fn matches(&self, type_def_guid: &str, type_def_name: &str) -> bool {
        self.type_def_guid == type_def_guid && self.type_def_name == type_def_name
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A typed attribute value.
///
/// Dates are epoch milliseconds; there is no floating-point variant.
/// Externally tagged so the same encoding works for JSON and postcard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Boolean(bool),
    Date(i64),
    Enum { ordinal: u32, symbolic_name: String },
    Array(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Short name of the value's kind, used in property error messages.
    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::String(_) => PropertyKind::String,
            Self::Int(_) => PropertyKind::Int,
            Self::Boolean(_) => PropertyKind::Boolean,
            Self::Date(_) => PropertyKind::Date,
            Self::Enum { .. } => PropertyKind::Enum,
            Self::Array(_) => PropertyKind::Array,
            Self::Map(_) => PropertyKind::Map,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// Declared kind of an attribute in a TypeDef.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    String,
    Int,
    Boolean,
    Date,
    Enum,
    Array,
    Map,
}

/// Attribute name -> value. Ordered for deterministic serialization.
pub type InstanceProperties = BTreeMap<String, PropertyValue>;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse classification of a `CohortError`.
///
/// Callers branch on the category: `Capability` is an expected outcome on
/// restricted repositories, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    TypeMismatch,
    Property,
    Capability,
    State,
    Integrity,
    Parameter,
    Infrastructure,
}

/// Errors that can occur in the Cohort instance store.
///
/// - Validation and state errors leave the store unchanged
/// - Infrastructure errors propagate unchanged and are never retried here
/// - The one deliberately silent path is provenance disqualification of a
///   reference copy, which returns `Ok(())` instead of an error
#[derive(Debug, Clone, Error)]
pub enum CohortError {
    /// The entity guid is absent, purged or soft-deleted.
    #[error("Entity not known: {guid}")]
    EntityNotKnown { guid: String },

    /// The relationship guid is absent, purged or soft-deleted.
    #[error("Relationship not known: {guid}")]
    RelationshipNotKnown { guid: String },

    /// The asserted or requested type does not match.
    #[error("Type error: {0}")]
    TypeError(String),

    /// The type definition itself is unusable.
    #[error("Invalid type definition: {0}")]
    InvalidTypeDef(String),

    /// Properties do not fit the type.
    #[error("Property error: {0}")]
    PropertyError(String),

    /// A classification is unknown, duplicated or not valid for the entity.
    #[error("Classification error: {0}")]
    ClassificationError(String),

    /// The operation is intentionally absent in this repository variant.
    #[error("Optional function not supported: {operation}")]
    FunctionNotSupported { operation: Operation },

    /// The requested status transition is not allowed.
    #[error("Status not supported: {0}")]
    StatusNotSupported(String),

    /// Purge or restore requested on an entity that is not soft-deleted.
    #[error("Entity not deleted: {guid}")]
    EntityNotDeleted { guid: String },

    /// Purge or restore requested on a relationship that is not soft-deleted.
    #[error("Relationship not deleted: {guid}")]
    RelationshipNotDeleted { guid: String },

    /// The entity is homed elsewhere (or locally, for reference-copy paths).
    #[error("Entity {guid} is homed in metadata collection {home}")]
    HomeEntity { guid: String, home: String },

    /// The relationship is homed elsewhere (or locally, for reference-copy paths).
    #[error("Relationship {guid} is homed in metadata collection {home}")]
    HomeRelationship { guid: String, home: String },

    /// Two different entities claim the same guid.
    #[error("Entity conflict: {0}")]
    EntityConflict(String),

    /// Two different relationships claim the same guid.
    #[error("Relationship conflict: {0}")]
    RelationshipConflict(String),

    /// A qualifying entity reference copy is malformed.
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// A qualifying relationship reference copy is malformed.
    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    /// A structural parameter check failed (blank user id, guid, name...).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Storage, serialization or I/O failure.
    #[error("Repository error: {0}")]
    Repository(String),

    /// The caller is not allowed to perform the operation.
    #[error("User not authorized: {user}")]
    UserNotAuthorized { user: String },
}

impl CohortError {
    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EntityNotKnown { .. } | Self::RelationshipNotKnown { .. } => {
                ErrorCategory::NotFound
            }
            Self::TypeError(_) | Self::InvalidTypeDef(_) => ErrorCategory::TypeMismatch,
            Self::PropertyError(_) | Self::ClassificationError(_) => ErrorCategory::Property,
            Self::FunctionNotSupported { .. } => ErrorCategory::Capability,
            Self::StatusNotSupported(_)
            | Self::EntityNotDeleted { .. }
            | Self::RelationshipNotDeleted { .. } => ErrorCategory::State,
            Self::HomeEntity { .. }
            | Self::HomeRelationship { .. }
            | Self::EntityConflict(_)
            | Self::RelationshipConflict(_)
            | Self::InvalidEntity(_)
            | Self::InvalidRelationship(_) => ErrorCategory::Integrity,
            Self::InvalidParameter(_) => ErrorCategory::Parameter,
            Self::Repository(_) | Self::UserNotAuthorized { .. } => ErrorCategory::Infrastructure,
        }
    }

    /// True for the capability-negotiation outcome.
    #[must_use]
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::FunctionNotSupported { .. })
    }

    pub(crate) fn entity_not_known(guid: &Guid) -> Self {
        Self::EntityNotKnown {
            guid: guid.to_string(),
        }
    }

    pub(crate) fn relationship_not_known(guid: &Guid) -> Self {
        Self::RelationshipNotKnown {
            guid: guid.to_string(),
        }
    }

    pub(crate) fn storage(e: impl fmt::Display) -> Self {
        Self::Repository(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_guids_are_distinct() {
        let a = Guid::generate();
        let b = Guid::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn blank_guid_is_empty() {
        assert!(Guid::new("   ").is_empty());
        assert!(Guid::new("").is_empty());
    }

    #[test]
    fn status_ordinals_follow_lifecycle() {
        assert!(InstanceStatus::Draft.ordinal() < InstanceStatus::Prepared.ordinal());
        assert!(InstanceStatus::Prepared.ordinal() < InstanceStatus::Active.ordinal());
        assert_eq!(InstanceStatus::default(), InstanceStatus::Active);
    }

    #[test]
    fn archive_provenance() {
        assert!(InstanceProvenanceType::ContentPack.is_archive());
        assert!(InstanceProvenanceType::ExportArchive.is_archive());
        assert!(!InstanceProvenanceType::LocalCohort.is_archive());
        assert!(!InstanceProvenanceType::Unknown.is_archive());
    }

    #[test]
    fn provenance_serializes_screaming_snake() {
        let json = serde_json::to_string(&InstanceProvenanceType::ContentPack).expect("json");
        assert_eq!(json, "\"CONTENT_PACK\"");
    }

    #[test]
    fn error_categories() {
        let e = CohortError::FunctionNotSupported {
            operation: Operation::AddEntity,
        };
        assert_eq!(e.category(), ErrorCategory::Capability);
        assert!(e.is_not_supported());
        assert!(e.to_string().contains("addEntity"));

        let e = CohortError::entity_not_known(&Guid::new("g1"));
        assert_eq!(e.category(), ErrorCategory::NotFound);
        assert!(!e.is_not_supported());
    }

    #[test]
    fn property_value_kinds() {
        assert_eq!(PropertyValue::from("x").kind(), PropertyKind::String);
        assert_eq!(PropertyValue::from(3i64).kind(), PropertyKind::Int);
        assert_eq!(PropertyValue::from(true).kind(), PropertyKind::Boolean);
    }
}
