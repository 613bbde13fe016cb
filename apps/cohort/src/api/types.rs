//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Instance bodies (`EntityDetail`, `Relationship`, `EntityProxy`,
//! `InstanceArchive`) use the cohort-core serialization unchanged, so an
//! instance fetched from one member can be posted to another as a reference
//! copy.

use cohort_core::{
    ArchiveLoadReport, Classification, ClassificationRequest, CohortError, EntityReference,
    ErrorCategory, Guid, InstanceArchive, InstanceProperties, InstanceStatus,
    MetadataCollectionId, RepositoryMetrics,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// RESPONSE ENVELOPE
// =============================================================================

/// Envelope for every repository operation.
///
/// Exactly one of `data` and `error` is set. `category` carries the error
/// class so clients can branch without parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

impl<T> ApiResponse<T> {
    /// Create a success response.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            category: None,
        }
    }

    /// Create an error response from a repository error.
    pub fn error(err: &CohortError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            category: Some(err.category()),
        }
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Repository status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub metadata_collection_id: MetadataCollectionId,
    pub metadata_collection_name: String,
    /// Names of the supported optional operations.
    pub capabilities: Vec<String>,
    pub metrics: RepositoryMetrics,
}

/// Administrative status lookup; `status` is absent for unknown guids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatusResponse {
    pub guid: Guid,
    pub status: Option<InstanceStatus>,
}

// =============================================================================
// ENTITY REQUESTS
// =============================================================================

/// Create a locally homed entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEntityRequest {
    pub type_guid: String,
    #[serde(default)]
    pub properties: InstanceProperties,
    #[serde(default)]
    pub classifications: Vec<ClassificationRequest>,
    pub status: Option<InstanceStatus>,
}

/// Create an entity homed in an external source this member replicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddExternalEntityRequest {
    pub type_guid: String,
    pub source_guid: MetadataCollectionId,
    pub source_name: Option<String>,
    #[serde(default)]
    pub properties: InstanceProperties,
    #[serde(default)]
    pub classifications: Vec<ClassificationRequest>,
    pub status: Option<InstanceStatus>,
}

// =============================================================================
// RELATIONSHIP REQUESTS
// =============================================================================

/// Create a locally homed relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddRelationshipRequest {
    pub type_guid: String,
    #[serde(default)]
    pub properties: InstanceProperties,
    pub entity_one_guid: Guid,
    pub entity_two_guid: Guid,
    pub status: Option<InstanceStatus>,
}

/// Create a relationship homed in an external source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddExternalRelationshipRequest {
    pub type_guid: String,
    pub source_guid: MetadataCollectionId,
    pub source_name: Option<String>,
    #[serde(default)]
    pub properties: InstanceProperties,
    pub entity_one_guid: Guid,
    pub entity_two_guid: Guid,
    pub status: Option<InstanceStatus>,
}

// =============================================================================
// SHARED INSTANCE REQUESTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: InstanceStatus,
}

/// Properties merged over the current ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertiesRequest {
    #[serde(default)]
    pub properties: InstanceProperties,
}

/// The caller's assertion of an instance's type, checked before the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeAssertion {
    pub type_guid: String,
    pub type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReTypeRequest {
    pub current_type_guid: String,
    pub current_type_name: String,
    pub new_type_guid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReHomeRequest {
    pub type_guid: String,
    pub type_name: String,
    pub home_metadata_collection_id: MetadataCollectionId,
    pub new_home_metadata_collection_id: MetadataCollectionId,
    pub new_home_metadata_collection_name: Option<String>,
}

// =============================================================================
// REFERENCE COPY REQUESTS
// =============================================================================

/// Purge a reference copy homed elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeReferenceCopyRequest {
    pub type_guid: String,
    pub type_name: String,
    pub home_metadata_collection_id: MetadataCollectionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReferenceCopyRequest {
    pub entity: EntityReference,
    pub classification: Classification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeClassificationReferenceCopyRequest {
    pub entity: EntityReference,
    pub classification_name: String,
}

// =============================================================================
// ARCHIVES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportArchiveRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Exported archive with its integrity checksums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportArchiveResponse {
    pub archive: InstanceArchive,
    pub checksum: u64,
    /// BLAKE3 hash of the archive's canonical JSON.
    pub hash: String,
}

/// Counts reported by an archive load.
pub type LoadArchiveResponse = ArchiveLoadReport;
