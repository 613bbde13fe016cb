//! # Instance Archives
//!
//! JSON documents carrying entities and relationships between repositories
//! outside the peer protocol: content packs, exports and backups.
//!
//! Loading never writes directly. Every instance goes through the
//! collection's `save_*_reference_copy` operations, so the provenance gate,
//! type validation and version rules apply exactly as for peer traffic. This
//! is also why a read-only collection can still load archives.

use crate::primitives::{ARCHIVE_FORMAT_VERSION, MAX_ARCHIVE_INSTANCES};
use crate::provenance::ProvenanceGate;
use crate::repository::MetadataCollection;
use crate::{CohortError, EntityDetail, InstanceProvenanceType, MetadataCollectionId, Relationship};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// =============================================================================
// ARCHIVE FORMAT
// =============================================================================

/// Archive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveHeader {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub origin_metadata_collection_id: MetadataCollectionId,
    #[serde(default)]
    pub origin_metadata_collection_name: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub version: u32,
}

/// An archive of instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceArchive {
    pub header: ArchiveHeader,
    #[serde(default)]
    pub entities: Vec<EntityDetail>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl InstanceArchive {
    /// Parse and validate an archive document.
    pub fn from_json(json: &str) -> Result<Self, CohortError> {
        let archive: Self = serde_json::from_str(json)
            .map_err(|e| CohortError::InvalidParameter(format!("Invalid archive: {e}")))?;
        archive.validate()?;
        Ok(archive)
    }

    pub fn to_json_pretty(&self) -> Result<String, CohortError> {
        serde_json::to_string_pretty(self).map_err(CohortError::storage)
    }

    pub fn validate(&self) -> Result<(), CohortError> {
        if self.header.version != ARCHIVE_FORMAT_VERSION {
            return Err(CohortError::InvalidParameter(format!(
                "Unsupported archive version: {} (expected {ARCHIVE_FORMAT_VERSION})",
                self.header.version
            )));
        }
        let count = self.instance_count();
        if count > MAX_ARCHIVE_INSTANCES {
            return Err(CohortError::InvalidParameter(format!(
                "Archive holds {count} instances, more than {MAX_ARCHIVE_INSTANCES}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.entities.len() + self.relationships.len()
    }

    /// Order-independent checksum over instance identities and versions.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;
        for entity in &self.entities {
            hash ^= fold(entity.guid().as_str().as_bytes()).rotate_left(13);
            hash ^= entity.header.version.rotate_left(7);
        }
        for rel in &self.relationships {
            hash ^= fold(rel.guid().as_str().as_bytes()).rotate_left(11);
            hash ^= rel.header.version.rotate_left(5);
        }
        hash ^= (self.instance_count() as u64).rotate_left(3);
        hash
    }
}

fn fold(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |hash, byte| hash.rotate_left(5) ^ u64::from(*byte))
}

/// BLAKE3 digest of the archive's JSON form, as lowercase hex.
#[cfg(feature = "crypto-hash")]
pub fn archive_crypto_hash(archive: &InstanceArchive) -> Result<String, CohortError> {
    let data = serde_json::to_vec(archive).map_err(CohortError::storage)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

/// Check an archive against an expected BLAKE3 digest.
#[cfg(feature = "crypto-hash")]
pub fn verify_archive_hash(archive: &InstanceArchive, expected_hash: &str) -> bool {
    archive_crypto_hash(archive).is_ok_and(|hash| hash == expected_hash)
}

// =============================================================================
// EXPORT
// =============================================================================

/// Export every non-deleted instance of a collection.
///
/// Instances and their classifications are stamped EXPORT_ARCHIVE so the
/// archive can be loaded into any repository.
pub fn export_archive(
    collection: &dyn MetadataCollection,
    name: &str,
    description: Option<&str>,
) -> Result<InstanceArchive, CohortError> {
    let entities: Vec<EntityDetail> = collection
        .entities_snapshot()?
        .into_iter()
        .filter(|e| !e.header.status.is_deleted())
        .map(|mut entity| {
            entity.header.instance_provenance_type = InstanceProvenanceType::ExportArchive;
            for classification in &mut entity.classifications {
                classification.instance_provenance_type = InstanceProvenanceType::ExportArchive;
            }
            entity
        })
        .collect();
    let relationships: Vec<Relationship> = collection
        .relationships_snapshot()?
        .into_iter()
        .filter(|r| !r.header.status.is_deleted())
        .map(|mut rel| {
            rel.header.instance_provenance_type = InstanceProvenanceType::ExportArchive;
            rel
        })
        .collect();

    info!(
        entities = entities.len(),
        relationships = relationships.len(),
        "Archive exported"
    );
    Ok(InstanceArchive {
        header: ArchiveHeader {
            name: name.to_string(),
            description: description.map(str::to_string),
            origin_metadata_collection_id: collection.metadata_collection_id().clone(),
            origin_metadata_collection_name: Some(collection.metadata_collection_name().to_string()),
            creation_date: Utc::now(),
            version: ARCHIVE_FORMAT_VERSION,
        },
        entities,
        relationships,
    })
}

// =============================================================================
// LOAD
// =============================================================================

/// Outcome of loading an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLoadReport {
    pub entities_admitted: usize,
    pub entities_ignored: usize,
    pub relationships_admitted: usize,
    pub relationships_ignored: usize,
}

impl ArchiveLoadReport {
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.entities_admitted + self.relationships_admitted
    }

    #[must_use]
    pub fn ignored(&self) -> usize {
        self.entities_ignored + self.relationships_ignored
    }
}

/// Load an archive through the collection's reference-copy operations.
///
/// Entities are loaded before relationships so relationship ends resolve to
/// full entities where the archive has them. The first error aborts the load;
/// instances saved before it stay saved.
pub fn load_archive(
    collection: &dyn MetadataCollection,
    user_id: &str,
    archive: &InstanceArchive,
) -> Result<ArchiveLoadReport, CohortError> {
    archive.validate()?;
    let gate = ProvenanceGate::new(collection.metadata_collection_id().clone());
    let mut report = ArchiveLoadReport::default();

    for entity in &archive.entities {
        if gate.admits_header(&entity.header) {
            report.entities_admitted += 1;
        } else {
            report.entities_ignored += 1;
        }
        collection.save_entity_reference_copy(user_id, entity.clone())?;
    }
    for rel in &archive.relationships {
        if gate.admits_header(&rel.header) {
            report.relationships_admitted += 1;
        } else {
            report.relationships_ignored += 1;
        }
        collection.save_relationship_reference_copy(user_id, rel.clone())?;
    }

    debug!(archive = %archive.header.name, checksum = archive.checksum(), "Archive checksum");
    info!(
        archive = %archive.header.name,
        admitted = report.admitted(),
        ignored = report.ignored(),
        "Archive loaded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Guid, InstanceHeader, InstanceKind, InstanceProperties, InstanceStatus, InstanceType};

    fn archive(entities: &[(&str, u64)]) -> InstanceArchive {
        InstanceArchive {
            header: ArchiveHeader {
                name: "pack".into(),
                description: None,
                origin_metadata_collection_id: "origin".into(),
                origin_metadata_collection_name: None,
                creation_date: Utc::now(),
                version: ARCHIVE_FORMAT_VERSION,
            },
            entities: entities
                .iter()
                .map(|(guid, version)| {
                    let mut header = InstanceHeader::new(
                        Guid::new(*guid),
                        InstanceType::new("t-asset", "Asset", InstanceKind::Entity),
                        InstanceStatus::Active,
                        "origin".into(),
                        InstanceProvenanceType::ContentPack,
                    );
                    header.version = *version;
                    EntityDetail::new(header, InstanceProperties::new())
                })
                .collect(),
            relationships: Vec::new(),
        }
    }

    #[test]
    fn checksum_is_order_independent() {
        let a = archive(&[("e1", 1), ("e2", 3)]);
        let b = archive(&[("e2", 3), ("e1", 1)]);
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), archive(&[("e1", 2), ("e2", 3)]).checksum());
    }

    #[test]
    fn json_roundtrip_and_version_check() {
        let original = archive(&[("e1", 1)]);
        let json = original.to_json_pretty().expect("serialize");
        let parsed = InstanceArchive::from_json(&json).expect("parse");
        assert_eq!(parsed, original);

        let mut wrong = original;
        wrong.header.version = ARCHIVE_FORMAT_VERSION + 1;
        let json = wrong.to_json_pretty().expect("serialize");
        assert!(matches!(
            InstanceArchive::from_json(&json),
            Err(CohortError::InvalidParameter(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(InstanceArchive::from_json("{not json").is_err());
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_is_stable() {
        let a = archive(&[("e1", 1)]);
        let hash = archive_crypto_hash(&a).expect("hash");
        assert_eq!(hash.len(), 64);
        assert!(verify_archive_hash(&a, &hash));
        assert!(!verify_archive_hash(&archive(&[("e1", 2)]), &hash));
    }
}
