//! # Instance Model
//!
//! Typed records held by a repository: entities, relationships,
//! classifications and entity proxies.
//!
//! Every entity and relationship carries an [`InstanceHeader`] with its
//! identity, type, lifecycle status, version and provenance. The header's
//! `metadata_collection_id` names the **home** repository, the sole writer of
//! the instance.
//!
//! [`EntityProxy`] is a distinct, smaller value type. The only way to obtain
//! one from a full entity is [`EntityProxy::from_entity`].
//!
//! Instances are persisted with `postcard`, so no field may use
//! `skip_serializing_if` or `flatten`.

use crate::{
    ClassificationOrigin, Guid, InstanceProperties, InstanceProvenanceType, InstanceStatus,
    InstanceType, MetadataCollectionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// INSTANCE HEADER
// =============================================================================

/// Header shared by entities, relationships and proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHeader {
    pub guid: Guid,
    pub instance_type: InstanceType,
    pub status: InstanceStatus,
    /// Status held before a soft delete. Informational; restore always activates.
    pub status_on_delete: Option<InstanceStatus>,
    pub version: u64,
    pub metadata_collection_id: MetadataCollectionId,
    pub metadata_collection_name: Option<String>,
    /// Collection maintaining an externally sourced instance on its home's behalf.
    pub replicated_by: Option<MetadataCollectionId>,
    pub instance_provenance_type: InstanceProvenanceType,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub re_identified_from_guid: Option<Guid>,
}

impl InstanceHeader {
    /// Create a version-1 header homed in `home`.
    #[must_use]
    pub fn new(
        guid: Guid,
        instance_type: InstanceType,
        status: InstanceStatus,
        home: MetadataCollectionId,
        provenance: InstanceProvenanceType,
    ) -> Self {
        Self {
            guid,
            instance_type,
            status,
            status_on_delete: None,
            version: 1,
            metadata_collection_id: home,
            metadata_collection_name: None,
            replicated_by: None,
            instance_provenance_type: provenance,
            created_by: None,
            updated_by: None,
            create_time: None,
            update_time: None,
            re_identified_from_guid: None,
        }
    }

    /// Stamp creation audit fields.
    #[must_use]
    pub fn created(mut self, user: &str, now: DateTime<Utc>) -> Self {
        self.created_by = Some(user.to_string());
        self.create_time = Some(now);
        self
    }

    /// True when `collection` is this instance's home.
    #[must_use]
    pub fn is_homed_in(&self, collection: &MetadataCollectionId) -> bool {
        &self.metadata_collection_id == collection
    }

    /// True when `collection` may write this instance: it is the home, or it
    /// replicates the instance for an external source.
    #[must_use]
    pub fn is_writable_by(&self, collection: &MetadataCollectionId) -> bool {
        self.is_homed_in(collection) || self.replicated_by.as_ref() == Some(collection)
    }

    /// Record an accepted mutation: version+1 and update audit fields.
    pub fn touch(&mut self, user: &str, now: DateTime<Utc>) {
        self.version = self.version.saturating_add(1);
        self.updated_by = Some(user.to_string());
        self.update_time = Some(now);
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.instance_type.type_def_name
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// A classification attached to an entity.
///
/// Carries its own provenance and home: a peer may attach a classification to
/// an entity it does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Classification type name; unique within one entity.
    pub name: String,
    pub instance_type: InstanceType,
    pub properties: InstanceProperties,
    pub origin: ClassificationOrigin,
    /// Set only when `origin` is PROPAGATED: the entity the classification came from.
    pub origin_guid: Option<Guid>,
    pub version: u64,
    pub instance_provenance_type: InstanceProvenanceType,
    pub metadata_collection_id: MetadataCollectionId,
    pub metadata_collection_name: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl Classification {
    /// Create a version-1 ASSIGNED classification.
    #[must_use]
    pub fn new(
        instance_type: InstanceType,
        properties: InstanceProperties,
        home: MetadataCollectionId,
        provenance: InstanceProvenanceType,
    ) -> Self {
        Self {
            name: instance_type.type_def_name.clone(),
            instance_type,
            properties,
            origin: ClassificationOrigin::Assigned,
            origin_guid: None,
            version: 1,
            instance_provenance_type: provenance,
            metadata_collection_id: home,
            metadata_collection_name: None,
            created_by: None,
            updated_by: None,
            create_time: None,
            update_time: None,
        }
    }

    /// Mark the classification as propagated from `origin`.
    #[must_use]
    pub fn propagated_from(mut self, origin: Guid) -> Self {
        self.origin = ClassificationOrigin::Propagated;
        self.origin_guid = Some(origin);
        self
    }

    pub fn touch(&mut self, user: &str, now: DateTime<Utc>) {
        self.version = self.version.saturating_add(1);
        self.updated_by = Some(user.to_string());
        self.update_time = Some(now);
    }
}

/// A classification requested by a caller creating or classifying an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub name: String,
    #[serde(default)]
    pub properties: InstanceProperties,
}

impl ClassificationRequest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: InstanceProperties::new(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: InstanceProperties) -> Self {
        self.properties = properties;
        self
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// A full entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetail {
    pub header: InstanceHeader,
    pub properties: InstanceProperties,
    pub classifications: Vec<Classification>,
}

impl EntityDetail {
    #[must_use]
    pub fn new(header: InstanceHeader, properties: InstanceProperties) -> Self {
        Self {
            header,
            properties,
            classifications: Vec::new(),
        }
    }

    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.header.guid
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.header.type_name()
    }

    #[must_use]
    pub fn classification(&self, name: &str) -> Option<&Classification> {
        self.classifications.iter().find(|c| c.name == name)
    }

    /// Attach or replace a classification, keeping names unique and the
    /// existing position when replacing.
    pub fn upsert_classification(&mut self, classification: Classification) {
        match self
            .classifications
            .iter_mut()
            .find(|c| c.name == classification.name)
        {
            Some(slot) => *slot = classification,
            None => self.classifications.push(classification),
        }
    }

    /// Remove a classification by name, returning it if present.
    pub fn remove_classification(&mut self, name: &str) -> Option<Classification> {
        let index = self.classifications.iter().position(|c| c.name == name)?;
        Some(self.classifications.remove(index))
    }
}

// =============================================================================
// ENTITY PROXY
// =============================================================================

/// A partial entity used as a relationship endpoint.
///
/// Holds the header plus only the properties the entity's type declares unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProxy {
    pub header: InstanceHeader,
    pub unique_properties: InstanceProperties,
}

impl EntityProxy {
    /// Build the proxy of a full entity.
    ///
    /// Total: every entity has a proxy; properties not listed in
    /// `unique_property_names` are dropped.
    #[must_use]
    pub fn from_entity(entity: &EntityDetail, unique_property_names: &[String]) -> Self {
        let unique_properties = entity
            .properties
            .iter()
            .filter(|(name, _)| unique_property_names.iter().any(|u| u == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self {
            header: entity.header.clone(),
            unique_properties,
        }
    }

    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.header.guid
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.header.type_name()
    }
}

/// An entity given to `save_classification_reference_copy`: either a full
/// entity or only its proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "camelCase")]
pub enum EntityReference {
    Detail(EntityDetail),
    Proxy(EntityProxy),
}

impl EntityReference {
    #[must_use]
    pub fn header(&self) -> &InstanceHeader {
        match self {
            Self::Detail(entity) => &entity.header,
            Self::Proxy(proxy) => &proxy.header,
        }
    }

    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.header().guid
    }
}

// =============================================================================
// RELATIONSHIP
// =============================================================================

/// A typed link between two entities, each end referenced by proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub header: InstanceHeader,
    pub properties: InstanceProperties,
    pub entity_one_proxy: EntityProxy,
    pub entity_two_proxy: EntityProxy,
}

impl Relationship {
    #[must_use]
    pub fn guid(&self) -> &Guid {
        &self.header.guid
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.header.type_name()
    }

    /// Guids of both ends (may be equal for a self-relationship).
    #[must_use]
    pub fn end_guids(&self) -> [&Guid; 2] {
        [
            &self.entity_one_proxy.header.guid,
            &self.entity_two_proxy.header.guid,
        ]
    }

    #[must_use]
    pub fn references(&self, entity: &Guid) -> bool {
        self.end_guids().contains(&entity)
    }

    /// Proxies at the ends referencing `entity`.
    pub fn proxies_for_mut<'a>(
        &'a mut self,
        entity: &'a Guid,
    ) -> impl Iterator<Item = &'a mut EntityProxy> + 'a {
        [&mut self.entity_one_proxy, &mut self.entity_two_proxy]
            .into_iter()
            .filter(move |proxy| &proxy.header.guid == entity)
    }
}

// =============================================================================
// TESTS
// =============================================================================
