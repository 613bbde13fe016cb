//! # Restricted Repository
//!
//! Wraps any [`MetadataCollection`] and answers `FunctionNotSupported` for
//! every operation outside its own [`CapabilitySet`], before the inner
//! collection is consulted. Reads always pass through.
//!
//! The restriction is independent of the storage backend: a read-only
//! collection over redb is `RestrictedRepository::read_only(Repository<RedbStore>)`.

use crate::repository::MetadataCollection;
use crate::system::RepositoryMetrics;
use crate::{
    CapabilitySet, Classification, ClassificationRequest, CohortError, EntityDetail,
    EntityProxy, EntityReference, Guid, InstanceProperties, InstanceStatus, MetadataCollectionId,
    Operation, Relationship,
};

/// A capability-restricted view of another collection.
#[derive(Debug)]
pub struct RestrictedRepository<M> {
    inner: M,
    capabilities: CapabilitySet,
}

impl<M: MetadataCollection> RestrictedRepository<M> {
    /// Restrict `inner` to `capabilities` (intersected with its own).
    pub fn new(inner: M, capabilities: CapabilitySet) -> Self {
        let capabilities = capabilities
            .iter()
            .filter(|op| inner.capabilities().supports(*op))
            .collect();
        Self {
            inner,
            capabilities,
        }
    }

    /// Only reference copies may be saved; nothing else mutates.
    pub fn read_only(inner: M) -> Self {
        Self::new(inner, CapabilitySet::read_only())
    }

    #[must_use]
    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }

    fn check(&self, operation: Operation) -> Result<&M, CohortError> {
        self.capabilities.check(operation)?;
        Ok(&self.inner)
    }
}

impl<M: MetadataCollection> MetadataCollection for RestrictedRepository<M> {
    fn metadata_collection_id(&self) -> &MetadataCollectionId {
        self.inner.metadata_collection_id()
    }

    fn metadata_collection_name(&self) -> &str {
        self.inner.metadata_collection_name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    // ----- reads (never gated) ----------------------------------------------

    fn get_entity_detail(&self, user_id: &str, guid: &Guid) -> Result<EntityDetail, CohortError> {
        self.inner.get_entity_detail(user_id, guid)
    }

    fn is_entity_known(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<EntityDetail>, CohortError> {
        self.inner.is_entity_known(user_id, guid)
    }

    fn get_entity_proxy(&self, user_id: &str, guid: &Guid) -> Result<EntityProxy, CohortError> {
        self.inner.get_entity_proxy(user_id, guid)
    }

    fn get_relationship(&self, user_id: &str, guid: &Guid) -> Result<Relationship, CohortError> {
        self.inner.get_relationship(user_id, guid)
    }

    fn is_relationship_known(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<Relationship>, CohortError> {
        self.inner.is_relationship_known(user_id, guid)
    }

    fn get_relationships_for_entity(
        &self,
        user_id: &str,
        entity_guid: &Guid,
    ) -> Result<Vec<Relationship>, CohortError> {
        self.inner.get_relationships_for_entity(user_id, entity_guid)
    }

    fn instance_status(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<InstanceStatus>, CohortError> {
        self.inner.instance_status(user_id, guid)
    }

    fn metrics(&self) -> Result<RepositoryMetrics, CohortError> {
        self.inner.metrics()
    }

    fn entities_snapshot(&self) -> Result<Vec<EntityDetail>, CohortError> {
        self.inner.entities_snapshot()
    }

    fn relationships_snapshot(&self) -> Result<Vec<Relationship>, CohortError> {
        self.inner.relationships_snapshot()
    }

    // ----- gated mutations ----------------------------------------------------

    fn add_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        properties: InstanceProperties,
        classifications: Vec<ClassificationRequest>,
        status: Option<InstanceStatus>,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::AddEntity)?
            .add_entity(user_id, type_guid, properties, classifications, status)
    }

    fn add_external_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        source_guid: &MetadataCollectionId,
        source_name: Option<&str>,
        properties: InstanceProperties,
        classifications: Vec<ClassificationRequest>,
        status: Option<InstanceStatus>,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::AddExternalEntity)?.add_external_entity(
            user_id,
            type_guid,
            source_guid,
            source_name,
            properties,
            classifications,
            status,
        )
    }

    fn add_entity_proxy(&self, user_id: &str, proxy: EntityProxy) -> Result<(), CohortError> {
        self.check(Operation::AddEntityProxy)?
            .add_entity_proxy(user_id, proxy)
    }

    fn update_entity_status(
        &self,
        user_id: &str,
        guid: &Guid,
        new_status: InstanceStatus,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::UpdateEntityStatus)?
            .update_entity_status(user_id, guid, new_status)
    }

    fn update_entity_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::UpdateEntityProperties)?
            .update_entity_properties(user_id, guid, properties)
    }

    fn delete_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::DeleteEntity)?
            .delete_entity(user_id, type_guid, type_name, guid)
    }

    fn purge_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<(), CohortError> {
        self.check(Operation::PurgeEntity)?
            .purge_entity(user_id, type_guid, type_name, guid)
    }

    fn restore_entity(&self, user_id: &str, guid: &Guid) -> Result<EntityDetail, CohortError> {
        self.check(Operation::RestoreEntity)?
            .restore_entity(user_id, guid)
    }

    fn classify_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::ClassifyEntity)?
            .classify_entity(user_id, guid, classification_name, properties)
    }

    fn declassify_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::DeclassifyEntity)?
            .declassify_entity(user_id, guid, classification_name)
    }

    fn update_entity_classification(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::UpdateEntityClassification)?
            .update_entity_classification(user_id, guid, classification_name, properties)
    }

    fn re_identify_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::ReIdentifyEntity)?
            .re_identify_entity(user_id, type_guid, type_name, guid)
    }

    fn re_type_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        current_type_guid: &str,
        current_type_name: &str,
        new_type_guid: &str,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::ReTypeEntity)?.re_type_entity(
            user_id,
            guid,
            current_type_guid,
            current_type_name,
            new_type_guid,
        )
    }

    fn re_home_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
        new_home: &MetadataCollectionId,
        new_home_name: Option<&str>,
    ) -> Result<EntityDetail, CohortError> {
        self.check(Operation::ReHomeEntity)?.re_home_entity(
            user_id,
            guid,
            type_guid,
            type_name,
            home,
            new_home,
            new_home_name,
        )
    }

    fn add_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        properties: InstanceProperties,
        entity_one_guid: &Guid,
        entity_two_guid: &Guid,
        status: Option<InstanceStatus>,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::AddRelationship)?.add_relationship(
            user_id,
            type_guid,
            properties,
            entity_one_guid,
            entity_two_guid,
            status,
        )
    }

    fn add_external_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        source_guid: &MetadataCollectionId,
        source_name: Option<&str>,
        properties: InstanceProperties,
        entity_one_guid: &Guid,
        entity_two_guid: &Guid,
        status: Option<InstanceStatus>,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::AddExternalRelationship)?
            .add_external_relationship(
                user_id,
                type_guid,
                source_guid,
                source_name,
                properties,
                entity_one_guid,
                entity_two_guid,
                status,
            )
    }

    fn update_relationship_status(
        &self,
        user_id: &str,
        guid: &Guid,
        new_status: InstanceStatus,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::UpdateRelationshipStatus)?
            .update_relationship_status(user_id, guid, new_status)
    }

    fn update_relationship_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: InstanceProperties,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::UpdateRelationshipProperties)?
            .update_relationship_properties(user_id, guid, properties)
    }

    fn delete_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::DeleteRelationship)?
            .delete_relationship(user_id, type_guid, type_name, guid)
    }

    fn purge_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<(), CohortError> {
        self.check(Operation::PurgeRelationship)?
            .purge_relationship(user_id, type_guid, type_name, guid)
    }

    fn restore_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::RestoreRelationship)?
            .restore_relationship(user_id, guid)
    }

    fn re_identify_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::ReIdentifyRelationship)?
            .re_identify_relationship(user_id, type_guid, type_name, guid)
    }

    fn re_type_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
        current_type_guid: &str,
        current_type_name: &str,
        new_type_guid: &str,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::ReTypeRelationship)?.re_type_relationship(
            user_id,
            guid,
            current_type_guid,
            current_type_name,
            new_type_guid,
        )
    }

    fn re_home_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
        new_home: &MetadataCollectionId,
        new_home_name: Option<&str>,
    ) -> Result<Relationship, CohortError> {
        self.check(Operation::ReHomeRelationship)?.re_home_relationship(
            user_id,
            guid,
            type_guid,
            type_name,
            home,
            new_home,
            new_home_name,
        )
    }

    fn save_entity_reference_copy(
        &self,
        user_id: &str,
        entity: EntityDetail,
    ) -> Result<(), CohortError> {
        self.check(Operation::SaveEntityReferenceCopy)?
            .save_entity_reference_copy(user_id, entity)
    }

    fn purge_entity_reference_copy(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<(), CohortError> {
        self.check(Operation::PurgeEntityReferenceCopy)?
            .purge_entity_reference_copy(user_id, guid, type_guid, type_name, home)
    }

    fn save_classification_reference_copy(
        &self,
        user_id: &str,
        entity: EntityReference,
        classification: Classification,
    ) -> Result<(), CohortError> {
        self.check(Operation::SaveClassificationReferenceCopy)?
            .save_classification_reference_copy(user_id, entity, classification)
    }

    fn purge_classification_reference_copy(
        &self,
        user_id: &str,
        entity: EntityReference,
        classification_name: &str,
    ) -> Result<(), CohortError> {
        self.check(Operation::PurgeClassificationReferenceCopy)?
            .purge_classification_reference_copy(user_id, entity, classification_name)
    }

    fn save_relationship_reference_copy(
        &self,
        user_id: &str,
        relationship: Relationship,
    ) -> Result<(), CohortError> {
        self.check(Operation::SaveRelationshipReferenceCopy)?
            .save_relationship_reference_copy(user_id, relationship)
    }

    fn purge_relationship_reference_copy(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<(), CohortError> {
        self.check(Operation::PurgeRelationshipReferenceCopy)?
            .purge_relationship_reference_copy(user_id, guid, type_guid, type_name, home)
    }
}
