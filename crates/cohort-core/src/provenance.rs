//! # Provenance Gate
//!
//! Decides which incoming reference copies may be stored here.
//!
//! A copy qualifies when its provenance is an archive kind (CONTENT_PACK or
//! EXPORT_ARCHIVE) or when it claims to be homed in this collection.
//! Anything else is dropped without an error: the caller receives `Ok(())`
//! and the store is untouched. Each such exit is marked at the call site.
//!
//! Classifications are gated one by one with the same test; the filtered
//! list replaces the incoming list before anything is stored.
//!
//! A copy naming a retired guid, as itself or as a relationship end, is
//! dropped the same silent way.

use crate::audit::{AuditEvent, AuditSeverity};
use crate::lifecycle::{check_property_count, require_type};
use crate::repository::{Repository, check_guid, check_identifier};
use crate::store::{ChangeSet, InstanceStore};
use crate::{
    Classification, CohortError, EntityDetail, EntityReference, Guid, InstanceHeader,
    InstanceKind, InstanceProvenanceType, MetadataCollectionId, Operation, Relationship,
};
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

// =============================================================================
// GATE
// =============================================================================

/// The qualifying test for reference copies, bound to one local collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceGate {
    local: MetadataCollectionId,
}

impl ProvenanceGate {
    #[must_use]
    pub fn new(local: MetadataCollectionId) -> Self {
        Self { local }
    }

    #[must_use]
    pub fn local(&self) -> &MetadataCollectionId {
        &self.local
    }

    /// Archive provenance, or homed here.
    #[must_use]
    pub fn qualifies(&self, provenance: InstanceProvenanceType, home: &MetadataCollectionId) -> bool {
        provenance.is_archive() || home == &self.local
    }

    #[must_use]
    pub fn admits_header(&self, header: &InstanceHeader) -> bool {
        self.qualifies(header.instance_provenance_type, &header.metadata_collection_id)
    }

    #[must_use]
    pub fn admits_classification(&self, classification: &Classification) -> bool {
        self.qualifies(
            classification.instance_provenance_type,
            &classification.metadata_collection_id,
        )
    }

    /// Keep the qualifying classifications; returns how many were dropped.
    pub fn filter_classifications(&self, classifications: &mut Vec<Classification>) -> usize {
        let before = classifications.len();
        classifications.retain(|c| self.admits_classification(c));
        before - classifications.len()
    }
}

// =============================================================================
// SILENT REJECTION
// =============================================================================

fn rejected<S: InstanceStore>(
    repo: &Repository<S>,
    operation: Operation,
    user_id: &str,
    guid: &Guid,
    provenance: InstanceProvenanceType,
    home: &MetadataCollectionId,
) {
    debug!(
        guid = %guid,
        provenance = provenance.name(),
        home = %home,
        "Reference copy ignored: provenance does not qualify"
    );
    repo.record(
        AuditEvent::new(
            AuditSeverity::Information,
            format!(
                "Reference copy ignored: {} provenance homed in {home}",
                provenance.name()
            ),
        )
        .for_operation(operation, user_id)
        .with_guid(guid),
    );
}

fn retired<S: InstanceStore>(
    repo: &Repository<S>,
    operation: Operation,
    user_id: &str,
    guid: &Guid,
) {
    debug!(guid = %guid, "Reference copy ignored: guid was purged here");
    repo.record(
        AuditEvent::new(
            AuditSeverity::Information,
            format!("Reference copy ignored: {guid} was purged and is retired"),
        )
        .for_operation(operation, user_id)
        .with_guid(guid),
    );
}

fn stale(kind: &str, guid: &Guid, incoming: u64, held: u64) {
    warn!(
        guid = %guid,
        incoming,
        held,
        "Stale {kind} reference copy ignored"
    );
}

// =============================================================================
// ENTITY REFERENCE COPIES
// =============================================================================

pub(crate) fn save_entity_reference_copy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    mut entity: EntityDetail,
) -> Result<(), CohortError> {
    let gate = repo.gate();
    if !gate.admits_header(&entity.header) {
        // Silent rejection: the caller gets Ok and nothing is stored.
        rejected(
            repo,
            Operation::SaveEntityReferenceCopy,
            user_id,
            entity.guid(),
            entity.header.instance_provenance_type,
            &entity.header.metadata_collection_id,
        );
        return Ok(());
    }
    let dropped = gate.filter_classifications(&mut entity.classifications);
    if dropped > 0 {
        debug!(guid = %entity.guid(), dropped, "Non-qualifying classifications dropped");
    }

    validate_entity_copy(repo, &entity)?;

    let guid = entity.guid().clone();
    let _locks = repo.lock([guid.clone()]);
    let (held, relationship, is_retired) = repo.read(|s| {
        Ok((
            s.get_entity(&guid)?,
            s.get_relationship(&guid)?,
            s.is_retired(&guid)?,
        ))
    })?;
    if is_retired {
        // A purged guid is never reissued, not even as a reference copy.
        retired(repo, Operation::SaveEntityReferenceCopy, user_id, &guid);
        return Ok(());
    }
    if relationship.is_some() {
        return Err(CohortError::EntityConflict(format!(
            "Guid {guid} belongs to a relationship"
        )));
    }
    if let Some(held) = held {
        if held.header.instance_type != entity.header.instance_type {
            return Err(CohortError::EntityConflict(format!(
                "Entity {guid} is held as {} but the copy is a {}",
                held.type_name(),
                entity.type_name()
            )));
        }
        if held.header.is_writable_by(repo.local())
            && held.header.metadata_collection_id != entity.header.metadata_collection_id
        {
            return Err(CohortError::HomeEntity {
                guid: guid.to_string(),
                home: held.header.metadata_collection_id.to_string(),
            });
        }
        if entity.header.version <= held.header.version {
            stale("entity", &guid, entity.header.version, held.header.version);
            return Ok(());
        }
    }

    let mut changes = ChangeSet::new();
    changes.put_entity(entity);
    changes.remove_proxy(guid.clone());
    repo.commit(changes)?;

    info!(guid = %guid, "Entity reference copy saved");
    repo.audit_action(
        Operation::SaveEntityReferenceCopy,
        user_id,
        &guid,
        "Entity reference copy saved",
    );
    Ok(())
}

fn validate_entity_copy<S: InstanceStore>(
    repo: &Repository<S>,
    entity: &EntityDetail,
) -> Result<(), CohortError> {
    let header = &entity.header;
    if header.guid.as_str().trim().is_empty() {
        return Err(CohortError::InvalidEntity(
            "Entity copy has no guid".to_string(),
        ));
    }
    if header.instance_type.type_def_guid.trim().is_empty()
        || header.instance_type.type_def_name.trim().is_empty()
    {
        return Err(CohortError::InvalidEntity(format!(
            "Entity copy {} has no type",
            header.guid
        )));
    }
    if header.version == 0 {
        return Err(CohortError::InvalidEntity(format!(
            "Entity copy {} has version 0",
            header.guid
        )));
    }
    if header.metadata_collection_id.as_str().trim().is_empty() {
        return Err(CohortError::InvalidEntity(format!(
            "Entity copy {} has no home collection",
            header.guid
        )));
    }

    let types = repo.types();
    let resolved = types.resolve_type_by_guid(&header.instance_type.type_def_guid, InstanceKind::Entity)?;
    if resolved.type_def_name != header.instance_type.type_def_name {
        return Err(CohortError::TypeError(format!(
            "Entity copy {} names type {} but guid {} is {}",
            header.guid,
            header.instance_type.type_def_name,
            header.instance_type.type_def_guid,
            resolved.type_def_name
        )));
    }
    check_property_count(&entity.properties)?;
    types.validate_properties_for_type(entity.type_name(), &entity.properties)?;
    for classification in &entity.classifications {
        validate_classification(repo, classification, entity.type_name())?;
    }
    Ok(())
}

fn validate_classification<S: InstanceStore>(
    repo: &Repository<S>,
    classification: &Classification,
    entity_type_name: &str,
) -> Result<(), CohortError> {
    check_identifier(&classification.name, "classificationName")?;
    let types = repo.types();
    types.validate_classification_for_entity(&classification.name, entity_type_name)?;
    check_property_count(&classification.properties)?;
    types.validate_properties_for_type(&classification.name, &classification.properties)
}

pub(crate) fn purge_entity_reference_copy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    type_guid: &str,
    type_name: &str,
    home: &MetadataCollectionId,
) -> Result<(), CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(home.as_str(), "homeMetadataCollectionId")?;
    let _locks = repo.lock_entity_with_relationships(guid, &[])?;
    let entity = repo
        .read(|s| s.get_entity(guid))?
        .ok_or_else(|| CohortError::entity_not_known(guid))?;
    require_type(&entity.header, type_guid, type_name)?;
    if entity.header.is_writable_by(repo.local()) {
        return Err(CohortError::HomeEntity {
            guid: guid.to_string(),
            home: entity.header.metadata_collection_id.to_string(),
        });
    }
    if &entity.header.metadata_collection_id != home {
        return Err(CohortError::InvalidParameter(format!(
            "Entity {guid} is homed in {}, not {home}",
            entity.header.metadata_collection_id
        )));
    }

    let mut changes = ChangeSet::new();
    changes.remove_entity(guid.clone());
    // Relationships still reference the entity; keep a proxy for their ends.
    if !repo.read(|s| s.relationships_for_entity(guid))?.is_empty() {
        changes.put_proxy(repo.proxy_of(&entity));
    }
    repo.commit(changes)?;

    info!(guid = %guid, "Entity reference copy purged");
    repo.audit_action(
        Operation::PurgeEntityReferenceCopy,
        user_id,
        guid,
        "Entity reference copy purged",
    );
    Ok(())
}

// =============================================================================
// CLASSIFICATION REFERENCE COPIES
// =============================================================================

pub(crate) fn save_classification_reference_copy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    entity: EntityReference,
    classification: Classification,
) -> Result<(), CohortError> {
    let guid = entity.guid().clone();
    check_guid(&guid, "entity.guid")?;
    if !repo.gate().admits_classification(&classification) {
        // Silent rejection: the caller gets Ok and nothing is stored.
        rejected(
            repo,
            Operation::SaveClassificationReferenceCopy,
            user_id,
            &guid,
            classification.instance_provenance_type,
            &classification.metadata_collection_id,
        );
        return Ok(());
    }
    if classification.version == 0 {
        return Err(CohortError::ClassificationError(format!(
            "Classification {} on {guid} has version 0",
            classification.name
        )));
    }

    let _locks = repo.lock([guid.clone()]);
    let mut held = repo
        .read(|s| s.get_entity(&guid))?
        .filter(|e| !e.header.status.is_deleted())
        .ok_or_else(|| CohortError::entity_not_known(&guid))?;
    validate_classification(repo, &classification, held.type_name())?;

    if let Some(current) = held.classification(&classification.name) {
        if &current.metadata_collection_id == repo.local()
            && current.metadata_collection_id != classification.metadata_collection_id
        {
            return Err(CohortError::HomeEntity {
                guid: guid.to_string(),
                home: current.metadata_collection_id.to_string(),
            });
        }
        if classification.version <= current.version {
            stale("classification", &guid, classification.version, current.version);
            return Ok(());
        }
    }

    let name = classification.name.clone();
    held.upsert_classification(classification);
    if held.header.is_writable_by(repo.local()) {
        held.header.touch(user_id, Utc::now());
    }
    let mut changes = ChangeSet::new();
    changes.put_entity(held);
    repo.commit(changes)?;

    info!(guid = %guid, classification = %name, "Classification reference copy saved");
    repo.audit_action(
        Operation::SaveClassificationReferenceCopy,
        user_id,
        &guid,
        format!("Classification {name} reference copy saved"),
    );
    Ok(())
}

pub(crate) fn purge_classification_reference_copy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    entity: EntityReference,
    classification_name: &str,
) -> Result<(), CohortError> {
    let guid = entity.guid().clone();
    check_guid(&guid, "entity.guid")?;
    check_identifier(classification_name, "classificationName")?;

    let _locks = repo.lock([guid.clone()]);
    let mut held = repo
        .read(|s| s.get_entity(&guid))?
        .ok_or_else(|| CohortError::entity_not_known(&guid))?;
    let Some(current) = held.classification(classification_name) else {
        return Err(CohortError::ClassificationError(format!(
            "Entity {guid} is not classified as {classification_name}"
        )));
    };
    if &current.metadata_collection_id == repo.local() {
        return Err(CohortError::HomeEntity {
            guid: guid.to_string(),
            home: current.metadata_collection_id.to_string(),
        });
    }

    held.remove_classification(classification_name);
    let mut changes = ChangeSet::new();
    changes.put_entity(held);
    repo.commit(changes)?;

    info!(guid = %guid, classification = classification_name, "Classification reference copy purged");
    repo.audit_action(
        Operation::PurgeClassificationReferenceCopy,
        user_id,
        &guid,
        format!("Classification {classification_name} reference copy purged"),
    );
    Ok(())
}

// =============================================================================
// RELATIONSHIP REFERENCE COPIES
// =============================================================================

pub(crate) fn save_relationship_reference_copy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    relationship: Relationship,
) -> Result<(), CohortError> {
    if !repo.gate().admits_header(&relationship.header) {
        // Silent rejection: the caller gets Ok and nothing is stored.
        rejected(
            repo,
            Operation::SaveRelationshipReferenceCopy,
            user_id,
            relationship.guid(),
            relationship.header.instance_provenance_type,
            &relationship.header.metadata_collection_id,
        );
        return Ok(());
    }
    validate_relationship_copy(repo, &relationship)?;

    let guid = relationship.guid().clone();
    let [one, two] = relationship.end_guids();
    let _locks = repo.lock([guid.clone(), one.clone(), two.clone()]);
    let (held, entity, ends_held, retired_guid) = repo.read(|s| {
        let mut ends_held = [false; 2];
        for (slot, end) in ends_held.iter_mut().zip([one, two]) {
            *slot = s.get_entity(end)?.is_some() || s.get_proxy(end)?.is_some();
        }
        let mut retired_guid = None;
        for candidate in [&guid, one, two] {
            if s.is_retired(candidate)? {
                retired_guid = Some(candidate.clone());
                break;
            }
        }
        Ok((
            s.get_relationship(&guid)?,
            s.get_entity(&guid)?,
            ends_held,
            retired_guid,
        ))
    })?;
    if let Some(retired_guid) = retired_guid {
        // Neither the relationship nor a purged end may come back.
        retired(
            repo,
            Operation::SaveRelationshipReferenceCopy,
            user_id,
            &retired_guid,
        );
        return Ok(());
    }
    if entity.is_some() {
        return Err(CohortError::RelationshipConflict(format!(
            "Guid {guid} belongs to an entity"
        )));
    }
    if let Some(held) = held {
        if held.header.instance_type != relationship.header.instance_type {
            return Err(CohortError::RelationshipConflict(format!(
                "Relationship {guid} is held as {} but the copy is a {}",
                held.type_name(),
                relationship.type_name()
            )));
        }
        if held.header.is_writable_by(repo.local())
            && held.header.metadata_collection_id != relationship.header.metadata_collection_id
        {
            return Err(CohortError::HomeRelationship {
                guid: guid.to_string(),
                home: held.header.metadata_collection_id.to_string(),
            });
        }
        if relationship.header.version <= held.header.version {
            stale(
                "relationship",
                &guid,
                relationship.header.version,
                held.header.version,
            );
            return Ok(());
        }
    }

    let mut changes = ChangeSet::new();
    let proxies = [&relationship.entity_one_proxy, &relationship.entity_two_proxy];
    let mut stored_ends = Vec::new();
    for (proxy, held) in proxies.into_iter().zip(ends_held) {
        if !held && !stored_ends.contains(&proxy.guid()) {
            stored_ends.push(proxy.guid());
            changes.put_proxy(proxy.clone());
        }
    }
    debug!(guid = %guid, proxies = stored_ends.len(), "Relationship end proxies stored");
    changes.put_relationship(relationship.clone());
    repo.commit(changes)?;

    info!(guid = %guid, "Relationship reference copy saved");
    repo.audit_action(
        Operation::SaveRelationshipReferenceCopy,
        user_id,
        &guid,
        "Relationship reference copy saved",
    );
    Ok(())
}

fn validate_relationship_copy<S: InstanceStore>(
    repo: &Repository<S>,
    relationship: &Relationship,
) -> Result<(), CohortError> {
    let header = &relationship.header;
    if header.guid.as_str().trim().is_empty() {
        return Err(CohortError::InvalidRelationship(
            "Relationship copy has no guid".to_string(),
        ));
    }
    if header.version == 0 {
        return Err(CohortError::InvalidRelationship(format!(
            "Relationship copy {} has version 0",
            header.guid
        )));
    }
    if header.metadata_collection_id.as_str().trim().is_empty() {
        return Err(CohortError::InvalidRelationship(format!(
            "Relationship copy {} has no home collection",
            header.guid
        )));
    }
    for end in [&relationship.entity_one_proxy, &relationship.entity_two_proxy] {
        if end.guid().as_str().trim().is_empty() {
            return Err(CohortError::InvalidRelationship(format!(
                "Relationship copy {} has an end without a guid",
                header.guid
            )));
        }
    }

    let types = repo.types();
    let resolved = types.resolve_type_by_guid(
        &header.instance_type.type_def_guid,
        InstanceKind::Relationship,
    )?;
    if resolved.type_def_name != header.instance_type.type_def_name {
        return Err(CohortError::TypeError(format!(
            "Relationship copy {} names type {} but guid {} is {}",
            header.guid,
            header.instance_type.type_def_name,
            header.instance_type.type_def_guid,
            resolved.type_def_name
        )));
    }
    check_property_count(&relationship.properties)?;
    types.validate_properties_for_type(relationship.type_name(), &relationship.properties)?;
    for end in [&relationship.entity_one_proxy, &relationship.entity_two_proxy] {
        types.validate_type_for_instance(end.type_name(), InstanceKind::Entity)?;
    }
    types.validate_relationship_ends(
        relationship.type_name(),
        relationship.entity_one_proxy.type_name(),
        relationship.entity_two_proxy.type_name(),
    )
}

pub(crate) fn purge_relationship_reference_copy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    type_guid: &str,
    type_name: &str,
    home: &MetadataCollectionId,
) -> Result<(), CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(home.as_str(), "homeMetadataCollectionId")?;
    let locks = repo.lock_relationship_with_ends(guid)?;
    let rel = repo
        .read(|s| s.get_relationship(guid))?
        .ok_or_else(|| CohortError::relationship_not_known(guid))?;
    require_type(&rel.header, type_guid, type_name)?;
    if rel.header.is_writable_by(repo.local()) {
        return Err(CohortError::HomeRelationship {
            guid: guid.to_string(),
            home: rel.header.metadata_collection_id.to_string(),
        });
    }
    if &rel.header.metadata_collection_id != home {
        return Err(CohortError::InvalidParameter(format!(
            "Relationship {guid} is homed in {}, not {home}",
            rel.header.metadata_collection_id
        )));
    }

    let mut changes = ChangeSet::new();
    changes.remove_relationship(guid.clone());
    let removed = BTreeSet::from([guid.clone()]);
    let orphans = repo.orphaned_proxies(&locks, rel.end_guids(), &removed)?;
    debug!(guid = %guid, proxies = orphans.len(), "Orphaned end proxies removed");
    for orphan in orphans {
        changes.remove_proxy(orphan);
    }
    repo.commit(changes)?;

    info!(guid = %guid, "Relationship reference copy purged");
    repo.audit_action(
        Operation::PurgeRelationshipReferenceCopy,
        user_id,
        guid,
        "Relationship reference copy purged",
    );
    Ok(())
}
