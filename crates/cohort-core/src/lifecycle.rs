//! # Lifecycle Controller
//!
//! Create, update, soft-delete, purge and restore for entities and
//! relationships, plus entity classification.
//!
//! ```text
//! DRAFT -> PREPARED -> ACTIVE <-> DELETED -> (purged)
//! ```
//!
//! Status updates only move forward among DRAFT < PREPARED < ACTIVE. DELETED
//! is entered through delete and left through restore. Purge is irreversible
//! and retires the guid.
//!
//! Capability and caller checks run in the façade before anything here.

use crate::primitives::{MAX_CLASSIFICATIONS, MAX_PROPERTIES};
use crate::repository::{Repository, check_guid, check_identifier};
use crate::store::{Change, ChangeSet, InstanceStore};
use crate::{
    Classification, ClassificationRequest, CohortError, EntityDetail, EntityProxy, Guid,
    InstanceHeader, InstanceKind, InstanceProperties, InstanceProvenanceType, InstanceStatus,
    InstanceType, MetadataCollectionId, Operation, Relationship,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info};

// =============================================================================
// ORIGIN
// =============================================================================

/// Home and provenance stamped on newly created instances.
#[derive(Debug, Clone)]
pub(crate) struct Origin {
    home: MetadataCollectionId,
    home_name: Option<String>,
    provenance: InstanceProvenanceType,
    replicated_by: Option<MetadataCollectionId>,
}

impl Origin {
    /// Instances homed in this collection.
    pub(crate) fn local<S: InstanceStore>(repo: &Repository<S>) -> Self {
        Self {
            home: repo.local().clone(),
            home_name: Some(repo.local_name().to_string()),
            provenance: InstanceProvenanceType::LocalCohort,
            replicated_by: None,
        }
    }

    /// Instances homed in an external source and replicated by this collection.
    pub(crate) fn external<S: InstanceStore>(
        repo: &Repository<S>,
        source: &MetadataCollectionId,
        source_name: Option<&str>,
    ) -> Result<Self, CohortError> {
        check_identifier(source.as_str(), "externalSourceGuid")?;
        if source == repo.local() {
            return Err(CohortError::InvalidParameter(format!(
                "External source {source} is this collection"
            )));
        }
        Ok(Self {
            home: source.clone(),
            home_name: source_name.map(str::to_string),
            provenance: InstanceProvenanceType::ExternalSource,
            replicated_by: Some(repo.local().clone()),
        })
    }

    fn header(
        &self,
        guid: Guid,
        instance_type: InstanceType,
        status: InstanceStatus,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> InstanceHeader {
        let mut header = InstanceHeader::new(
            guid,
            instance_type,
            status,
            self.home.clone(),
            self.provenance,
        )
        .created(user_id, now);
        header.metadata_collection_name = self.home_name.clone();
        header.replicated_by = self.replicated_by.clone();
        header
    }

    fn classification(
        &self,
        instance_type: InstanceType,
        properties: InstanceProperties,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Classification {
        let mut classification =
            Classification::new(instance_type, properties, self.home.clone(), self.provenance);
        classification.metadata_collection_name = self.home_name.clone();
        classification.created_by = Some(user_id.to_string());
        classification.create_time = Some(now);
        classification
    }
}

// =============================================================================
// SHARED CHECKS
// =============================================================================

pub(crate) fn check_property_count(properties: &InstanceProperties) -> Result<(), CohortError> {
    if properties.len() > MAX_PROPERTIES {
        return Err(CohortError::PropertyError(format!(
            "{} properties exceed the limit of {MAX_PROPERTIES}",
            properties.len()
        )));
    }
    Ok(())
}

/// Status for a new instance: ACTIVE unless given, never DELETED.
fn initial_status<S: InstanceStore>(
    repo: &Repository<S>,
    type_name: &str,
    requested: Option<InstanceStatus>,
) -> Result<InstanceStatus, CohortError> {
    let status = requested.unwrap_or_default();
    if status.is_deleted() {
        return Err(CohortError::StatusNotSupported(
            "Instances cannot be created DELETED".to_string(),
        ));
    }
    repo.types().validate_instance_status(type_name, status)?;
    Ok(status)
}

/// Next status for an update, or `None` when nothing changes.
fn next_status<S: InstanceStore>(
    repo: &Repository<S>,
    type_name: &str,
    current: InstanceStatus,
    requested: InstanceStatus,
) -> Result<Option<InstanceStatus>, CohortError> {
    if requested == current {
        return Ok(None);
    }
    if requested.is_deleted() {
        return Err(CohortError::StatusNotSupported(
            "DELETED is only reachable through delete".to_string(),
        ));
    }
    if requested.ordinal() < current.ordinal() {
        return Err(CohortError::StatusNotSupported(format!(
            "Cannot move from {current} back to {requested}"
        )));
    }
    repo.types().validate_instance_status(type_name, requested)?;
    Ok(Some(requested))
}

pub(crate) fn require_entity_home(
    entity_header: &InstanceHeader,
    local: &MetadataCollectionId,
) -> Result<(), CohortError> {
    if entity_header.is_writable_by(local) {
        Ok(())
    } else {
        Err(CohortError::HomeEntity {
            guid: entity_header.guid.to_string(),
            home: entity_header.metadata_collection_id.to_string(),
        })
    }
}

pub(crate) fn require_relationship_home(
    header: &InstanceHeader,
    local: &MetadataCollectionId,
) -> Result<(), CohortError> {
    if header.is_writable_by(local) {
        Ok(())
    } else {
        Err(CohortError::HomeRelationship {
            guid: header.guid.to_string(),
            home: header.metadata_collection_id.to_string(),
        })
    }
}

pub(crate) fn require_type(
    header: &InstanceHeader,
    type_guid: &str,
    type_name: &str,
) -> Result<(), CohortError> {
    check_identifier(type_guid, "typeDefGuid")?;
    check_identifier(type_name, "typeDefName")?;
    if header.instance_type.matches(type_guid, type_name) {
        Ok(())
    } else {
        Err(CohortError::TypeError(format!(
            "Instance {} is a {} ({}), not {type_name} ({type_guid})",
            header.guid, header.instance_type.type_def_name, header.instance_type.type_def_guid
        )))
    }
}

pub(crate) fn live_entity<S: InstanceStore>(
    repo: &Repository<S>,
    guid: &Guid,
) -> Result<EntityDetail, CohortError> {
    repo.read(|s| s.get_entity(guid))?
        .filter(|e| !e.header.status.is_deleted())
        .ok_or_else(|| CohortError::entity_not_known(guid))
}

pub(crate) fn stored_entity<S: InstanceStore>(
    repo: &Repository<S>,
    guid: &Guid,
) -> Result<EntityDetail, CohortError> {
    repo.read(|s| s.get_entity(guid))?
        .ok_or_else(|| CohortError::entity_not_known(guid))
}

pub(crate) fn live_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    guid: &Guid,
) -> Result<Relationship, CohortError> {
    repo.read(|s| s.get_relationship(guid))?
        .filter(|r| !r.header.status.is_deleted())
        .ok_or_else(|| CohortError::relationship_not_known(guid))
}

pub(crate) fn stored_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    guid: &Guid,
) -> Result<Relationship, CohortError> {
    repo.read(|s| s.get_relationship(guid))?
        .ok_or_else(|| CohortError::relationship_not_known(guid))
}

/// Merge `update` over `current`; `None` when no value changes.
fn merged(
    current: &InstanceProperties,
    update: InstanceProperties,
) -> Option<InstanceProperties> {
    let mut result = current.clone();
    let mut changed = false;
    for (name, value) in update {
        if result.get(&name) != Some(&value) {
            result.insert(name, value);
            changed = true;
        }
    }
    changed.then_some(result)
}

/// Validate a classification request against an entity type and build it.
fn build_classification<S: InstanceStore>(
    repo: &Repository<S>,
    origin: &Origin,
    entity_type_name: &str,
    request: ClassificationRequest,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Classification, CohortError> {
    check_identifier(&request.name, "classificationName")?;
    repo.types()
        .validate_classification_for_entity(&request.name, entity_type_name)?;
    let instance_type = repo
        .types()
        .resolve_type_by_name(&request.name, InstanceKind::Classification)
        .map_err(|e| CohortError::ClassificationError(e.to_string()))?;
    check_property_count(&request.properties)?;
    repo.types()
        .validate_properties_for_type(&request.name, &request.properties)?;
    Ok(origin.classification(instance_type, request.properties, user_id, now))
}

// =============================================================================
// ENTITY LIFECYCLE
// =============================================================================

#[allow(clippy::too_many_arguments)]
pub(crate) fn add_entity<S: InstanceStore>(
    repo: &Repository<S>,
    operation: Operation,
    user_id: &str,
    type_guid: &str,
    origin: Origin,
    properties: InstanceProperties,
    classifications: Vec<ClassificationRequest>,
    status: Option<InstanceStatus>,
) -> Result<EntityDetail, CohortError> {
    check_identifier(type_guid, "typeDefGuid")?;
    let instance_type = repo
        .types()
        .resolve_type_by_guid(type_guid, InstanceKind::Entity)?;
    let type_name = instance_type.type_def_name.clone();
    check_property_count(&properties)?;
    repo.types()
        .validate_properties_for_type(&type_name, &properties)?;
    let status = initial_status(repo, &type_name, status)?;

    if classifications.len() > MAX_CLASSIFICATIONS {
        return Err(CohortError::ClassificationError(format!(
            "{} classifications exceed the limit of {MAX_CLASSIFICATIONS}",
            classifications.len()
        )));
    }
    let now = Utc::now();
    let mut names = BTreeSet::new();
    let mut built = Vec::with_capacity(classifications.len());
    for request in classifications {
        if !names.insert(request.name.clone()) {
            return Err(CohortError::ClassificationError(format!(
                "Classification {} requested twice",
                request.name
            )));
        }
        built.push(build_classification(
            repo, &origin, &type_name, request, user_id, now,
        )?);
    }

    let guid = repo.mint_guid()?;
    let _locks = repo.lock([guid.clone()]);
    if repo.read(|s| s.is_guid_taken(&guid))? {
        return Err(CohortError::Repository(format!(
            "Minted guid {guid} was claimed concurrently"
        )));
    }

    let mut entity = EntityDetail::new(
        origin.header(guid, instance_type, status, user_id, now),
        properties,
    );
    entity.classifications = built;
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %entity.guid(), type_name = %type_name, "Entity added");
    repo.audit_action(operation, user_id, entity.guid(), "Entity added");
    Ok(entity)
}

pub(crate) fn add_entity_proxy<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    proxy: EntityProxy,
) -> Result<(), CohortError> {
    check_guid(proxy.guid(), "proxy.guid")?;
    repo.types()
        .validate_type_for_instance(proxy.type_name(), InstanceKind::Entity)?;
    if proxy.header.version == 0 {
        return Err(CohortError::InvalidEntity(format!(
            "Proxy {} has version 0",
            proxy.guid()
        )));
    }

    let guid = proxy.guid().clone();
    let _locks = repo.lock([guid.clone()]);
    let (entity, held, relationship, retired) = repo.read(|s| {
        Ok((
            s.get_entity(&guid)?,
            s.get_proxy(&guid)?,
            s.get_relationship(&guid)?,
            s.is_retired(&guid)?,
        ))
    })?;
    if retired {
        debug!(guid = %guid, "Proxy ignored: guid is retired");
        return Ok(());
    }
    if relationship.is_some() {
        return Err(CohortError::EntityConflict(format!(
            "Guid {guid} belongs to a relationship"
        )));
    }
    if entity.is_some() {
        debug!(guid = %guid, "Proxy ignored: entity is stored");
        return Ok(());
    }
    if held.is_some_and(|h| h.header.version >= proxy.header.version) {
        debug!(guid = %guid, "Proxy ignored: held proxy is not older");
        return Ok(());
    }

    let mut changes = ChangeSet::new();
    changes.put_proxy(proxy);
    repo.commit(changes)?;
    repo.audit_action(Operation::AddEntityProxy, user_id, &guid, "Entity proxy stored");
    Ok(())
}

pub(crate) fn update_entity_status<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    new_status: InstanceStatus,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut entity = live_entity(repo, guid)?;
    require_entity_home(&entity.header, repo.local())?;

    let Some(status) = next_status(repo, entity.type_name(), entity.header.status, new_status)?
    else {
        return Ok(entity);
    };
    entity.header.status = status;
    entity.header.touch(user_id, Utc::now());
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %guid, status = %status, "Entity status updated");
    repo.audit_action(
        Operation::UpdateEntityStatus,
        user_id,
        guid,
        format!("Entity status set to {status}"),
    );
    Ok(entity)
}

pub(crate) fn update_entity_properties<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    properties: InstanceProperties,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut entity = live_entity(repo, guid)?;
    require_entity_home(&entity.header, repo.local())?;

    let Some(properties) = merged(&entity.properties, properties) else {
        return Ok(entity);
    };
    check_property_count(&properties)?;
    repo.types()
        .validate_properties_for_type(entity.type_name(), &properties)?;
    entity.properties = properties;
    entity.header.touch(user_id, Utc::now());
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %guid, version = entity.header.version, "Entity properties updated");
    repo.audit_action(
        Operation::UpdateEntityProperties,
        user_id,
        guid,
        "Entity properties updated",
    );
    Ok(entity)
}

pub(crate) fn delete_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    type_guid: &str,
    type_name: &str,
    guid: &Guid,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    let ends = repo.attached_ends(guid)?;
    let locks = repo.lock_entity_with_relationships(guid, &ends)?;
    let mut entity = stored_entity(repo, guid)?;
    require_type(&entity.header, type_guid, type_name)?;
    require_entity_home(&entity.header, repo.local())?;
    if entity.header.status != InstanceStatus::Active {
        return Err(CohortError::StatusNotSupported(format!(
            "Entity {guid} is {}; only an ACTIVE entity can be deleted",
            entity.header.status
        )));
    }

    let now = Utc::now();
    let local = repo.local();
    let mut changes = ChangeSet::new();
    let mut soft_deleted = 0usize;
    let mut purged = BTreeSet::new();
    let mut purged_ends = Vec::new();
    for rel_guid in repo.read(|s| s.relationships_for_entity(guid))? {
        let Some(mut rel) = repo.read(|s| s.get_relationship(&rel_guid))? else {
            continue;
        };
        if !rel.header.is_writable_by(local) {
            purged_ends.extend(rel.end_guids().into_iter().cloned());
            changes.remove_relationship(rel_guid.clone());
            purged.insert(rel_guid);
        } else if !rel.header.status.is_deleted() {
            rel.header.status_on_delete = Some(rel.header.status);
            rel.header.status = InstanceStatus::Deleted;
            rel.header.touch(user_id, now);
            changes.put_relationship(rel);
            soft_deleted += 1;
        }
    }

    for orphan in repo.orphaned_proxies(&locks, &purged_ends, &purged)? {
        changes.remove_proxy(orphan);
    }

    entity.header.status_on_delete = Some(entity.header.status);
    entity.header.status = InstanceStatus::Deleted;
    entity.header.touch(user_id, now);
    changes.put_entity(entity.clone());
    repo.commit(changes)?;

    debug!(guid = %guid, soft_deleted, purged = purged.len(), "Delete cascaded to relationships");
    info!(guid = %guid, "Entity deleted");
    repo.audit_action(Operation::DeleteEntity, user_id, guid, "Entity soft-deleted");
    Ok(entity)
}

pub(crate) fn purge_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    type_guid: &str,
    type_name: &str,
    guid: &Guid,
) -> Result<(), CohortError> {
    check_guid(guid, "guid")?;
    let ends = repo.attached_ends(guid)?;
    let locks = repo.lock_entity_with_relationships(guid, &ends)?;
    let entity = stored_entity(repo, guid)?;
    require_type(&entity.header, type_guid, type_name)?;
    require_entity_home(&entity.header, repo.local())?;
    if !entity.header.status.is_deleted() {
        return Err(CohortError::EntityNotDeleted {
            guid: guid.to_string(),
        });
    }

    let mut changes = ChangeSet::new();
    let attached: BTreeSet<Guid> = repo
        .read(|s| s.relationships_for_entity(guid))?
        .into_iter()
        .collect();
    let cascaded = attached.len();
    for rel_guid in &attached {
        changes.remove_relationship(rel_guid.clone());
        changes.retire(rel_guid.clone());
    }
    for orphan in repo.orphaned_proxies(&locks, &ends, &attached)? {
        changes.remove_proxy(orphan);
    }
    changes.remove_entity(guid.clone());
    changes.remove_proxy(guid.clone());
    changes.retire(guid.clone());
    repo.commit(changes)?;

    debug!(guid = %guid, cascaded, "Purge cascaded to relationships");
    info!(guid = %guid, "Entity purged");
    repo.audit_action(Operation::PurgeEntity, user_id, guid, "Entity purged");
    Ok(())
}

pub(crate) fn restore_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut entity = stored_entity(repo, guid)?;
    require_entity_home(&entity.header, repo.local())?;
    if !entity.header.status.is_deleted() {
        return Err(CohortError::EntityNotDeleted {
            guid: guid.to_string(),
        });
    }

    // status_on_delete is kept for inspection only; restore always activates.
    entity.header.status = InstanceStatus::Active;
    entity.header.status_on_delete = None;
    entity.header.touch(user_id, Utc::now());
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %guid, status = %entity.header.status, "Entity restored");
    repo.audit_action(Operation::RestoreEntity, user_id, guid, "Entity restored");
    Ok(entity)
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

pub(crate) fn classify_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    classification_name: &str,
    properties: InstanceProperties,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(classification_name, "classificationName")?;
    let _locks = repo.lock([guid.clone()]);
    let mut entity = live_entity(repo, guid)?;
    require_entity_home(&entity.header, repo.local())?;
    if entity.classification(classification_name).is_some() {
        return Err(CohortError::ClassificationError(format!(
            "Entity {guid} is already classified as {classification_name}"
        )));
    }
    if entity.classifications.len() >= MAX_CLASSIFICATIONS {
        return Err(CohortError::ClassificationError(format!(
            "Entity {guid} already has {MAX_CLASSIFICATIONS} classifications"
        )));
    }

    let now = Utc::now();
    let classification = build_classification(
        repo,
        &Origin::local(repo),
        entity.type_name(),
        ClassificationRequest::new(classification_name).with_properties(properties),
        user_id,
        now,
    )?;
    entity.upsert_classification(classification);
    entity.header.touch(user_id, now);
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %guid, classification = classification_name, "Entity classified");
    repo.audit_action(
        Operation::ClassifyEntity,
        user_id,
        guid,
        format!("Classification {classification_name} added"),
    );
    Ok(entity)
}

pub(crate) fn declassify_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    classification_name: &str,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(classification_name, "classificationName")?;
    let _locks = repo.lock([guid.clone()]);
    let mut entity = live_entity(repo, guid)?;
    require_entity_home(&entity.header, repo.local())?;
    if entity.remove_classification(classification_name).is_none() {
        return Err(CohortError::ClassificationError(format!(
            "Entity {guid} is not classified as {classification_name}"
        )));
    }
    entity.header.touch(user_id, Utc::now());
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %guid, classification = classification_name, "Entity declassified");
    repo.audit_action(
        Operation::DeclassifyEntity,
        user_id,
        guid,
        format!("Classification {classification_name} removed"),
    );
    Ok(entity)
}

pub(crate) fn update_entity_classification<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    classification_name: &str,
    properties: InstanceProperties,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(classification_name, "classificationName")?;
    let _locks = repo.lock([guid.clone()]);
    let mut entity = live_entity(repo, guid)?;
    require_entity_home(&entity.header, repo.local())?;
    let Some(held) = entity.classification(classification_name) else {
        return Err(CohortError::ClassificationError(format!(
            "Entity {guid} is not classified as {classification_name}"
        )));
    };

    let Some(merged) = merged(&held.properties, properties) else {
        return Ok(entity);
    };
    check_property_count(&merged)?;
    repo.types()
        .validate_properties_for_type(classification_name, &merged)?;
    let now = Utc::now();
    let mut classification = held.clone();
    classification.properties = merged;
    classification.touch(user_id, now);
    entity.upsert_classification(classification);
    entity.header.touch(user_id, now);
    repo.commit(Change::PutEntity(entity.clone()).into())?;

    info!(guid = %guid, classification = classification_name, "Classification updated");
    repo.audit_action(
        Operation::UpdateEntityClassification,
        user_id,
        guid,
        format!("Classification {classification_name} updated"),
    );
    Ok(entity)
}

// =============================================================================
// RELATIONSHIP LIFECYCLE
// =============================================================================

#[allow(clippy::too_many_arguments)]
pub(crate) fn add_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    operation: Operation,
    user_id: &str,
    type_guid: &str,
    origin: Origin,
    properties: InstanceProperties,
    ends: [&Guid; 2],
    status: Option<InstanceStatus>,
) -> Result<Relationship, CohortError> {
    check_identifier(type_guid, "typeDefGuid")?;
    check_guid(ends[0], "entityOneGuid")?;
    check_guid(ends[1], "entityTwoGuid")?;
    let instance_type = repo
        .types()
        .resolve_type_by_guid(type_guid, InstanceKind::Relationship)?;
    let type_name = instance_type.type_def_name.clone();
    check_property_count(&properties)?;
    repo.types()
        .validate_properties_for_type(&type_name, &properties)?;
    let status = initial_status(repo, &type_name, status)?;

    let guid = repo.mint_guid()?;
    let _locks = repo.lock([guid.clone(), ends[0].clone(), ends[1].clone()]);
    let (one, two) = repo.read(|s| {
        if s.is_guid_taken(&guid)? {
            return Err(CohortError::Repository(format!(
                "Minted guid {guid} was claimed concurrently"
            )));
        }
        Ok((repo.resolve_end(s, ends[0])?, repo.resolve_end(s, ends[1])?))
    })?;
    repo.types()
        .validate_relationship_ends(&type_name, one.type_name(), two.type_name())?;

    let relationship = Relationship {
        header: origin.header(guid, instance_type, status, user_id, Utc::now()),
        properties,
        entity_one_proxy: one,
        entity_two_proxy: two,
    };
    let mut changes = ChangeSet::new();
    changes.put_relationship(relationship.clone());
    repo.commit(changes)?;

    info!(guid = %relationship.guid(), type_name = %type_name, "Relationship added");
    repo.audit_action(operation, user_id, relationship.guid(), "Relationship added");
    Ok(relationship)
}

pub(crate) fn update_relationship_status<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    new_status: InstanceStatus,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut rel = live_relationship(repo, guid)?;
    require_relationship_home(&rel.header, repo.local())?;

    let Some(status) = next_status(repo, rel.type_name(), rel.header.status, new_status)? else {
        return Ok(rel);
    };
    rel.header.status = status;
    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.put_relationship(rel.clone());
    repo.commit(changes)?;

    info!(guid = %guid, status = %status, "Relationship status updated");
    repo.audit_action(
        Operation::UpdateRelationshipStatus,
        user_id,
        guid,
        format!("Relationship status set to {status}"),
    );
    Ok(rel)
}

pub(crate) fn update_relationship_properties<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    properties: InstanceProperties,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut rel = live_relationship(repo, guid)?;
    require_relationship_home(&rel.header, repo.local())?;

    let Some(properties) = merged(&rel.properties, properties) else {
        return Ok(rel);
    };
    check_property_count(&properties)?;
    repo.types()
        .validate_properties_for_type(rel.type_name(), &properties)?;
    rel.properties = properties;
    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.put_relationship(rel.clone());
    repo.commit(changes)?;

    info!(guid = %guid, version = rel.header.version, "Relationship properties updated");
    repo.audit_action(
        Operation::UpdateRelationshipProperties,
        user_id,
        guid,
        "Relationship properties updated",
    );
    Ok(rel)
}

pub(crate) fn delete_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    type_guid: &str,
    type_name: &str,
    guid: &Guid,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut rel = stored_relationship(repo, guid)?;
    require_type(&rel.header, type_guid, type_name)?;
    require_relationship_home(&rel.header, repo.local())?;
    if rel.header.status != InstanceStatus::Active {
        return Err(CohortError::StatusNotSupported(format!(
            "Relationship {guid} is {}; only an ACTIVE relationship can be deleted",
            rel.header.status
        )));
    }

    rel.header.status_on_delete = Some(rel.header.status);
    rel.header.status = InstanceStatus::Deleted;
    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.put_relationship(rel.clone());
    repo.commit(changes)?;

    info!(guid = %guid, "Relationship deleted");
    repo.audit_action(
        Operation::DeleteRelationship,
        user_id,
        guid,
        "Relationship soft-deleted",
    );
    Ok(rel)
}

pub(crate) fn purge_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    type_guid: &str,
    type_name: &str,
    guid: &Guid,
) -> Result<(), CohortError> {
    check_guid(guid, "guid")?;
    let locks = repo.lock_relationship_with_ends(guid)?;
    let rel = stored_relationship(repo, guid)?;
    require_type(&rel.header, type_guid, type_name)?;
    require_relationship_home(&rel.header, repo.local())?;
    if !rel.header.status.is_deleted() {
        return Err(CohortError::RelationshipNotDeleted {
            guid: guid.to_string(),
        });
    }

    let mut changes = ChangeSet::new();
    changes.remove_relationship(guid.clone());
    changes.retire(guid.clone());
    let removed = BTreeSet::from([guid.clone()]);
    for orphan in repo.orphaned_proxies(&locks, rel.end_guids(), &removed)? {
        changes.remove_proxy(orphan);
    }
    repo.commit(changes)?;

    info!(guid = %guid, "Relationship purged");
    repo.audit_action(Operation::PurgeRelationship, user_id, guid, "Relationship purged");
    Ok(())
}

pub(crate) fn restore_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock_relationship_with_ends(guid)?;

    let mut rel = stored_relationship(repo, guid)?;
    require_relationship_home(&rel.header, repo.local())?;
    if !rel.header.status.is_deleted() {
        return Err(CohortError::RelationshipNotDeleted {
            guid: guid.to_string(),
        });
    }
    let [one, two] = rel.end_guids();
    repo.read(|s| {
        repo.resolve_end(s, one)?;
        repo.resolve_end(s, two)
    })?;

    rel.header.status = InstanceStatus::Active;
    rel.header.status_on_delete = None;
    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.put_relationship(rel.clone());
    repo.commit(changes)?;

    info!(guid = %guid, status = %rel.header.status, "Relationship restored");
    repo.audit_action(
        Operation::RestoreRelationship,
        user_id,
        guid,
        "Relationship restored",
    );
    Ok(rel)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::PropertyValue;

    #[test]
    fn merge_reports_no_change() {
        let mut current = InstanceProperties::new();
        current.insert("name".into(), PropertyValue::from("a"));

        let mut same = InstanceProperties::new();
        same.insert("name".into(), PropertyValue::from("a"));
        assert!(merged(&current, same).is_none());

        let mut update = InstanceProperties::new();
        update.insert("owner".into(), PropertyValue::from("bob"));
        let result = merged(&current, update).expect("changed");
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn type_check_matches_guid_and_name() {
        let header = InstanceHeader::new(
            Guid::new("e1"),
            InstanceType::new("t-asset", "Asset", InstanceKind::Entity),
            InstanceStatus::Active,
            MetadataCollectionId::new("local"),
            InstanceProvenanceType::LocalCohort,
        );
        assert!(require_type(&header, "t-asset", "Asset").is_ok());
        assert!(matches!(
            require_type(&header, "t-asset", "Table"),
            Err(CohortError::TypeError(_))
        ));
        assert!(matches!(
            require_type(&header, "", "Asset"),
            Err(CohortError::InvalidParameter(_))
        ));
    }

    #[test]
    fn home_checks_name_the_home() {
        let header = InstanceHeader::new(
            Guid::new("e1"),
            InstanceType::new("t-asset", "Asset", InstanceKind::Entity),
            InstanceStatus::Active,
            MetadataCollectionId::new("peer"),
            InstanceProvenanceType::LocalCohort,
        );
        let local = MetadataCollectionId::new("local");
        match require_entity_home(&header, &local) {
            Err(CohortError::HomeEntity { guid, home }) => {
                assert_eq!(guid, "e1");
                assert_eq!(home, "peer");
            }
            other => panic!("expected HomeEntity, got {other:?}"),
        }
        assert!(matches!(
            require_relationship_home(&header, &local),
            Err(CohortError::HomeRelationship { .. })
        ));
    }
}
