//! # Identity Reassignment
//!
//! Re-identify (new guid), re-type (new type definition) and re-home (new
//! home collection) for entities and relationships.
//!
//! An entity's identity is embedded in the proxies held by every relationship
//! attached to it, so entity changes lock and rewrite those relationships in
//! the same commit. Relationships writable here get version+1; reference
//! copies keep the version their home assigned.

use crate::lifecycle::{
    check_property_count, live_entity, live_relationship, require_entity_home,
    require_relationship_home, require_type,
};
use crate::repository::{Repository, check_guid, check_identifier};
use crate::store::{ChangeSet, InstanceStore};
use crate::{
    CohortError, EntityDetail, Guid, InstanceHeader, InstanceKind, MetadataCollectionId,
    Operation, Relationship,
};
use chrono::{DateTime, Utc};
use tracing::info;

/// Point every relationship attached to `old_guid` at the current form of
/// `entity`.
fn rewrite_attached<S: InstanceStore>(
    repo: &Repository<S>,
    changes: &mut ChangeSet,
    old_guid: &Guid,
    entity: &EntityDetail,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, CohortError> {
    let proxy = repo.proxy_of(entity);
    let attached = repo.read(|s| s.relationships_for_entity(old_guid))?;
    let mut rewritten = 0usize;
    for rel_guid in attached {
        let Some(mut rel) = repo.read(|s| s.get_relationship(&rel_guid))? else {
            continue;
        };
        for end in rel.proxies_for_mut(old_guid) {
            *end = proxy.clone();
        }
        if rel.header.is_writable_by(repo.local()) {
            rel.header.touch(user_id, now);
        }
        changes.put_relationship(rel);
        rewritten += 1;
    }
    Ok(rewritten)
}

/// Move `header` from `home` to `new_home`.
fn move_home(
    header: &mut InstanceHeader,
    home: &MetadataCollectionId,
    new_home: &MetadataCollectionId,
    new_home_name: Option<&str>,
    local: &MetadataCollectionId,
) -> Result<(), CohortError> {
    check_identifier(home.as_str(), "homeMetadataCollectionId")?;
    check_identifier(new_home.as_str(), "newHomeMetadataCollectionId")?;
    if &header.metadata_collection_id != home {
        return Err(CohortError::InvalidParameter(format!(
            "Instance {} is homed in {}, not {home}",
            header.guid, header.metadata_collection_id
        )));
    }
    header.metadata_collection_id = new_home.clone();
    header.metadata_collection_name = new_home_name.map(str::to_string);
    if new_home == local {
        header.replicated_by = None;
    }
    Ok(())
}

// =============================================================================
// ENTITIES
// =============================================================================

pub(crate) fn re_identify_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    type_guid: &str,
    type_name: &str,
    guid: &Guid,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    let new_guid = repo.mint_guid()?;
    let _locks = repo.lock_entity_with_relationships(guid, std::slice::from_ref(&new_guid))?;
    let mut entity = live_entity(repo, guid)?;
    require_type(&entity.header, type_guid, type_name)?;
    require_entity_home(&entity.header, repo.local())?;
    if repo.read(|s| s.is_guid_taken(&new_guid))? {
        return Err(CohortError::Repository(format!(
            "Minted guid {new_guid} was claimed concurrently"
        )));
    }

    let now = Utc::now();
    entity.header.guid = new_guid.clone();
    entity.header.re_identified_from_guid = Some(guid.clone());
    entity.header.touch(user_id, now);

    let mut changes = ChangeSet::new();
    let rewritten = rewrite_attached(repo, &mut changes, guid, &entity, user_id, now)?;
    changes.remove_entity(guid.clone());
    changes.put_entity(entity.clone());
    changes.retire(guid.clone());
    repo.commit(changes)?;

    info!(old = %guid, new = %new_guid, rewritten, "Entity re-identified");
    repo.audit_action(
        Operation::ReIdentifyEntity,
        user_id,
        &new_guid,
        format!("Entity re-identified from {guid}"),
    );
    Ok(entity)
}

pub(crate) fn re_type_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    current_type_guid: &str,
    current_type_name: &str,
    new_type_guid: &str,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(new_type_guid, "newTypeDefGuid")?;
    let _locks = repo.lock_entity_with_relationships(guid, &[])?;
    let mut entity = live_entity(repo, guid)?;
    require_type(&entity.header, current_type_guid, current_type_name)?;
    require_entity_home(&entity.header, repo.local())?;

    let new_type = repo
        .types()
        .resolve_type_by_guid(new_type_guid, InstanceKind::Entity)?;
    if new_type == entity.header.instance_type {
        return Ok(entity);
    }
    let new_name = new_type.type_def_name.as_str();
    let types = repo.types();
    types.validate_properties_for_type(new_name, &entity.properties)?;
    types.validate_instance_status(new_name, entity.header.status)?;
    for classification in &entity.classifications {
        types.validate_classification_for_entity(&classification.name, new_name)?;
    }

    // Every attached relationship must accept the new end type before anything changes.
    for rel_guid in repo.read(|s| s.relationships_for_entity(guid))? {
        let Some(rel) = repo.read(|s| s.get_relationship(&rel_guid))? else {
            continue;
        };
        if rel.header.status.is_deleted() {
            continue;
        }
        let end_type = |end: &crate::EntityProxy| {
            if end.guid() == guid {
                new_name.to_string()
            } else {
                end.type_name().to_string()
            }
        };
        types.validate_relationship_ends(
            rel.type_name(),
            &end_type(&rel.entity_one_proxy),
            &end_type(&rel.entity_two_proxy),
        )?;
    }

    let now = Utc::now();
    let old_name = entity.type_name().to_string();
    entity.header.instance_type = new_type;
    entity.header.touch(user_id, now);
    let mut changes = ChangeSet::new();
    let rewritten = rewrite_attached(repo, &mut changes, guid, &entity, user_id, now)?;
    changes.put_entity(entity.clone());
    repo.commit(changes)?;

    info!(guid = %guid, from = %old_name, to = %entity.type_name(), rewritten, "Entity re-typed");
    repo.audit_action(
        Operation::ReTypeEntity,
        user_id,
        guid,
        format!("Entity re-typed from {old_name} to {}", entity.type_name()),
    );
    Ok(entity)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn re_home_entity<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    type_guid: &str,
    type_name: &str,
    home: &MetadataCollectionId,
    new_home: &MetadataCollectionId,
    new_home_name: Option<&str>,
) -> Result<EntityDetail, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock_entity_with_relationships(guid, &[])?;
    let mut entity = live_entity(repo, guid)?;
    require_type(&entity.header, type_guid, type_name)?;
    move_home(&mut entity.header, home, new_home, new_home_name, repo.local())?;

    let now = Utc::now();
    entity.header.touch(user_id, now);
    let mut changes = ChangeSet::new();
    let rewritten = rewrite_attached(repo, &mut changes, guid, &entity, user_id, now)?;
    changes.put_entity(entity.clone());
    repo.commit(changes)?;

    info!(guid = %guid, from = %home, to = %new_home, rewritten, "Entity re-homed");
    repo.audit_action(
        Operation::ReHomeEntity,
        user_id,
        guid,
        format!("Entity re-homed from {home} to {new_home}"),
    );
    Ok(entity)
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

pub(crate) fn re_identify_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    type_guid: &str,
    type_name: &str,
    guid: &Guid,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    let new_guid = repo.mint_guid()?;
    let _locks = repo.lock([guid.clone(), new_guid.clone()]);
    let mut rel = live_relationship(repo, guid)?;
    require_type(&rel.header, type_guid, type_name)?;
    require_relationship_home(&rel.header, repo.local())?;
    if repo.read(|s| s.is_guid_taken(&new_guid))? {
        return Err(CohortError::Repository(format!(
            "Minted guid {new_guid} was claimed concurrently"
        )));
    }

    rel.header.guid = new_guid.clone();
    rel.header.re_identified_from_guid = Some(guid.clone());
    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.remove_relationship(guid.clone());
    changes.put_relationship(rel.clone());
    changes.retire(guid.clone());
    repo.commit(changes)?;

    info!(old = %guid, new = %new_guid, "Relationship re-identified");
    repo.audit_action(
        Operation::ReIdentifyRelationship,
        user_id,
        &new_guid,
        format!("Relationship re-identified from {guid}"),
    );
    Ok(rel)
}

pub(crate) fn re_type_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    current_type_guid: &str,
    current_type_name: &str,
    new_type_guid: &str,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    check_identifier(new_type_guid, "newTypeDefGuid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut rel = live_relationship(repo, guid)?;
    require_type(&rel.header, current_type_guid, current_type_name)?;
    require_relationship_home(&rel.header, repo.local())?;

    let new_type = repo
        .types()
        .resolve_type_by_guid(new_type_guid, InstanceKind::Relationship)?;
    if new_type == rel.header.instance_type {
        return Ok(rel);
    }
    let new_name = new_type.type_def_name.as_str();
    let types = repo.types();
    check_property_count(&rel.properties)?;
    types.validate_properties_for_type(new_name, &rel.properties)?;
    types.validate_instance_status(new_name, rel.header.status)?;
    types.validate_relationship_ends(
        new_name,
        rel.entity_one_proxy.type_name(),
        rel.entity_two_proxy.type_name(),
    )?;

    let old_name = rel.type_name().to_string();
    rel.header.instance_type = new_type;
    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.put_relationship(rel.clone());
    repo.commit(changes)?;

    info!(guid = %guid, from = %old_name, to = %rel.type_name(), "Relationship re-typed");
    repo.audit_action(
        Operation::ReTypeRelationship,
        user_id,
        guid,
        format!("Relationship re-typed from {old_name} to {}", rel.type_name()),
    );
    Ok(rel)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn re_home_relationship<S: InstanceStore>(
    repo: &Repository<S>,
    user_id: &str,
    guid: &Guid,
    type_guid: &str,
    type_name: &str,
    home: &MetadataCollectionId,
    new_home: &MetadataCollectionId,
    new_home_name: Option<&str>,
) -> Result<Relationship, CohortError> {
    check_guid(guid, "guid")?;
    let _locks = repo.lock([guid.clone()]);
    let mut rel = live_relationship(repo, guid)?;
    require_type(&rel.header, type_guid, type_name)?;
    move_home(&mut rel.header, home, new_home, new_home_name, repo.local())?;

    rel.header.touch(user_id, Utc::now());
    let mut changes = ChangeSet::new();
    changes.put_relationship(rel.clone());
    repo.commit(changes)?;

    info!(guid = %guid, from = %home, to = %new_home, "Relationship re-homed");
    repo.audit_action(
        Operation::ReHomeRelationship,
        user_id,
        guid,
        format!("Relationship re-homed from {home} to {new_home}"),
    );
    Ok(rel)
}
