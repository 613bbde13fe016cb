//! # Store Façade
//!
//! [`MetadataCollection`] is the single entry point callers use, whatever the
//! repository variant. [`Repository`] implements it over any [`InstanceStore`].
//!
//! Every mutating call is dispatched in the same order:
//!
//! 1. capability check (`FunctionNotSupported`, nothing read or written)
//! 2. structural parameter checks (`InvalidParameter`)
//! 3. type validation through the injected [`TypeValidator`]
//! 4. lifecycle, identity or provenance logic (`lifecycle`, `identity`, `provenance`)
//! 5. one atomic [`ChangeSet`] applied to the store
//! 6. an audit event
//!
//! Every check in steps 2-4 completes before step 5, so a failed call leaves
//! the store unchanged.
//!
//! ## Concurrency
//!
//! All methods take `&self`. The store sits behind a `parking_lot::RwLock`;
//! reads clone out of it and never block one another. Mutations first lock
//! the guids they touch through the [`LockTable`] (ascending order), then
//! plan under the shared lock and commit under the exclusive lock.

use crate::audit::{AuditEvent, AuditSeverity, AuditSink, NullAuditSink};
use crate::locks::{GuidLocks, LockTable};
use crate::primitives::{MAX_GUID_MINT_ATTEMPTS, MAX_IDENTIFIER_LENGTH, MAX_LOCK_ATTEMPTS};
use crate::provenance::ProvenanceGate;
use crate::store::{ChangeSet, InstanceStore};
use crate::system::RepositoryMetrics;
use crate::typedef::TypeValidator;
use crate::{
    CapabilitySet, Classification, ClassificationRequest, CohortError, EntityDetail,
    EntityProxy, EntityReference, Guid, InstanceProperties, InstanceStatus, MetadataCollectionId,
    Operation, Relationship, identity, lifecycle, provenance,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// METADATA COLLECTION CONTRACT
// =============================================================================

/// The uniform instance API of a repository.
///
/// Mutating operations may answer `FunctionNotSupported` on restricted
/// variants; reads are never gated.
pub trait MetadataCollection: Send + Sync {
    /// Identity of this collection; fixed at construction.
    fn metadata_collection_id(&self) -> &MetadataCollectionId;

    fn metadata_collection_name(&self) -> &str;

    /// Operations this variant supports.
    fn capabilities(&self) -> CapabilitySet;

    // ----- reads ------------------------------------------------------------

    /// A non-deleted entity, or `EntityNotKnown`.
    fn get_entity_detail(&self, user_id: &str, guid: &Guid) -> Result<EntityDetail, CohortError>;

    /// A non-deleted entity, if any.
    fn is_entity_known(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<EntityDetail>, CohortError>;

    /// The proxy of a non-deleted entity, or a stored proxy.
    fn get_entity_proxy(&self, user_id: &str, guid: &Guid) -> Result<EntityProxy, CohortError>;

    /// A non-deleted relationship, or `RelationshipNotKnown`.
    fn get_relationship(&self, user_id: &str, guid: &Guid) -> Result<Relationship, CohortError>;

    fn is_relationship_known(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<Relationship>, CohortError>;

    /// Non-deleted relationships with an end at a known entity or proxy.
    fn get_relationships_for_entity(
        &self,
        user_id: &str,
        entity_guid: &Guid,
    ) -> Result<Vec<Relationship>, CohortError>;

    /// Administrative status lookup; includes DELETED instances.
    fn instance_status(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<InstanceStatus>, CohortError>;

    fn metrics(&self) -> Result<RepositoryMetrics, CohortError>;

    /// Every stored entity, deleted ones included, in guid order.
    fn entities_snapshot(&self) -> Result<Vec<EntityDetail>, CohortError>;

    /// Every stored relationship, deleted ones included, in guid order.
    fn relationships_snapshot(&self) -> Result<Vec<Relationship>, CohortError>;

    // ----- entity lifecycle -------------------------------------------------

    fn add_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        properties: InstanceProperties,
        classifications: Vec<ClassificationRequest>,
        status: Option<InstanceStatus>,
    ) -> Result<EntityDetail, CohortError>;

    /// Add an entity homed in an external source this collection replicates.
    fn add_external_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        source_guid: &MetadataCollectionId,
        source_name: Option<&str>,
        properties: InstanceProperties,
        classifications: Vec<ClassificationRequest>,
        status: Option<InstanceStatus>,
    ) -> Result<EntityDetail, CohortError>;

    /// Store a proxy for an entity not materialized here.
    fn add_entity_proxy(&self, user_id: &str, proxy: EntityProxy) -> Result<(), CohortError>;

    fn update_entity_status(
        &self,
        user_id: &str,
        guid: &Guid,
        new_status: InstanceStatus,
    ) -> Result<EntityDetail, CohortError>;

    /// Merge `properties` over the current ones.
    fn update_entity_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError>;

    fn delete_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<EntityDetail, CohortError>;

    fn purge_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<(), CohortError>;

    fn restore_entity(&self, user_id: &str, guid: &Guid) -> Result<EntityDetail, CohortError>;

    fn classify_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError>;

    fn declassify_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
    ) -> Result<EntityDetail, CohortError>;

    /// Merge `properties` over a classification's current ones.
    fn update_entity_classification(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError>;

    // ----- entity identity --------------------------------------------------

    fn re_identify_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<EntityDetail, CohortError>;

    fn re_type_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        current_type_guid: &str,
        current_type_name: &str,
        new_type_guid: &str,
    ) -> Result<EntityDetail, CohortError>;

    fn re_home_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
        new_home: &MetadataCollectionId,
        new_home_name: Option<&str>,
    ) -> Result<EntityDetail, CohortError>;

    // ----- relationship lifecycle -------------------------------------------

    fn add_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        properties: InstanceProperties,
        entity_one_guid: &Guid,
        entity_two_guid: &Guid,
        status: Option<InstanceStatus>,
    ) -> Result<Relationship, CohortError>;

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
    ) -> Result<Relationship, CohortError>;

    fn update_relationship_status(
        &self,
        user_id: &str,
        guid: &Guid,
        new_status: InstanceStatus,
    ) -> Result<Relationship, CohortError>;

    fn update_relationship_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: InstanceProperties,
    ) -> Result<Relationship, CohortError>;

    fn delete_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError>;

    fn purge_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<(), CohortError>;

    fn restore_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError>;

    // ----- relationship identity --------------------------------------------

    fn re_identify_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError>;

    fn re_type_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
        current_type_guid: &str,
        current_type_name: &str,
        new_type_guid: &str,
    ) -> Result<Relationship, CohortError>;

    fn re_home_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
        new_home: &MetadataCollectionId,
        new_home_name: Option<&str>,
    ) -> Result<Relationship, CohortError>;

    // ----- reference copies -------------------------------------------------

    /// Returns `Ok(())` without storing anything when the copy's provenance
    /// does not qualify.
    fn save_entity_reference_copy(
        &self,
        user_id: &str,
        entity: EntityDetail,
    ) -> Result<(), CohortError>;

    fn purge_entity_reference_copy(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<(), CohortError>;

    /// Returns `Ok(())` without storing anything when the classification's
    /// provenance does not qualify.
    fn save_classification_reference_copy(
        &self,
        user_id: &str,
        entity: EntityReference,
        classification: Classification,
    ) -> Result<(), CohortError>;

    fn purge_classification_reference_copy(
        &self,
        user_id: &str,
        entity: EntityReference,
        classification_name: &str,
    ) -> Result<(), CohortError>;

    /// Returns `Ok(())` without storing anything when the copy's provenance
    /// does not qualify.
    fn save_relationship_reference_copy(
        &self,
        user_id: &str,
        relationship: Relationship,
    ) -> Result<(), CohortError>;

    fn purge_relationship_reference_copy(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<(), CohortError>;
}

// =============================================================================
// PARAMETER CHECKS
// =============================================================================

pub(crate) fn check_identifier(value: &str, name: &str) -> Result<(), CohortError> {
    if value.trim().is_empty() {
        return Err(CohortError::InvalidParameter(format!(
            "{name} must not be empty"
        )));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CohortError::InvalidParameter(format!(
            "{name} exceeds {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    Ok(())
}

pub(crate) fn check_user(user_id: &str) -> Result<(), CohortError> {
    check_identifier(user_id, "userId")
}

pub(crate) fn check_guid(guid: &Guid, name: &str) -> Result<(), CohortError> {
    check_identifier(guid.as_str(), name)
}

// =============================================================================
// REPOSITORY
// =============================================================================

/// A repository over a backing [`InstanceStore`].
pub struct Repository<S> {
    store: RwLock<S>,
    locks: LockTable,
    local: MetadataCollectionId,
    local_name: String,
    capabilities: CapabilitySet,
    types: Arc<dyn TypeValidator>,
    audit: Arc<dyn AuditSink>,
    gate: ProvenanceGate,
}

impl<S> std::fmt::Debug for Repository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("metadata_collection_id", &self.local)
            .field("metadata_collection_name", &self.local_name)
            .field("capabilities", &self.capabilities.len())
            .finish_non_exhaustive()
    }
}

impl<S: InstanceStore> Repository<S> {
    /// Create a full-capability repository with a null audit sink.
    pub fn new(
        store: S,
        metadata_collection_id: MetadataCollectionId,
        types: Arc<dyn TypeValidator>,
    ) -> Result<Self, CohortError> {
        check_identifier(metadata_collection_id.as_str(), "metadataCollectionId")?;
        Ok(Self {
            store: RwLock::new(store),
            locks: LockTable::new(),
            local_name: metadata_collection_id.to_string(),
            gate: ProvenanceGate::new(metadata_collection_id.clone()),
            local: metadata_collection_id,
            capabilities: CapabilitySet::full(),
            types,
            audit: Arc::new(NullAuditSink),
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Run `f` against the backing store under the shared lock.
    pub fn with_store<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.store.read())
    }

    /// Consume the repository, returning the backing store.
    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    // ----- crate-internal plumbing -------------------------------------------

    pub(crate) fn local(&self) -> &MetadataCollectionId {
        &self.local
    }

    pub(crate) fn local_name(&self) -> &str {
        &self.local_name
    }

    pub(crate) fn types(&self) -> &dyn TypeValidator {
        self.types.as_ref()
    }

    pub(crate) fn gate(&self) -> &ProvenanceGate {
        &self.gate
    }

    /// Capability and caller checks shared by every mutating operation.
    pub(crate) fn admit(&self, operation: Operation, user_id: &str) -> Result<(), CohortError> {
        self.capabilities.check(operation)?;
        check_user(user_id)
    }

    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&S) -> Result<T, CohortError>,
    ) -> Result<T, CohortError> {
        f(&self.store.read())
    }

    pub(crate) fn commit(&self, changes: ChangeSet) -> Result<(), CohortError> {
        self.store.write().apply(changes)
    }

    pub(crate) fn lock<I: IntoIterator<Item = Guid>>(&self, guids: I) -> GuidLocks<'_> {
        self.locks.lock(guids)
    }

    /// Lock an entity, every relationship attached to it and `extra`.
    ///
    /// The attached set is re-read under the locks; if a relationship was
    /// added in between, the locks are dropped and the set collected again.
    pub(crate) fn lock_entity_with_relationships(
        &self,
        entity: &Guid,
        extra: &[Guid],
    ) -> Result<GuidLocks<'_>, CohortError> {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            let attached = self.read(|s| s.relationships_for_entity(entity))?;
            let locks = self.locks.lock(
                std::iter::once(entity.clone())
                    .chain(attached)
                    .chain(extra.iter().cloned()),
            );
            let current = self.read(|s| s.relationships_for_entity(entity))?;
            if locks.covers(current.iter()) {
                return Ok(locks);
            }
        }
        Err(CohortError::Repository(format!(
            "Relationships of entity {entity} kept changing while locking"
        )))
    }

    /// Lock a stored relationship together with both of its ends.
    pub(crate) fn lock_relationship_with_ends(
        &self,
        relationship: &Guid,
    ) -> Result<GuidLocks<'_>, CohortError> {
        let ends: Vec<Guid> = self
            .read(|s| s.get_relationship(relationship))?
            .ok_or_else(|| CohortError::relationship_not_known(relationship))?
            .end_guids()
            .into_iter()
            .cloned()
            .collect();
        Ok(self.locks.lock(std::iter::once(relationship.clone()).chain(ends)))
    }

    /// Mint a guid that is neither live nor retired.
    pub(crate) fn mint_guid(&self) -> Result<Guid, CohortError> {
        for _ in 0..MAX_GUID_MINT_ATTEMPTS {
            let candidate = Guid::generate();
            if !self.read(|s| s.is_guid_taken(&candidate))? {
                return Ok(candidate);
            }
        }
        Err(CohortError::Repository(
            "Could not mint an unused guid".to_string(),
        ))
    }

    pub(crate) fn unique_property_names(&self, type_name: &str) -> Vec<String> {
        self.types.unique_property_names(type_name)
    }

    /// The proxy of an entity, with the unique properties its type declares.
    pub(crate) fn proxy_of(&self, entity: &EntityDetail) -> EntityProxy {
        EntityProxy::from_entity(entity, &self.unique_property_names(entity.type_name()))
    }

    /// Resolve a relationship end: a non-deleted entity or a stored proxy.
    pub(crate) fn resolve_end(&self, store: &S, guid: &Guid) -> Result<EntityProxy, CohortError> {
        match store.get_entity(guid)? {
            Some(entity) if !entity.header.status.is_deleted() => Ok(self.proxy_of(&entity)),
            Some(_) => Err(CohortError::entity_not_known(guid)),
            None => store
                .get_proxy(guid)?
                .ok_or_else(|| CohortError::entity_not_known(guid)),
        }
    }

    /// Ends of the relationships attached to `entity`, other than `entity`.
    pub(crate) fn attached_ends(&self, entity: &Guid) -> Result<Vec<Guid>, CohortError> {
        self.read(|s| {
            let mut ends = Vec::new();
            for rel_guid in s.relationships_for_entity(entity)? {
                if let Some(rel) = s.get_relationship(&rel_guid)? {
                    ends.extend(rel.end_guids().into_iter().filter(|g| *g != entity).cloned());
                }
            }
            Ok(ends)
        })
    }

    /// End proxies that no relationship references once `removed` are gone.
    ///
    /// Only ends held in `locks` are considered; an end backed by an entity
    /// is never an orphan.
    pub(crate) fn orphaned_proxies<'g>(
        &self,
        locks: &GuidLocks<'_>,
        ends: impl IntoIterator<Item = &'g Guid>,
        removed: &BTreeSet<Guid>,
    ) -> Result<Vec<Guid>, CohortError> {
        self.read(|s| {
            let mut orphans: Vec<Guid> = Vec::new();
            for end in ends {
                if orphans.contains(end) || !locks.covers([end]) {
                    continue;
                }
                if s.get_entity(end)?.is_some() || s.get_proxy(end)?.is_none() {
                    continue;
                }
                let referenced = s
                    .relationships_for_entity(end)?
                    .iter()
                    .any(|rel| !removed.contains(rel));
                if !referenced {
                    orphans.push(end.clone());
                }
            }
            Ok(orphans)
        })
    }

    pub(crate) fn record(&self, event: AuditEvent) {
        self.audit.record(&event);
    }

    pub(crate) fn audit_action(
        &self,
        operation: Operation,
        user_id: &str,
        guid: &Guid,
        message: impl Into<String>,
    ) {
        self.record(
            AuditEvent::new(AuditSeverity::Action, message)
                .for_operation(operation, user_id)
                .with_guid(guid),
        );
    }

    fn known_entity(&self, guid: &Guid) -> Result<Option<EntityDetail>, CohortError> {
        Ok(self
            .read(|s| s.get_entity(guid))?
            .filter(|e| !e.header.status.is_deleted()))
    }

    fn known_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CohortError> {
        Ok(self
            .read(|s| s.get_relationship(guid))?
            .filter(|r| !r.header.status.is_deleted()))
    }
}

// =============================================================================
// METADATA COLLECTION IMPLEMENTATION
// =============================================================================

impl<S: InstanceStore + Send + Sync> MetadataCollection for Repository<S> {
    fn metadata_collection_id(&self) -> &MetadataCollectionId {
        &self.local
    }

    fn metadata_collection_name(&self) -> &str {
        &self.local_name
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn get_entity_detail(&self, user_id: &str, guid: &Guid) -> Result<EntityDetail, CohortError> {
        self.is_entity_known(user_id, guid)?
            .ok_or_else(|| CohortError::entity_not_known(guid))
    }

    fn is_entity_known(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<EntityDetail>, CohortError> {
        check_user(user_id)?;
        check_guid(guid, "guid")?;
        self.known_entity(guid)
    }

    fn get_entity_proxy(&self, user_id: &str, guid: &Guid) -> Result<EntityProxy, CohortError> {
        check_user(user_id)?;
        check_guid(guid, "guid")?;
        if let Some(entity) = self.known_entity(guid)? {
            return Ok(self.proxy_of(&entity));
        }
        self.read(|s| s.get_proxy(guid))?
            .ok_or_else(|| CohortError::entity_not_known(guid))
    }

    fn get_relationship(&self, user_id: &str, guid: &Guid) -> Result<Relationship, CohortError> {
        self.is_relationship_known(user_id, guid)?
            .ok_or_else(|| CohortError::relationship_not_known(guid))
    }

    fn is_relationship_known(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<Relationship>, CohortError> {
        check_user(user_id)?;
        check_guid(guid, "guid")?;
        self.known_relationship(guid)
    }

    fn get_relationships_for_entity(
        &self,
        user_id: &str,
        entity_guid: &Guid,
    ) -> Result<Vec<Relationship>, CohortError> {
        check_user(user_id)?;
        check_guid(entity_guid, "entityGuid")?;
        self.read(|s| {
            self.resolve_end(s, entity_guid)?;
            let mut relationships = Vec::new();
            for guid in s.relationships_for_entity(entity_guid)? {
                if let Some(rel) = s.get_relationship(&guid)?
                    && !rel.header.status.is_deleted()
                {
                    relationships.push(rel);
                }
            }
            Ok(relationships)
        })
    }

    fn instance_status(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Option<InstanceStatus>, CohortError> {
        check_user(user_id)?;
        check_guid(guid, "guid")?;
        self.read(|s| {
            if let Some(entity) = s.get_entity(guid)? {
                return Ok(Some(entity.header.status));
            }
            if let Some(rel) = s.get_relationship(guid)? {
                return Ok(Some(rel.header.status));
            }
            Ok(s.get_proxy(guid)?.map(|p| p.header.status))
        })
    }

    fn metrics(&self) -> Result<RepositoryMetrics, CohortError> {
        self.read(|s| RepositoryMetrics::from_store(s, &self.local))
    }

    fn entities_snapshot(&self) -> Result<Vec<EntityDetail>, CohortError> {
        self.read(|s| s.entities())
    }

    fn relationships_snapshot(&self) -> Result<Vec<Relationship>, CohortError> {
        self.read(|s| s.relationships())
    }

    fn add_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        properties: InstanceProperties,
        classifications: Vec<ClassificationRequest>,
        status: Option<InstanceStatus>,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::AddEntity, user_id)?;
        let origin = lifecycle::Origin::local(self);
        lifecycle::add_entity(
            self,
            Operation::AddEntity,
            user_id,
            type_guid,
            origin,
            properties,
            classifications,
            status,
        )
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
        self.admit(Operation::AddExternalEntity, user_id)?;
        let origin = lifecycle::Origin::external(self, source_guid, source_name)?;
        lifecycle::add_entity(
            self,
            Operation::AddExternalEntity,
            user_id,
            type_guid,
            origin,
            properties,
            classifications,
            status,
        )
    }

    fn add_entity_proxy(&self, user_id: &str, proxy: EntityProxy) -> Result<(), CohortError> {
        self.admit(Operation::AddEntityProxy, user_id)?;
        lifecycle::add_entity_proxy(self, user_id, proxy)
    }

    fn update_entity_status(
        &self,
        user_id: &str,
        guid: &Guid,
        new_status: InstanceStatus,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::UpdateEntityStatus, user_id)?;
        lifecycle::update_entity_status(self, user_id, guid, new_status)
    }

    fn update_entity_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::UpdateEntityProperties, user_id)?;
        lifecycle::update_entity_properties(self, user_id, guid, properties)
    }

    fn delete_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::DeleteEntity, user_id)?;
        lifecycle::delete_entity(self, user_id, type_guid, type_name, guid)
    }

    fn purge_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<(), CohortError> {
        self.admit(Operation::PurgeEntity, user_id)?;
        lifecycle::purge_entity(self, user_id, type_guid, type_name, guid)
    }

    fn restore_entity(&self, user_id: &str, guid: &Guid) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::RestoreEntity, user_id)?;
        lifecycle::restore_entity(self, user_id, guid)
    }

    fn classify_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::ClassifyEntity, user_id)?;
        lifecycle::classify_entity(self, user_id, guid, classification_name, properties)
    }

    fn declassify_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::DeclassifyEntity, user_id)?;
        lifecycle::declassify_entity(self, user_id, guid, classification_name)
    }

    fn update_entity_classification(
        &self,
        user_id: &str,
        guid: &Guid,
        classification_name: &str,
        properties: InstanceProperties,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::UpdateEntityClassification, user_id)?;
        lifecycle::update_entity_classification(
            self,
            user_id,
            guid,
            classification_name,
            properties,
        )
    }

    fn re_identify_entity(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::ReIdentifyEntity, user_id)?;
        identity::re_identify_entity(self, user_id, type_guid, type_name, guid)
    }

    fn re_type_entity(
        &self,
        user_id: &str,
        guid: &Guid,
        current_type_guid: &str,
        current_type_name: &str,
        new_type_guid: &str,
    ) -> Result<EntityDetail, CohortError> {
        self.admit(Operation::ReTypeEntity, user_id)?;
        identity::re_type_entity(
            self,
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
        self.admit(Operation::ReHomeEntity, user_id)?;
        identity::re_home_entity(
            self,
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
        self.admit(Operation::AddRelationship, user_id)?;
        let origin = lifecycle::Origin::local(self);
        lifecycle::add_relationship(
            self,
            Operation::AddRelationship,
            user_id,
            type_guid,
            origin,
            properties,
            [entity_one_guid, entity_two_guid],
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
        self.admit(Operation::AddExternalRelationship, user_id)?;
        let origin = lifecycle::Origin::external(self, source_guid, source_name)?;
        lifecycle::add_relationship(
            self,
            Operation::AddExternalRelationship,
            user_id,
            type_guid,
            origin,
            properties,
            [entity_one_guid, entity_two_guid],
            status,
        )
    }

    fn update_relationship_status(
        &self,
        user_id: &str,
        guid: &Guid,
        new_status: InstanceStatus,
    ) -> Result<Relationship, CohortError> {
        self.admit(Operation::UpdateRelationshipStatus, user_id)?;
        lifecycle::update_relationship_status(self, user_id, guid, new_status)
    }

    fn update_relationship_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: InstanceProperties,
    ) -> Result<Relationship, CohortError> {
        self.admit(Operation::UpdateRelationshipProperties, user_id)?;
        lifecycle::update_relationship_properties(self, user_id, guid, properties)
    }

    fn delete_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError> {
        self.admit(Operation::DeleteRelationship, user_id)?;
        lifecycle::delete_relationship(self, user_id, type_guid, type_name, guid)
    }

    fn purge_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<(), CohortError> {
        self.admit(Operation::PurgeRelationship, user_id)?;
        lifecycle::purge_relationship(self, user_id, type_guid, type_name, guid)
    }

    fn restore_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError> {
        self.admit(Operation::RestoreRelationship, user_id)?;
        lifecycle::restore_relationship(self, user_id, guid)
    }

    fn re_identify_relationship(
        &self,
        user_id: &str,
        type_guid: &str,
        type_name: &str,
        guid: &Guid,
    ) -> Result<Relationship, CohortError> {
        self.admit(Operation::ReIdentifyRelationship, user_id)?;
        identity::re_identify_relationship(self, user_id, type_guid, type_name, guid)
    }

    fn re_type_relationship(
        &self,
        user_id: &str,
        guid: &Guid,
        current_type_guid: &str,
        current_type_name: &str,
        new_type_guid: &str,
    ) -> Result<Relationship, CohortError> {
        self.admit(Operation::ReTypeRelationship, user_id)?;
        identity::re_type_relationship(
            self,
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
        self.admit(Operation::ReHomeRelationship, user_id)?;
        identity::re_home_relationship(
            self,
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
        self.admit(Operation::SaveEntityReferenceCopy, user_id)?;
        provenance::save_entity_reference_copy(self, user_id, entity)
    }

    fn purge_entity_reference_copy(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<(), CohortError> {
        self.admit(Operation::PurgeEntityReferenceCopy, user_id)?;
        provenance::purge_entity_reference_copy(self, user_id, guid, type_guid, type_name, home)
    }

    fn save_classification_reference_copy(
        &self,
        user_id: &str,
        entity: EntityReference,
        classification: Classification,
    ) -> Result<(), CohortError> {
        self.admit(Operation::SaveClassificationReferenceCopy, user_id)?;
        provenance::save_classification_reference_copy(self, user_id, entity, classification)
    }

    fn purge_classification_reference_copy(
        &self,
        user_id: &str,
        entity: EntityReference,
        classification_name: &str,
    ) -> Result<(), CohortError> {
        self.admit(Operation::PurgeClassificationReferenceCopy, user_id)?;
        provenance::purge_classification_reference_copy(self, user_id, entity, classification_name)
    }

    fn save_relationship_reference_copy(
        &self,
        user_id: &str,
        relationship: Relationship,
    ) -> Result<(), CohortError> {
        self.admit(Operation::SaveRelationshipReferenceCopy, user_id)?;
        provenance::save_relationship_reference_copy(self, user_id, relationship)
    }

    fn purge_relationship_reference_copy(
        &self,
        user_id: &str,
        guid: &Guid,
        type_guid: &str,
        type_name: &str,
        home: &MetadataCollectionId,
    ) -> Result<(), CohortError> {
        self.admit(Operation::PurgeRelationshipReferenceCopy, user_id)?;
        provenance::purge_relationship_reference_copy(
            self, user_id, guid, type_guid, type_name, home,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_checked() {
        assert!(check_user("alice").is_ok());
        assert!(matches!(
            check_user("  "),
            Err(CohortError::InvalidParameter(_))
        ));
        let long = "x".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(check_identifier(&long, "typeName").is_err());
        assert!(check_guid(&Guid::new(""), "guid").is_err());
    }
}
