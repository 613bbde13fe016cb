//! # Instance Store
//!
//! The backing data structure behind a repository.
//!
//! `InstanceStore` is deliberately dumb: it stores and indexes what it is
//! given and never applies lifecycle, home or provenance rules. Those live in
//! the repository, which validates a whole mutation first and then hands the
//! store one [`ChangeSet`] to apply. Backends apply a change set atomically
//! (the redb backend uses a single write transaction).
//!
//! All fallible operations return `Result<T, CohortError>` so in-memory and
//! persistent backends are interchangeable.

use crate::{CohortError, EntityDetail, EntityProxy, Guid, Relationship};

// =============================================================================
// CHANGE SETS
// =============================================================================

/// One write in a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    PutEntity(EntityDetail),
    RemoveEntity(Guid),
    PutProxy(EntityProxy),
    RemoveProxy(Guid),
    /// Insert or replace; the end index follows the new ends.
    PutRelationship(Relationship),
    RemoveRelationship(Guid),
    /// Mark a guid as never to be reissued.
    Retire(Guid),
}

/// An ordered batch of writes applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn put_entity(&mut self, entity: EntityDetail) {
        self.push(Change::PutEntity(entity));
    }

    pub fn remove_entity(&mut self, guid: Guid) {
        self.push(Change::RemoveEntity(guid));
    }

    pub fn put_proxy(&mut self, proxy: EntityProxy) {
        self.push(Change::PutProxy(proxy));
    }

    pub fn remove_proxy(&mut self, guid: Guid) {
        self.push(Change::RemoveProxy(guid));
    }

    pub fn put_relationship(&mut self, relationship: Relationship) {
        self.push(Change::PutRelationship(relationship));
    }

    pub fn remove_relationship(&mut self, guid: Guid) {
        self.push(Change::RemoveRelationship(guid));
    }

    pub fn retire(&mut self, guid: Guid) {
        self.push(Change::Retire(guid));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl From<Change> for ChangeSet {
    fn from(change: Change) -> Self {
        Self {
            changes: vec![change],
        }
    }
}

// =============================================================================
// INSTANCESTORE TRAIT
// =============================================================================

/// Storage contract for entities, proxies, relationships and retired guids.
///
/// Reads return owned values so callers never hold references into the store.
pub trait InstanceStore {
    /// Look up a full entity, whatever its status.
    fn get_entity(&self, guid: &Guid) -> Result<Option<EntityDetail>, CohortError>;

    /// Look up a stored proxy (an endpoint not materialized as a full entity).
    fn get_proxy(&self, guid: &Guid) -> Result<Option<EntityProxy>, CohortError>;

    /// Look up a relationship, whatever its status.
    fn get_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CohortError>;

    /// Guids of every stored relationship with an end at `entity`, in guid order.
    fn relationships_for_entity(&self, entity: &Guid) -> Result<Vec<Guid>, CohortError>;

    /// True when the guid was purged or re-identified away.
    fn is_retired(&self, guid: &Guid) -> Result<bool, CohortError>;

    /// Apply every change in order, atomically.
    fn apply(&mut self, changes: ChangeSet) -> Result<(), CohortError>;

    fn entity_count(&self) -> Result<usize, CohortError>;

    fn proxy_count(&self) -> Result<usize, CohortError>;

    fn relationship_count(&self) -> Result<usize, CohortError>;

    fn retired_count(&self) -> Result<usize, CohortError>;

    /// Every stored entity in guid order.
    fn entities(&self) -> Result<Vec<EntityDetail>, CohortError>;

    /// Every stored proxy in guid order.
    fn proxies(&self) -> Result<Vec<EntityProxy>, CohortError>;

    /// Every stored relationship in guid order.
    fn relationships(&self) -> Result<Vec<Relationship>, CohortError>;

    /// True when the guid names any live instance (entity, proxy or relationship).
    fn contains_guid(&self, guid: &Guid) -> Result<bool, CohortError> {
        Ok(self.get_entity(guid)?.is_some()
            || self.get_proxy(guid)?.is_some()
            || self.get_relationship(guid)?.is_some())
    }

    /// True when the guid is live or retired.
    fn is_guid_taken(&self, guid: &Guid) -> Result<bool, CohortError> {
        Ok(self.contains_guid(guid)? || self.is_retired(guid)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_set_keeps_order() {
        let mut changes = ChangeSet::new();
        changes.remove_entity(Guid::new("a"));
        changes.retire(Guid::new("a"));
        assert_eq!(changes.len(), 2);

        let collected: Vec<Change> = changes.into_iter().collect();
        assert_eq!(collected[0], Change::RemoveEntity(Guid::new("a")));
        assert_eq!(collected[1], Change::Retire(Guid::new("a")));
    }

    #[test]
    fn single_change_converts() {
        let changes = ChangeSet::from(Change::Retire(Guid::new("g")));
        assert!(!changes.is_empty());
        assert_eq!(changes.iter().count(), 1);
    }
}
