//! # In-Memory Store
//!
//! `MemoryStore` implements [`InstanceStore`] with `BTreeMap`s only, so
//! iteration and serialization order are deterministic.

use crate::store::{Change, ChangeSet, InstanceStore};
use crate::{CohortError, EntityDetail, EntityProxy, Guid, Relationship};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The in-memory instance store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: BTreeMap<Guid, EntityDetail>,
    proxies: BTreeMap<Guid, EntityProxy>,
    relationships: BTreeMap<Guid, Relationship>,
    /// Entity guid -> guids of relationships with an end there.
    entity_relationships: BTreeMap<Guid, BTreeSet<Guid>>,
    retired: BTreeSet<Guid>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn index_relationship(&mut self, relationship: &Relationship) {
        for end in relationship.end_guids() {
            self.entity_relationships
                .entry(end.clone())
                .or_default()
                .insert(relationship.guid().clone());
        }
    }

    fn unindex_relationship(&mut self, relationship: &Relationship) {
        for end in relationship.end_guids() {
            if let Some(set) = self.entity_relationships.get_mut(end) {
                set.remove(relationship.guid());
                if set.is_empty() {
                    self.entity_relationships.remove(end);
                }
            }
        }
    }

    fn apply_one(&mut self, change: Change) {
        match change {
            Change::PutEntity(entity) => {
                self.entities.insert(entity.guid().clone(), entity);
            }
            Change::RemoveEntity(guid) => {
                self.entities.remove(&guid);
            }
            Change::PutProxy(proxy) => {
                self.proxies.insert(proxy.guid().clone(), proxy);
            }
            Change::RemoveProxy(guid) => {
                self.proxies.remove(&guid);
            }
            Change::PutRelationship(relationship) => {
                if let Some(old) = self.relationships.remove(relationship.guid()) {
                    self.unindex_relationship(&old);
                }
                self.index_relationship(&relationship);
                self.relationships
                    .insert(relationship.guid().clone(), relationship);
            }
            Change::RemoveRelationship(guid) => {
                if let Some(old) = self.relationships.remove(&guid) {
                    self.unindex_relationship(&old);
                }
            }
            Change::Retire(guid) => {
                self.retired.insert(guid);
            }
        }
    }
}

impl InstanceStore for MemoryStore {
    fn get_entity(&self, guid: &Guid) -> Result<Option<EntityDetail>, CohortError> {
        Ok(self.entities.get(guid).cloned())
    }

    fn get_proxy(&self, guid: &Guid) -> Result<Option<EntityProxy>, CohortError> {
        Ok(self.proxies.get(guid).cloned())
    }

    fn get_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CohortError> {
        Ok(self.relationships.get(guid).cloned())
    }

    fn relationships_for_entity(&self, entity: &Guid) -> Result<Vec<Guid>, CohortError> {
        Ok(self
            .entity_relationships
            .get(entity)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn is_retired(&self, guid: &Guid) -> Result<bool, CohortError> {
        Ok(self.retired.contains(guid))
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<(), CohortError> {
        for change in changes {
            self.apply_one(change);
        }
        Ok(())
    }

    fn entity_count(&self) -> Result<usize, CohortError> {
        Ok(self.entities.len())
    }

    fn proxy_count(&self) -> Result<usize, CohortError> {
        Ok(self.proxies.len())
    }

    fn relationship_count(&self) -> Result<usize, CohortError> {
        Ok(self.relationships.len())
    }

    fn retired_count(&self) -> Result<usize, CohortError> {
        Ok(self.retired.len())
    }

    fn entities(&self) -> Result<Vec<EntityDetail>, CohortError> {
        Ok(self.entities.values().cloned().collect())
    }

    fn proxies(&self) -> Result<Vec<EntityProxy>, CohortError> {
        Ok(self.proxies.values().cloned().collect())
    }

    fn relationships(&self) -> Result<Vec<Relationship>, CohortError> {
        Ok(self.relationships.values().cloned().collect())
    }
}

// =============================================================================
// SERIALIZABLE FORM
// =============================================================================

/// Flat, serializable form of a `MemoryStore`.
///
/// The end index is derived and rebuilt on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableStore {
    pub entities: Vec<EntityDetail>,
    pub proxies: Vec<EntityProxy>,
    pub relationships: Vec<Relationship>,
    pub retired: Vec<Guid>,
}

impl From<&MemoryStore> for SerializableStore {
    fn from(store: &MemoryStore) -> Self {
        Self {
            entities: store.entities.values().cloned().collect(),
            proxies: store.proxies.values().cloned().collect(),
            relationships: store.relationships.values().cloned().collect(),
            retired: store.retired.iter().cloned().collect(),
        }
    }
}

impl From<SerializableStore> for MemoryStore {
    fn from(snapshot: SerializableStore) -> Self {
        let mut store = Self::new();
        for entity in snapshot.entities {
            store.apply_one(Change::PutEntity(entity));
        }
        for proxy in snapshot.proxies {
            store.apply_one(Change::PutProxy(proxy));
        }
        for relationship in snapshot.relationships {
            store.apply_one(Change::PutRelationship(relationship));
        }
        store.retired = snapshot.retired.into_iter().collect();
        store
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        InstanceHeader, InstanceKind, InstanceProperties, InstanceProvenanceType, InstanceStatus,
        InstanceType, MetadataCollectionId,
    };

    fn header(guid: &str, kind: InstanceKind) -> InstanceHeader {
        InstanceHeader::new(
            Guid::new(guid),
            InstanceType::new("t", "T", kind),
            InstanceStatus::Active,
            MetadataCollectionId::new("local"),
            InstanceProvenanceType::LocalCohort,
        )
    }

    fn entity(guid: &str) -> EntityDetail {
        EntityDetail::new(header(guid, InstanceKind::Entity), InstanceProperties::new())
    }

    fn relationship(guid: &str, one: &str, two: &str) -> Relationship {
        Relationship {
            header: header(guid, InstanceKind::Relationship),
            properties: InstanceProperties::new(),
            entity_one_proxy: EntityProxy::from_entity(&entity(one), &[]),
            entity_two_proxy: EntityProxy::from_entity(&entity(two), &[]),
        }
    }

    #[test]
    fn index_follows_relationship_ends() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.put_entity(entity("e1"));
        changes.put_entity(entity("e2"));
        changes.put_relationship(relationship("r1", "e1", "e2"));
        store.apply(changes).expect("apply");

        assert_eq!(
            store.relationships_for_entity(&Guid::new("e1")).expect("index"),
            vec![Guid::new("r1")]
        );

        // Moving an end re-indexes.
        store
            .apply(Change::PutRelationship(relationship("r1", "e1", "e3")).into())
            .expect("apply");
        assert!(store
            .relationships_for_entity(&Guid::new("e2"))
            .expect("index")
            .is_empty());
        assert_eq!(
            store.relationships_for_entity(&Guid::new("e3")).expect("index"),
            vec![Guid::new("r1")]
        );

        store
            .apply(Change::RemoveRelationship(Guid::new("r1")).into())
            .expect("apply");
        assert!(store
            .relationships_for_entity(&Guid::new("e1"))
            .expect("index")
            .is_empty());
    }

    #[test]
    fn retired_guids_are_taken() {
        let mut store = MemoryStore::new();
        store
            .apply(Change::Retire(Guid::new("gone")).into())
            .expect("apply");
        assert!(store.is_retired(&Guid::new("gone")).expect("retired"));
        assert!(store.is_guid_taken(&Guid::new("gone")).expect("taken"));
        assert!(!store.contains_guid(&Guid::new("gone")).expect("live"));
    }

    #[test]
    fn serializable_roundtrip_rebuilds_index() {
        let mut store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.put_entity(entity("e1"));
        changes.put_relationship(relationship("r1", "e1", "e1"));
        changes.retire(Guid::new("old"));
        store.apply(changes).expect("apply");

        let restored = MemoryStore::from(SerializableStore::from(&store));
        assert_eq!(restored.entity_count().expect("count"), 1);
        assert_eq!(restored.retired_count().expect("count"), 1);
        assert_eq!(
            restored
                .relationships_for_entity(&Guid::new("e1"))
                .expect("index"),
            vec![Guid::new("r1")]
        );
    }
}
