//! # redb-backed Instance Storage
//!
//! A disk-backed instance store using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Values are postcard-encoded. Every [`ChangeSet`] is applied in one write
//! transaction, so a cascading delete or an identity change either lands
//! completely or not at all.

use crate::store::{Change, ChangeSet, InstanceStore};
use crate::{CohortError, EntityDetail, EntityProxy, Guid, MetadataCollectionId, Relationship};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Entity guid -> postcard `EntityDetail`
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// Proxy guid -> postcard `EntityProxy`
const PROXIES: TableDefinition<&str, &[u8]> = TableDefinition::new("proxies");

/// Relationship guid -> postcard `Relationship`
const RELATIONSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("relationships");

/// (entity guid, relationship guid) -> ()
///
/// Keyed by entity first so one entity's relationships form a contiguous range.
const ENTITY_RELATIONSHIPS: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("entity_relationships");

/// Retired guid -> ()
const RETIRED: TableDefinition<&str, ()> = TableDefinition::new("retired");

/// Metadata: key -> value
const METADATA: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const COLLECTION_ID_KEY: &str = "metadata_collection_id";

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CohortError> {
    postcard::to_allocvec(value).map_err(CohortError::storage)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CohortError> {
    postcard::from_bytes(bytes)
        .map_err(|e| CohortError::Repository(format!("Corrupted instance record: {e}")))
}

/// A disk-backed instance store.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create an instance database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CohortError> {
        let db = Database::create(path.as_ref()).map_err(CohortError::storage)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(CohortError::storage)?;
            let _ = write_txn
                .open_table(ENTITIES)
                .map_err(CohortError::storage)?;
            let _ = write_txn.open_table(PROXIES).map_err(CohortError::storage)?;
            let _ = write_txn
                .open_table(RELATIONSHIPS)
                .map_err(CohortError::storage)?;
            let _ = write_txn
                .open_table(ENTITY_RELATIONSHIPS)
                .map_err(CohortError::storage)?;
            let _ = write_txn.open_table(RETIRED).map_err(CohortError::storage)?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(CohortError::storage)?;
            write_txn.commit().map_err(CohortError::storage)?;
        }

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), CohortError> {
        self.db.compact().map_err(CohortError::storage)?;
        Ok(())
    }

    /// The collection id this database was bound to, if any.
    pub fn collection_id(&self) -> Result<Option<MetadataCollectionId>, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn
            .open_table(METADATA)
            .map_err(CohortError::storage)?;
        Ok(table
            .get(COLLECTION_ID_KEY)
            .map_err(CohortError::storage)?
            .map(|v| MetadataCollectionId::new(v.value())))
    }

    /// Bind the database to a collection id on first use.
    ///
    /// Home comparisons depend on the local id, so a database written by one
    /// collection cannot be reopened under another.
    pub fn bind_collection_id(&mut self, id: &MetadataCollectionId) -> Result<(), CohortError> {
        match self.collection_id()? {
            Some(existing) if &existing == id => Ok(()),
            Some(existing) => Err(CohortError::Repository(format!(
                "Database belongs to metadata collection {existing}, not {id}"
            ))),
            None => {
                let write_txn = self.db.begin_write().map_err(CohortError::storage)?;
                {
                    let mut table = write_txn
                        .open_table(METADATA)
                        .map_err(CohortError::storage)?;
                    table
                        .insert(COLLECTION_ID_KEY, id.as_str())
                        .map_err(CohortError::storage)?;
                }
                write_txn.commit().map_err(CohortError::storage)?;
                Ok(())
            }
        }
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        definition: RecordTable,
        guid: &Guid,
    ) -> Result<Option<T>, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn
            .open_table(definition)
            .map_err(CohortError::storage)?;
        match table.get(guid.as_str()).map_err(CohortError::storage)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn all_records<T: DeserializeOwned>(
        &self,
        definition: RecordTable,
    ) -> Result<Vec<T>, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn
            .open_table(definition)
            .map_err(CohortError::storage)?;
        let mut records = Vec::new();
        for entry in table.iter().map_err(CohortError::storage)? {
            let (_, value) = entry.map_err(CohortError::storage)?;
            records.push(decode(value.value())?);
        }
        Ok(records)
    }

    fn count(&self, definition: RecordTable) -> Result<usize, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn
            .open_table(definition)
            .map_err(CohortError::storage)?;
        Ok(table.len().map_err(CohortError::storage)? as usize)
    }
}

fn index_relationship(
    index: &mut Table<'_, (&'static str, &'static str), ()>,
    relationship: &Relationship,
) -> Result<(), CohortError> {
    for end in relationship.end_guids() {
        index
            .insert((end.as_str(), relationship.guid().as_str()), ())
            .map_err(CohortError::storage)?;
    }
    Ok(())
}

fn unindex_relationship(
    index: &mut Table<'_, (&'static str, &'static str), ()>,
    relationship: &Relationship,
) -> Result<(), CohortError> {
    for end in relationship.end_guids() {
        index
            .remove((end.as_str(), relationship.guid().as_str()))
            .map_err(CohortError::storage)?;
    }
    Ok(())
}

fn take_relationship(
    relationships: &mut Table<'_, &'static str, &'static [u8]>,
    guid: &Guid,
) -> Result<Option<Relationship>, CohortError> {
    let old = relationships
        .remove(guid.as_str())
        .map_err(CohortError::storage)?
        .map(|data| decode::<Relationship>(data.value()));
    old.transpose()
}

// =============================================================================
// INSTANCESTORE TRAIT IMPLEMENTATION
// =============================================================================

impl InstanceStore for RedbStore {
    fn get_entity(&self, guid: &Guid) -> Result<Option<EntityDetail>, CohortError> {
        self.get_record(ENTITIES, guid)
    }

    fn get_proxy(&self, guid: &Guid) -> Result<Option<EntityProxy>, CohortError> {
        self.get_record(PROXIES, guid)
    }

    fn get_relationship(&self, guid: &Guid) -> Result<Option<Relationship>, CohortError> {
        self.get_record(RELATIONSHIPS, guid)
    }

    fn relationships_for_entity(&self, entity: &Guid) -> Result<Vec<Guid>, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn
            .open_table(ENTITY_RELATIONSHIPS)
            .map_err(CohortError::storage)?;

        let mut guids = Vec::new();
        for entry in table
            .range((entity.as_str(), "")..)
            .map_err(CohortError::storage)?
        {
            let (key, _) = entry.map_err(CohortError::storage)?;
            let (end, relationship) = key.value();
            if end != entity.as_str() {
                break;
            }
            guids.push(Guid::new(relationship));
        }
        Ok(guids)
    }

    fn is_retired(&self, guid: &Guid) -> Result<bool, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn.open_table(RETIRED).map_err(CohortError::storage)?;
        Ok(table
            .get(guid.as_str())
            .map_err(CohortError::storage)?
            .is_some())
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<(), CohortError> {
        if changes.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write().map_err(CohortError::storage)?;
        {
            let mut entities = write_txn
                .open_table(ENTITIES)
                .map_err(CohortError::storage)?;
            let mut proxies = write_txn.open_table(PROXIES).map_err(CohortError::storage)?;
            let mut relationships = write_txn
                .open_table(RELATIONSHIPS)
                .map_err(CohortError::storage)?;
            let mut index = write_txn
                .open_table(ENTITY_RELATIONSHIPS)
                .map_err(CohortError::storage)?;
            let mut retired = write_txn.open_table(RETIRED).map_err(CohortError::storage)?;

            for change in changes {
                match change {
                    Change::PutEntity(entity) => {
                        let bytes = encode(&entity)?;
                        entities
                            .insert(entity.guid().as_str(), bytes.as_slice())
                            .map_err(CohortError::storage)?;
                    }
                    Change::RemoveEntity(guid) => {
                        entities
                            .remove(guid.as_str())
                            .map_err(CohortError::storage)?;
                    }
                    Change::PutProxy(proxy) => {
                        let bytes = encode(&proxy)?;
                        proxies
                            .insert(proxy.guid().as_str(), bytes.as_slice())
                            .map_err(CohortError::storage)?;
                    }
                    Change::RemoveProxy(guid) => {
                        proxies
                            .remove(guid.as_str())
                            .map_err(CohortError::storage)?;
                    }
                    Change::PutRelationship(relationship) => {
                        if let Some(old) = take_relationship(&mut relationships, relationship.guid())? {
                            unindex_relationship(&mut index, &old)?;
                        }
                        let bytes = encode(&relationship)?;
                        relationships
                            .insert(relationship.guid().as_str(), bytes.as_slice())
                            .map_err(CohortError::storage)?;
                        index_relationship(&mut index, &relationship)?;
                    }
                    Change::RemoveRelationship(guid) => {
                        if let Some(old) = take_relationship(&mut relationships, &guid)? {
                            unindex_relationship(&mut index, &old)?;
                        }
                    }
                    Change::Retire(guid) => {
                        retired
                            .insert(guid.as_str(), ())
                            .map_err(CohortError::storage)?;
                    }
                }
            }
        }
        write_txn.commit().map_err(CohortError::storage)?;
        Ok(())
    }

    fn entity_count(&self) -> Result<usize, CohortError> {
        self.count(ENTITIES)
    }

    fn proxy_count(&self) -> Result<usize, CohortError> {
        self.count(PROXIES)
    }

    fn relationship_count(&self) -> Result<usize, CohortError> {
        self.count(RELATIONSHIPS)
    }

    fn retired_count(&self) -> Result<usize, CohortError> {
        let read_txn = self.db.begin_read().map_err(CohortError::storage)?;
        let table = read_txn.open_table(RETIRED).map_err(CohortError::storage)?;
        Ok(table.len().map_err(CohortError::storage)? as usize)
    }

    fn entities(&self) -> Result<Vec<EntityDetail>, CohortError> {
        self.all_records(ENTITIES)
    }

    fn proxies(&self) -> Result<Vec<EntityProxy>, CohortError> {
        self.all_records(PROXIES)
    }

    fn relationships(&self) -> Result<Vec<Relationship>, CohortError> {
        self.all_records(RELATIONSHIPS)
    }
}

// =============================================================================
// TESTS
// =============================================================================
