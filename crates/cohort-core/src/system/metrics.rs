//! # Repository Metrics
//!
//! Instance counts for status reporting. Reference copies are the stored
//! entities and relationships that this collection may not write.

use crate::store::InstanceStore;
use crate::{CohortError, InstanceHeader, MetadataCollectionId};
use serde::{Deserialize, Serialize};

/// Instance counts of one repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    /// Stored entities, deleted ones included.
    pub entity_count: usize,
    pub deleted_entity_count: usize,
    pub proxy_count: usize,
    /// Stored relationships, deleted ones included.
    pub relationship_count: usize,
    pub deleted_relationship_count: usize,
    /// Entities and relationships homed elsewhere.
    pub reference_copy_count: usize,
    /// Guids that can never be issued again.
    pub retired_count: usize,
}

impl RepositoryMetrics {
    /// Create new metrics with all zeros.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compute metrics from a store, relative to the local collection.
    pub fn from_store<S: InstanceStore + ?Sized>(
        store: &S,
        local: &MetadataCollectionId,
    ) -> Result<Self, CohortError> {
        let entities = store.entities()?;
        let relationships = store.relationships()?;
        let is_copy = |header: &InstanceHeader| !header.is_writable_by(local);

        let reference_copy_count = entities.iter().filter(|e| is_copy(&e.header)).count()
            + relationships.iter().filter(|r| is_copy(&r.header)).count();

        Ok(Self {
            entity_count: entities.len(),
            deleted_entity_count: entities
                .iter()
                .filter(|e| e.header.status.is_deleted())
                .count(),
            proxy_count: store.proxy_count()?,
            relationship_count: relationships.len(),
            deleted_relationship_count: relationships
                .iter()
                .filter(|r| r.header.status.is_deleted())
                .count(),
            reference_copy_count,
            retired_count: store.retired_count()?,
        })
    }

    /// Entities returned by normal reads.
    #[must_use]
    pub fn live_entity_count(&self) -> usize {
        self.entity_count.saturating_sub(self.deleted_entity_count)
    }

    /// Relationships returned by normal reads.
    #[must_use]
    pub fn live_relationship_count(&self) -> usize {
        self.relationship_count
            .saturating_sub(self.deleted_relationship_count)
    }
}
