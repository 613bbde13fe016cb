//! # Capability Negotiation
//!
//! The full instance-mutation surface is one set of named operations.
//! A repository variant declares the subset it supports as a
//! [`CapabilitySet`]; every unsupported call is answered with
//! `CohortError::FunctionNotSupported` tagged with the operation's name,
//! before any state is read or written.
//!
//! Read operations (lookups, traversal, metrics) are never gated.
//!
//! | Variant | Supported operations |
//! |---------|----------------------|
//! | `full()` | every operation |
//! | `read_only()` | the three `save*ReferenceCopy` operations (archive content still flows through the provenance gate) |
//! | `none()` | nothing |

use crate::CohortError;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// OPERATIONS
// =============================================================================

/// A mutating operation of the `MetadataCollection` surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    AddEntity,
    AddExternalEntity,
    AddEntityProxy,
    UpdateEntityStatus,
    UpdateEntityProperties,
    DeleteEntity,
    PurgeEntity,
    RestoreEntity,
    ClassifyEntity,
    DeclassifyEntity,
    UpdateEntityClassification,
    ReIdentifyEntity,
    ReTypeEntity,
    ReHomeEntity,
    AddRelationship,
    AddExternalRelationship,
    UpdateRelationshipStatus,
    UpdateRelationshipProperties,
    DeleteRelationship,
    PurgeRelationship,
    RestoreRelationship,
    ReIdentifyRelationship,
    ReTypeRelationship,
    ReHomeRelationship,
    SaveEntityReferenceCopy,
    PurgeEntityReferenceCopy,
    SaveClassificationReferenceCopy,
    PurgeClassificationReferenceCopy,
    SaveRelationshipReferenceCopy,
    PurgeRelationshipReferenceCopy,
}

impl Operation {
    /// Every operation, in bit order.
    pub const ALL: [Operation; 30] = [
        Operation::AddEntity,
        Operation::AddExternalEntity,
        Operation::AddEntityProxy,
        Operation::UpdateEntityStatus,
        Operation::UpdateEntityProperties,
        Operation::DeleteEntity,
        Operation::PurgeEntity,
        Operation::RestoreEntity,
        Operation::ClassifyEntity,
        Operation::DeclassifyEntity,
        Operation::UpdateEntityClassification,
        Operation::ReIdentifyEntity,
        Operation::ReTypeEntity,
        Operation::ReHomeEntity,
        Operation::AddRelationship,
        Operation::AddExternalRelationship,
        Operation::UpdateRelationshipStatus,
        Operation::UpdateRelationshipProperties,
        Operation::DeleteRelationship,
        Operation::PurgeRelationship,
        Operation::RestoreRelationship,
        Operation::ReIdentifyRelationship,
        Operation::ReTypeRelationship,
        Operation::ReHomeRelationship,
        Operation::SaveEntityReferenceCopy,
        Operation::PurgeEntityReferenceCopy,
        Operation::SaveClassificationReferenceCopy,
        Operation::PurgeClassificationReferenceCopy,
        Operation::SaveRelationshipReferenceCopy,
        Operation::PurgeRelationshipReferenceCopy,
    ];

    /// Stable operation name, as reported in not-supported errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddEntity => "addEntity",
            Self::AddExternalEntity => "addExternalEntity",
            Self::AddEntityProxy => "addEntityProxy",
            Self::UpdateEntityStatus => "updateEntityStatus",
            Self::UpdateEntityProperties => "updateEntityProperties",
            Self::DeleteEntity => "deleteEntity",
            Self::PurgeEntity => "purgeEntity",
            Self::RestoreEntity => "restoreEntity",
            Self::ClassifyEntity => "classifyEntity",
            Self::DeclassifyEntity => "declassifyEntity",
            Self::UpdateEntityClassification => "updateEntityClassification",
            Self::ReIdentifyEntity => "reIdentifyEntity",
            Self::ReTypeEntity => "reTypeEntity",
            Self::ReHomeEntity => "reHomeEntity",
            Self::AddRelationship => "addRelationship",
            Self::AddExternalRelationship => "addExternalRelationship",
            Self::UpdateRelationshipStatus => "updateRelationshipStatus",
            Self::UpdateRelationshipProperties => "updateRelationshipProperties",
            Self::DeleteRelationship => "deleteRelationship",
            Self::PurgeRelationship => "purgeRelationship",
            Self::RestoreRelationship => "restoreRelationship",
            Self::ReIdentifyRelationship => "reIdentifyRelationship",
            Self::ReTypeRelationship => "reTypeRelationship",
            Self::ReHomeRelationship => "reHomeRelationship",
            Self::SaveEntityReferenceCopy => "saveEntityReferenceCopy",
            Self::PurgeEntityReferenceCopy => "purgeEntityReferenceCopy",
            Self::SaveClassificationReferenceCopy => "saveClassificationReferenceCopy",
            Self::PurgeClassificationReferenceCopy => "purgeClassificationReferenceCopy",
            Self::SaveRelationshipReferenceCopy => "saveRelationshipReferenceCopy",
            Self::PurgeRelationshipReferenceCopy => "purgeRelationshipReferenceCopy",
        }
    }

    /// Parse an operation from its stable name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    const fn bit(self) -> u64 {
        1u64 << (self as u32)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// CAPABILITY SET
// =============================================================================

/// The set of mutating operations a repository variant supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet(u64);

impl CapabilitySet {
    /// Every operation supported.
    #[must_use]
    pub fn full() -> Self {
        Self(Operation::ALL.iter().fold(0, |acc, op| acc | op.bit()))
    }

    /// No operation supported.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// Read-only variant backed by archive content.
    ///
    /// Reference-copy saves stay enabled so archives can be loaded; the
    /// provenance gate decides what actually lands.
    #[must_use]
    pub fn read_only() -> Self {
        Self::none()
            .with(Operation::SaveEntityReferenceCopy)
            .with(Operation::SaveClassificationReferenceCopy)
            .with(Operation::SaveRelationshipReferenceCopy)
    }

    #[must_use]
    pub const fn with(self, op: Operation) -> Self {
        Self(self.0 | op.bit())
    }

    #[must_use]
    pub const fn without(self, op: Operation) -> Self {
        Self(self.0 & !op.bit())
    }

    #[must_use]
    pub const fn supports(&self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }

    /// The uniform not-supported signal.
    pub fn check(&self, op: Operation) -> Result<(), CohortError> {
        if self.supports(op) {
            Ok(())
        } else {
            Err(CohortError::FunctionNotSupported { operation: op })
        }
    }

    /// Supported operations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::ALL.iter().copied().filter(|op| self.supports(*op))
    }

    /// Unsupported operations in declaration order.
    pub fn unsupported(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::ALL.iter().copied().filter(|op| !self.supports(*op))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::full()
    }
}

impl FromIterator<Operation> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_supports_everything() {
        let caps = CapabilitySet::full();
        assert_eq!(caps.len(), Operation::ALL.len());
        for op in Operation::ALL {
            assert!(caps.supports(op), "{op} should be supported");
            assert!(caps.check(op).is_ok());
        }
    }

    #[test]
    fn read_only_keeps_reference_copy_saves() {
        let caps = CapabilitySet::read_only();
        assert_eq!(caps.len(), 3);
        assert!(caps.supports(Operation::SaveEntityReferenceCopy));
        assert!(caps.supports(Operation::SaveRelationshipReferenceCopy));
        assert!(caps.supports(Operation::SaveClassificationReferenceCopy));
        assert!(!caps.supports(Operation::AddEntity));
        assert!(!caps.supports(Operation::PurgeEntityReferenceCopy));
    }

    #[test]
    fn check_reports_operation_name() {
        let caps = CapabilitySet::none();
        let err = caps.check(Operation::ReIdentifyEntity).expect_err("unsupported");
        assert!(err.is_not_supported());
        assert_eq!(err.to_string(), "Optional function not supported: reIdentifyEntity");
    }

    #[test]
    fn with_and_without() {
        let caps = CapabilitySet::full().without(Operation::PurgeEntity);
        assert!(!caps.supports(Operation::PurgeEntity));
        assert!(caps.with(Operation::PurgeEntity).supports(Operation::PurgeEntity));
        assert_eq!(caps.unsupported().collect::<Vec<_>>(), vec![Operation::PurgeEntity]);
    }

    #[test]
    fn names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("findEntities"), None);
    }

    #[test]
    fn collect_from_operations() {
        let caps: CapabilitySet = [Operation::AddEntity, Operation::DeleteEntity]
            .into_iter()
            .collect();
        assert_eq!(
            caps.iter().collect::<Vec<_>>(),
            vec![Operation::AddEntity, Operation::DeleteEntity]
        );
    }
}
