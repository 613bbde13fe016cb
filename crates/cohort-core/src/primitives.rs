//! # Primitives
//!
//! Fixed runtime constants for the Cohort instance store.
//!
//! These are compiled into the binary and immutable at runtime.

/// Magic bytes for the Cohort binary snapshot header.
///
/// - File Header = Magic Bytes ("CHRT") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"CHRT";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

/// Version carried by an archive header.
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Version assigned to a freshly created instance.
pub const INITIAL_VERSION: u64 = 1;

/// Attempts made to mint a guid that is neither live nor retired.
///
/// Collisions of random v4 uuids are not expected; the bound keeps the loop finite.
pub const MAX_GUID_MINT_ATTEMPTS: usize = 16;

/// Attempts made to lock a stable guid set for a multi-instance operation.
///
/// The set is re-read under the locks; a concurrent change forces a retry.
pub const MAX_LOCK_ATTEMPTS: usize = 8;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a guid, type name or user id.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Maximum number of properties on one instance.
pub const MAX_PROPERTIES: usize = 1024;

/// Maximum number of classifications on one entity.
pub const MAX_CLASSIFICATIONS: usize = 128;

/// Maximum number of instances accepted in one archive.
pub const MAX_ARCHIVE_INSTANCES: usize = 1_000_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"CHRT");
    }

    #[test]
    fn first_version_is_one() {
        assert_eq!(INITIAL_VERSION, 1);
    }
}
