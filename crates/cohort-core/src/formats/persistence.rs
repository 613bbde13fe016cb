//! # Snapshot Format
//!
//! Binary serialization for in-memory stores. File I/O is in the app layer.
//!
//! Format: Header (5 bytes) + postcard-serialized store contents.
//! - 4 bytes: Magic ("CHRT")
//! - 1 byte: Version
//!
//! Sizes and header are validated before the payload is deserialized.

use crate::memory::{MemoryStore, SerializableStore};
use crate::{CohortError, primitives};

/// Maximum accepted snapshot size (500 MB), checked before deserialization.
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 500 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), CohortError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(CohortError::Repository(
                "Invalid snapshot magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(CohortError::Repository(format!(
                "Unsupported snapshot version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CohortError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CohortError::Repository(
                "Snapshot header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a store to bytes (header + payload).
pub fn store_to_bytes(store: &MemoryStore) -> Result<Vec<u8>, CohortError> {
    let payload =
        postcard::to_stdvec(&SerializableStore::from(store)).map_err(CohortError::storage)?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a store from bytes.
pub fn store_from_bytes(bytes: &[u8]) -> Result<MemoryStore, CohortError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CohortError::Repository(format!(
            "Snapshot too short: minimum {HEADER_SIZE} bytes required"
        )));
    }
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(CohortError::Repository(format!(
            "Snapshot size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let snapshot: SerializableStore = postcard::from_bytes(&bytes[HEADER_SIZE..])
        .map_err(|e| CohortError::Repository(format!("Failed to deserialize snapshot: {e}")))?;
    Ok(MemoryStore::from(snapshot))
}

// =============================================================================
// TESTS
// =============================================================================
