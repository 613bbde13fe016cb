//! # Formats
//!
//! Byte-level encodings. File I/O stays in the app layer.

mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, store_from_bytes, store_to_bytes,
};
