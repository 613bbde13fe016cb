//! # Persistent Storage
//!
//! Disk-backed `InstanceStore` implementations.

mod redb_store;

pub use redb_store::RedbStore;
