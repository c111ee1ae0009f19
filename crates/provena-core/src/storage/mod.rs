//! # Persistent Storage
//!
//! Disk-backed graph backends. Currently redb only.

mod redb_store;

pub use redb_store::RedbStore;
