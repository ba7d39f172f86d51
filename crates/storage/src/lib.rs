#![forbid(unsafe_code)]

pub mod repository;
pub mod snapshots;
pub mod sqlite;

pub use repository::{InMemoryStore, KeyValueStore, Storage, StorageError};
pub use snapshots::SnapshotRepository;
