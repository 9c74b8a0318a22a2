//! Durable key/value storage.
//!
//! Both the TTL cache and the connectivity monitor persist through
//! `KeyValueStore`. Values are JSON strings; keys are chosen by the caller.
//!
//! - `FileStore`: one JSON file per key, used by the application
//! - `MemoryStore`: process-local map, used in tests and ephemeral runs

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::StorageError;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}
