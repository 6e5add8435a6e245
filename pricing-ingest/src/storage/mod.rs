//! Byte storage for uploaded submissions

mod local;
mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

/// Key-addressed blob storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bytes: &[u8], key: &str, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;
}
