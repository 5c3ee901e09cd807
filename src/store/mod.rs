// src/store/mod.rs
pub mod json_file;
pub mod memory;

use async_trait::async_trait;

use crate::poll::types::Reading;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data is not valid json: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert every reading whose (meter, timestamp) key is not stored yet and skip the rest.
    /// Returns how many readings were newly inserted. An empty batch is a no-op.
    /// On error nothing from the batch is visible.
    async fn insert_or_ignore_all(&self, readings: &[Reading]) -> Result<usize, StoreError>;
}
