// src/store/memory.rs
use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RecordStore, StoreError};
use crate::poll::types::{Reading, ReadingKey};

/// In-process store keyed by (meter, timestamp). Each batch is applied under a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<ReadingKey, Reading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.guard().map(|m| m.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ReadingKey) -> bool {
        self.guard().map(|m| m.contains_key(key)).unwrap_or(false)
    }

    /// Snapshot ordered by meter, then timestamp.
    pub fn readings(&self) -> Vec<Reading> {
        self.guard()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ReadingKey, Reading>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".into()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_or_ignore_all(&self, readings: &[Reading]) -> Result<usize, StoreError> {
        let mut map = self.guard()?;
        let mut inserted = 0usize;
        for r in readings {
            if let std::collections::btree_map::Entry::Vacant(slot) = map.entry(r.key()) {
                slot.insert(r.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
