// src/store/json_file.rs
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;

use super::{RecordStore, StoreError};
use crate::poll::types::{Reading, ReadingKey};

/// Readings persisted as a JSON array in a single file.
///
/// Every read-merge-write holds an exclusive lock on `<path>.lock`, so separate
/// processes or handles on the same path serialize. New contents go to a unique
/// temp file in the same directory, are synced, then renamed over `<path>`.
/// A failed write leaves the old file untouched.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored readings; a missing file reads as empty.
    pub async fn load_all(&self) -> Result<Vec<Reading>, StoreError> {
        let path = self.path.clone();
        run_blocking(move || {
            let lock = open_lock(&path)?;
            FileExt::lock_shared(&lock)?;
            read_file(&path)
        })
        .await
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Lock file lives next to the data file; the lock is released when the handle drops.
fn open_lock(path: &Path) -> Result<fs::File, StoreError> {
    fs::create_dir_all(parent_dir(path))?;
    let mut lock_path = path.as_os_str().to_owned();
    lock_path.push(".lock");
    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(PathBuf::from(lock_path))?)
}

fn read_file(path: &Path) -> Result<Vec<Reading>, StoreError> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_file(path: &Path, readings: Vec<&Reading>) -> Result<(), StoreError> {
    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    serde_json::to_writer_pretty(&mut tmp, &readings)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn merge_locked(path: &Path, readings: &[Reading]) -> Result<usize, StoreError> {
    let lock = open_lock(path)?;
    FileExt::lock_exclusive(&lock)?;

    let mut merged: BTreeMap<ReadingKey, Reading> = read_file(path)?
        .into_iter()
        .map(|r| (r.key(), r))
        .collect();

    let mut inserted = 0usize;
    for r in readings {
        if let std::collections::btree_map::Entry::Vacant(slot) = merged.entry(r.key()) {
            slot.insert(r.clone());
            inserted += 1;
        }
    }
    if inserted > 0 {
        write_file(path, merged.values().collect())?;
    }
    Ok(inserted)
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn insert_or_ignore_all(&self, readings: &[Reading]) -> Result<usize, StoreError> {
        if readings.is_empty() {
            return Ok(0);
        }
        let path = self.path.clone();
        let batch = readings.to_vec();
        let inserted = run_blocking(move || merge_locked(&path, &batch)).await?;

        tracing::debug!(target: "poll", path = %self.path.display(), inserted, "readings persisted");
        Ok(inserted)
    }
}
