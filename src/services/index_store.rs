//! IndexStore — the local name→key index.
//!
//! The full ordered set of file records is held in memory as the
//! write-through view and mirrored to one JSON document on disk, read once at
//! startup and rewritten wholesale after every mutation. Mutations are
//! serialized through an async mutex so concurrent requests always persist a
//! consistent snapshot.

use crate::models::file_record::FileRecord;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed index document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Durable store for [`FileRecord`]s, constructed once at startup and handed
/// to handlers through shared state.
#[derive(Clone)]
pub struct IndexStore {
    path: Arc<PathBuf>,
    records: Arc<Mutex<Vec<FileRecord>>>,
}

impl IndexStore {
    /// Load the index from `path`, or start empty when the document does not
    /// exist yet. A document that exists but fails to parse is a fatal error
    /// left to the caller.
    pub async fn load(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        let records = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(IndexError::Io(err)),
        };

        Ok(Self {
            path: Arc::new(path),
            records: Arc::new(Mutex::new(records)),
        })
    }

    /// Snapshot of all records in insertion order.
    pub async fn records(&self) -> Vec<FileRecord> {
        self.records.lock().await.clone()
    }

    /// Append a record and persist the full sequence.
    pub async fn append(&self, record: FileRecord) -> IndexResult<()> {
        let mut records = self.records.lock().await;
        records.push(record);
        Self::persist(&records, &self.path).await
    }

    /// Remove every record whose key matches, then persist. Succeeds as a
    /// no-op when nothing matches.
    pub async fn remove_by_key(&self, key: &str) -> IndexResult<()> {
        let mut records = self.records.lock().await;
        records.retain(|record| record.key != key);
        Self::persist(&records, &self.path).await
    }

    /// Overwrite the backing document with the full record sequence.
    ///
    /// Writes beside the target and renames into place so a crash mid-write
    /// cannot truncate the document. Callers must hold the records lock.
    async fn persist(records: &[FileRecord], path: &Path) -> IndexResult<()> {
        let json = serde_json::to_vec_pretty(records)?;
        let tmp_path = match path.parent() {
            Some(parent) => parent.join(format!(".tmp-{}", Uuid::new_v4())),
            None => PathBuf::from(format!(".tmp-{}", Uuid::new_v4())),
        };
        if let Err(err) = fs::write(&tmp_path, &json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(IndexError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(IndexError::Io(err));
        }
        Ok(())
    }
}
