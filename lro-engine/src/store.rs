//! Operation state stores.
//!
//! The store is the only place continuation state lives between passes. All
//! operations are safe to repeat: `set` overwrites, `delete` of a missing
//! record succeeds.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::future::{OperationKind, RecordKey, ResumeRecord};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Get/set/delete of resume records.
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn get(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<Option<ResumeRecord>, StoreError>;

    async fn set(&self, record: ResumeRecord) -> Result<(), StoreError>;

    async fn delete(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<(), StoreError>;
}

/// In-memory store for tests and short-lived callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, ResumeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records.
    pub async fn records(&self) -> Vec<ResumeRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn get(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<Option<ResumeRecord>, StoreError> {
        let key = RecordKey::new(resource_name, service_name, kind);
        Ok(self.records.read().await.get(&key).cloned())
    }

    async fn set(&self, record: ResumeRecord) -> Result<(), StoreError> {
        self.records.write().await.insert(record.key(), record);
        Ok(())
    }

    async fn delete(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<(), StoreError> {
        let key = RecordKey::new(resource_name, service_name, kind);
        self.records.write().await.remove(&key);
        Ok(())
    }
}

/// On-disk layout of a [`FileStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    records: Vec<ResumeRecord>,
}

/// Durable store keeping all records in one JSON document.
///
/// The file is re-read on every access, so records written by an earlier
/// process are picked up after a restart.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StoreDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, then rename over the real one.
    async fn save(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(doc)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} resume records to {}", doc.records.len(), self.path.display());
        Ok(())
    }

    /// All records currently on disk.
    pub async fn records(&self) -> Result<Vec<ResumeRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.records)
    }
}

#[async_trait]
impl OperationStore for FileStore {
    async fn get(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<Option<ResumeRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let key = RecordKey::new(resource_name, service_name, kind);
        let doc = self.load().await?;
        Ok(doc.records.into_iter().find(|r| r.key() == key))
    }

    async fn set(&self, record: ResumeRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let key = record.key();
        match doc.records.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = record,
            None => doc.records.push(record),
        }
        self.save(&doc).await
    }

    async fn delete(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let key = RecordKey::new(resource_name, service_name, kind);
        let mut doc = self.load().await?;
        let before = doc.records.len();
        doc.records.retain(|r| r.key() != key);
        if doc.records.len() == before {
            return Ok(());
        }
        self.save(&doc).await
    }
}
