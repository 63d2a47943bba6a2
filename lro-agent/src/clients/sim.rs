//! Simulated block-storage backend.
//!
//! Disks and in-flight operations live in a JSON file so that operations
//! started by one agent process can be resumed by the next. Every write takes
//! `operation_time` of wall-clock time to finish.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lro_engine::{
    Creator, Deleter, Getter, PollHandle, ProviderCall, ProviderError, ReconcileContext, Response,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::reconciler::{DiskParameters, DiskSpec};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Disk as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub name: String,
    pub resource_group: String,
    pub size_gb: u64,
    pub provisioning_state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum OperationType {
    Put,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Operation {
    op: OperationType,
    resource_group: String,
    name: String,
    size_gb: u64,
    completes_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackendState {
    disks: BTreeMap<String, Disk>,
    operations: BTreeMap<String, Operation>,
}

/// Poll handle for a pending backend operation. The token is the operation id.
#[derive(Debug, Clone)]
pub struct SimPoller {
    operation_id: String,
}

impl PollHandle for SimPoller {
    fn resume_token(&self) -> Result<String, ProviderError> {
        Ok(self.operation_id.clone())
    }
}

enum Waited {
    Finished(Option<Disk>),
    Interrupted(ProviderError),
}

/// Client for the simulated backend. Clones share the same file lock.
#[derive(Debug, Clone)]
pub struct SimClient {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    operation_time: Duration,
}

fn disk_key(resource_group: &str, name: &str) -> String {
    format!("{}/{}", resource_group, name)
}

fn io_error(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

impl SimClient {
    pub fn new(path: impl Into<PathBuf>, operation_time: Duration) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
            operation_time,
        }
    }

    async fn load(&self) -> Result<BackendState, ProviderError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) if data.is_empty() => Ok(BackendState::default()),
            Ok(data) => serde_json::from_slice(&data).map_err(io_error),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BackendState::default()),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn save(&self, state: &BackendState) -> Result<(), ProviderError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let data = serde_json::to_vec_pretty(state).map_err(io_error)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_error)
    }

    /// Look up a disk.
    pub async fn get_disk(&self, resource_group: &str, name: &str) -> Result<Disk, ProviderError> {
        let _guard = self.lock.lock().await;
        let state = self.load().await?;
        state
            .disks
            .get(&disk_key(resource_group, name))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("disk {}/{}", resource_group, name)))
    }

    /// Number of operations still pending in the backend.
    pub async fn pending_operations(&self) -> Result<usize, ProviderError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.operations.len())
    }

    async fn start(
        &self,
        op: OperationType,
        resource_group: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<String, ProviderError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;

        if op == OperationType::Delete
            && !state.disks.contains_key(&disk_key(resource_group, name))
        {
            return Err(ProviderError::NotFound(format!(
                "disk {}/{}",
                resource_group, name
            )));
        }

        let completes_at = Utc::now()
            + chrono::Duration::from_std(self.operation_time).map_err(io_error)?;
        let id = uuid::Uuid::new_v4().to_string();
        state.operations.insert(
            id.clone(),
            Operation {
                op,
                resource_group: resource_group.to_string(),
                name: name.to_string(),
                size_gb,
                completes_at,
            },
        );
        self.save(&state).await?;

        debug!(
            operation = %id,
            disk = %disk_key(resource_group, name),
            "Started {:?} operation",
            op
        );
        Ok(id)
    }

    /// Apply the operation if it is due. `None` means still running.
    async fn try_complete(&self, id: &str) -> Result<Option<Option<Disk>>, ProviderError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;

        let op = state.operations.get(id).cloned().ok_or_else(|| {
            ProviderError::Response(Response::new(
                400,
                format!("operation {} is unknown to the backend", id),
            ))
        })?;
        if Utc::now() < op.completes_at {
            return Ok(None);
        }

        let key = disk_key(&op.resource_group, &op.name);
        let result = match op.op {
            OperationType::Put => {
                let disk = Disk {
                    name: op.name.clone(),
                    resource_group: op.resource_group.clone(),
                    size_gb: op.size_gb,
                    provisioning_state: "Succeeded".to_string(),
                };
                state.disks.insert(key, disk.clone());
                Some(disk)
            }
            OperationType::Delete => {
                state.disks.remove(&key);
                None
            }
        };
        state.operations.remove(id);
        self.save(&state).await?;

        debug!(operation = %id, "Operation finished");
        Ok(Some(result))
    }

    /// Poll the operation until it finishes or the context ends.
    async fn wait(&self, ctx: &ReconcileContext, id: &str) -> Result<Waited, ProviderError> {
        loop {
            if let Some(result) = self.try_complete(id).await? {
                return Ok(Waited::Finished(result));
            }
            if let Some(err) = ctx.err() {
                return Ok(Waited::Interrupted(err));
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = ctx.done() => {}
            }
        }
    }

    fn finish<T>(
        id: String,
        waited: Result<Waited, ProviderError>,
        complete: impl FnOnce(Option<Disk>) -> ProviderCall<T>,
    ) -> ProviderCall<T> {
        match waited {
            Ok(Waited::Finished(disk)) => complete(disk),
            Ok(Waited::Interrupted(err)) => {
                ProviderCall::in_progress(Box::new(SimPoller { operation_id: id }), err)
            }
            Err(err) => ProviderCall::failed(err),
        }
    }
}

#[async_trait]
impl Getter<DiskSpec> for SimClient {
    async fn get(&self, _ctx: &ReconcileContext, spec: &DiskSpec) -> Result<Disk, ProviderError> {
        self.get_disk(&spec.resource_group, &spec.name).await
    }
}

#[async_trait]
impl Creator<DiskSpec> for SimClient {
    async fn create_or_update_async(
        &self,
        ctx: &ReconcileContext,
        spec: &DiskSpec,
        resume_token: Option<&str>,
        parameters: Option<DiskParameters>,
    ) -> ProviderCall<Disk> {
        let id = match (resume_token, parameters) {
            (Some(token), _) => token.to_string(),
            (None, Some(params)) => {
                match self
                    .start(OperationType::Put, &spec.resource_group, &spec.name, params.size_gb)
                    .await
                {
                    Ok(id) => id,
                    Err(e) => return ProviderCall::failed(e),
                }
            }
            (None, None) => {
                return ProviderCall::failed(ProviderError::Other(
                    "create requires either a resume token or parameters".to_string(),
                ))
            }
        };

        let waited = self.wait(ctx, &id).await;
        Self::finish(id, waited, |disk| match disk {
            Some(disk) => ProviderCall::completed(disk),
            None => ProviderCall::failed(ProviderError::Other(
                "resumed operation is not a create".to_string(),
            )),
        })
    }
}

#[async_trait]
impl Deleter<DiskSpec> for SimClient {
    async fn delete_async(
        &self,
        ctx: &ReconcileContext,
        spec: &DiskSpec,
        resume_token: Option<&str>,
    ) -> ProviderCall<()> {
        let id = match resume_token {
            Some(token) => token.to_string(),
            None => match self
                .start(OperationType::Delete, &spec.resource_group, &spec.name, 0)
                .await
            {
                Ok(id) => id,
                Err(e) => return ProviderCall::failed(e),
            },
        };

        let waited = self.wait(ctx, &id).await;
        Self::finish(id, waited, |_| ProviderCall::completed(()))
    }
}
