//! Shared test utilities: a scripted in-memory provider and a disk spec.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lro_engine::{
    Creator, Deleter, Desired, Getter, MemoryStore, OperationKind, OperationStore, PollHandle,
    ProviderCall, ProviderError, ReconcileContext, ResourceSpec, ResumeRecord, StoreError,
};

/// Remote state of a fake disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub name: String,
    pub size_gb: u64,
}

/// Desired disk. Counts how often parameters were computed.
#[derive(Debug)]
pub struct DiskSpec {
    pub name: String,
    pub group: String,
    pub size_gb: u64,
    pub fail_parameters: bool,
    parameters_calls: AtomicUsize,
}

impl DiskSpec {
    pub fn new(name: &str, size_gb: u64) -> Self {
        Self {
            name: name.to_string(),
            group: "rg".to_string(),
            size_gb,
            fail_parameters: false,
            parameters_calls: AtomicUsize::new(0),
        }
    }

    pub fn parameters_calls(&self) -> usize {
        self.parameters_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceSpec for DiskSpec {
    type Resource = Disk;
    type Parameters = u64;

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.group
    }

    async fn parameters(
        &self,
        _ctx: &ReconcileContext,
        existing: Option<&Disk>,
    ) -> anyhow::Result<Desired<u64>> {
        self.parameters_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_parameters {
            anyhow::bail!("size must be a power of two");
        }
        match existing {
            Some(disk) if disk.size_gb == self.size_gb => Ok(Desired::NoChange),
            _ => Ok(Desired::Change(self.size_gb)),
        }
    }
}

/// Poll handle handing out a fixed token.
#[derive(Debug, Clone)]
pub struct FakePoller {
    pub token: Option<String>,
}

impl PollHandle for FakePoller {
    fn resume_token(&self) -> Result<String, ProviderError> {
        self.token
            .clone()
            .ok_or_else(|| ProviderError::Other("poller has no resume token".into()))
    }
}

/// Scripted behavior of one provider write call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Finish the operation.
    Complete,
    /// Keep running until the context ends, then hand back the token.
    Stall(Option<String>),
    /// Return a handle together with an arbitrary error.
    HandleWithError(String, ProviderError),
    /// Fail outright.
    Fail(ProviderError),
}

#[derive(Debug, Default)]
struct Inner {
    remote: Mutex<Option<Disk>>,
    get_error: Mutex<Option<ProviderError>>,
    pending_size: Mutex<Option<u64>>,
    create_steps: Mutex<VecDeque<Step>>,
    delete_steps: Mutex<VecDeque<Step>>,
    create_calls: Mutex<Vec<(Option<String>, Option<u64>)>>,
    delete_calls: Mutex<Vec<Option<String>>>,
}

/// Scripted provider. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    inner: Arc<Inner>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote(disk: Disk) -> Self {
        let client = Self::new();
        *client.inner.remote.lock().unwrap() = Some(disk);
        client
    }

    pub fn remote(&self) -> Option<Disk> {
        self.inner.remote.lock().unwrap().clone()
    }

    pub fn fail_get(&self, err: ProviderError) {
        *self.inner.get_error.lock().unwrap() = Some(err);
    }

    pub fn script_create(&self, steps: impl IntoIterator<Item = Step>) {
        self.inner.create_steps.lock().unwrap().extend(steps);
    }

    pub fn script_delete(&self, steps: impl IntoIterator<Item = Step>) {
        self.inner.delete_steps.lock().unwrap().extend(steps);
    }

    /// `(resume_token, parameters)` of every create call.
    pub fn create_calls(&self) -> Vec<(Option<String>, Option<u64>)> {
        self.inner.create_calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<Option<String>> {
        self.inner.delete_calls.lock().unwrap().clone()
    }
}

async fn stall<T>(ctx: &ReconcileContext, token: Option<String>) -> ProviderCall<T> {
    ctx.done().await;
    let err = ctx.err().unwrap_or(ProviderError::DeadlineExceeded);
    ProviderCall::in_progress(Box::new(FakePoller { token }), err)
}

#[async_trait]
impl Getter<DiskSpec> for FakeClient {
    async fn get(&self, _ctx: &ReconcileContext, spec: &DiskSpec) -> Result<Disk, ProviderError> {
        if let Some(err) = self.inner.get_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.remote()
            .ok_or_else(|| ProviderError::NotFound(spec.name.clone()))
    }
}

#[async_trait]
impl Creator<DiskSpec> for FakeClient {
    async fn create_or_update_async(
        &self,
        ctx: &ReconcileContext,
        spec: &DiskSpec,
        resume_token: Option<&str>,
        parameters: Option<u64>,
    ) -> ProviderCall<Disk> {
        self.inner
            .create_calls
            .lock()
            .unwrap()
            .push((resume_token.map(str::to_string), parameters));
        if let Some(size) = parameters {
            *self.inner.pending_size.lock().unwrap() = Some(size);
        }

        let step = self
            .inner
            .create_steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Complete);
        match step {
            Step::Complete => {
                let size = self
                    .inner
                    .pending_size
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or(spec.size_gb);
                let disk = Disk {
                    name: spec.name.clone(),
                    size_gb: size,
                };
                *self.inner.remote.lock().unwrap() = Some(disk.clone());
                ProviderCall::completed(disk)
            }
            Step::Stall(token) => stall(ctx, token).await,
            Step::HandleWithError(token, err) => ProviderCall::in_progress(
                Box::new(FakePoller { token: Some(token) }),
                err,
            ),
            Step::Fail(err) => ProviderCall::failed(err),
        }
    }
}

#[async_trait]
impl Deleter<DiskSpec> for FakeClient {
    async fn delete_async(
        &self,
        ctx: &ReconcileContext,
        spec: &DiskSpec,
        resume_token: Option<&str>,
    ) -> ProviderCall<()> {
        self.inner
            .delete_calls
            .lock()
            .unwrap()
            .push(resume_token.map(str::to_string));

        let step = self.inner.delete_steps.lock().unwrap().pop_front();
        match step {
            None | Some(Step::Complete) => {
                if self.inner.remote.lock().unwrap().take().is_none() {
                    return ProviderCall::failed(ProviderError::NotFound(spec.name.clone()));
                }
                ProviderCall::completed(())
            }
            Some(Step::Stall(token)) => stall(ctx, token).await,
            Some(Step::HandleWithError(token, err)) => ProviderCall::in_progress(
                Box::new(FakePoller { token: Some(token) }),
                err,
            ),
            Some(Step::Fail(err)) => ProviderCall::failed(err),
        }
    }
}

/// Memory store whose writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_set(&self) {
        self.fail_set.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }
}

fn disk_full() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
}

#[async_trait]
impl OperationStore for FlakyStore {
    async fn get(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<Option<ResumeRecord>, StoreError> {
        self.inner.get(resource_name, service_name, kind).await
    }

    async fn set(&self, record: ResumeRecord) -> Result<(), StoreError> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.set(record).await
    }

    async fn delete(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<(), StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.delete(resource_name, service_name, kind).await
    }
}
