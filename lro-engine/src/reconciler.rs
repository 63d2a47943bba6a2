//! Service reconcilers.
//!
//! A service reconciler owns the specs of one service and runs all of them
//! through the async service in a single pass, bounded by a service timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::context::ReconcileContext;
use crate::error::{ReconcileError, Result};
use crate::provider::{Creator, Deleter};
use crate::service::AsyncService;
use crate::spec::ResourceSpec;

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Service name, also used as part of the resume record key.
    fn name(&self) -> &str;

    /// Converge remote state towards the desired specs.
    async fn reconcile(&self, ctx: &ReconcileContext) -> Result<()>;

    /// Handle resource deletion (finalization).
    async fn finalize(&self, ctx: &ReconcileContext) -> Result<()>;
}

/// Runs every spec of one service through [`AsyncService`].
pub struct ServiceReconciler<S, C, D> {
    name: String,
    specs: Vec<S>,
    service: Arc<AsyncService<C, D>>,
    timeout: Duration,
}

impl<S, C, D> ServiceReconciler<S, C, D> {
    pub fn new(name: impl Into<String>, specs: Vec<S>, service: Arc<AsyncService<C, D>>) -> Self {
        let timeout = service.config().service_timeout();
        Self {
            name: name.into(),
            specs,
            service,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Keep the most useful error of a pass: any real failure replaces what was
/// there, a not-done error only fills an empty slot.
fn record_error(slot: &mut Option<ReconcileError>, err: ReconcileError) {
    if !err.is_operation_not_done() || slot.is_none() {
        *slot = Some(err);
    }
}

#[async_trait]
impl<S, C, D> Reconciler for ServiceReconciler<S, C, D>
where
    S: ResourceSpec + 'static,
    C: Creator<S> + 'static,
    D: Deleter<S> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn reconcile(&self, ctx: &ReconcileContext) -> Result<()> {
        let ctx = ctx.child_with_timeout(self.timeout);
        let mut result = None;

        for spec in &self.specs {
            if let Err(e) = self.service.create_or_update(&ctx, spec, &self.name).await {
                if !e.is_operation_not_done() {
                    error!(
                        service = %self.name,
                        resource = spec.resource_name(),
                        "reconciliation failed: {}",
                        e
                    );
                }
                record_error(&mut result, e);
            }
        }

        debug!(service = %self.name, specs = self.specs.len(), "reconcile pass finished");
        result.map_or(Ok(()), Err)
    }

    async fn finalize(&self, ctx: &ReconcileContext) -> Result<()> {
        let ctx = ctx.child_with_timeout(self.timeout);
        let mut result = None;

        for spec in &self.specs {
            if let Err(e) = self.service.delete(&ctx, spec, &self.name).await {
                if !e.is_operation_not_done() {
                    error!(
                        service = %self.name,
                        resource = spec.resource_name(),
                        "deletion failed: {}",
                        e
                    );
                }
                record_error(&mut result, e);
            }
        }

        debug!(service = %self.name, specs = self.specs.len(), "delete pass finished");
        result.map_or(Ok(()), Err)
    }
}

/// What the caller should do after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    /// Converged; nothing to do until the desired state changes.
    Done,
    /// Run another pass after the delay.
    After(Duration),
    /// Hard failure that needs attention.
    Failed(String),
}

impl Requeue {
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Requeue::Done,
            Err(e) if e.is_transient() => {
                Requeue::After(e.requeue_after().unwrap_or_default())
            }
            Err(e) => Requeue::Failed(e.to_string()),
        }
    }
}
