//! Disk agent: runs reconcile (or finalize) passes until the disks converge,
//! persisting in-flight operations between passes and across restarts.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use lro_engine::status::ConditionStatus;
use lro_engine::{
    AsyncService, Conditions, EngineConfig, FileStore, ReconcileContext, Reconciler, Requeue,
    ServiceReconciler,
};
use tracing::{debug, error, info, warn};

use crate::clients::SimClient;
use crate::reconciler::{DiskSpec, DISKS_READY};

/// Which direction the agent drives the disks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Apply,
    Delete,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Converged,
    /// Stopped with operations still in flight; they resume on the next start.
    Suspended,
}

pub struct DiskAgent {
    reconciler: ServiceReconciler<DiskSpec, SimClient, SimClient>,
    conditions: Conditions,
    mode: Mode,
    pass_timeout: Duration,
    max_passes: Option<u32>,
}

impl DiskAgent {
    pub fn new(
        client: SimClient,
        store: FileStore,
        config: EngineConfig,
        service_name: &str,
        specs: Vec<DiskSpec>,
        mode: Mode,
        pass_timeout: Duration,
    ) -> Self {
        let service = Arc::new(AsyncService::new(
            client.clone(),
            client,
            Arc::new(store),
            config,
        ));
        Self {
            reconciler: ServiceReconciler::new(service_name, specs, service),
            conditions: Conditions::new(),
            mode,
            pass_timeout,
            max_passes: None,
        }
    }

    /// Stop after this many passes even if operations are still running.
    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = Some(max_passes);
        self
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    async fn run_pass(&self, ctx: &ReconcileContext) -> lro_engine::Result<()> {
        match self.mode {
            Mode::Apply => self.reconciler.reconcile(ctx).await,
            Mode::Delete => self.reconciler.finalize(ctx).await,
        }
    }

    fn record_status(&mut self, result: &lro_engine::Result<()>) {
        let service = self.reconciler.name().to_string();
        match self.mode {
            Mode::Apply => {
                self.conditions
                    .update_put_status(DISKS_READY, &service, result.as_ref().err())
            }
            Mode::Delete => {
                self.conditions
                    .update_delete_status(DISKS_READY, &service, result.as_ref().err())
            }
        }

        for condition in self.conditions.iter() {
            let ready = condition.status == ConditionStatus::True;
            info!(
                condition = %condition.condition_type,
                ready,
                reason = ?condition.reason,
                "{}",
                condition.message.as_deref().unwrap_or("ok")
            );
        }
    }

    /// Run passes until the disks converge, a pass fails hard, the pass limit
    /// is hit, or the process is interrupted.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let mut passes = 0u32;

        loop {
            passes += 1;
            let ctx = ReconcileContext::with_timeout(self.pass_timeout);
            debug!(pass = passes, mode = ?self.mode, "Starting pass");

            let mut interrupted = false;
            let result = {
                let pass = self.run_pass(&ctx);
                tokio::pin!(pass);
                tokio::select! {
                    result = &mut pass => result,
                    _ = tokio::signal::ctrl_c() => {
                        warn!("Interrupted, suspending in-flight operations");
                        interrupted = true;
                        ctx.cancel();
                        pass.await
                    }
                }
            };

            self.record_status(&result);
            if interrupted {
                return Ok(RunOutcome::Suspended);
            }

            match Requeue::from_result(&result) {
                Requeue::Done => {
                    info!("Disks converged after {} pass(es)", passes);
                    return Ok(RunOutcome::Converged);
                }
                Requeue::Failed(msg) => {
                    error!("Pass {} failed: {}", passes, msg);
                    bail!("reconciliation failed: {}", msg);
                }
                Requeue::After(delay) => {
                    if self.max_passes.is_some_and(|max| passes >= max) {
                        info!("Pass limit reached with operations in flight");
                        return Ok(RunOutcome::Suspended);
                    }
                    info!("Requeueing in {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = tokio::signal::ctrl_c() => {
                            warn!("Interrupted, in-flight operations resume on next start");
                            return Ok(RunOutcome::Suspended);
                        }
                    }
                }
            }
        }
    }
}
