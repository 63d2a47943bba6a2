//! Async reconciliation service.
//!
//! Drives one resource per call through create/update or delete, resuming
//! long-running provider operations across passes via the operation store.
//! Nothing is cached in memory between calls.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::ErrorClassifier;
use crate::config::EngineConfig;
use crate::context::ReconcileContext;
use crate::error::{Cause, OperationNotDone, ProviderError, ReconcileError, Result};
use crate::future::{OperationKind, ResumeRecord};
use crate::provider::{Creator, Deleter, Outcome, PollHandle};
use crate::spec::{Desired, ResourceSpec};
use crate::store::{OperationStore, StoreError};

/// Create/update and delete for resources handled by `C` and `D`.
pub struct AsyncService<C, D> {
    creator: C,
    deleter: D,
    store: Arc<dyn OperationStore>,
    classifier: ErrorClassifier,
    config: EngineConfig,
}

impl<C, D> AsyncService<C, D> {
    pub fn new(creator: C, deleter: D, store: Arc<dyn OperationStore>, config: EngineConfig) -> Self {
        Self {
            creator,
            deleter,
            store,
            classifier: ErrorClassifier::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create or update `spec`, resuming an earlier operation if one is
    /// recorded for `service_name`.
    ///
    /// Returns the provider's result, or the existing resource when nothing
    /// needs to change. A still-running operation yields a transient error.
    pub async fn create_or_update<S>(
        &self,
        ctx: &ReconcileContext,
        spec: &S,
        service_name: &str,
    ) -> Result<Option<S::Resource>>
    where
        S: ResourceSpec,
        C: Creator<S>,
    {
        let resource_name = spec.resource_name();
        let resource_group = spec.resource_group_name();
        let kind = OperationKind::Create;

        let resume_token = self
            .resume_token(resource_name, service_name, kind)
            .await?;

        // Parameters are only computed when not resuming. The provider
        // continues a resumed operation from the token alone.
        let mut parameters = None;
        if resume_token.is_none() {
            let existing = match self.creator.get(ctx, spec).await {
                Ok(existing) => Some(existing),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    return Err(self.classifier.wrap_transient(e).context(format!(
                        "failed to get existing resource {}/{} (service: {})",
                        resource_group, resource_name, service_name
                    )));
                }
            };

            let desired = spec
                .parameters(ctx, existing.as_ref())
                .await
                .map_err(|e| {
                    ReconcileError::terminal(Cause::Spec(e)).context(format!(
                        "failed to get desired parameters for resource {}/{} (service: {})",
                        resource_group, resource_name, service_name
                    ))
                })?;

            match desired {
                Desired::NoChange => {
                    debug!(
                        service = service_name,
                        resource = resource_name,
                        resource_group,
                        "resource up to date"
                    );
                    return Ok(existing);
                }
                Desired::Change(p) => {
                    let verb = if existing.is_some() { "updating" } else { "creating" };
                    info!(
                        service = service_name,
                        resource = resource_name,
                        resource_group,
                        "{} resource",
                        verb
                    );
                    parameters = Some(p);
                }
            }
        } else {
            info!(
                service = service_name,
                resource = resource_name,
                resource_group,
                "resuming create or update of resource"
            );
        }

        let call = self
            .creator
            .create_or_update_async(ctx, spec, resume_token.as_deref(), parameters)
            .await;
        let describe = || {
            format!(
                "failed to create or update resource {}/{} (service: {})",
                resource_group, resource_name, service_name
            )
        };

        match call.into_outcome() {
            Outcome::InProgress { handle, error } => Err(self
                .suspend(handle.as_ref(), error, kind, spec, service_name)
                .await
                .context(describe())),
            Outcome::Completed(result) => {
                self.clear(resource_name, service_name, kind).await?;
                info!(
                    service = service_name,
                    resource = resource_name,
                    resource_group,
                    "successfully created or updated resource"
                );
                Ok(result)
            }
            Outcome::Failed(err) => {
                // The provider gave up on this operation; start over next pass.
                self.clear_after_failure(resource_name, service_name, kind)
                    .await;
                Err(self.classifier.wrap(err).context(describe()))
            }
        }
    }

    /// Delete `spec`, resuming an earlier delete if one is recorded.
    /// A resource that is already gone counts as deleted.
    pub async fn delete<S>(
        &self,
        ctx: &ReconcileContext,
        spec: &S,
        service_name: &str,
    ) -> Result<()>
    where
        S: ResourceSpec,
        D: Deleter<S>,
    {
        let resource_name = spec.resource_name();
        let resource_group = spec.resource_group_name();
        let kind = OperationKind::Delete;

        let resume_token = self
            .resume_token(resource_name, service_name, kind)
            .await?;

        info!(
            service = service_name,
            resource = resource_name,
            resource_group,
            resuming = resume_token.is_some(),
            "deleting resource"
        );

        let call = self
            .deleter
            .delete_async(ctx, spec, resume_token.as_deref())
            .await;
        let describe = || {
            format!(
                "failed to delete resource {}/{} (service: {})",
                resource_group, resource_name, service_name
            )
        };

        match call.into_outcome() {
            Outcome::InProgress { handle, error } => Err(self
                .suspend(handle.as_ref(), error, kind, spec, service_name)
                .await
                .context(describe())),
            Outcome::Completed(_) => {
                self.clear(resource_name, service_name, kind).await?;
                info!(
                    service = service_name,
                    resource = resource_name,
                    resource_group,
                    "successfully deleted resource"
                );
                Ok(())
            }
            Outcome::Failed(err) if err.is_not_found() => {
                self.clear(resource_name, service_name, kind).await?;
                debug!(
                    service = service_name,
                    resource = resource_name,
                    resource_group,
                    "resource already deleted"
                );
                Ok(())
            }
            Outcome::Failed(err) => {
                self.clear_after_failure(resource_name, service_name, kind)
                    .await;
                Err(self.classifier.wrap(err).context(describe()))
            }
        }
    }

    /// Look up and decode the resume token for a key. An undecodable record
    /// is deleted and reported as corrupt.
    async fn resume_token(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<Option<String>> {
        let record = self
            .store
            .get(resource_name, service_name, kind)
            .await
            .map_err(|e| self.store_error(e, "failed to read long-running operation state"))?;
        let Some(record) = record else {
            return Ok(None);
        };

        match record.resume_token() {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(
                    service = service_name,
                    resource = resource_name,
                    operation = %kind,
                    "could not decode resume record, resetting long-running operation state: {}",
                    e
                );
                self.clear(resource_name, service_name, kind).await?;
                Err(ReconcileError::corrupt(e).context(
                    "could not decode future data, resetting long-running operation state",
                ))
            }
        }
    }

    /// Persist a resume record for an operation the context cut short and
    /// return the matching not-done error.
    async fn suspend<S: ResourceSpec>(
        &self,
        handle: &dyn PollHandle,
        error: ProviderError,
        kind: OperationKind,
        spec: &S,
        service_name: &str,
    ) -> ReconcileError {
        let record = match ResumeRecord::from_handle(
            handle,
            kind,
            service_name,
            spec.resource_name(),
            spec.resource_group_name(),
        ) {
            Ok(record) => record,
            Err(token_err) => {
                warn!(
                    service = service_name,
                    resource = spec.resource_name(),
                    "could not capture in-flight operation: {}",
                    token_err
                );
                return self.classifier.wrap(error);
            }
        };

        if let Err(e) = self.store.set(record.clone()).await {
            return self.store_error(e, "failed to persist long-running operation state");
        }

        info!(
            service = service_name,
            resource = spec.resource_name(),
            resource_group = spec.resource_group_name(),
            operation = %kind,
            "operation still in progress, persisted resume record"
        );
        ReconcileError::transient(OperationNotDone { record }, self.config.default_requeue())
    }

    async fn clear(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) -> Result<()> {
        self.store
            .delete(resource_name, service_name, kind)
            .await
            .map_err(|e| self.store_error(e, "failed to clear long-running operation state"))
    }

    /// Like [`Self::clear`], but the provider error is what gets reported.
    async fn clear_after_failure(
        &self,
        resource_name: &str,
        service_name: &str,
        kind: OperationKind,
    ) {
        if let Err(e) = self.clear(resource_name, service_name, kind).await {
            warn!(
                service = service_name,
                resource = resource_name,
                operation = %kind,
                "{}",
                e
            );
        }
    }

    fn store_error(&self, err: StoreError, message: &str) -> ReconcileError {
        ReconcileError::transient(err, self.config.default_requeue()).context(message)
    }
}
