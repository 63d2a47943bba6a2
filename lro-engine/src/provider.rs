//! Provider client capabilities.
//!
//! A provider client implements [`Getter`] and [`Creator`] for the resource
//! types it can create or update, and [`Deleter`] for the ones it can delete.
//! The two write capabilities are independent so a service can be built from
//! any pair of them.

use std::fmt;

use async_trait::async_trait;

use crate::context::ReconcileContext;
use crate::error::ProviderError;
use crate::spec::ResourceSpec;

/// An in-flight provider operation.
pub trait PollHandle: fmt::Debug + Send + Sync {
    /// Opaque token from which the provider can resume polling later,
    /// possibly from another process.
    fn resume_token(&self) -> Result<String, ProviderError>;
}

/// Raw result of a long-running provider call.
///
/// Mirrors what provider SDKs hand back: an optional result, an optional
/// poll handle and an optional error. [`ProviderCall::into_outcome`] turns
/// it into exactly one [`Outcome`].
#[derive(Debug)]
pub struct ProviderCall<T> {
    pub result: Option<T>,
    pub handle: Option<Box<dyn PollHandle>>,
    pub error: Option<ProviderError>,
}

impl<T> ProviderCall<T> {
    pub fn completed(result: T) -> Self {
        Self {
            result: Some(result),
            handle: None,
            error: None,
        }
    }

    /// The call stopped waiting before the operation finished.
    pub fn in_progress(handle: Box<dyn PollHandle>, error: ProviderError) -> Self {
        Self {
            result: None,
            handle: Some(handle),
            error: Some(error),
        }
    }

    pub fn failed(error: ProviderError) -> Self {
        Self {
            result: None,
            handle: None,
            error: Some(error),
        }
    }

    /// A handle only counts as in-progress when the error says the context
    /// ended. Any other error discards the handle.
    pub fn into_outcome(self) -> Outcome<T> {
        match (self.handle, self.error) {
            (Some(handle), Some(error)) if error.is_deadline_or_cancelled() => {
                Outcome::InProgress { handle, error }
            }
            (_, Some(error)) => Outcome::Failed(error),
            (_, None) => Outcome::Completed(self.result),
        }
    }
}

/// What a provider call amounted to.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(Option<T>),
    InProgress {
        handle: Box<dyn PollHandle>,
        error: ProviderError,
    },
    Failed(ProviderError),
}

/// Reads current remote state.
#[async_trait]
pub trait Getter<S: ResourceSpec>: Send + Sync {
    /// Fetch the resource. A missing resource is reported as an error for
    /// which [`ProviderError::is_not_found`] holds.
    async fn get(&self, ctx: &ReconcileContext, spec: &S) -> Result<S::Resource, ProviderError>;
}

/// Starts or resumes create/update operations.
#[async_trait]
pub trait Creator<S: ResourceSpec>: Getter<S> {
    /// With a resume token, continue that operation and ignore `parameters`.
    /// Without one, start a new operation from `parameters`.
    async fn create_or_update_async(
        &self,
        ctx: &ReconcileContext,
        spec: &S,
        resume_token: Option<&str>,
        parameters: Option<S::Parameters>,
    ) -> ProviderCall<S::Resource>;
}

/// Starts or resumes delete operations.
#[async_trait]
pub trait Deleter<S: ResourceSpec>: Send + Sync {
    async fn delete_async(
        &self,
        ctx: &ReconcileContext,
        spec: &S,
        resume_token: Option<&str>,
    ) -> ProviderCall<()>;
}
