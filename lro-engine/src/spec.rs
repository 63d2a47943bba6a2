//! Resource specs: what a manageable resource should look like.

use async_trait::async_trait;

use crate::context::ReconcileContext;

/// Outcome of computing desired parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired<P> {
    /// Write these parameters to the provider.
    Change(P),
    /// The remote resource already matches; skip the write.
    NoChange,
}

/// A resource the engine can drive.
///
/// `parameters` must give the same answer for the same existing state. It is
/// only consulted when no operation is being resumed.
#[async_trait]
pub trait ResourceSpec: Send + Sync {
    /// Remote state as returned by the provider.
    type Resource: Send + Sync;
    /// Request payload for a create or update.
    type Parameters: Send;

    fn resource_name(&self) -> &str;

    fn resource_group_name(&self) -> &str;

    async fn parameters(
        &self,
        ctx: &ReconcileContext,
        existing: Option<&Self::Resource>,
    ) -> anyhow::Result<Desired<Self::Parameters>>;
}
