//! Disk reconciler spec.

use anyhow::{bail, Result};
use async_trait::async_trait;
use lro_engine::{Desired, ReconcileContext, ResourceSpec};

use crate::clients::sim::Disk;

/// Body of a disk put request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskParameters {
    pub size_gb: u64,
}

/// Desired state of one disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub name: String,
    pub resource_group: String,
    pub size_gb: u64,
}

impl DiskSpec {
    pub fn new(name: impl Into<String>, resource_group: impl Into<String>, size_gb: u64) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            size_gb,
        }
    }
}

#[async_trait]
impl ResourceSpec for DiskSpec {
    type Resource = Disk;
    type Parameters = DiskParameters;

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    /// Disks can grow in place but never shrink.
    async fn parameters(
        &self,
        _ctx: &ReconcileContext,
        existing: Option<&Disk>,
    ) -> Result<Desired<DiskParameters>> {
        match existing {
            Some(disk) if disk.size_gb == self.size_gb => Ok(Desired::NoChange),
            Some(disk) if disk.size_gb > self.size_gb => bail!(
                "cannot shrink disk {} from {} GB to {} GB",
                self.name,
                disk.size_gb,
                self.size_gb
            ),
            _ => Ok(Desired::Change(DiskParameters {
                size_gb: self.size_gb,
            })),
        }
    }
}
