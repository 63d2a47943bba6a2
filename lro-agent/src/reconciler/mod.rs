//! Reconcilers for different resource types.
//!
//! Each resource type provides a [`lro_engine::ResourceSpec`] that compares
//! desired state with what the backend reports and computes the request to
//! converge.

pub mod disk;

pub use disk::{DiskParameters, DiskSpec};

/// Condition type reported for the disk service.
pub const DISKS_READY: &str = "DisksReady";
