//! lro-engine: resumable reconciliation of long-running provider operations.
//!
//! A reconciliation pass calls [`AsyncService::create_or_update`] or
//! [`AsyncService::delete`] once per resource. When the provider is still
//! working as the pass runs out of time, the operation's resume token is
//! written to an [`OperationStore`] and the pass ends with a transient error;
//! the next pass picks the operation up from the stored token instead of
//! starting a new one.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use lro_engine::{AsyncService, EngineConfig, FileStore, ReconcileContext, Requeue};
//!
//! let store = Arc::new(FileStore::new("/var/lib/agent/operations.json"));
//! let service = AsyncService::new(client.clone(), client, store, EngineConfig::default());
//!
//! let ctx = ReconcileContext::with_timeout(std::time::Duration::from_secs(10));
//! let result = service.create_or_update(&ctx, &disk_spec, "disks").await;
//! match Requeue::from_result(&result) {
//!     Requeue::Done => {}
//!     Requeue::After(delay) => schedule(delay),
//!     Requeue::Failed(msg) => report(msg),
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod future;
pub mod provider;
pub mod reconciler;
pub mod service;
pub mod spec;
pub mod status;
pub mod store;

pub use classifier::{Classification, ErrorClassifier};
pub use config::EngineConfig;
pub use context::ReconcileContext;
pub use error::{ErrorKind, ProviderError, ReconcileError, Response, Result};
pub use future::{OperationKind, ResumeRecord};
pub use provider::{Creator, Deleter, Getter, Outcome, PollHandle, ProviderCall};
pub use reconciler::{Reconciler, Requeue, ServiceReconciler};
pub use service::AsyncService;
pub use spec::{Desired, ResourceSpec};
pub use status::Conditions;
pub use store::{FileStore, MemoryStore, OperationStore, StoreError};
