//! Error types for the reconciliation engine.
//!
//! Provider clients report failures as [`ProviderError`]. The engine turns
//! every failure it surfaces into a [`ReconcileError`], which carries an
//! explicit [`ErrorKind`] tag plus a chain of context strings. Callers decide
//! whether to requeue by looking at the kind, never at the message.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::future::{DecodeError, ResumeRecord};
use crate::store::StoreError;

/// HTTP-style response attached to a provider error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub message: String,
}

impl Response {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}: {}", self.status, self.message)
    }
}

/// Errors returned by provider clients.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The reconcile context's deadline passed while the call was running.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The reconcile context was cancelled while the call was running.
    #[error("context canceled")]
    Cancelled,

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider answered with an error response.
    #[error("{0}")]
    Response(Response),

    /// Connection-level failure; no response was received.
    #[error("transport: {0}")]
    Transport(String),

    /// Anything else the client could not classify.
    #[error("{0}")]
    Other(String),

    /// Another provider error with a contextual prefix.
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn context(self, message: impl Into<String>) -> Self {
        ProviderError::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error below any context wrappers.
    pub fn root(&self) -> &ProviderError {
        let mut err = self;
        while let ProviderError::Context { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn response(&self) -> Option<&Response> {
        match self.root() {
            ProviderError::Response(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self.root() {
            ProviderError::NotFound(_) => true,
            ProviderError::Response(resp) => resp.status == 404,
            _ => false,
        }
    }

    /// True only for the typed deadline and cancellation variants. An error
    /// whose message merely mentions a deadline does not count.
    pub fn is_deadline_or_cancelled(&self) -> bool {
        matches!(
            self.root(),
            ProviderError::DeadlineExceeded | ProviderError::Cancelled
        )
    }
}

/// Returned when a long-running operation is still running at the end of a
/// pass. Holds the resume record that was persisted for the next pass.
#[derive(Debug, Clone, Error)]
#[error(
    "operation type {} on resource {}/{} (service: {}) is not done",
    .record.kind,
    .record.resource_group,
    .record.resource_name,
    .record.service_name
)]
pub struct OperationNotDone {
    pub record: ResumeRecord,
}

/// Classification tag of a [`ReconcileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    /// Retry after `requeue_after`.
    Transient,
    /// Persisted resume state could not be read. The state has been cleared.
    Corrupt,
    /// Needs intervention; retrying as-is will not help.
    Terminal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Transient => "transient",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Underlying cause of a [`ReconcileError`].
#[derive(Debug, Error)]
pub enum Cause {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    NotDone(#[from] OperationNotDone),

    /// Computing the desired parameters failed.
    #[error(transparent)]
    Spec(anyhow::Error),
}

/// Error returned by a reconciliation pass.
#[derive(Debug)]
pub struct ReconcileError {
    kind: ErrorKind,
    context: Vec<String>,
    requeue_after: Option<Duration>,
    cause: Cause,
}

impl ReconcileError {
    fn new(kind: ErrorKind, cause: Cause, requeue_after: Option<Duration>) -> Self {
        Self {
            kind,
            context: Vec::new(),
            requeue_after,
            cause,
        }
    }

    pub fn transient(cause: impl Into<Cause>, requeue_after: Duration) -> Self {
        Self::new(ErrorKind::Transient, cause.into(), Some(requeue_after))
    }

    pub fn terminal(cause: impl Into<Cause>) -> Self {
        Self::new(ErrorKind::Terminal, cause.into(), None)
    }

    pub fn corrupt(cause: impl Into<Cause>) -> Self {
        Self::new(ErrorKind::Corrupt, cause.into(), None)
    }

    /// Prefix the error with another layer of context.
    pub fn context(mut self, message: impl Into<String>) -> Self {
        self.context.insert(0, message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// Context strings, outermost first.
    pub fn context_chain(&self) -> &[String] {
        &self.context
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }

    pub fn is_operation_not_done(&self) -> bool {
        matches!(self.cause, Cause::NotDone(_))
    }

    /// The resume record persisted for an unfinished operation.
    pub fn not_done_record(&self) -> Option<&ResumeRecord> {
        match &self.cause {
            Cause::NotDone(not_done) => Some(&not_done.record),
            _ => None,
        }
    }

    /// Suggested delay before the next pass. Only transient errors have one.
    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for message in &self.context {
            write!(f, "{}: ", message)?;
        }
        write!(f, "{}", self.cause)
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
