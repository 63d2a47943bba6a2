//! Deadline and cancellation signal for one reconciliation pass.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Ambient context of a reconciliation pass.
///
/// Passed unchanged to every provider call. Provider clients are expected to
/// stop waiting once [`ReconcileContext::done`] resolves and hand back a poll
/// handle together with [`ReconcileContext::err`].
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ReconcileContext {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Derive a context that ends at the earlier of the parent's deadline and
    /// `timeout` from now. Cancelling the parent cancels the child.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let local = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < local => parent,
            _ => local,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context ended, or `None` while it is still live.
    pub fn err(&self) -> Option<ProviderError> {
        if self.token.is_cancelled() {
            return Some(ProviderError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ProviderError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self::background()
    }
}
