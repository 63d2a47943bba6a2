//! Transient/terminal classification and retry delay extraction.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::{ProviderError, ReconcileError};

const RETRY_AFTER: &str = "Retry-After";
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Statuses where the provider rejected the request itself.
const TERMINAL_STATUSES: &[u16] = &[400, 401, 403, 422];

/// Result of classifying a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retryable: bool,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    default_requeue: Duration,
    rate_limit_requeue: Duration,
}

impl ErrorClassifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            default_requeue: config.default_requeue(),
            rate_limit_requeue: config.rate_limit_requeue(),
        }
    }

    pub fn classify(&self, err: &ProviderError) -> Classification {
        self.classify_at(err, Utc::now())
    }

    /// Classify relative to `now`, which is only used for HTTP-date
    /// Retry-After values.
    pub fn classify_at(&self, err: &ProviderError, now: DateTime<Utc>) -> Classification {
        let retryable = match err.response() {
            Some(resp) => !TERMINAL_STATUSES.contains(&resp.status),
            // Connection errors, timeouts and the like never have a response.
            None => true,
        };
        Classification {
            retryable,
            delay: self.retry_after_at(err, now),
        }
    }

    /// Suggested delay before retrying after `err`.
    pub fn retry_after_at(&self, err: &ProviderError, now: DateTime<Utc>) -> Duration {
        let Some(resp) = err.response() else {
            return self.default_requeue;
        };
        match resp.header(RETRY_AFTER) {
            Some(value) => parse_retry_after(value, now).unwrap_or(self.default_requeue),
            None if resp.status == STATUS_TOO_MANY_REQUESTS => self.rate_limit_requeue,
            None => self.default_requeue,
        }
    }

    /// Wrap an error from a read call. Reads never fail terminally; the
    /// classifier only contributes the delay.
    pub fn wrap_transient(&self, err: ProviderError) -> ReconcileError {
        let delay = self.classify(&err).delay;
        ReconcileError::transient(err, delay)
    }

    /// Wrap a provider error from a write call into a [`ReconcileError`] of
    /// the right kind.
    pub fn wrap(&self, err: ProviderError) -> ReconcileError {
        let class = self.classify(&err);
        if class.retryable {
            ReconcileError::transient(err, class.delay)
        } else {
            ReconcileError::terminal(err)
        }
    }
}

/// Parse a Retry-After value: delta seconds or an HTTP date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
