//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Requeue interval used when nothing better is known.
pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(15);

/// Requeue interval after a 429 response without a Retry-After header.
pub const DEFAULT_RATE_LIMIT_REQUEUE: Duration = Duration::from_secs(60);

/// Upper bound on one service's share of a reconciliation pass.
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(12);

/// Timing configuration. A value of zero falls back to the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub requeue_secs: u64,
    pub rate_limit_requeue_secs: u64,
    pub service_timeout_secs: u64,
}

impl EngineConfig {
    pub fn default_requeue(&self) -> Duration {
        defaulted(self.requeue_secs, DEFAULT_REQUEUE)
    }

    pub fn rate_limit_requeue(&self) -> Duration {
        defaulted(self.rate_limit_requeue_secs, DEFAULT_RATE_LIMIT_REQUEUE)
    }

    pub fn service_timeout(&self) -> Duration {
        defaulted(self.service_timeout_secs, DEFAULT_SERVICE_TIMEOUT)
    }
}

fn defaulted(secs: u64, default: Duration) -> Duration {
    if secs == 0 {
        default
    } else {
        Duration::from_secs(secs)
    }
}
