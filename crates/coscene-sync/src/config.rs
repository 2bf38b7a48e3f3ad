//! Sync coordinator configuration

use std::time::Duration;

use coscene_store::config::millis;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Configuration for a [`SyncCoordinator`](crate::SyncCoordinator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between sends of a throttled (entity, kind) pair
    #[serde(with = "millis")]
    pub throttle_window: Duration,
    /// Backoff policy for failed sends
    pub retry: RetryPolicy,
    /// Lower bound of the random delay before requesting a snapshot on join
    #[serde(with = "millis")]
    pub snapshot_delay_min: Duration,
    /// Upper bound of the random delay before requesting a snapshot on join
    #[serde(with = "millis")]
    pub snapshot_delay_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_window: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            snapshot_delay_min: Duration::from_millis(100),
            snapshot_delay_max: Duration::from_millis(500),
        }
    }
}

impl SyncConfig {
    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_snapshot_delay(mut self, min: Duration, max: Duration) -> Self {
        self.snapshot_delay_min = min.min(max);
        self.snapshot_delay_max = min.max(max);
        self
    }
}
