//! Reconciler configuration

use std::time::Duration;

use coscene_store::config::millis;
use serde::{Deserialize, Serialize};

/// Thresholds below which a field change is not worth an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Minimum position distance that triggers an update
    pub position_epsilon: f32,
    /// Minimum absolute scale change that triggers an update
    pub scale_epsilon: f32,
    /// Minimum quaternion component change that triggers an update
    pub rotation_epsilon: f32,
    /// How soon a failed create is attempted again when nothing else changes
    #[serde(with = "millis")]
    pub retry_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            position_epsilon: 0.01,
            scale_epsilon: 0.01,
            rotation_epsilon: 0.01,
            retry_interval: Duration::from_millis(500),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.position_epsilon = epsilon;
        self.scale_epsilon = epsilon;
        self.rotation_epsilon = epsilon;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}
