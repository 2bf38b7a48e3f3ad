//! Store configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Delay after a local action trigger before the entity returns to idle
    #[serde(with = "millis")]
    pub action_revert_delay: Duration,
    /// Extra time an effect stays after its duration elapses
    #[serde(with = "millis")]
    pub effect_grace: Duration,
    /// How many expired effect ids to remember so late duplicates stay dead
    pub expired_effect_memory: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            action_revert_delay: Duration::from_secs(2),
            effect_grace: Duration::from_millis(500),
            expired_effect_memory: 256,
        }
    }
}

impl StoreConfig {
    pub fn with_action_revert_delay(mut self, delay: Duration) -> Self {
        self.action_revert_delay = delay;
        self
    }

    pub fn with_effect_grace(mut self, grace: Duration) -> Self {
        self.effect_grace = grace;
        self
    }
}

/// Serialize `Duration`s as integer milliseconds
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.action_revert_delay, Duration::from_secs(2));
        assert_eq!(config.effect_grace, Duration::from_millis(500));
    }
}
