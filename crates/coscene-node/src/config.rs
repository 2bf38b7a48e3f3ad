//! Node configuration, loadable from TOML
//!
//! Every section and field is optional; missing values take their defaults.
//!
//! ```toml
//! [store]
//! action_revert_delay = 2000
//!
//! [sync]
//! throttle_window = 50
//!
//! [sync.retry]
//! max_retries = 5
//!
//! [reconciler]
//! position_epsilon = 0.005
//!
//! [logging]
//! level = "debug"
//! console = "pretty"
//! ```

use std::path::Path;

use coscene_logging::LogConfig;
use coscene_scene::ReconcilerConfig;
use coscene_store::StoreConfig;
use coscene_sync::SyncConfig;
use serde::{Deserialize, Serialize};

use crate::error::NodeResult;

/// Configuration for a [`SceneNode`](crate::SceneNode)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub reconciler: ReconcilerConfig,
    pub logging: LogConfig,
}

impl NodeConfig {
    pub fn from_toml_str(source: &str) -> NodeResult<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn to_toml_string(&self) -> NodeResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Read and parse a TOML config file
    pub async fn load(path: impl AsRef<Path>) -> NodeResult<Self> {
        let source = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&source)
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_reconciler(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(NodeConfig::from_toml_str("").unwrap(), NodeConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_fields() {
        let config = NodeConfig::from_toml_str(
            r#"
            [sync]
            throttle_window = 50

            [sync.retry]
            max_retries = 5

            [store]
            action_revert_delay = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.throttle_window, Duration::from_millis(50));
        assert_eq!(config.sync.retry.max_retries, 5);
        assert_eq!(config.sync.retry.initial_backoff, Duration::from_millis(500));
        assert_eq!(config.store.action_revert_delay, Duration::from_millis(1500));
        assert_eq!(config.reconciler, ReconcilerConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = NodeConfig::default().with_sync(
            SyncConfig::default().with_throttle_window(Duration::from_millis(250)),
        );
        let text = config.to_toml_string().unwrap();
        assert_eq!(NodeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = NodeConfig::from_toml_str("[sync]\nthrottle_window = \"fast\"");
        assert!(matches!(result, Err(crate::NodeError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let result = NodeConfig::load("/definitely/not/here.toml").await;
        assert!(matches!(result, Err(crate::NodeError::Io(_))));
    }
}
