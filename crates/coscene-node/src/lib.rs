//! # Coscene Node
//!
//! Builds the full per-session stack from a [`NodeConfig`]:
//!
//! ```text
//! input ─▶ StoreHandle ─▶ SyncCoordinator ─▶ Transport ─▶ other peers
//!              │
//!              └─▶ SceneReconciler ─▶ Renderer
//! ```
//!
//! Nothing here is global: each [`SceneNode::join`] creates an independent
//! store, coordinator, and reconciler bound to the given transport and
//! renderer.

pub mod config;
pub mod error;
pub mod session;

pub use config::NodeConfig;
pub use error::{NodeError, NodeResult};
pub use session::SceneSession;

use std::sync::Arc;

use coscene_core::Transport;
use coscene_logging::{CosceneSubscriberBuilder, WorkerGuard};
use coscene_scene::{Renderer, SceneReconciler};
use coscene_store::StoreHandle;
use coscene_sync::SyncCoordinator;
use tracing::info;

/// Factory for scene sessions sharing one configuration
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    config: NodeConfig,
}

impl SceneNode {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Install the global subscriber described by the `logging` section.
    ///
    /// Keep the returned guard alive while file output is in use.
    pub fn init_logging(&self) -> NodeResult<Option<WorkerGuard>> {
        Ok(CosceneSubscriberBuilder::new()
            .with_config(self.config.logging.clone())
            .try_init()?)
    }

    /// Start a session on `transport`, drawing into `renderer`
    pub async fn join<T: Transport>(
        &self,
        transport: Arc<T>,
        renderer: Arc<dyn Renderer>,
    ) -> NodeResult<SceneSession> {
        let peer = transport.local_peer();
        let (store, store_task) = StoreHandle::spawn(self.config.store.clone());

        let sync = match SyncCoordinator::start(transport, store.clone(), self.config.sync.clone()).await {
            Ok(sync) => sync,
            Err(e) => {
                store_task.abort();
                return Err(e.into());
            }
        };

        let reconciler_task =
            SceneReconciler::new(renderer, self.config.reconciler.clone()).spawn(store.watch());

        info!(peer = %peer.short_id(), "Scene session started");
        Ok(SceneSession::new(peer, store, sync, store_task, reconciler_task))
    }
}
