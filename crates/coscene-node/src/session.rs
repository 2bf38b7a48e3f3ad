//! One peer's participation in one scene session

use std::sync::Arc;

use coscene_core::{
    Action, ActionTarget, EffectId, EffectType, EntityId, EntityKind, EntityPatch, Origin, PeerId,
    Quat, Roster, SessionState, Transform, Vec3,
};
use coscene_store::{Snapshot, StoreHandle};
use coscene_sync::{StatsSnapshot, SyncCoordinator};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::NodeResult;

/// A running store, sync coordinator, and reconciler for one session
///
/// All mutating calls are local-origin: they apply immediately and are
/// broadcast in the background.
pub struct SceneSession {
    peer: PeerId,
    store: StoreHandle,
    sync: SyncCoordinator,
    store_task: JoinHandle<()>,
    reconciler_task: JoinHandle<()>,
}

impl SceneSession {
    pub(crate) fn new(
        peer: PeerId,
        store: StoreHandle,
        sync: SyncCoordinator,
        store_task: JoinHandle<()>,
        reconciler_task: JoinHandle<()>,
    ) -> Self {
        Self {
            peer,
            store,
            sync,
            store_task,
            reconciler_task,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Handle on the underlying store
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.sync.stats()
    }

    pub fn roster(&self) -> Roster {
        self.sync.roster()
    }

    pub fn session_state(&self) -> SessionState {
        self.sync.session_state()
    }

    pub async fn spawn_entity(&self, kind: EntityKind, transform: Transform) -> NodeResult<EntityId> {
        let id = self.store.spawn_entity(kind, transform, Origin::Local).await?;
        debug!(entity = %id.short_id(), kind = %kind, "Spawned entity");
        Ok(id)
    }

    pub async fn move_entity(&self, id: EntityId, position: Vec3) -> NodeResult<bool> {
        self.update_entity(id, EntityPatch::position(position)).await
    }

    pub async fn scale_entity(&self, id: EntityId, scale: f32) -> NodeResult<bool> {
        self.update_entity(id, EntityPatch::scale(scale)).await
    }

    pub async fn rotate_entity(&self, id: EntityId, rotation: Quat) -> NodeResult<bool> {
        self.update_entity(id, EntityPatch::rotation(rotation)).await
    }

    pub async fn set_hidden(&self, id: EntityId, hidden: bool) -> NodeResult<bool> {
        self.update_entity(id, EntityPatch::hidden(hidden)).await
    }

    pub async fn update_entity(&self, id: EntityId, patch: EntityPatch) -> NodeResult<bool> {
        Ok(self.store.update_entity(id, patch, Origin::Local).await?)
    }

    pub async fn remove_entity(&self, id: EntityId) -> NodeResult<bool> {
        Ok(self.store.remove_entity(id, Origin::Local).await?)
    }

    /// Trigger an action on one entity; it reverts to idle on its own
    pub async fn trigger_action(&self, id: EntityId, action: Action) -> NodeResult<bool> {
        let affected = self
            .store
            .trigger_action(ActionTarget::Entity(id), action, Origin::Local)
            .await?;
        Ok(affected > 0)
    }

    /// Trigger an action on every entity in the scene
    pub async fn trigger_action_all(&self, action: Action) -> NodeResult<usize> {
        Ok(self
            .store
            .trigger_action(ActionTarget::All, action, Origin::Local)
            .await?)
    }

    pub async fn spawn_effect(
        &self,
        effect_type: EffectType,
        position: Vec3,
        duration: f32,
    ) -> NodeResult<EffectId> {
        Ok(self
            .store
            .spawn_effect(effect_type, position, duration, Origin::Local)
            .await?)
    }

    /// Stop syncing and rendering, then let the store wind down
    pub async fn leave(self) {
        let Self {
            peer,
            store,
            sync,
            store_task,
            reconciler_task,
        } = self;

        sync.shutdown().await;
        drop(store);

        if let Err(e) = store_task.await {
            warn!(error = %e, "Store task ended abnormally");
        }
        if let Err(e) = reconciler_task.await {
            warn!(error = %e, "Reconciler task ended abnormally");
        }
        info!(peer = %peer.short_id(), "Left session");
    }
}
