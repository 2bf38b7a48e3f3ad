//! State-owner task and the handle used to reach it
//!
//! The store lives on one task. Everything else, including local input,
//! the sync coordinator's inbound path, and elapsed timers, marshals
//! through a single-consumer queue, so the entity and effect maps are only
//! ever touched from one place.

use std::sync::Arc;

use coscene_core::{
    Action, ActionTarget, EffectId, EffectInstance, EffectType, EntityId, EntityKind,
    EntityPatch, EntityState, Origin, Transform, Vec3,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::change::{LocalChange, Snapshot};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::StateStore;
use crate::timer::TimerFired;

enum StoreCommand {
    SpawnEntity {
        kind: EntityKind,
        transform: Transform,
        origin: Origin,
        reply: oneshot::Sender<EntityId>,
    },
    InsertEntity {
        state: EntityState,
        origin: Origin,
        reply: oneshot::Sender<EntityId>,
    },
    UpdateEntity {
        id: EntityId,
        patch: EntityPatch,
        origin: Origin,
        reply: oneshot::Sender<bool>,
    },
    RemoveEntity {
        id: EntityId,
        origin: Origin,
        reply: oneshot::Sender<bool>,
    },
    TriggerAction {
        target: ActionTarget,
        action: Action,
        origin: Origin,
        reply: oneshot::Sender<usize>,
    },
    SpawnEffect {
        effect_type: EffectType,
        position: Vec3,
        duration: f32,
        origin: Origin,
        reply: oneshot::Sender<EffectId>,
    },
    InsertEffect {
        effect: EffectInstance,
        origin: Origin,
        reply: oneshot::Sender<bool>,
    },
    SubscribeLocal {
        reply: oneshot::Sender<mpsc::UnboundedReceiver<LocalChange>>,
    },
}

/// Cloneable handle on a running [`StateStore`]
///
/// Mutating calls resolve as soon as the state owner has applied them.
/// They never wait on the network.
#[derive(Clone)]
pub struct StoreHandle {
    commands: mpsc::UnboundedSender<StoreCommand>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
}

impl StoreHandle {
    /// Move a new store onto its own task
    pub fn spawn(config: StoreConfig) -> (Self, JoinHandle<()>) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let store = StateStore::new(config, timer_tx);
        let snapshots = store.watch_snapshots();

        let task = tokio::spawn(run(store, command_rx, timer_rx));
        (
            Self {
                commands: command_tx,
                snapshots,
            },
            task,
        )
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> StoreResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    pub async fn spawn_entity(
        &self,
        kind: EntityKind,
        transform: Transform,
        origin: Origin,
    ) -> StoreResult<EntityId> {
        self.request(|reply| StoreCommand::SpawnEntity {
            kind,
            transform,
            origin,
            reply,
        })
        .await
    }

    pub async fn insert_entity(&self, state: EntityState, origin: Origin) -> StoreResult<EntityId> {
        self.request(|reply| StoreCommand::InsertEntity { state, origin, reply })
            .await
    }

    pub async fn update_entity(
        &self,
        id: EntityId,
        patch: EntityPatch,
        origin: Origin,
    ) -> StoreResult<bool> {
        self.request(|reply| StoreCommand::UpdateEntity {
            id,
            patch,
            origin,
            reply,
        })
        .await
    }

    pub async fn remove_entity(&self, id: EntityId, origin: Origin) -> StoreResult<bool> {
        self.request(|reply| StoreCommand::RemoveEntity { id, origin, reply })
            .await
    }

    pub async fn trigger_action(
        &self,
        target: ActionTarget,
        action: Action,
        origin: Origin,
    ) -> StoreResult<usize> {
        self.request(|reply| StoreCommand::TriggerAction {
            target,
            action,
            origin,
            reply,
        })
        .await
    }

    pub async fn spawn_effect(
        &self,
        effect_type: EffectType,
        position: Vec3,
        duration: f32,
        origin: Origin,
    ) -> StoreResult<EffectId> {
        self.request(|reply| StoreCommand::SpawnEffect {
            effect_type,
            position,
            duration,
            origin,
            reply,
        })
        .await
    }

    pub async fn insert_effect(&self, effect: EffectInstance, origin: Origin) -> StoreResult<bool> {
        self.request(|reply| StoreCommand::InsertEffect { effect, origin, reply })
            .await
    }

    /// Register for local-origin change notifications
    pub async fn subscribe_local(&self) -> StoreResult<mpsc::UnboundedReceiver<LocalChange>> {
        self.request(|reply| StoreCommand::SubscribeLocal { reply }).await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshots as they are published
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

async fn run(
    mut store: StateStore,
    mut commands: mpsc::UnboundedReceiver<StoreCommand>,
    mut timers: mpsc::UnboundedReceiver<TimerFired>,
) {
    info!("State owner started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => execute(&mut store, command),
                None => break,
            },
            Some(fired) = timers.recv() => store.handle_timer(fired),
        }
    }

    store.cancel_timers();
    info!(entities = store.entity_count(), "State owner stopped");
}

fn execute(store: &mut StateStore, command: StoreCommand) {
    // A dropped reply just means the caller stopped waiting
    match command {
        StoreCommand::SpawnEntity {
            kind,
            transform,
            origin,
            reply,
        } => {
            let _ = reply.send(store.spawn_entity(kind, transform, origin));
        }
        StoreCommand::InsertEntity { state, origin, reply } => {
            let _ = reply.send(store.insert_entity(state, origin));
        }
        StoreCommand::UpdateEntity {
            id,
            patch,
            origin,
            reply,
        } => {
            let _ = reply.send(store.update_entity(id, patch, origin));
        }
        StoreCommand::RemoveEntity { id, origin, reply } => {
            let _ = reply.send(store.remove_entity(id, origin));
        }
        StoreCommand::TriggerAction {
            target,
            action,
            origin,
            reply,
        } => {
            let _ = reply.send(store.trigger_action(target, action, origin));
        }
        StoreCommand::SpawnEffect {
            effect_type,
            position,
            duration,
            origin,
            reply,
        } => {
            let _ = reply.send(store.spawn_effect(effect_type, position, duration, origin));
        }
        StoreCommand::InsertEffect { effect, origin, reply } => {
            let _ = reply.send(store.insert_effect(effect, origin));
        }
        StoreCommand::SubscribeLocal { reply } => {
            debug!("Local change subscriber registered");
            let _ = reply.send(store.subscribe_local());
        }
    }
}
