//! The authoritative scene state for one peer

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use coscene_core::{
    Action, ActionTarget, EffectId, EffectInstance, EffectType, EntityId, EntityKind,
    EntityPatch, EntityState, Origin, Transform, Vec3,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::change::{LocalChange, Snapshot};
use crate::config::StoreConfig;
use crate::timer::{TimerFired, TimerKey, TimerTable};

/// Single-writer store of entities and effects.
///
/// Every method takes `&mut self`; callers on other tasks go through
/// [`StoreHandle`](crate::StoreHandle). Mutations on unknown ids are
/// silent no-ops so replayed messages are always safe to apply.
pub struct StateStore {
    config: StoreConfig,
    entities: BTreeMap<EntityId, EntityState>,
    effects: BTreeMap<EffectId, EffectInstance>,
    expired_effects: VecDeque<EffectId>,
    expired_lookup: HashSet<EffectId>,
    timers: TimerTable,
    subscribers: Vec<mpsc::UnboundedSender<LocalChange>>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    revision: u64,
}

impl StateStore {
    /// Create an empty store. Elapsed timers are reported on `timer_tx`;
    /// whoever owns the store feeds them back through [`Self::handle_timer`].
    pub fn new(config: StoreConfig, timer_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            config,
            entities: BTreeMap::new(),
            effects: BTreeMap::new(),
            expired_effects: VecDeque::new(),
            expired_lookup: HashSet::new(),
            timers: TimerTable::new(timer_tx),
            subscribers: Vec::new(),
            snapshot_tx,
            revision: 0,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register for local-origin change notifications
    pub fn subscribe_local(&mut self) -> mpsc::UnboundedReceiver<LocalChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Watch immutable snapshots; updated after every change of any origin
    pub fn watch_snapshots(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn entity(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    pub fn effect(&self, id: &EffectId) -> Option<&EffectInstance> {
        self.effects.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Spawn a new entity with a fresh id
    pub fn spawn_entity(&mut self, kind: EntityKind, transform: Transform, origin: Origin) -> EntityId {
        let state = EntityState::new(EntityId::generate(), kind, transform);
        self.insert_entity(state, origin)
    }

    /// Insert an entity with a known id.
    ///
    /// If the id already exists this behaves as a full update, which makes
    /// repeated spawns of the same entity idempotent. The incoming action
    /// retimes the revert exactly as [`trigger_action`](Self::trigger_action)
    /// would.
    pub fn insert_entity(&mut self, state: EntityState, origin: Origin) -> EntityId {
        let id = state.id;
        let (changed, known) = match self.entities.get_mut(&id) {
            Some(existing) => {
                trace!(entity = %id.short_id(), ?origin, "Spawn of known entity merged as update");
                (existing.apply_patch(&EntityPatch::full(&state)), true)
            }
            None => {
                debug!(entity = %id.short_id(), kind = %state.kind, ?origin, "Entity spawned");
                self.entities.insert(id, state.clone());
                (true, false)
            }
        };

        if known {
            self.retime_action(id, state.action, origin);
        }
        if changed {
            self.publish();
        }
        if origin.is_local() {
            self.notify(LocalChange::EntitySpawned(state));
        }
        id
    }

    /// Merge a partial update into an entity. Unknown ids are ignored.
    pub fn update_entity(&mut self, id: EntityId, patch: EntityPatch, origin: Origin) -> bool {
        if patch.is_empty() {
            return false;
        }
        if !self.entities.contains_key(&id) {
            trace!(entity = %id.short_id(), ?origin, "Update for unknown entity ignored");
            return false;
        }

        if let Some(action) = patch.action {
            self.retime_action(id, action, origin);
        }

        let changed = self
            .entities
            .get_mut(&id)
            .is_some_and(|existing| existing.apply_patch(&patch));
        if changed {
            self.publish();
        }
        if origin.is_local() {
            self.notify(LocalChange::EntityUpdated { id, patch });
        }
        true
    }

    /// Remove an entity and cancel its pending revert. Unknown ids are ignored.
    pub fn remove_entity(&mut self, id: EntityId, origin: Origin) -> bool {
        if self.entities.remove(&id).is_none() {
            trace!(entity = %id.short_id(), ?origin, "Remove for unknown entity ignored");
            return false;
        }
        self.timers.cancel(&TimerKey::ActionRevert(id));
        debug!(entity = %id.short_id(), ?origin, "Entity removed");

        self.publish();
        if origin.is_local() {
            self.notify(LocalChange::EntityRemoved(id));
        }
        true
    }

    /// Set the action on one entity or on all of them.
    ///
    /// A local non-idle action schedules a revert to idle after
    /// [`StoreConfig::action_revert_delay`]; the revert is itself a local
    /// mutation and is announced like any other. Returns the number of
    /// entities affected.
    pub fn trigger_action(&mut self, target: ActionTarget, action: Action, origin: Origin) -> usize {
        let ids: Vec<EntityId> = match target {
            ActionTarget::Entity(id) if self.entities.contains_key(&id) => vec![id],
            ActionTarget::Entity(id) => {
                trace!(entity = %id.short_id(), ?origin, "Action for unknown entity ignored");
                return 0;
            }
            ActionTarget::All => self.entities.keys().copied().collect(),
        };
        if ids.is_empty() {
            return 0;
        }

        let mut changed = false;
        for id in &ids {
            self.retime_action(*id, action, origin);
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.action != action {
                    entity.action = action;
                    changed = true;
                }
            }
        }
        debug!(?target, %action, ?origin, affected = ids.len(), "Action triggered");

        if changed {
            self.publish();
        }
        if origin.is_local() {
            self.notify(LocalChange::ActionTriggered { target, action });
        }
        ids.len()
    }

    /// Schedule, or cancel, the revert timer for an action change.
    ///
    /// Only the originating peer times an action out. A remote action
    /// cancels any revert we had pending, since its origin now owns it.
    fn retime_action(&mut self, id: EntityId, action: Action, origin: Origin) {
        let key = TimerKey::ActionRevert(id);
        if origin.is_local() && !action.is_idle() {
            self.timers.schedule(key, self.config.action_revert_delay);
        } else {
            self.timers.cancel(&key);
        }
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Spawn a new effect at `position` lasting `duration` seconds
    pub fn spawn_effect(
        &mut self,
        effect_type: EffectType,
        position: Vec3,
        duration: f32,
        origin: Origin,
    ) -> EffectId {
        let effect = EffectInstance::new(effect_type, position, duration);
        let id = effect.id;
        self.insert_effect(effect, origin);
        id
    }

    /// Insert an effect with a known id and schedule its removal.
    ///
    /// Returns `false` without doing anything if the effect is already
    /// present or has already expired here.
    pub fn insert_effect(&mut self, effect: EffectInstance, origin: Origin) -> bool {
        let id = effect.id;
        if self.effects.contains_key(&id) || self.expired_lookup.contains(&id) {
            trace!(effect = %id.short_id(), ?origin, "Duplicate effect ignored");
            return false;
        }

        let delay = effect.lifetime() + self.config.effect_grace;
        self.timers.schedule(TimerKey::EffectExpiry(id), delay);
        debug!(
            effect = %id.short_id(),
            effect_type = %effect.effect_type,
            duration = effect.duration,
            ?origin,
            "Effect spawned"
        );

        self.effects.insert(id, effect.clone());
        self.publish();
        if origin.is_local() {
            self.notify(LocalChange::EffectSpawned(effect));
        }
        true
    }

    fn expire_effect(&mut self, id: EffectId) {
        if self.effects.remove(&id).is_none() {
            return;
        }
        debug!(effect = %id.short_id(), "Effect expired");

        self.expired_effects.push_back(id);
        self.expired_lookup.insert(id);
        while self.expired_effects.len() > self.config.expired_effect_memory {
            if let Some(oldest) = self.expired_effects.pop_front() {
                self.expired_lookup.remove(&oldest);
            }
        }

        self.publish();
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Apply an elapsed timer; stale or cancelled timers are ignored
    pub fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.take_if_current(&fired) {
            trace!(key = ?fired.key, "Stale timer ignored");
            return;
        }

        match fired.key {
            TimerKey::ActionRevert(id) => {
                let still_acting = self
                    .entities
                    .get(&id)
                    .is_some_and(|entity| !entity.action.is_idle());
                if still_acting {
                    self.trigger_action(ActionTarget::Entity(id), Action::Idle, Origin::Local);
                }
            }
            TimerKey::EffectExpiry(id) => self.expire_effect(id),
        }
    }

    /// Cancel every pending timer
    pub fn cancel_timers(&mut self) {
        self.timers.clear();
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    fn notify(&mut self, change: LocalChange) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = Snapshot {
            revision: self.revision,
            entities: self.entities.clone(),
            effects: self.effects.clone(),
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (StateStore, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StateStore::new(StoreConfig::default(), tx), rx)
    }

    #[tokio::test]
    async fn test_local_spawn_notifies() {
        let (mut store, _timers) = store();
        let mut changes = store.subscribe_local();

        let id = store.spawn_entity(EntityKind::Fox, Transform::default(), Origin::Local);

        match changes.try_recv().unwrap() {
            LocalChange::EntitySpawned(state) => assert_eq!(state.id, id),
            other => panic!("unexpected change: {:?}", other),
        }
        assert_eq!(store.snapshot().entities.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_mutations_are_silent() {
        let (mut store, _timers) = store();
        let mut changes = store.subscribe_local();

        let state = EntityState::new(EntityId::generate(), EntityKind::Robot, Transform::default());
        let id = store.insert_entity(state, Origin::Remote);
        store.update_entity(id, EntityPatch::scale(3.0), Origin::Remote);
        store.trigger_action(ActionTarget::Entity(id), Action::Dance, Origin::Remote);
        store.spawn_effect(EffectType::Smoke, Vec3::ZERO, 1.0, Origin::Remote);
        store.remove_entity(id, Origin::Remote);

        assert!(changes.try_recv().is_err());
        // The snapshot watchers still see every change
        assert_eq!(store.snapshot().revision, 5);
    }

    #[tokio::test]
    async fn test_remote_spawn_of_known_id_is_update() {
        let (mut store, _timers) = store();
        let mut state = EntityState::new(EntityId::generate(), EntityKind::Ghost, Transform::default());
        store.insert_entity(state.clone(), Origin::Remote);

        state.position = Vec3::new(1.0, 2.0, 3.0);
        store.insert_entity(state.clone(), Origin::Remote);

        assert_eq!(store.entity_count(), 1);
        assert_eq!(store.entity(&state.id).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_noops() {
        let (mut store, _timers) = store();
        let mut changes = store.subscribe_local();
        let ghost = EntityId::generate();

        assert!(!store.update_entity(ghost, EntityPatch::scale(2.0), Origin::Local));
        assert!(!store.remove_entity(ghost, Origin::Local));
        assert_eq!(store.trigger_action(ActionTarget::Entity(ghost), Action::Wave, Origin::Local), 0);

        assert!(changes.try_recv().is_err());
        assert_eq!(store.snapshot().revision, 0);
    }

    #[tokio::test]
    async fn test_local_action_schedules_revert_and_remove_cancels_it() {
        let (mut store, _timers) = store();
        let id = store.spawn_entity(EntityKind::Fox, Transform::default(), Origin::Local);

        store.trigger_action(ActionTarget::Entity(id), Action::Wave, Origin::Local);
        assert_eq!(store.pending_timers(), 1);

        store.remove_entity(id, Origin::Local);
        assert_eq!(store.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_remote_action_cancels_local_revert() {
        let (mut store, _timers) = store();
        let id = store.spawn_entity(EntityKind::Fox, Transform::default(), Origin::Local);

        store.trigger_action(ActionTarget::Entity(id), Action::Wave, Origin::Local);
        store.trigger_action(ActionTarget::Entity(id), Action::Jump, Origin::Remote);

        assert_eq!(store.pending_timers(), 0);
        assert_eq!(store.entity(&id).unwrap().action, Action::Jump);
    }

    #[tokio::test]
    async fn test_remote_spawn_of_known_id_cancels_local_revert() {
        let (mut store, _timers) = store();
        let id = store.spawn_entity(EntityKind::Fox, Transform::default(), Origin::Local);
        store.trigger_action(ActionTarget::Entity(id), Action::Wave, Origin::Local);
        assert_eq!(store.pending_timers(), 1);

        let mut remote = store.entity(&id).unwrap().clone();
        remote.action = Action::Dance;
        store.insert_entity(remote, Origin::Remote);

        assert_eq!(store.pending_timers(), 0);
        assert_eq!(store.entity(&id).unwrap().action, Action::Dance);
    }

    #[tokio::test]
    async fn test_local_respawn_with_action_schedules_revert() {
        let (mut store, _timers) = store();
        let mut state = EntityState::new(EntityId::generate(), EntityKind::Robot, Transform::default());
        store.insert_entity(state.clone(), Origin::Remote);
        assert_eq!(store.pending_timers(), 0);

        state.action = Action::Jump;
        store.insert_entity(state, Origin::Local);
        assert_eq!(store.pending_timers(), 1);
    }

    #[tokio::test]
    async fn test_action_for_all_entities() {
        let (mut store, _timers) = store();
        let mut changes = store.subscribe_local();
        for _ in 0..3 {
            store.spawn_entity(EntityKind::Penguin, Transform::default(), Origin::Remote);
        }

        let affected = store.trigger_action(ActionTarget::All, Action::Dance, Origin::Local);

        assert_eq!(affected, 3);
        assert!(store.snapshot().entities.values().all(|e| e.action == Action::Dance));
        assert_eq!(
            changes.try_recv().unwrap(),
            LocalChange::ActionTriggered {
                target: ActionTarget::All,
                action: Action::Dance
            }
        );
        assert_eq!(store.pending_timers(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_effect_is_ignored() {
        let (mut store, _timers) = store();
        let effect = EffectInstance::new(EffectType::Confetti, Vec3::ZERO, 1.0);

        assert!(store.insert_effect(effect.clone(), Origin::Remote));
        assert!(!store.insert_effect(effect, Origin::Remote));
        assert_eq!(store.effect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_effect_stays_dead() {
        let (mut store, mut timers) = store();
        let effect = EffectInstance::new(EffectType::Hearts, Vec3::ZERO, 0.5);
        store.insert_effect(effect.clone(), Origin::Remote);

        let fired = timers.recv().await.unwrap();
        store.handle_timer(fired);
        assert_eq!(store.effect_count(), 0);

        // A late duplicate delivery must not resurrect it
        assert!(!store.insert_effect(effect, Origin::Remote));
        assert_eq!(store.effect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_is_broadcast_as_local_change() {
        let (mut store, mut timers) = store();
        let mut changes = store.subscribe_local();
        let id = store.spawn_entity(EntityKind::Dragon, Transform::default(), Origin::Local);
        store.trigger_action(ActionTarget::Entity(id), Action::Spin, Origin::Local);
        while changes.try_recv().is_ok() {}

        let fired = timers.recv().await.unwrap();
        store.handle_timer(fired);

        assert_eq!(store.entity(&id).unwrap().action, Action::Idle);
        assert_eq!(
            changes.try_recv().unwrap(),
            LocalChange::ActionTriggered {
                target: ActionTarget::Entity(id),
                action: Action::Idle
            }
        );
    }
}
