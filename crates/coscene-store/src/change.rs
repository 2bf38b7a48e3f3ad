//! Change notifications and immutable snapshots

use std::collections::BTreeMap;

use coscene_core::{
    Action, ActionTarget, EffectId, EffectInstance, EntityId, EntityPatch, EntityState,
};

/// A mutation made by this peer, announced to local subscribers.
///
/// Remote-origin mutations never produce one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalChange {
    EntitySpawned(EntityState),
    EntityUpdated { id: EntityId, patch: EntityPatch },
    EntityRemoved(EntityId),
    ActionTriggered { target: ActionTarget, action: Action },
    EffectSpawned(EffectInstance),
}

impl LocalChange {
    /// Entity this change concerns, if it targets exactly one
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            LocalChange::EntitySpawned(state) => Some(state.id),
            LocalChange::EntityUpdated { id, .. } => Some(*id),
            LocalChange::EntityRemoved(id) => Some(*id),
            LocalChange::ActionTriggered {
                target: ActionTarget::Entity(id),
                ..
            } => Some(*id),
            LocalChange::ActionTriggered {
                target: ActionTarget::All,
                ..
            } => None,
            LocalChange::EffectSpawned(_) => None,
        }
    }
}

/// Full store contents at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Bumped on every applied change
    pub revision: u64,
    pub entities: BTreeMap<EntityId, EntityState>,
    pub effects: BTreeMap<EffectId, EffectInstance>,
}

impl Snapshot {
    pub fn entity(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    pub fn effect(&self, id: &EffectId) -> Option<&EffectInstance> {
        self.effects.get(id)
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Same entities and effects, ignoring the revision counter
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.entities == other.entities && self.effects == other.effects
    }
}
