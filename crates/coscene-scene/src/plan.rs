//! Pure diffing of rendered state against a snapshot

use std::collections::{HashMap, HashSet};

use coscene_core::{EntityId, EntityState};
use coscene_store::Snapshot;

use crate::config::ReconcilerConfig;

/// Operations one reconciliation pass will issue, in issue order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub creates: Vec<EntityState>,
    pub updates: Vec<EntityState>,
    pub destroys: Vec<EntityId>,
}

impl ReconcilePlan {
    /// Diff `snapshot` against what is already rendered.
    ///
    /// Unrendered ids in `held` (a create in flight, or a failed create
    /// waiting out its retry delay) are skipped for this pass.
    pub fn diff(
        rendered: &HashMap<EntityId, EntityState>,
        held: &HashSet<EntityId>,
        snapshot: &Snapshot,
        config: &ReconcilerConfig,
    ) -> Self {
        let mut plan = Self::default();

        for (id, state) in &snapshot.entities {
            match rendered.get(id) {
                None if held.contains(id) => {}
                None => plan.creates.push(state.clone()),
                Some(shown) if needs_update(shown, state, config) => {
                    plan.updates.push(state.clone())
                }
                Some(_) => {}
            }
        }

        let mut destroys: Vec<EntityId> = rendered
            .keys()
            .filter(|id| !snapshot.entities.contains_key(*id))
            .copied()
            .collect();
        destroys.sort();
        plan.destroys = destroys;

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.destroys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.destroys.len()
    }

    /// Whether any operation in the plan concerns `id`
    pub fn touches(&self, id: &EntityId) -> bool {
        self.creates.iter().any(|s| s.id == *id)
            || self.updates.iter().any(|s| s.id == *id)
            || self.destroys.contains(id)
    }
}

/// Whether `next` differs from `shown` by more than floating drift
pub fn needs_update(shown: &EntityState, next: &EntityState, config: &ReconcilerConfig) -> bool {
    shown.kind != next.kind
        || shown.action != next.action
        || shown.hidden != next.hidden
        || shown.position.distance(&next.position) >= config.position_epsilon
        || (shown.scale - next.scale).abs() >= config.scale_epsilon
        || shown.rotation.max_component_delta(&next.rotation) >= config.rotation_epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use coscene_core::{Action, EntityKind, Quat, Transform, Vec3};

    fn entity() -> EntityState {
        EntityState::new(
            EntityId::generate(),
            EntityKind::Fox,
            Transform::at(Vec3::new(0.0, 0.0, -1.0)),
        )
    }

    fn snapshot(states: &[&EntityState]) -> Snapshot {
        Snapshot {
            revision: 1,
            entities: states.iter().map(|s| (s.id, (*s).clone())).collect(),
            effects: Default::default(),
        }
    }

    fn rendered(states: &[&EntityState]) -> HashMap<EntityId, EntityState> {
        states.iter().map(|s| (s.id, (*s).clone())).collect()
    }

    #[test]
    fn test_swap_one_entity_touches_nothing_else() {
        let (a, b, c) = (entity(), entity(), entity());
        let plan = ReconcilePlan::diff(
            &rendered(&[&a, &b]),
            &HashSet::new(),
            &snapshot(&[&a, &c]),
            &ReconcilerConfig::default(),
        );

        assert_eq!(plan.creates, vec![c.clone()]);
        assert!(plan.updates.is_empty());
        assert_eq!(plan.destroys, vec![b.id]);
        assert!(!plan.touches(&a.id));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_in_flight_create_is_not_repeated() {
        let a = entity();
        let in_flight: HashSet<EntityId> = [a.id].into_iter().collect();
        let plan = ReconcilePlan::diff(
            &HashMap::new(),
            &in_flight,
            &snapshot(&[&a]),
            &ReconcilerConfig::default(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_drift_below_epsilon_is_ignored() {
        let config = ReconcilerConfig::default();
        let shown = entity();

        let mut drifted = shown.clone();
        drifted.position.x += 0.001;
        drifted.scale += 0.005;
        assert!(!needs_update(&shown, &drifted, &config));

        let mut moved = shown.clone();
        moved.position.x += 0.02;
        assert!(needs_update(&shown, &moved, &config));

        let mut rotated = shown.clone();
        rotated.rotation = Quat::new(0.0, 0.7071, 0.0, 0.7071);
        assert!(needs_update(&shown, &rotated, &config));
    }

    #[test]
    fn test_discrete_fields_always_update() {
        let config = ReconcilerConfig::default();
        let shown = entity();

        let mut waving = shown.clone();
        waving.action = Action::Wave;
        assert!(needs_update(&shown, &waving, &config));

        let mut hidden = shown.clone();
        hidden.hidden = true;
        assert!(needs_update(&shown, &hidden, &config));
    }
}
