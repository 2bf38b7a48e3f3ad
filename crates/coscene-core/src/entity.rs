//! Entity state, partial updates, and mutation origin

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::identity::EntityId;
use crate::math::{Quat, Vec3};

/// Closed set of spawnable character kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Fox,
    Robot,
    Dragon,
    Ghost,
    Penguin,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Fox,
        EntityKind::Robot,
        EntityKind::Dragon,
        EntityKind::Ghost,
        EntityKind::Penguin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Fox => "fox",
            EntityKind::Robot => "robot",
            EntityKind::Dragon => "dragon",
            EntityKind::Ghost => "ghost",
            EntityKind::Penguin => "penguin",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownEntityKind(s.to_string()))
    }
}

/// Animation an entity is currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Idle,
    Wave,
    Jump,
    Dance,
    Spin,
    Bow,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Idle,
        Action::Wave,
        Action::Jump,
        Action::Dance,
        Action::Spin,
        Action::Bow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Idle => "idle",
            Action::Wave => "wave",
            Action::Jump => "jump",
            Action::Dance => "dance",
            Action::Spin => "spin",
            Action::Bow => "bow",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Action::Idle)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownAction(s.to_string()))
    }
}

/// Where a mutation came from.
///
/// Never serialized. Only `Local` mutations are broadcast; anything applied
/// with `Remote` stops at this peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn is_local(&self) -> bool {
        matches!(self, Origin::Local)
    }
}

/// Target of an action trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    Entity(EntityId),
    All,
}

/// Placement of a newly spawned entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
    pub rotation: Quat,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
            rotation: Quat::IDENTITY,
        }
    }
}

/// The fixed view the renderer and diffing code need from scene state
pub trait Animatable {
    fn position(&self) -> Vec3;
    fn scale(&self) -> f32;
    fn action(&self) -> Action;
}

/// Full state of one shared entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
    pub scale: f32,
    pub rotation: Quat,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub hidden: bool,
}

impl EntityState {
    pub fn new(id: EntityId, kind: EntityKind, transform: Transform) -> Self {
        Self {
            id,
            kind,
            position: transform.position,
            scale: transform.scale,
            rotation: transform.rotation,
            action: Action::Idle,
            hidden: false,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            scale: self.scale,
            rotation: self.rotation,
        }
    }

    /// Merge a partial update field by field.
    ///
    /// Returns `true` if any field actually changed.
    pub fn apply_patch(&mut self, patch: &EntityPatch) -> bool {
        let before = self.clone();
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(scale) = patch.scale {
            self.scale = scale;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(action) = patch.action {
            self.action = action;
        }
        if let Some(hidden) = patch.hidden {
            self.hidden = hidden;
        }
        *self != before
    }
}

impl Animatable for EntityState {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn scale(&self) -> f32 {
        self.scale
    }

    fn action(&self) -> Action {
        self.action
    }
}

/// A partial entity update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub kind: Option<EntityKind>,
    pub position: Option<Vec3>,
    pub scale: Option<f32>,
    pub rotation: Option<Quat>,
    pub action: Option<Action>,
    pub hidden: Option<bool>,
}

impl EntityPatch {
    /// A patch carrying every field of `state` (a full replace)
    pub fn full(state: &EntityState) -> Self {
        Self {
            kind: Some(state.kind),
            position: Some(state.position),
            scale: Some(state.scale),
            rotation: Some(state.rotation),
            action: Some(state.action),
            hidden: Some(state.hidden),
        }
    }

    pub fn position(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn scale(scale: f32) -> Self {
        Self {
            scale: Some(scale),
            ..Self::default()
        }
    }

    pub fn rotation(rotation: Quat) -> Self {
        Self {
            rotation: Some(rotation),
            ..Self::default()
        }
    }

    pub fn hidden(hidden: bool) -> Self {
        Self {
            hidden: Some(hidden),
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.position.is_none()
            && self.scale.is_none()
            && self.rotation.is_none()
            && self.action.is_none()
            && self.hidden.is_none()
    }

    /// Fold a newer patch into this one; fields set in `newer` win.
    pub fn merge(&mut self, newer: &EntityPatch) {
        if newer.kind.is_some() {
            self.kind = newer.kind;
        }
        if newer.position.is_some() {
            self.position = newer.position;
        }
        if newer.scale.is_some() {
            self.scale = newer.scale;
        }
        if newer.rotation.is_some() {
            self.rotation = newer.rotation;
        }
        if newer.action.is_some() {
            self.action = newer.action;
        }
        if newer.hidden.is_some() {
            self.hidden = newer.hidden;
        }
    }

    /// True when the patch only touches continuously-changing transform fields
    pub fn is_transform_only(&self) -> bool {
        !self.is_empty() && self.kind.is_none() && self.action.is_none() && self.hidden.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntityState {
        EntityState::new(
            EntityId::generate(),
            EntityKind::Fox,
            Transform::at(Vec3::new(0.0, 0.0, -1.0)),
        )
    }

    #[test]
    fn test_new_entity_is_idle_and_visible() {
        let state = sample();
        assert_eq!(state.action, Action::Idle);
        assert!(!state.hidden);
        assert_eq!(state.scale, 1.0);
    }

    #[test]
    fn test_patch_merges_field_by_field() {
        let mut state = sample();
        let changed = state.apply_patch(&EntityPatch::scale(2.0));
        assert!(changed);
        assert_eq!(state.scale, 2.0);
        assert_eq!(state.position, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(state.kind, EntityKind::Fox);
    }

    #[test]
    fn test_patch_reports_no_change() {
        let mut state = sample();
        let patch = EntityPatch::position(state.position);
        assert!(!state.apply_patch(&patch));
    }

    #[test]
    fn test_full_patch_replaces() {
        let mut a = sample();
        let mut b = sample();
        b.kind = EntityKind::Robot;
        b.position = Vec3::new(4.0, 5.0, 6.0);
        b.action = Action::Dance;
        b.hidden = true;
        b.id = a.id;
        a.apply_patch(&EntityPatch::full(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_newer_wins() {
        let mut older = EntityPatch::position(Vec3::new(1.0, 0.0, 0.0)).with_scale(1.5);
        let newer = EntityPatch::position(Vec3::new(2.0, 0.0, 0.0));
        older.merge(&newer);
        assert_eq!(older.position, Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(older.scale, Some(1.5));
    }

    #[test]
    fn test_transform_only() {
        assert!(EntityPatch::position(Vec3::ZERO).is_transform_only());
        assert!(EntityPatch::scale(1.0).is_transform_only());
        assert!(!EntityPatch::hidden(true).is_transform_only());
        assert!(!EntityPatch::default().is_transform_only());
    }

    #[test]
    fn test_named_values_parse_case_insensitively() {
        assert_eq!("Dragon".parse::<EntityKind>().unwrap(), EntityKind::Dragon);
        assert_eq!("WAVE".parse::<Action>().unwrap(), Action::Wave);
        assert!("moonwalk".parse::<Action>().is_err());
    }
}
