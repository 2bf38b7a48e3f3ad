//! Sync messages and their JSON wire format
//!
//! A [`SyncMessage`] is what peers exchange. On the wire it travels inside an
//! [`Envelope`] that adds the sender id and a timestamp, flattened into the
//! [`WireMessage`] shape:
//!
//! ```text
//! { "kind": "EntityUpdated", "entityId": "…", "position": [1.0, 0.0, 0.0],
//!   "senderId": "…", "timestamp": "2026-01-01T12:00:00Z" }
//! ```
//!
//! Every message is idempotent under replay: applying it twice leaves the
//! receiver in the same state as applying it once.

use chrono::{DateTime, Utc};
use coscene_core::{
    Action, ActionTarget, EffectId, EffectInstance, EffectType, EntityId, EntityKind,
    EntityPatch, EntityState, PeerId, Quat, Vec3,
};
use coscene_store::LocalChange;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Discriminant of a [`SyncMessage`]; also the `kind` field on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    EntitySpawned,
    EntityUpdated,
    EntityRemoved,
    ActionTriggered,
    EffectSpawned,
    RequestSnapshot,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::EntitySpawned => "EntitySpawned",
            MessageKind::EntityUpdated => "EntityUpdated",
            MessageKind::EntityRemoved => "EntityRemoved",
            MessageKind::ActionTriggered => "ActionTriggered",
            MessageKind::EffectSpawned => "EffectSpawned",
            MessageKind::RequestSnapshot => "RequestSnapshot",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which outbound messages are rate limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub entity: EntityId,
    pub kind: MessageKind,
}

/// A replicated scene mutation
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    EntitySpawned(EntityState),
    EntityUpdated { id: EntityId, patch: EntityPatch },
    EntityRemoved(EntityId),
    ActionTriggered { target: ActionTarget, action: Action },
    EffectSpawned(EffectInstance),
    RequestSnapshot,
}

impl SyncMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SyncMessage::EntitySpawned(_) => MessageKind::EntitySpawned,
            SyncMessage::EntityUpdated { .. } => MessageKind::EntityUpdated,
            SyncMessage::EntityRemoved(_) => MessageKind::EntityRemoved,
            SyncMessage::ActionTriggered { .. } => MessageKind::ActionTriggered,
            SyncMessage::EffectSpawned(_) => MessageKind::EffectSpawned,
            SyncMessage::RequestSnapshot => MessageKind::RequestSnapshot,
        }
    }

    /// The single entity this message is about, if any
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            SyncMessage::EntitySpawned(state) => Some(state.id),
            SyncMessage::EntityUpdated { id, .. } | SyncMessage::EntityRemoved(id) => Some(*id),
            SyncMessage::ActionTriggered {
                target: ActionTarget::Entity(id),
                ..
            } => Some(*id),
            _ => None,
        }
    }

    /// Throttle key for high-frequency messages; `None` bypasses throttling.
    ///
    /// Only transform updates (position, scale, rotation) are throttled.
    pub fn throttle_key(&self) -> Option<ThrottleKey> {
        match self {
            SyncMessage::EntityUpdated { id, patch } if patch.is_transform_only() => {
                Some(ThrottleKey {
                    entity: *id,
                    kind: MessageKind::EntityUpdated,
                })
            }
            _ => None,
        }
    }
}

impl From<LocalChange> for SyncMessage {
    fn from(change: LocalChange) -> Self {
        match change {
            LocalChange::EntitySpawned(state) => SyncMessage::EntitySpawned(state),
            LocalChange::EntityUpdated { id, patch } => SyncMessage::EntityUpdated { id, patch },
            LocalChange::EntityRemoved(id) => SyncMessage::EntityRemoved(id),
            LocalChange::ActionTriggered { target, action } => {
                SyncMessage::ActionTriggered { target, action }
            }
            LocalChange::EffectSpawned(effect) => SyncMessage::EffectSpawned(effect),
        }
    }
}

/// Flat JSON shape of a message on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_kind: Option<EntityKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Quat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_id: Option<EffectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_type: Option<EffectType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
    pub sender_id: PeerId,
    pub timestamp: DateTime<Utc>,
}

impl WireMessage {
    fn empty(kind: MessageKind, sender_id: PeerId, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            entity_id: None,
            entity_kind: None,
            position: None,
            scale: None,
            rotation: None,
            action: None,
            hidden: None,
            effect_id: None,
            effect_type: None,
            duration: None,
            sender_id,
            timestamp,
        }
    }

    fn require<T>(&self, value: Option<T>, field: &'static str) -> SyncResult<T> {
        value.ok_or(SyncError::MissingField {
            kind: self.kind.as_str(),
            field,
        })
    }
}

/// A message together with who sent it and when
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender: PeerId,
    pub timestamp: DateTime<Utc>,
    pub message: SyncMessage,
}

impl Envelope {
    pub fn new(sender: PeerId, message: SyncMessage) -> Self {
        Self {
            sender,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        serde_json::to_vec(&self.to_wire()).map_err(|e| SyncError::Encode(e.to_string()))
    }

    /// Parse wire bytes
    pub fn decode(bytes: &[u8]) -> SyncResult<Self> {
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        Self::from_wire(wire)
    }

    pub fn to_wire(&self) -> WireMessage {
        let mut wire = WireMessage::empty(self.message.kind(), self.sender, self.timestamp);

        match &self.message {
            SyncMessage::EntitySpawned(state) => {
                wire.entity_id = Some(state.id);
                wire.entity_kind = Some(state.kind);
                wire.position = Some(state.position);
                wire.scale = Some(state.scale);
                wire.rotation = Some(state.rotation);
                wire.action = Some(state.action);
                wire.hidden = Some(state.hidden);
            }
            SyncMessage::EntityUpdated { id, patch } => {
                wire.entity_id = Some(*id);
                wire.entity_kind = patch.kind;
                wire.position = patch.position;
                wire.scale = patch.scale;
                wire.rotation = patch.rotation;
                wire.action = patch.action;
                wire.hidden = patch.hidden;
            }
            SyncMessage::EntityRemoved(id) => {
                wire.entity_id = Some(*id);
            }
            SyncMessage::ActionTriggered { target, action } => {
                if let ActionTarget::Entity(id) = target {
                    wire.entity_id = Some(*id);
                }
                wire.action = Some(*action);
            }
            SyncMessage::EffectSpawned(effect) => {
                wire.effect_id = Some(effect.id);
                wire.effect_type = Some(effect.effect_type);
                wire.position = Some(effect.position);
                wire.duration = Some(effect.duration);
                // The effect's creation time travels as the message timestamp
                wire.timestamp = effect.created_at;
            }
            SyncMessage::RequestSnapshot => {}
        }

        wire
    }

    pub fn from_wire(wire: WireMessage) -> SyncResult<Self> {
        let message = match wire.kind {
            MessageKind::EntitySpawned => {
                let id = wire.require(wire.entity_id, "entityId")?;
                let kind = wire.require(wire.entity_kind, "entityKind")?;
                let position = wire.require(wire.position, "position")?;
                SyncMessage::EntitySpawned(EntityState {
                    id,
                    kind,
                    position,
                    scale: wire.scale.unwrap_or(1.0),
                    rotation: wire.rotation.unwrap_or_default(),
                    action: wire.action.unwrap_or_default(),
                    hidden: wire.hidden.unwrap_or(false),
                })
            }
            MessageKind::EntityUpdated => SyncMessage::EntityUpdated {
                id: wire.require(wire.entity_id, "entityId")?,
                patch: EntityPatch {
                    kind: wire.entity_kind,
                    position: wire.position,
                    scale: wire.scale,
                    rotation: wire.rotation,
                    action: wire.action,
                    hidden: wire.hidden,
                },
            },
            MessageKind::EntityRemoved => {
                SyncMessage::EntityRemoved(wire.require(wire.entity_id, "entityId")?)
            }
            MessageKind::ActionTriggered => SyncMessage::ActionTriggered {
                target: wire
                    .entity_id
                    .map(ActionTarget::Entity)
                    .unwrap_or(ActionTarget::All),
                action: wire.require(wire.action, "action")?,
            },
            MessageKind::EffectSpawned => SyncMessage::EffectSpawned(EffectInstance {
                id: wire.require(wire.effect_id, "effectId")?,
                effect_type: wire.require(wire.effect_type, "effectType")?,
                position: wire.require(wire.position, "position")?,
                created_at: wire.timestamp,
                duration: wire.require(wire.duration, "duration")?,
            }),
            MessageKind::RequestSnapshot => SyncMessage::RequestSnapshot,
        };

        Ok(Self {
            sender: wire.sender_id,
            timestamp: wire.timestamp,
            message,
        })
    }
}
