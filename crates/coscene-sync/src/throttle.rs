//! Trailing-edge coalescing of high-frequency updates
//!
//! The first update for a key opens a window. Later updates inside the window
//! fold into the pending one, and the merged result is released when the
//! window closes, whether or not anything else arrives.

use std::collections::HashMap;
use std::time::Duration;

use coscene_core::EntityId;
use tokio::time::Instant;
use tracing::trace;

use crate::message::{SyncMessage, ThrottleKey};

#[derive(Debug)]
struct Pending {
    message: SyncMessage,
    due: Instant,
    coalesced: u32,
}

/// Per-key pending updates, each released once its window closes
#[derive(Debug)]
pub struct Throttler {
    window: Duration,
    pending: HashMap<ThrottleKey, Pending>,
}

impl Throttler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Hold `message` until the key's window closes, merging it into any
    /// update already waiting under the same key.
    ///
    /// Returns `true` if the message opened a new window.
    pub fn offer(&mut self, key: ThrottleKey, message: SyncMessage, now: Instant) -> bool {
        match self.pending.get_mut(&key) {
            Some(pending) => {
                coalesce(&mut pending.message, message);
                pending.coalesced += 1;
                false
            }
            None => {
                self.pending.insert(
                    key,
                    Pending {
                        message,
                        due: now + self.window,
                        coalesced: 0,
                    },
                );
                true
            }
        }
    }

    /// Release every update whose window has closed, oldest first
    pub fn take_due(&mut self, now: Instant) -> Vec<(ThrottleKey, SyncMessage)> {
        let mut keys: Vec<(Instant, ThrottleKey)> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.due <= now)
            .map(|(key, pending)| (pending.due, *key))
            .collect();
        keys.sort_by_key(|(due, _)| *due);

        keys.into_iter()
            .filter_map(|(_, key)| {
                let pending = self.pending.remove(&key)?;
                if pending.coalesced > 0 {
                    trace!(
                        entity = %key.entity.short_id(),
                        coalesced = pending.coalesced,
                        "Releasing coalesced update"
                    );
                }
                Some((key, pending.message))
            })
            .collect()
    }

    /// Release an entity's pending updates right away, ignoring their windows
    pub fn take_entity(&mut self, id: EntityId) -> Vec<SyncMessage> {
        let keys: Vec<ThrottleKey> = self
            .pending
            .keys()
            .filter(|key| key.entity == id)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .map(|pending| pending.message)
            .collect()
    }

    /// Forget an entity's pending updates
    pub fn discard_entity(&mut self, id: EntityId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, _| key.entity != id);
        before - self.pending.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

/// Fold `newer` into `older`; field-level for updates, replacement otherwise
pub(crate) fn coalesce(older: &mut SyncMessage, newer: SyncMessage) {
    match (older, newer) {
        (
            SyncMessage::EntityUpdated { id, patch },
            SyncMessage::EntityUpdated {
                id: newer_id,
                patch: newer_patch,
            },
        ) if *id == newer_id => patch.merge(&newer_patch),
        (older, newer) => *older = newer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use coscene_core::{EntityPatch, Vec3};

    fn key(entity: EntityId) -> ThrottleKey {
        ThrottleKey {
            entity,
            kind: MessageKind::EntityUpdated,
        }
    }

    fn moved(id: EntityId, x: f32) -> SyncMessage {
        SyncMessage::EntityUpdated {
            id,
            patch: EntityPatch::position(Vec3::new(x, 0.0, 0.0)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_latest_value() {
        let mut throttler = Throttler::new(Duration::from_millis(100));
        let id = EntityId::generate();
        let start = Instant::now();

        for i in 1..=10 {
            let now = start + Duration::from_millis(i * 5);
            throttler.offer(key(id), moved(id, i as f32), now);
        }

        assert!(throttler.take_due(start + Duration::from_millis(50)).is_empty());

        let released = throttler.take_due(start + Duration::from_millis(105));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].1, moved(id, 10.0));
        assert!(throttler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reopens_after_release() {
        let mut throttler = Throttler::new(Duration::from_millis(100));
        let id = EntityId::generate();
        let start = Instant::now();

        assert!(throttler.offer(key(id), moved(id, 1.0), start));
        throttler.take_due(start + Duration::from_millis(100));

        let later = start + Duration::from_millis(150);
        assert!(throttler.offer(key(id), moved(id, 2.0), later));
        assert_eq!(
            throttler.next_deadline(),
            Some(later + Duration::from_millis(100))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_keeps_disjoint_fields() {
        let mut throttler = Throttler::new(Duration::from_millis(100));
        let id = EntityId::generate();
        let now = Instant::now();

        throttler.offer(key(id), moved(id, 1.0), now);
        throttler.offer(
            key(id),
            SyncMessage::EntityUpdated {
                id,
                patch: EntityPatch::scale(3.0),
            },
            now,
        );

        let released = throttler.take_entity(id);
        assert_eq!(
            released,
            vec![SyncMessage::EntityUpdated {
                id,
                patch: EntityPatch::position(Vec3::new(1.0, 0.0, 0.0)).with_scale(3.0),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_entity() {
        let mut throttler = Throttler::new(Duration::from_millis(100));
        let a = EntityId::generate();
        let b = EntityId::generate();
        let now = Instant::now();

        throttler.offer(key(a), moved(a, 1.0), now);
        throttler.offer(key(b), moved(b, 1.0), now);

        assert_eq!(throttler.discard_entity(a), 1);
        assert_eq!(throttler.len(), 1);
        assert_eq!(throttler.clear(), 1);
    }
}
