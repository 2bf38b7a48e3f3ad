//! Bounded exponential backoff for failed sends

use std::collections::VecDeque;
use std::time::Duration;

use coscene_core::{ActionTarget, EntityId};
use coscene_store::config::millis;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::message::SyncMessage;

/// How failed sends are retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the initial attempt before a message is dropped
    pub max_retries: u32,
    /// Delay before the first retry
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (zero-based): doubles each time, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Whether a message that has already failed `attempts` times may be retried
    pub fn allows(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }
}

/// A message waiting for its next attempt
#[derive(Debug, Clone)]
pub(crate) struct RetryEntry {
    pub message: SyncMessage,
    /// Failed attempts so far
    pub failures: u32,
    pub due: Instant,
    /// Outbox sequence number; lower is older
    pub seq: u64,
}

/// Messages scheduled for another send attempt, in insertion order
#[derive(Debug, Default)]
pub(crate) struct RetryQueue {
    entries: VecDeque<RetryEntry>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, message: SyncMessage, failures: u32, due: Instant, seq: u64) {
        self.entries.push_back(RetryEntry {
            message,
            failures,
            due,
            seq,
        });
    }

    /// Remove and return every entry whose delay has elapsed
    pub fn take_due(&mut self, now: Instant) -> Vec<RetryEntry> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|entry| entry.due <= now);
        self.entries = waiting.into();
        due
    }

    /// Fold retries older than `seq` into `newer`, which is about to be sent.
    ///
    /// A stale retry must never reach receivers after `newer` and undo it:
    /// retries that `newer` fully covers are dropped, a pending spawn is
    /// carried along inside `newer`, and fields `newer` sets are stripped
    /// from the rest. Returns how many retries were absorbed.
    pub fn supersede(&mut self, newer: &mut SyncMessage, seq: u64) -> usize {
        let mut absorbed = 0;
        for entry in std::mem::take(&mut self.entries) {
            if entry.seq >= seq {
                self.entries.push_back(entry);
                continue;
            }
            let RetryEntry {
                message,
                failures,
                due,
                seq: stale_seq,
            } = entry;
            match fold_stale(message, newer) {
                Some(message) => self.entries.push_back(RetryEntry {
                    message,
                    failures,
                    due,
                    seq: stale_seq,
                }),
                None => absorbed += 1,
            }
        }
        absorbed
    }

    /// Drop every pending retry about an entity that no longer exists
    pub fn discard_entity(&mut self, id: EntityId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.message.entity_id() != Some(id));
        before - self.entries.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.due).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

/// Reconcile one stale retry with a newer message.
///
/// Returns what is left of the stale message, or `None` once `newer`
/// carries everything it still had to say.
fn fold_stale(stale: SyncMessage, newer: &mut SyncMessage) -> Option<SyncMessage> {
    use SyncMessage::{ActionTriggered, EntityRemoved, EntitySpawned, EntityUpdated};

    let Some(stale_id) = stale.entity_id() else {
        let both_broadcast = matches!(
            (&stale, &*newer),
            (
                ActionTriggered {
                    target: ActionTarget::All,
                    ..
                },
                ActionTriggered {
                    target: ActionTarget::All,
                    ..
                }
            )
        );
        return if both_broadcast { None } else { Some(stale) };
    };

    let covers = matches!(
        newer,
        ActionTriggered {
            target: ActionTarget::All,
            ..
        }
    ) || newer.entity_id() == Some(stale_id);
    if !covers {
        return Some(stale);
    }

    let mut promoted = None;
    let leftover = match (stale, &mut *newer) {
        (_, EntityRemoved(_)) | (_, EntitySpawned(_)) => None,
        (EntityUpdated { mut patch, .. }, EntityUpdated { patch: newer_patch, .. }) => {
            patch.merge(newer_patch);
            *newer_patch = patch;
            None
        }
        (EntitySpawned(mut state), EntityUpdated { patch, .. }) => {
            state.apply_patch(patch);
            promoted = Some(state);
            None
        }
        (EntitySpawned(mut state), ActionTriggered { target, action }) => {
            state.action = *action;
            if matches!(target, ActionTarget::All) {
                // The broadcast still has to go out on its own
                Some(EntitySpawned(state))
            } else {
                promoted = Some(state);
                None
            }
        }
        (ActionTriggered { .. }, ActionTriggered { .. }) => None,
        (EntityUpdated { id, mut patch }, ActionTriggered { .. }) => {
            patch.action = None;
            if patch.is_empty() {
                None
            } else {
                Some(EntityUpdated { id, patch })
            }
        }
        (ActionTriggered { target, action }, EntityUpdated { patch, .. }) => {
            if patch.action.is_some() {
                None
            } else {
                Some(ActionTriggered { target, action })
            }
        }
        (stale, _) => Some(stale),
    };

    // Receivers that never saw the spawn get the entity's current state
    if let Some(state) = promoted {
        *newer = EntitySpawned(state);
    }
    leftover
}
