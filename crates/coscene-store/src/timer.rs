//! Cancellable per-id timers owned by the state store

use std::collections::HashMap;
use std::time::Duration;

use coscene_core::{EffectId, EntityId};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// What a timer is for; at most one live timer exists per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    ActionRevert(EntityId),
    EffectExpiry(EffectId),
}

/// Delivered to the store's queue when a timer elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub generation: u64,
}

/// Registry of pending timers.
///
/// Each scheduled timer gets a generation number. A firing is honoured only
/// if its generation is still the current one for its key, so a timer that
/// was cancelled or rescheduled after its notification was already queued
/// does nothing.
pub struct TimerTable {
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    next_generation: u64,
    pending: HashMap<TimerKey, (u64, AbortHandle)>,
}

impl TimerTable {
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            fired_tx,
            next_generation: 0,
            pending: HashMap::new(),
        }
    }

    /// Schedule (or reschedule) the timer for `key`
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { key, generation });
        });

        self.pending.insert(key, (generation, task.abort_handle()));
    }

    /// Cancel the timer for `key`; returns whether one was pending
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.pending.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Consume a firing. Returns `false` for stale generations.
    pub fn take_if_current(&mut self, fired: &TimerFired) -> bool {
        match self.pending.get(&fired.key) {
            Some((generation, _)) if *generation == fired.generation => {
                self.pending.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, key: &TimerKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerTable {
    fn drop(&mut self) {
        self.clear();
    }
}
