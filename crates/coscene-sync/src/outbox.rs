//! Outbound queue combining throttling, ordering, and retry
//!
//! The outbox is a plain state machine driven by the coordinator's outbound
//! task: messages go in with [`Outbox::push`], sendable messages come out of
//! [`Outbox::poll_ready`], and failures come back through
//! [`Outbox::on_failure`]. It never touches the network or the clock itself.
//!
//! Every message gets a sequence number when it becomes sendable. Right
//! before a send the coordinator calls [`Outbox::supersede`], which folds
//! older retries about the same entity into the outgoing message so a late
//! retry can never overwrite newer state on other peers.

use std::collections::VecDeque;

use tokio::time::Instant;
use tracing::debug;

use crate::config::SyncConfig;
use crate::message::SyncMessage;
use crate::retry::{RetryPolicy, RetryQueue};
use crate::throttle::Throttler;

/// A message cleared for sending
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub message: SyncMessage,
    /// Failed attempts before this one
    pub failures: u32,
    seq: u64,
}

/// What became of a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Another attempt is scheduled at the given instant
    Retrying { attempt: u32, at: Instant },
    /// Attempts are exhausted and the message is gone
    Dropped,
}

/// Pending outbound work for one session
#[derive(Debug)]
pub struct Outbox {
    ready: VecDeque<Outgoing>,
    throttle: Throttler,
    retries: RetryQueue,
    policy: RetryPolicy,
    next_seq: u64,
}

impl Outbox {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            ready: VecDeque::new(),
            throttle: Throttler::new(config.throttle_window),
            retries: RetryQueue::new(),
            policy: config.retry.clone(),
            next_seq: 0,
        }
    }

    fn fresh(&mut self, message: SyncMessage) -> Outgoing {
        self.next_seq += 1;
        Outgoing {
            message,
            failures: 0,
            seq: self.next_seq,
        }
    }

    /// Queue a message for sending
    pub fn push(&mut self, message: SyncMessage, now: Instant) {
        if let Some(key) = message.throttle_key() {
            self.throttle.offer(key, message, now);
            return;
        }

        if let Some(id) = message.entity_id() {
            if matches!(message, SyncMessage::EntityRemoved(_)) {
                let discarded = self.throttle.discard_entity(id) + self.retries.discard_entity(id);
                if discarded > 0 {
                    debug!(
                        entity = %id.short_id(),
                        discarded,
                        "Dropped pending updates for removed entity"
                    );
                }
            } else {
                // Keep per-entity order: anything held back goes out first
                for held in self.throttle.take_entity(id) {
                    let held = self.fresh(held);
                    self.ready.push_back(held);
                }
            }
        }

        let outgoing = self.fresh(message);
        self.ready.push_back(outgoing);
    }

    /// Everything that may be sent at `now`, in send order
    pub fn poll_ready(&mut self, now: Instant) -> Vec<Outgoing> {
        let mut out: Vec<Outgoing> = self
            .retries
            .take_due(now)
            .into_iter()
            .map(|entry| Outgoing {
                message: entry.message,
                failures: entry.failures,
                seq: entry.seq,
            })
            .collect();

        for (_, message) in self.throttle.take_due(now) {
            let released = self.fresh(message);
            out.push(released);
        }

        out.extend(self.ready.drain(..));
        out
    }

    /// Fold pending retries older than `outgoing` into it.
    ///
    /// Call right before sending; returns how many retries were absorbed.
    pub fn supersede(&mut self, outgoing: &mut Outgoing) -> usize {
        self.retries.supersede(&mut outgoing.message, outgoing.seq)
    }

    /// Record a failed send and decide whether to try again
    pub fn on_failure(&mut self, outgoing: Outgoing, now: Instant) -> FailureOutcome {
        let failures = outgoing.failures + 1;
        if !self.policy.allows(failures) {
            return FailureOutcome::Dropped;
        }

        let at = now + self.policy.backoff(failures - 1);
        self.retries
            .schedule(outgoing.message, failures, at, outgoing.seq);
        FailureOutcome::Retrying {
            attempt: failures,
            at,
        }
    }

    /// Earliest instant at which [`poll_ready`](Self::poll_ready) has work
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.ready.is_empty() {
            return Some(Instant::now());
        }
        match (self.throttle.next_deadline(), self.retries.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Messages held anywhere in the outbox
    pub fn len(&self) -> usize {
        self.ready.len() + self.throttle.len() + self.retries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all queued, throttled, and retrying messages
    pub fn clear(&mut self) -> usize {
        let ready = self.ready.len();
        self.ready.clear();
        ready + self.throttle.clear() + self.retries.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coscene_core::{
        Action, ActionTarget, EntityId, EntityKind, EntityPatch, EntityState, Transform, Vec3,
    };
    use std::time::Duration;

    fn outbox() -> Outbox {
        Outbox::new(&SyncConfig::default())
    }

    fn moved(id: EntityId, x: f32) -> SyncMessage {
        SyncMessage::EntityUpdated {
            id,
            patch: EntityPatch::position(Vec3::new(x, 0.0, 0.0)),
        }
    }

    fn messages(out: Vec<Outgoing>) -> Vec<SyncMessage> {
        out.into_iter().map(|o| o.message).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unthrottled_messages_are_ready_immediately() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();

        outbox.push(SyncMessage::EntityRemoved(id), now);
        outbox.push(SyncMessage::RequestSnapshot, now);

        assert_eq!(
            messages(outbox.poll_ready(now)),
            vec![SyncMessage::EntityRemoved(id), SyncMessage::RequestSnapshot]
        );
        assert!(outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_update_flushes_before_action() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();
        let action = SyncMessage::ActionTriggered {
            target: ActionTarget::Entity(id),
            action: Action::Jump,
        };

        outbox.push(moved(id, 4.0), now);
        outbox.push(action.clone(), now);

        assert_eq!(messages(outbox.poll_ready(now)), vec![moved(id, 4.0), action]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_discards_pending_update() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();

        outbox.push(moved(id, 1.0), now);
        outbox.push(SyncMessage::EntityRemoved(id), now);

        assert_eq!(
            messages(outbox.poll_ready(now + Duration::from_secs(1))),
            vec![SyncMessage::EntityRemoved(id)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_schedules_backoff_then_drops() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();

        outbox.push(SyncMessage::EntityRemoved(id), now);
        let mut sending = outbox.poll_ready(now).remove(0);

        let mut delays = Vec::new();
        let mut clock = now;
        loop {
            match outbox.on_failure(sending, clock) {
                FailureOutcome::Retrying { at, .. } => {
                    delays.push(at - clock);
                    clock = at;
                    sending = outbox.poll_ready(clock).remove(0);
                }
                FailureOutcome::Dropped => break,
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
        assert!(outbox.is_empty());
    }

    /// Send everything due at `now` the way the coordinator does, failing
    /// the sends whose index is in `fail`
    fn send_due(outbox: &mut Outbox, now: Instant, fail: &[usize]) -> Vec<SyncMessage> {
        let mut sent = Vec::new();
        for (i, mut outgoing) in outbox.poll_ready(now).into_iter().enumerate() {
            outbox.supersede(&mut outgoing);
            if fail.contains(&i) {
                outbox.on_failure(outgoing, now);
            } else {
                sent.push(outgoing.message);
            }
        }
        sent
    }

    fn spawned(id: EntityId) -> SyncMessage {
        SyncMessage::EntitySpawned(EntityState::new(id, EntityKind::Fox, Transform::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_update_supersedes_stale_retry() {
        let mut outbox = outbox();
        let start = Instant::now();
        let id = EntityId::generate();

        outbox.push(
            SyncMessage::EntityUpdated {
                id,
                patch: EntityPatch::scale(2.0),
            },
            start,
        );
        send_due(&mut outbox, start + Duration::from_millis(100), &[0]);

        outbox.push(moved(id, 7.0), start + Duration::from_millis(150));
        let sent = send_due(&mut outbox, start + Duration::from_millis(250), &[]);

        assert_eq!(
            sent,
            vec![SyncMessage::EntityUpdated {
                id,
                patch: EntityPatch::scale(2.0).with_position(Vec3::new(7.0, 0.0, 0.0)),
            }]
        );
        assert!(outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_discards_failed_spawn() {
        let mut outbox = outbox();
        let start = Instant::now();
        let id = EntityId::generate();

        outbox.push(spawned(id), start);
        send_due(&mut outbox, start, &[0]);

        outbox.push(SyncMessage::EntityRemoved(id), start + Duration::from_millis(50));
        let sent = send_due(&mut outbox, start + Duration::from_millis(50), &[]);
        assert_eq!(sent, vec![SyncMessage::EntityRemoved(id)]);

        assert!(outbox.is_empty());
        assert!(send_due(&mut outbox, start + Duration::from_secs(5), &[]).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flag_change_never_overwrites_newer_one() {
        let mut outbox = outbox();
        let start = Instant::now();
        let id = EntityId::generate();
        let hidden = |value| SyncMessage::EntityUpdated {
            id,
            patch: EntityPatch::hidden(value),
        };

        outbox.push(hidden(true), start);
        send_due(&mut outbox, start, &[0]);

        outbox.push(hidden(false), start + Duration::from_millis(10));
        let sent = send_due(&mut outbox, start + Duration::from_millis(10), &[]);
        assert_eq!(sent, vec![hidden(false)]);

        assert!(outbox.is_empty());
        assert!(send_due(&mut outbox, start + Duration::from_secs(5), &[]).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_earlier_in_batch_is_absorbed_by_later_message() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();
        let hidden = |value| SyncMessage::EntityUpdated {
            id,
            patch: EntityPatch::hidden(value),
        };

        outbox.push(hidden(true), now);
        outbox.push(hidden(false), now);
        let sent = send_due(&mut outbox, now, &[0]);

        assert_eq!(sent, vec![hidden(false)]);
        assert!(outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_carries_failed_spawn() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();

        outbox.push(spawned(id), now);
        send_due(&mut outbox, now, &[0]);

        outbox.push(
            SyncMessage::EntityUpdated {
                id,
                patch: EntityPatch::hidden(true),
            },
            now,
        );
        let sent = send_due(&mut outbox, now, &[]);

        let [SyncMessage::EntitySpawned(state)] = sent.as_slice() else {
            panic!("expected a single spawn, got {sent:?}");
        };
        assert!(state.hidden);
        assert!(outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_everything() {
        let mut outbox = outbox();
        let now = Instant::now();
        let id = EntityId::generate();

        outbox.push(moved(id, 1.0), now);
        outbox.push(SyncMessage::RequestSnapshot, now);
        let failed = outbox.poll_ready(now).remove(0);
        outbox.on_failure(failed, now);

        assert_eq!(outbox.clear(), 2);
        assert!(outbox.next_deadline().is_none());
    }
}
