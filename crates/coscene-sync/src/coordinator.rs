//! Bridges a [`StoreHandle`] and a [`Transport`]
//!
//! Two tasks run per coordinator:
//!
//! - **Outbound**: drains local-origin store changes into the [`Outbox`],
//!   sends whatever is due, schedules retries, and tracks the session's
//!   lifecycle (snapshot request on join, full discard on invalidation).
//! - **Inbound**: decodes received payloads, drops self-echo, and applies
//!   everything else to the store as `Origin::Remote`. Remote changes never
//!   reach the outbound task, so each message travels exactly one hop.
//!
//! Snapshot requests are answered by the outbound task: the inbound side
//! forwards them over a control channel so all sending stays on one task.

use std::sync::Arc;

use coscene_core::{Origin, PeerId, Roster, SessionState, Transport, incoming};
use coscene_store::{LocalChange, StoreError, StoreHandle};
use futures::StreamExt;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::message::{Envelope, SyncMessage};
use crate::outbox::{FailureOutcome, Outbox, Outgoing};
use crate::stats::{StatsSnapshot, SyncStats};

/// Requests from the inbound task to the outbound task
#[derive(Debug)]
enum Control {
    ServeSnapshot { requester: PeerId },
}

/// Keeps one store in sync with every other peer in the session
pub struct SyncCoordinator {
    local: PeerId,
    stats: Arc<SyncStats>,
    roster: watch::Receiver<Roster>,
    session: watch::Receiver<SessionState>,
    shutdown_tx: broadcast::Sender<()>,
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl SyncCoordinator {
    /// Subscribe to the store's local changes and start both tasks
    pub async fn start<T: Transport>(
        transport: Arc<T>,
        store: StoreHandle,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let transport: Arc<dyn Transport> = transport;
        let local = transport.local_peer();
        let changes = store.subscribe_local().await?;
        let stats = Arc::new(SyncStats::new());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let roster = transport.roster();
        let session = transport.session_state();

        let outbound = OutboundTask {
            local,
            transport: Arc::clone(&transport),
            store: store.clone(),
            outbox: Outbox::new(&config),
            config,
            stats: Arc::clone(&stats),
            changes,
            control: control_rx,
            session: session.clone(),
            state: *session.borrow(),
            roster: roster.clone(),
            members: roster.borrow().clone(),
            roster_open: true,
            snapshot_due: None,
            shutdown_rx: shutdown_tx.subscribe(),
        };
        let outbound = tokio::spawn(outbound.run());

        let inbound = tokio::spawn(run_inbound(
            local,
            transport,
            store,
            Arc::clone(&stats),
            control_tx,
            shutdown_tx.subscribe(),
        ));

        info!(peer = %local.short_id(), "Sync coordinator started");

        Ok(Self {
            local,
            stats,
            roster,
            session,
            shutdown_tx,
            outbound,
            inbound,
        })
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current session members as reported by the transport
    pub fn roster(&self) -> Roster {
        self.roster.borrow().clone()
    }

    pub fn session_state(&self) -> SessionState {
        *self.session.borrow()
    }

    /// Stop both tasks and wait for them to finish
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = (&mut self.outbound).await {
            warn!(error = %e, "Outbound task ended abnormally");
        }
        if let Err(e) = (&mut self.inbound).await {
            warn!(error = %e, "Inbound task ended abnormally");
        }
        info!(peer = %self.local.short_id(), "Sync coordinator stopped");
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.outbound.abort();
        self.inbound.abort();
    }
}

/// Apply a received message to the store as a remote change.
///
/// Returns whether the store changed. `RequestSnapshot` is not a store
/// mutation and always returns `false`.
pub async fn apply_remote(store: &StoreHandle, message: SyncMessage) -> SyncResult<bool> {
    let origin = Origin::Remote;
    let changed = match message {
        SyncMessage::EntitySpawned(state) => {
            store.insert_entity(state, origin).await?;
            true
        }
        SyncMessage::EntityUpdated { id, patch } => store.update_entity(id, patch, origin).await?,
        SyncMessage::EntityRemoved(id) => store.remove_entity(id, origin).await?,
        SyncMessage::ActionTriggered { target, action } => {
            store.trigger_action(target, action, origin).await? > 0
        }
        SyncMessage::EffectSpawned(effect) => store.insert_effect(effect, origin).await?,
        SyncMessage::RequestSnapshot => false,
    };
    Ok(changed)
}

struct OutboundTask {
    local: PeerId,
    transport: Arc<dyn Transport>,
    store: StoreHandle,
    config: SyncConfig,
    outbox: Outbox,
    stats: Arc<SyncStats>,
    changes: mpsc::UnboundedReceiver<LocalChange>,
    control: mpsc::UnboundedReceiver<Control>,
    session: watch::Receiver<SessionState>,
    state: SessionState,
    roster: watch::Receiver<Roster>,
    members: Roster,
    roster_open: bool,
    snapshot_due: Option<Instant>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl OutboundTask {
    async fn run(mut self) {
        debug!(peer = %self.local.short_id(), state = ?self.state, "Outbound task started");
        if self.state.is_active() {
            self.schedule_snapshot_request();
        }

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    debug!("Outbound task shutting down");
                    break;
                }
                change = self.changes.recv() => match change {
                    Some(change) => self.enqueue(change.into()),
                    None => {
                        debug!("Store closed, stopping outbound task");
                        break;
                    }
                },
                Some(control) = self.control.recv() => match control {
                    Control::ServeSnapshot { requester } => self.serve_snapshot(requester),
                },
                changed = self.session.changed() => {
                    if changed.is_err() {
                        debug!("Session closed, stopping outbound task");
                        break;
                    }
                    let state = *self.session.borrow_and_update();
                    self.on_session_state(state);
                }
                changed = self.roster.changed(), if self.roster_open => {
                    match changed {
                        Ok(()) => {
                            let roster = self.roster.borrow_and_update().clone();
                            self.on_roster(roster);
                        }
                        Err(_) => self.roster_open = false,
                    }
                }
                _ = sleep_until_opt(deadline) => {}
            }

            if self.snapshot_due.is_some_and(|due| due <= Instant::now()) {
                self.snapshot_due = None;
                debug!(peer = %self.local.short_id(), "Requesting snapshot");
                self.enqueue(SyncMessage::RequestSnapshot);
            }

            self.flush().await;
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        if !self.state.is_active() {
            return None;
        }
        match (self.outbox.next_deadline(), self.snapshot_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn enqueue(&mut self, message: SyncMessage) {
        if self.state == SessionState::Invalidated {
            trace!(kind = %message.kind(), "Session invalidated, discarding outbound message");
            return;
        }
        self.outbox.push(message, Instant::now());
    }

    fn schedule_snapshot_request(&mut self) {
        let (min, max) = (
            self.config.snapshot_delay_min,
            self.config.snapshot_delay_max,
        );
        let delay = if min < max {
            rand::rng().random_range(min..=max)
        } else {
            min
        };
        self.snapshot_due = Some(Instant::now() + delay);
        debug!(delay_ms = delay.as_millis() as u64, "Scheduled snapshot request");
    }

    fn on_session_state(&mut self, state: SessionState) {
        let previous = std::mem::replace(&mut self.state, state);
        if previous == state {
            return;
        }
        info!(peer = %self.local.short_id(), from = ?previous, to = ?state, "Session state changed");

        match state {
            SessionState::Active => self.schedule_snapshot_request(),
            SessionState::Joining => {}
            SessionState::Invalidated => {
                self.snapshot_due = None;
                let discarded = self.outbox.clear();
                if discarded > 0 {
                    warn!(discarded, "Session invalidated, discarded pending outbound messages");
                }
            }
        }
    }

    fn on_roster(&mut self, roster: Roster) {
        for member in roster.members().filter(|m| !self.members.contains(m)) {
            info!(member, "Peer joined session");
        }
        for member in self.members.members().filter(|m| !roster.contains(m)) {
            info!(member, "Peer left session");
        }
        self.members = roster;
    }

    fn serve_snapshot(&mut self, requester: PeerId) {
        let snapshot = self.store.snapshot();
        debug!(
            requester = %requester.short_id(),
            entities = snapshot.entities.len(),
            "Answering snapshot request"
        );
        for state in snapshot.entities.values() {
            self.enqueue(SyncMessage::EntitySpawned(state.clone()));
        }
        self.stats.record_snapshot_served();
    }

    async fn flush(&mut self) {
        if !self.state.is_active() {
            return;
        }
        for outgoing in self.outbox.poll_ready(Instant::now()) {
            self.send(outgoing).await;
        }
    }

    async fn send(&mut self, mut outgoing: Outgoing) {
        let absorbed = self.outbox.supersede(&mut outgoing);
        if absorbed > 0 {
            trace!(absorbed, "Folded stale retries into outgoing message");
        }

        let kind = outgoing.message.kind();
        let bytes = match Envelope::new(self.local, outgoing.message.clone()).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(kind = %kind, error = %e, "Failed to encode outbound message");
                self.stats.record_dropped();
                return;
            }
        };

        match self.transport.send(bytes).await {
            Ok(()) => {
                self.stats.record_sent();
                trace!(kind = %kind, attempt = outgoing.failures, "Sent message");
            }
            Err(e) => {
                self.stats.record_send_failure();
                let now = Instant::now();
                match self.outbox.on_failure(outgoing, now) {
                    FailureOutcome::Retrying { attempt, at } => {
                        warn!(
                            kind = %kind,
                            attempt,
                            delay_ms = (at - now).as_millis() as u64,
                            error = %e,
                            "Send failed, will retry"
                        );
                    }
                    FailureOutcome::Dropped => {
                        self.stats.record_dropped();
                        error!(kind = %kind, error = %e, "Send failed, retries exhausted, dropping message");
                    }
                }
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn run_inbound(
    local: PeerId,
    transport: Arc<dyn Transport>,
    store: StoreHandle,
    stats: Arc<SyncStats>,
    control: mpsc::UnboundedSender<Control>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut payloads = incoming(transport);

    loop {
        let bytes = tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Inbound task shutting down");
                break;
            }
            next = payloads.next() => match next {
                Some(bytes) => bytes,
                None => {
                    debug!("Transport closed, stopping inbound task");
                    break;
                }
            },
        };

        let envelope = match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                stats.record_decode_failure();
                warn!(error = %e, len = bytes.len(), "Discarding undecodable message");
                continue;
            }
        };

        if envelope.sender == local {
            stats.record_self_echo();
            trace!(kind = %envelope.message.kind(), "Dropped self-echo");
            continue;
        }

        if let SyncMessage::RequestSnapshot = envelope.message {
            if control
                .send(Control::ServeSnapshot {
                    requester: envelope.sender,
                })
                .is_err()
            {
                break;
            }
            continue;
        }

        let kind = envelope.message.kind();
        match apply_remote(&store, envelope.message).await {
            Ok(changed) => {
                stats.record_applied();
                trace!(kind = %kind, sender = %envelope.sender.short_id(), changed, "Applied remote message");
            }
            Err(SyncError::Store(StoreError::Closed)) => {
                debug!("Store closed, stopping inbound task");
                break;
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Failed to apply remote message");
            }
        }
    }
}
