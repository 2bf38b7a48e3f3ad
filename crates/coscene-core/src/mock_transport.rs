//! Mock transport implementation for testing
//!
//! Provides an in-memory broadcast session for testing the sync engine
//! without real network connections. Unlike point-to-point channels, every
//! send on a [`MockTransport`] fans out to all active members of its
//! [`MockBroadcastHub`], optionally including the sender itself (self-echo),
//! and can drop or duplicate deliveries to model an at-least-once channel.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use coscene_core::{MockBroadcastHub, Transport};
//!
//! let hub = MockBroadcastHub::new();
//! let alice = hub.join_new();
//! let bob = hub.join_new();
//!
//! alice.send(b"hello".to_vec()).await?;
//! assert_eq!(bob.recv().await?, b"hello");
//! // Loopback is on by default, so alice hears herself too
//! assert_eq!(alice.recv().await?, b"hello");
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{Mutex as TokioMutex, mpsc, watch};

use crate::error::TransportError;
use crate::identity::PeerId;
use crate::transport::{Roster, SessionState, Transport};

/// Delivery behaviour of a mock session
#[derive(Debug, Clone)]
pub struct MockHubConfig {
    /// Deliver a sender's broadcast back to the sender
    pub loopback: bool,
    /// Probability that a single delivery is lost
    pub drop_probability: f64,
    /// Probability that a single delivery arrives twice
    pub duplicate_probability: f64,
}

impl Default for MockHubConfig {
    fn default() -> Self {
        Self {
            loopback: true,
            drop_probability: 0.0,
            duplicate_probability: 0.0,
        }
    }
}

impl MockHubConfig {
    /// Loss-free, duplication-free, with self-echo
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Lossy channel with the given drop and duplicate probabilities
    pub fn lossy(drop_probability: f64, duplicate_probability: f64) -> Self {
        Self {
            loopback: true,
            drop_probability: drop_probability.clamp(0.0, 1.0),
            duplicate_probability: duplicate_probability.clamp(0.0, 1.0),
        }
    }
}

struct MemberLink {
    inbox: mpsc::UnboundedSender<Vec<u8>>,
    roster_tx: watch::Sender<Roster>,
    state_tx: watch::Sender<SessionState>,
}

struct HubInner {
    config: MockHubConfig,
    members: DashMap<PeerId, MemberLink>,
}

impl HubInner {
    fn deliver(&self, from: PeerId, data: &[u8]) -> usize {
        let mut rng = rand::rng();
        let mut delivered = 0;

        for entry in self.members.iter() {
            if *entry.key() == from && !self.config.loopback {
                continue;
            }
            let link = entry.value();
            if !link.state_tx.borrow().is_active() {
                continue;
            }
            if rng.random_bool(self.config.drop_probability) {
                continue;
            }
            if link.inbox.send(data.to_vec()).is_ok() {
                delivered += 1;
            }
            if rng.random_bool(self.config.duplicate_probability) {
                let _ = link.inbox.send(data.to_vec());
            }
        }

        delivered
    }

    fn refresh_rosters(&self) {
        let roster: Roster = self
            .members
            .iter()
            .filter(|entry| entry.value().state_tx.borrow().is_active())
            .map(|entry| entry.key().to_string())
            .collect();

        for entry in self.members.iter() {
            entry.value().roster_tx.send_replace(roster.clone());
        }
    }

    fn set_state(&self, peer: &PeerId, state: SessionState) -> bool {
        let updated = match self.members.get(peer) {
            Some(link) => {
                link.state_tx.send_replace(state);
                true
            }
            None => false,
        };
        if updated {
            self.refresh_rosters();
        }
        updated
    }
}

/// An in-memory broadcast session shared by any number of [`MockTransport`]s
#[derive(Clone)]
pub struct MockBroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for MockBroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroadcastHub {
    /// Create a reliable hub with self-echo enabled
    pub fn new() -> Self {
        Self::with_config(MockHubConfig::default())
    }

    pub fn with_config(config: MockHubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                members: DashMap::new(),
            }),
        }
    }

    /// Join the session as `peer`; the returned transport starts `Active`
    pub fn join(&self, peer: PeerId) -> MockTransport {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (roster_tx, roster_rx) = watch::channel(Roster::new());
        let (state_tx, state_rx) = watch::channel(SessionState::Active);

        self.inner.members.insert(
            peer,
            MemberLink {
                inbox: inbox_tx,
                roster_tx,
                state_tx,
            },
        );
        self.inner.refresh_rosters();

        MockTransport {
            local: peer,
            hub: Arc::clone(&self.inner),
            inbox_rx: TokioMutex::new(inbox_rx),
            roster_rx,
            state_rx,
            fail_next: AtomicU32::new(0),
            sent: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Join with a freshly generated peer id
    pub fn join_new(&self) -> MockTransport {
        self.join(PeerId::generate())
    }

    /// Leave the session; the peer's receive side closes
    pub fn leave(&self, peer: &PeerId) {
        if let Some((_, link)) = self.inner.members.remove(peer) {
            link.state_tx.send_replace(SessionState::Invalidated);
        }
        self.inner.refresh_rosters();
    }

    /// Tear down a peer's session without removing it from the hub
    pub fn invalidate(&self, peer: &PeerId) -> bool {
        self.inner.set_state(peer, SessionState::Invalidated)
    }

    /// Rejoin a previously invalidated peer
    pub fn reactivate(&self, peer: &PeerId) -> bool {
        self.inner.set_state(peer, SessionState::Active)
    }

    /// Number of peers attached to the hub (active or not)
    pub fn member_count(&self) -> usize {
        self.inner.members.len()
    }
}

/// One peer's handle on a [`MockBroadcastHub`]
pub struct MockTransport {
    local: PeerId,
    hub: Arc<HubInner>,
    inbox_rx: TokioMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    roster_rx: watch::Receiver<Roster>,
    state_rx: watch::Receiver<SessionState>,
    fail_next: AtomicU32,
    sent: parking_lot::Mutex<Vec<Vec<u8>>>,
}

impl MockTransport {
    /// Make the next `count` sends fail with `SendFailed`
    pub fn fail_next_sends(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Every payload this transport successfully broadcast, in order
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    async fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if !self.state_rx.borrow().is_active() {
            return Err(TransportError::SessionInactive);
        }
        if self.take_failure() {
            return Err(TransportError::SendFailed("injected failure".into()));
        }

        self.hub.deliver(self.local, &data);
        self.sent.lock().push(data);
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inbox = self.inbox_rx.lock().await;
        inbox.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn roster(&self) -> watch::Receiver<Roster> {
        self.roster_rx.clone()
    }

    fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_members_and_self() {
        let hub = MockBroadcastHub::new();
        let a = hub.join_new();
        let b = hub.join_new();
        let c = hub.join_new();

        a.send(b"hi".to_vec()).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), b"hi");
        assert_eq!(b.recv().await.unwrap(), b"hi");
        assert_eq!(c.recv().await.unwrap(), b"hi");
        assert_eq!(a.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_no_loopback() {
        let hub = MockBroadcastHub::with_config(MockHubConfig {
            loopback: false,
            ..MockHubConfig::default()
        });
        let a = hub.join_new();
        let b = hub.join_new();

        a.send(b"x".to_vec()).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), b"x");

        let mut inbox = a.inbox_rx.lock().await;
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let hub = MockBroadcastHub::new();
        let a = hub.join_new();
        a.fail_next_sends(2);

        assert!(a.send(vec![1]).await.is_err());
        assert!(a.send(vec![2]).await.is_err());
        assert!(a.send(vec![3]).await.is_ok());
        assert_eq!(a.sent_messages(), vec![vec![3]]);
    }

    #[tokio::test]
    async fn test_invalidated_peer_cannot_send_or_receive() {
        let hub = MockBroadcastHub::new();
        let a = hub.join_new();
        let b = hub.join_new();

        assert!(hub.invalidate(&b.local_peer()));
        assert_eq!(*b.session_state().borrow(), SessionState::Invalidated);
        assert!(matches!(
            b.send(vec![1]).await,
            Err(TransportError::SessionInactive)
        ));

        a.send(vec![7]).await.unwrap();
        let mut inbox = b.inbox_rx.lock().await;
        assert!(inbox.try_recv().is_err());
        drop(inbox);

        assert!(hub.reactivate(&b.local_peer()));
        a.send(vec![8]).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), vec![8]);
    }

    #[tokio::test]
    async fn test_roster_tracks_membership() {
        let hub = MockBroadcastHub::new();
        let a = hub.join_new();
        let b = hub.join_new();

        let roster = a.roster().borrow().clone();
        assert_eq!(roster.len(), 2);
        assert!(roster.contains(&b.local_peer().to_string()));

        hub.leave(&b.local_peer());
        assert_eq!(a.roster().borrow().len(), 1);
        assert!(matches!(b.recv().await, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_duplication() {
        let hub = MockBroadcastHub::with_config(MockHubConfig::lossy(0.0, 1.0));
        let a = hub.join_new();
        let b = hub.join_new();

        a.send(vec![5]).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), vec![5]);
        assert_eq!(b.recv().await.unwrap(), vec![5]);
    }
}
