//! [`Transport`] implementation over one gossip topic

use std::sync::Arc;

use async_trait::async_trait;
use coscene_core::{PeerId, Roster, SessionState, Transport, TransportError};
use iroh_gossip::api::{Event, GossipReceiver, GossipSender};
use n0_future::StreamExt;
use tokio::sync::{Mutex as TokioMutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::GossipError;
use crate::topic::{MeshEvent, MeshState, SessionTopic};

/// Inbound payloads buffered between the gossip receiver and `recv`
const INBOX_CAPACITY: usize = 1024;

/// A scene session carried by iroh-gossip
pub struct GossipTransport {
    local: PeerId,
    topic: SessionTopic,
    sender: TokioMutex<GossipSender>,
    inbox: TokioMutex<mpsc::Receiver<Vec<u8>>>,
    roster_rx: watch::Receiver<Roster>,
    state_rx: watch::Receiver<SessionState>,
    state_tx: Arc<watch::Sender<SessionState>>,
    pump: JoinHandle<()>,
}

impl GossipTransport {
    pub(crate) fn new(
        local: PeerId,
        local_endpoint: String,
        topic: SessionTopic,
        sender: GossipSender,
        receiver: GossipReceiver,
        has_bootstrap: bool,
    ) -> Self {
        let mesh = MeshState::new(local_endpoint, has_bootstrap);
        let (roster_tx, roster_rx) = watch::channel(mesh.roster());
        let (state_tx, state_rx) = watch::channel(mesh.state());
        let state_tx = Arc::new(state_tx);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

        let pump = tokio::spawn(pump_events(
            topic.name().to_string(),
            receiver,
            mesh,
            inbox_tx,
            roster_tx,
            Arc::clone(&state_tx),
        ));

        Self {
            local,
            topic,
            sender: TokioMutex::new(sender),
            inbox: TokioMutex::new(inbox_rx),
            roster_rx,
            state_rx,
            state_tx,
            pump,
        }
    }

    pub fn topic(&self) -> &SessionTopic {
        &self.topic
    }

    /// Stop receiving and mark the session invalidated
    pub fn leave(&self) {
        self.pump.abort();
        self.state_tx.send_replace(SessionState::Invalidated);
        info!(session = self.topic.name(), "Left session");
    }
}

impl Drop for GossipTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl Transport for GossipTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    async fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if !self.state_rx.borrow().is_active() {
            return Err(TransportError::SessionInactive);
        }
        self.sender
            .lock()
            .await
            .broadcast(data.into())
            .await
            .map_err(|e| GossipError::BroadcastFailed(e.to_string()).into())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn roster(&self) -> watch::Receiver<Roster> {
        self.roster_rx.clone()
    }

    fn session_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

/// Forward gossip events into the inbox and membership watches
async fn pump_events(
    session: String,
    mut receiver: GossipReceiver,
    mut mesh: MeshState,
    inbox: mpsc::Sender<Vec<u8>>,
    roster_tx: watch::Sender<Roster>,
    state_tx: Arc<watch::Sender<SessionState>>,
) {
    loop {
        let mesh_event = match receiver.try_next().await {
            Ok(Some(Event::Received(message))) => {
                if inbox.send(message.content.to_vec()).await.is_err() {
                    debug!(session = %session, "Transport dropped, stopping gossip pump");
                    break;
                }
                continue;
            }
            Ok(Some(Event::NeighborUp(id))) => MeshEvent::NeighborUp(id.to_string()),
            Ok(Some(Event::NeighborDown(id))) => MeshEvent::NeighborDown(id.to_string()),
            Ok(Some(Event::Lagged)) => {
                warn!(session = %session, "Gossip receiver lagged, messages were missed");
                continue;
            }
            Ok(None) => MeshEvent::Closed,
            Err(e) => {
                warn!(session = %session, error = %e, "Gossip receiver failed");
                MeshEvent::Closed
            }
        };

        let before = mesh.state();
        if mesh.apply(&mesh_event) {
            roster_tx.send_replace(mesh.roster());
            if mesh.state() != before {
                info!(session = %session, from = ?before, to = ?mesh.state(), neighbors = mesh.neighbor_count(), "Session state changed");
                state_tx.send_replace(mesh.state());
            }
        }

        if mesh_event == MeshEvent::Closed {
            break;
        }
    }
}
