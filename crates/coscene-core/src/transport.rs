//! Transport abstraction for session-scoped broadcast
//!
//! The [`Transport`] trait is the only view the sync engine has of the
//! network: a one-to-many, ordered-per-sender, at-least-once broadcast
//! channel whose membership changes while the session runs.
//!
//! ## Implementations
//!
//! - [`MockTransport`](crate::MockTransport): in-memory transport for testing
//! - `GossipTransport`: iroh-gossip topic (in the coscene-gossip crate)

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;

use crate::error::TransportError;
use crate::identity::PeerId;

/// Lifecycle of the session a transport is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not yet joined
    Joining,
    /// Joined and able to send and receive
    Active,
    /// The session ended or was torn down; anything queued is stale
    Invalidated,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

/// Current participants of a session, as named by the transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster(BTreeSet<String>);

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, member: impl Into<String>) -> bool {
        self.0.insert(member.into())
    }

    pub fn remove(&mut self, member: &str) -> bool {
        self.0.remove(member)
    }

    pub fn contains(&self, member: &str) -> bool {
        self.0.contains(member)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for Roster {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Session-scoped broadcast transport
///
/// # Example
///
/// ```rust,ignore
/// use coscene_core::{Transport, TransportError};
///
/// async fn announce<T: Transport>(transport: &T, bytes: Vec<u8>) -> Result<(), TransportError> {
///     transport.send(bytes).await
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identity this peer stamps on outgoing messages
    fn local_peer(&self) -> PeerId;

    /// Broadcast bytes to every participant of the session
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not active or the send fails.
    /// Failures are transient from the caller's point of view and may be
    /// retried.
    async fn send(&self, data: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next wire message from any participant
    ///
    /// Depending on the channel, this may include our own broadcasts.
    /// Returns `Err(TransportError::ConnectionClosed)` once the transport
    /// is gone for good.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Watch the session roster
    fn roster(&self) -> watch::Receiver<Roster>;

    /// Watch the session lifecycle
    fn session_state(&self) -> watch::Receiver<SessionState>;
}

/// Lazily turn a transport's receive side into a stream of wire messages.
///
/// The stream ends when the transport reports it is closed. Transient
/// receive errors are logged and skipped.
pub fn incoming<T>(transport: Arc<T>) -> BoxStream<'static, Vec<u8>>
where
    T: Transport + ?Sized,
{
    Box::pin(stream::unfold(transport, |transport| async move {
        loop {
            match transport.recv().await {
                Ok(bytes) => return Some((bytes, transport)),
                Err(TransportError::ConnectionClosed) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "Transport receive failed");
                    continue;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_trait_is_object_safe() {
        fn assert_dyn(_: Option<Arc<dyn Transport>>) {}
        assert_dyn(None);
    }

    #[test]
    fn test_roster_membership() {
        let mut roster = Roster::new();
        assert!(roster.insert("a"));
        assert!(!roster.insert("a"));
        assert!(roster.insert("b"));
        assert_eq!(roster.len(), 2);
        assert!(roster.remove("a"));
        assert!(!roster.contains("a"));
        assert_eq!(roster.members().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_session_state_is_active() {
        assert!(SessionState::Active.is_active());
        assert!(!SessionState::Joining.is_active());
        assert!(!SessionState::Invalidated.is_active());
    }
}
