//! Session naming and mesh membership tracking

use std::collections::BTreeSet;

use coscene_core::{Roster, SessionState};

/// A named scene session, mapped onto one gossip topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionTopic {
    name: String,
    id: [u8; 32],
}

impl SessionTopic {
    /// Derive the topic from a session name; equal names meet on equal topics
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"coscene/session/v1/");
        hasher.update(name.as_bytes());
        Self {
            id: *hasher.finalize().as_bytes(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> [u8; 32] {
        self.id
    }
}

/// Membership change observed on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    NeighborUp(String),
    NeighborDown(String),
    /// The subscription ended
    Closed,
}

/// Local view of the topic mesh: who is connected and whether we are in
#[derive(Debug, Clone)]
pub struct MeshState {
    local: String,
    neighbors: BTreeSet<String>,
    state: SessionState,
}

impl MeshState {
    /// Without bootstrap peers there is nobody to wait for, so the session
    /// starts active; otherwise it joins on the first neighbor.
    pub fn new(local: impl Into<String>, has_bootstrap: bool) -> Self {
        Self {
            local: local.into(),
            neighbors: BTreeSet::new(),
            state: if has_bootstrap {
                SessionState::Joining
            } else {
                SessionState::Active
            },
        }
    }

    /// Apply an event; returns whether the roster or state changed
    pub fn apply(&mut self, event: &MeshEvent) -> bool {
        match event {
            MeshEvent::NeighborUp(id) => {
                let added = self.neighbors.insert(id.clone());
                let joined = self.state == SessionState::Joining;
                if joined {
                    self.state = SessionState::Active;
                }
                added || joined
            }
            MeshEvent::NeighborDown(id) => self.neighbors.remove(id),
            MeshEvent::Closed => {
                let changed = self.state != SessionState::Invalidated;
                self.state = SessionState::Invalidated;
                self.neighbors.clear();
                changed
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Neighbors plus ourselves, unless the session is gone
    pub fn roster(&self) -> Roster {
        if self.state == SessionState::Invalidated {
            return Roster::new();
        }
        std::iter::once(self.local.clone())
            .chain(self.neighbors.iter().cloned())
            .collect()
    }
}
