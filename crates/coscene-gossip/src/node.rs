//! Gossip node: one iroh-gossip instance hosting any number of sessions

use std::sync::Arc;

use coscene_core::PeerId;
use dashmap::DashSet;
use iroh::{Endpoint, EndpointId};
use iroh_gossip::net::{GOSSIP_ALPN, Gossip};
use tracing::info;

use crate::error::{GossipError, GossipResult};
use crate::topic::SessionTopic;
use crate::transport::GossipTransport;

/// Entry point for joining scene sessions over gossip
pub struct CosceneGossip {
    gossip: Gossip,
    endpoint_id: EndpointId,
    joined: DashSet<String>,
}

impl CosceneGossip {
    /// Spawn the gossip protocol on `endpoint`.
    ///
    /// Register [`gossip`](Self::gossip) with the endpoint's router under
    /// [`alpn`](Self::alpn) so peers can reach it.
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            gossip: Gossip::builder().spawn(endpoint.clone()),
            endpoint_id: endpoint.id(),
            joined: DashSet::new(),
        }
    }

    pub fn gossip(&self) -> &Gossip {
        &self.gossip
    }

    pub fn alpn() -> &'static [u8] {
        GOSSIP_ALPN
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint_id
    }

    /// Join `topic` as `local`; the transport is active once a neighbor
    /// connects, or immediately when there is nobody to bootstrap from.
    pub async fn join(
        &self,
        topic: SessionTopic,
        local: PeerId,
        bootstrap: Vec<EndpointId>,
    ) -> GossipResult<Arc<GossipTransport>> {
        if !self.joined.insert(topic.name().to_string()) {
            return Err(GossipError::AlreadyJoined(topic.name().to_string()));
        }

        let has_bootstrap = !bootstrap.is_empty();
        let subscription = match self.gossip.subscribe(topic.id().into(), bootstrap).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.joined.remove(topic.name());
                return Err(GossipError::SubscribeFailed(e.to_string()));
            }
        };
        let (sender, receiver) = subscription.split();

        info!(
            session = topic.name(),
            peer = %local.short_id(),
            has_bootstrap,
            "Joined gossip session"
        );

        Ok(Arc::new(GossipTransport::new(
            local,
            self.endpoint_id.to_string(),
            topic,
            sender,
            receiver,
            has_bootstrap,
        )))
    }

    /// Forget a session so it can be joined again
    pub fn forget(&self, topic: &SessionTopic) -> bool {
        self.joined.remove(topic.name()).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.joined.len()
    }
}
