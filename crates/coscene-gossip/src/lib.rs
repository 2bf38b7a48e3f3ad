//! # Coscene Gossip
//!
//! Carries scene sessions over [iroh-gossip](https://docs.rs/iroh-gossip).
//! Each named session maps to one gossip topic; [`GossipTransport`] exposes
//! it through the [`Transport`](coscene_core::Transport) trait so a sync
//! coordinator can run on it unchanged.
//!
//! ```ignore
//! let endpoint = iroh::Endpoint::builder().bind().await?;
//! let node = CosceneGossip::new(&endpoint);
//! let _router = iroh::protocol::Router::builder(endpoint.clone())
//!     .accept(CosceneGossip::alpn(), node.gossip().clone())
//!     .spawn();
//!
//! let transport = node
//!     .join(SessionTopic::new("living-room"), PeerId::generate(), bootstrap)
//!     .await?;
//! ```

pub mod error;
pub mod node;
pub mod topic;
pub mod transport;

pub use error::{GossipError, GossipResult};
pub use node::CosceneGossip;
pub use topic::{MeshEvent, MeshState, SessionTopic};
pub use transport::GossipTransport;
