//! # Coscene Sync
//!
//! Keeps a [`StoreHandle`](coscene_store::StoreHandle) consistent with every
//! other peer in a broadcast session.
//!
//! ## Outbound
//!
//! Local-origin changes become [`SyncMessage`]s. Transform updates are
//! coalesced per entity over a throttle window and released on its trailing
//! edge; everything else is sent immediately. Failed sends are retried with
//! bounded exponential backoff and then dropped and counted.
//!
//! ## Inbound
//!
//! Payloads that fail to decode are logged and skipped. Messages carrying the
//! local peer id are self-echo and dropped. Everything else is applied as a
//! remote change, which is never broadcast again.
//!
//! ## Late joiners
//!
//! Whenever the session becomes active the coordinator broadcasts
//! `RequestSnapshot` after a short random delay. Every peer answers by
//! broadcasting `EntitySpawned` for each entity it holds. Spawning an id that
//! already exists is an idempotent full update, so duplicate answers are
//! harmless.
//!
//! ## Example
//!
//! ```rust,ignore
//! let hub = MockBroadcastHub::new();
//! let (store, _task) = StoreHandle::spawn(StoreConfig::default());
//! let sync = SyncCoordinator::start(Arc::new(hub.join_new()), store.clone(), SyncConfig::default()).await?;
//!
//! store.spawn_entity(EntityKind::Fox, Transform::default(), Origin::Local).await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod outbox;
pub mod retry;
pub mod stats;
pub mod throttle;

pub use config::SyncConfig;
pub use coordinator::{SyncCoordinator, apply_remote};
pub use error::{SyncError, SyncResult};
pub use message::{Envelope, MessageKind, SyncMessage, ThrottleKey, WireMessage};
pub use outbox::{FailureOutcome, Outbox, Outgoing};
pub use retry::RetryPolicy;
pub use stats::{StatsSnapshot, SyncStats};
pub use throttle::Throttler;
