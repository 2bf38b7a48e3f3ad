//! # Coscene Store
//!
//! The authoritative in-memory scene for one peer.
//!
//! [`StateStore`] holds every entity and effect this peer knows about and is
//! the only code that mutates them. Each mutation carries an
//! [`Origin`](coscene_core::Origin):
//!
//! - `Local` mutations are announced as [`LocalChange`]s to subscribers (the
//!   sync coordinator turns them into wire messages)
//! - `Remote` mutations change state silently, so nothing received from the
//!   network is ever broadcast again
//!
//! Every change, whatever its origin, publishes a fresh immutable
//! [`Snapshot`] on a watch channel for the scene reconciler.
//!
//! ## Timers
//!
//! Action reverts and effect expiries are cancellable delayed tasks kept in
//! a per-id [`TimerTable`]. Removing an entity cancels its revert; a timer
//! that fires after being cancelled or replaced is ignored.
//!
//! ## Concurrency
//!
//! [`StoreHandle::spawn`] moves the store onto its own task. All callers,
//! including timers, reach it through one single-consumer command queue.

pub mod change;
pub mod config;
pub mod error;
pub mod handle;
pub mod store;
pub mod timer;

pub use change::{LocalChange, Snapshot};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use handle::StoreHandle;
pub use store::StateStore;
pub use timer::{TimerFired, TimerKey, TimerTable};
