//! # Coscene Core
//!
//! Core types, errors, and collaborator traits for the Coscene replicated
//! scene engine.
//!
//! Every peer in a session holds its own copy of a small shared world made of
//! long-lived *entities* (spawned characters) and short-lived *effects*. This
//! crate defines the vocabulary the rest of the stack speaks:
//!
//! ## Key Types
//!
//! - [`EntityId`], [`EffectId`], [`PeerId`]: opaque UUID-backed identifiers
//! - [`EntityState`] / [`EntityPatch`]: full and partial entity state
//! - [`EffectInstance`]: a timed visual event
//! - [`Origin`]: whether a mutation came from this peer or a remote one
//!
//! ## Key Traits
//!
//! - [`Transport`]: one-to-many, at-least-once broadcast channel for a session
//! - [`Animatable`]: the fixed `{position, scale, action}` view over scene state
//!
//! ## Testing
//!
//! [`MockBroadcastHub`] wires any number of in-memory [`MockTransport`]s into a
//! shared session with configurable loss, duplication, and self-echo.

pub mod effect;
pub mod entity;
pub mod error;
pub mod identity;
pub mod math;
pub mod mock_transport;
pub mod transport;

pub use effect::*;
pub use entity::*;
pub use error::*;
pub use identity::*;
pub use math::*;
pub use mock_transport::*;
pub use transport::*;
