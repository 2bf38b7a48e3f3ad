//! # Coscene Scene
//!
//! Turns store snapshots into the smallest set of renderer calls.
//!
//! A [`SceneReconciler`] remembers what it has shown. On each snapshot it
//! creates new ids, updates ids whose fields moved by more than a small
//! epsilon, and destroys ids that disappeared, in that order. Creates are
//! asynchronous and may fail; an id is never created twice concurrently and a
//! failed create is retried on a later pass.

pub mod config;
pub mod error;
pub mod plan;
pub mod reconciler;
pub mod renderer;

pub use config::ReconcilerConfig;
pub use error::{RenderError, RenderResult};
pub use plan::{ReconcilePlan, needs_update};
pub use reconciler::SceneReconciler;
pub use renderer::{RecordingRenderer, RenderOp, Renderer};
