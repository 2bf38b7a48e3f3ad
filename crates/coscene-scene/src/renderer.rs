//! The rendering collaborator and an in-memory recorder for tests

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use coscene_core::{EntityId, EntityState};
use parking_lot::Mutex;

use crate::error::RenderError;

/// Something that can show entities
///
/// `create` may take a while (loading a model, say) and may fail; the
/// reconciler never issues a second `create` for an id while one is pending.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    async fn create(&self, id: EntityId, state: &EntityState) -> Result<(), RenderError>;

    async fn update(&self, id: EntityId, state: &EntityState) -> Result<(), RenderError>;

    async fn destroy(&self, id: EntityId) -> Result<(), RenderError>;
}

/// One call observed by a [`RecordingRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    Create(EntityId),
    Update(EntityId),
    Destroy(EntityId),
}

impl RenderOp {
    pub fn entity_id(&self) -> EntityId {
        match self {
            RenderOp::Create(id) | RenderOp::Update(id) | RenderOp::Destroy(id) => *id,
        }
    }
}

#[derive(Default)]
struct Recorder {
    ops: Vec<RenderOp>,
    nodes: HashMap<EntityId, EntityState>,
    fail_creates: HashMap<EntityId, u32>,
    fail_all_creates: bool,
}

/// Renderer that keeps its "scene" in a map and logs every call
#[derive(Default)]
pub struct RecordingRenderer {
    inner: Mutex<Recorder>,
    create_latency: Duration,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create` take `latency` before completing
    pub fn with_create_latency(mut self, latency: Duration) -> Self {
        self.create_latency = latency;
        self
    }

    /// Fail the next `count` creates of `id`
    pub fn fail_creates(&self, id: EntityId, count: u32) {
        self.inner.lock().fail_creates.insert(id, count);
    }

    /// Fail every create until switched off again
    pub fn set_fail_all_creates(&self, fail: bool) {
        self.inner.lock().fail_all_creates = fail;
    }

    pub fn ops(&self) -> Vec<RenderOp> {
        self.inner.lock().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<RenderOp> {
        std::mem::take(&mut self.inner.lock().ops)
    }

    /// Ids currently shown
    pub fn node_ids(&self) -> HashSet<EntityId> {
        self.inner.lock().nodes.keys().copied().collect()
    }

    pub fn node(&self, id: &EntityId) -> Option<EntityState> {
        self.inner.lock().nodes.get(id).cloned()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn create(&self, id: EntityId, state: &EntityState) -> Result<(), RenderError> {
        self.inner.lock().ops.push(RenderOp::Create(id));

        if !self.create_latency.is_zero() {
            tokio::time::sleep(self.create_latency).await;
        }

        let mut inner = self.inner.lock();
        if inner.fail_all_creates {
            return Err(RenderError::Resource(id, "creates disabled".into()));
        }
        if let Some(remaining) = inner.fail_creates.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::Resource(id, "injected failure".into()));
            }
        }
        inner.nodes.insert(id, state.clone());
        Ok(())
    }

    async fn update(&self, id: EntityId, state: &EntityState) -> Result<(), RenderError> {
        let mut inner = self.inner.lock();
        inner.ops.push(RenderOp::Update(id));
        match inner.nodes.get_mut(&id) {
            Some(node) => {
                *node = state.clone();
                Ok(())
            }
            None => Err(RenderError::UnknownEntity(id)),
        }
    }

    async fn destroy(&self, id: EntityId) -> Result<(), RenderError> {
        let mut inner = self.inner.lock();
        inner.ops.push(RenderOp::Destroy(id));
        inner
            .nodes
            .remove(&id)
            .map(|_| ())
            .ok_or(RenderError::UnknownEntity(id))
    }
}
