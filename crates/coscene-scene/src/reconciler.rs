//! Drives a [`Renderer`] from store snapshots
//!
//! Each pass diffs the latest snapshot against what the renderer is known to
//! show and issues creates, then updates, then destroys. Creates run
//! concurrently and report back when they settle; a failed create leaves the
//! id pending retry and it is attempted again on the very next pass. When the
//! store is quiet, [`SceneReconciler::run`] wakes after `retry_interval` to
//! start that pass itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use coscene_core::{EntityId, EntityState};
use coscene_store::Snapshot;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::config::ReconcilerConfig;
use crate::error::RenderError;
use crate::plan::ReconcilePlan;
use crate::renderer::Renderer;

struct CreateOutcome {
    state: EntityState,
    result: Result<(), RenderError>,
}

/// Keeps a renderer in step with a stream of snapshots
pub struct SceneReconciler {
    renderer: Arc<dyn Renderer>,
    config: ReconcilerConfig,
    /// What the renderer is showing, as of the last successful call per id
    rendered: HashMap<EntityId, EntityState>,
    in_flight: HashSet<EntityId>,
    /// Failed creates and when `run` should wake to retry them
    pending_retry: HashMap<EntityId, Instant>,
    creates: FuturesUnordered<BoxFuture<'static, CreateOutcome>>,
    passes: u64,
}

impl SceneReconciler {
    pub fn new(renderer: Arc<dyn Renderer>, config: ReconcilerConfig) -> Self {
        Self {
            renderer,
            config,
            rendered: HashMap::new(),
            in_flight: HashSet::new(),
            pending_retry: HashMap::new(),
            creates: FuturesUnordered::new(),
            passes: 0,
        }
    }

    /// Run one pass against `snapshot`.
    ///
    /// Creates are started but not awaited; updates and destroys complete
    /// before this returns. The returned plan lists what was issued.
    pub async fn reconcile(&mut self, snapshot: &Snapshot) -> ReconcilePlan {
        self.passes += 1;
        self.pending_retry
            .retain(|id, _| snapshot.entities.contains_key(id));

        // Pending-retry ids are never rendered, so the diff recreates them
        let plan = ReconcilePlan::diff(&self.rendered, &self.in_flight, snapshot, &self.config);
        if plan.is_empty() {
            return plan;
        }

        trace!(
            revision = snapshot.revision,
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            destroys = plan.destroys.len(),
            "Reconciliation pass"
        );

        for state in &plan.creates {
            self.start_create(state.clone());
        }

        for state in &plan.updates {
            match self.renderer.update(state.id, state).await {
                Ok(()) => {
                    self.rendered.insert(state.id, state.clone());
                }
                Err(e) => warn!(entity = %state.id.short_id(), error = %e, "Render update failed"),
            }
        }

        for id in &plan.destroys {
            match self.renderer.destroy(*id).await {
                Ok(()) | Err(RenderError::UnknownEntity(_)) => {
                    self.rendered.remove(id);
                }
                Err(e) => warn!(entity = %id.short_id(), error = %e, "Render destroy failed"),
            }
        }

        plan
    }

    fn start_create(&mut self, state: EntityState) {
        let renderer = Arc::clone(&self.renderer);
        self.in_flight.insert(state.id);
        self.creates.push(Box::pin(async move {
            let result = renderer.create(state.id, &state).await;
            CreateOutcome { state, result }
        }));
    }

    /// Record a finished create; returns whether it succeeded
    fn settle_create(&mut self, outcome: CreateOutcome) -> bool {
        let id = outcome.state.id;
        self.in_flight.remove(&id);

        match outcome.result {
            Ok(()) => {
                if self.pending_retry.remove(&id).is_some() {
                    info!(entity = %id.short_id(), "Render create succeeded after retry");
                }
                self.rendered.insert(id, outcome.state);
                true
            }
            Err(e) => {
                warn!(entity = %id.short_id(), error = %e, "Render create failed, will retry");
                self.pending_retry
                    .insert(id, Instant::now() + self.config.retry_interval);
                false
            }
        }
    }

    /// Wait for every in-flight create to settle.
    ///
    /// Does not start a new pass; call [`reconcile`](Self::reconcile) after
    /// it to catch up with changes made while the creates were running.
    pub async fn settle(&mut self) {
        while let Some(outcome) = self.creates.next().await {
            self.settle_create(outcome);
        }
    }

    pub fn is_rendered(&self, id: &EntityId) -> bool {
        self.rendered.contains_key(id)
    }

    pub fn rendered_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.rendered.keys()
    }

    pub fn is_in_flight(&self, id: &EntityId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn is_pending_retry(&self, id: &EntityId) -> bool {
        self.pending_retry.contains_key(id)
    }

    pub fn pending_retry_count(&self) -> usize {
        self.pending_retry.len()
    }

    /// When `run` should start a pass for pending retries on a quiet store
    fn next_retry(&self) -> Option<Instant> {
        self.pending_retry
            .iter()
            .filter(|(id, _)| !self.in_flight.contains(*id))
            .map(|(_, at)| *at)
            .min()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Reconcile on every published snapshot until the store goes away
    pub async fn run(mut self, mut snapshots: watch::Receiver<Arc<Snapshot>>) {
        debug!("Scene reconciler started");
        let mut retry_at: Option<Instant> = None;

        let initial = snapshots.borrow_and_update().clone();
        self.reconcile(&initial).await;

        loop {
            let mut pass = true;
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        debug!("Snapshot source closed, stopping reconciler");
                        break;
                    }
                }
                Some(outcome) = self.creates.next(), if !self.creates.is_empty() => {
                    // A failure waits for the next change or the retry wake-up
                    pass = self.settle_create(outcome);
                }
                _ = sleep_until_opt(retry_at) => {}
            }

            if pass {
                let latest = snapshots.borrow_and_update().clone();
                self.reconcile(&latest).await;
            }

            retry_at = self.next_retry();
        }

        self.settle().await;
    }

    /// Run [`run`](Self::run) on its own task
    pub fn spawn(self, snapshots: watch::Receiver<Arc<Snapshot>>) -> JoinHandle<()> {
        tokio::spawn(self.run(snapshots))
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{RecordingRenderer, RenderOp};
    use coscene_core::{EntityKind, Transform, Vec3};
    use std::time::Duration;

    fn entity() -> EntityState {
        EntityState::new(EntityId::generate(), EntityKind::Ghost, Transform::default())
    }

    fn snapshot(states: &[&EntityState]) -> Snapshot {
        Snapshot {
            revision: 0,
            entities: states.iter().map(|s| (s.id, (*s).clone())).collect(),
            effects: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_minimal_ops_when_swapping_entities() {
        let renderer = Arc::new(RecordingRenderer::new());
        let mut reconciler = SceneReconciler::new(renderer.clone(), ReconcilerConfig::default());
        let (a, b, c) = (entity(), entity(), entity());

        reconciler.reconcile(&snapshot(&[&a, &b])).await;
        reconciler.settle().await;
        renderer.take_ops();

        reconciler.reconcile(&snapshot(&[&a, &c])).await;
        reconciler.settle().await;

        let ops = renderer.take_ops();
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&RenderOp::Create(c.id)));
        assert!(ops.contains(&RenderOp::Destroy(b.id)));
        assert!(ops.iter().all(|op| op.entity_id() != a.id));
    }

    #[tokio::test]
    async fn test_ops_issue_in_create_update_destroy_order() {
        let renderer = Arc::new(RecordingRenderer::new());
        let mut reconciler = SceneReconciler::new(renderer.clone(), ReconcilerConfig::default());
        let (a, b, c) = (entity(), entity(), entity());

        reconciler.reconcile(&snapshot(&[&a, &b])).await;
        reconciler.settle().await;
        renderer.take_ops();

        let mut moved = a.clone();
        moved.position = Vec3::new(1.0, 0.0, 0.0);
        reconciler.reconcile(&snapshot(&[&moved, &c])).await;

        assert_eq!(
            renderer.take_ops(),
            vec![
                RenderOp::Create(c.id),
                RenderOp::Update(a.id),
                RenderOp::Destroy(b.id)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_duplicate_create_while_in_flight() {
        let renderer = Arc::new(RecordingRenderer::new().with_create_latency(Duration::from_millis(200)));
        let mut reconciler = SceneReconciler::new(renderer.clone(), ReconcilerConfig::default());
        let a = entity();

        reconciler.reconcile(&snapshot(&[&a])).await;
        assert!(reconciler.is_in_flight(&a.id));

        let mut moved = a.clone();
        moved.position = Vec3::new(2.0, 0.0, 0.0);
        let plan = reconciler.reconcile(&snapshot(&[&moved])).await;
        assert!(plan.is_empty());

        reconciler.settle().await;
        assert!(reconciler.is_rendered(&a.id));

        // The move that happened mid-create is picked up on the next pass
        let plan = reconciler.reconcile(&snapshot(&[&moved])).await;
        assert_eq!(plan.updates, vec![moved.clone()]);
        assert_eq!(
            renderer.ops(),
            vec![RenderOp::Create(a.id), RenderOp::Update(a.id)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_create_is_retried_next_pass() {
        let renderer = Arc::new(RecordingRenderer::new());
        let mut reconciler = SceneReconciler::new(renderer.clone(), ReconcilerConfig::default());
        let a = entity();
        renderer.fail_creates(a.id, 1);

        reconciler.reconcile(&snapshot(&[&a])).await;
        reconciler.settle().await;
        assert!(reconciler.is_pending_retry(&a.id));
        assert!(!reconciler.is_rendered(&a.id));

        // No waiting for the retry interval: the next pass creates it again
        let plan = reconciler.reconcile(&snapshot(&[&a])).await;
        assert_eq!(plan.creates, vec![a.clone()]);
        reconciler.settle().await;
        assert!(reconciler.is_rendered(&a.id));
        assert_eq!(reconciler.pending_retry_count(), 0);
        assert_eq!(renderer.node_ids().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_during_create_is_destroyed_after() {
        let renderer = Arc::new(RecordingRenderer::new().with_create_latency(Duration::from_millis(200)));
        let mut reconciler = SceneReconciler::new(renderer.clone(), ReconcilerConfig::default());
        let a = entity();

        reconciler.reconcile(&snapshot(&[&a])).await;
        assert!(reconciler.reconcile(&snapshot(&[])).await.is_empty());

        reconciler.settle().await;
        let plan = reconciler.reconcile(&snapshot(&[])).await;

        assert_eq!(plan.destroys, vec![a.id]);
        assert!(renderer.node_ids().is_empty());
        assert!(!reconciler.is_rendered(&a.id));
    }
}
