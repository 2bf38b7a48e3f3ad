//! # Coscene Simulation
//!
//! Drives several scene sessions over one [`MockBroadcastHub`] with random
//! local edits, lets the system settle, brings in a late joiner, and
//! reports whether every peer ended up with the same scene.
//!
//! Message loss is injected by the hub. There is no anti-entropy beyond the
//! snapshot a peer requests on joining, so a lossy run may legitimately end
//! diverged; the report says so instead of failing.

use std::sync::Arc;
use std::time::Duration;

use coscene_core::{
    Action, EffectType, EntityId, EntityKind, MockBroadcastHub, MockHubConfig, Quat, Transform, Vec3,
};
use coscene_logging::peer_span;
use coscene_node::{NodeConfig, SceneNode, SceneSession};
use coscene_scene::RecordingRenderer;
use coscene_sync::StatsSnapshot;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{Instrument, info, warn};

/// Parameters of one simulation run
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub peers: usize,
    pub ops: usize,
    pub drop_probability: f64,
    pub duplicate_probability: f64,
    pub seed: u64,
    /// Pause between consecutive operations; above the throttle window,
    /// edits to one entity from different peers never cross in flight
    pub op_interval: Duration,
    /// Quiet period before measuring convergence
    pub settle: Duration,
    pub late_joiner: bool,
    pub node: NodeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            peers: 3,
            ops: 50,
            drop_probability: 0.0,
            duplicate_probability: 0.0,
            seed: 7,
            op_interval: Duration::from_millis(150),
            settle: Duration::from_secs(3),
            late_joiner: true,
            node: NodeConfig::default(),
        }
    }
}

/// Per-peer outcome
#[derive(Debug, Clone, Serialize)]
pub struct PeerReport {
    pub label: String,
    pub peer: String,
    pub entities: usize,
    pub effects: usize,
    pub rendered: usize,
    pub roster: usize,
    pub stats: StatsSnapshot,
}

/// Outcome of a full run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub seed: u64,
    pub ops_applied: usize,
    pub converged: bool,
    pub render_matches_store: bool,
    pub peers: Vec<PeerReport>,
}

impl SimReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

struct SimPeer {
    label: String,
    session: SceneSession,
    renderer: Arc<RecordingRenderer>,
}

impl SimPeer {
    async fn join(node: &SceneNode, hub: &MockBroadcastHub, label: String) -> anyhow::Result<Self> {
        let renderer = Arc::new(RecordingRenderer::new());
        let session = node.join(Arc::new(hub.join_new()), renderer.clone()).await?;
        info!(label = %label, peer = %session.peer().short_id(), "Peer joined");
        Ok(Self {
            label,
            session,
            renderer,
        })
    }

    fn report(&self) -> PeerReport {
        let snapshot = self.session.snapshot();
        PeerReport {
            label: self.label.clone(),
            peer: self.session.peer().short_id(),
            entities: snapshot.entities.len(),
            effects: snapshot.effects.len(),
            rendered: self.renderer.node_ids().len(),
            roster: self.session.roster().len(),
            stats: self.session.stats(),
        }
    }

    fn render_matches_store(&self) -> bool {
        let snapshot = self.session.snapshot();
        let rendered = self.renderer.node_ids();
        rendered.len() == snapshot.entities.len()
            && snapshot.entities.keys().all(|id| rendered.contains(id))
    }
}

/// Run a simulation to completion
pub async fn run(config: SimConfig) -> anyhow::Result<SimReport> {
    anyhow::ensure!(config.peers > 0, "simulation needs at least one peer");

    let hub = MockBroadcastHub::with_config(MockHubConfig::lossy(
        config.drop_probability,
        config.duplicate_probability,
    ));
    let node = SceneNode::new(config.node.clone());
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut peers = Vec::with_capacity(config.peers + 1);
    for i in 0..config.peers {
        peers.push(SimPeer::join(&node, &hub, peer_label(i)).await?);
    }
    tokio::time::sleep(config.settle).await;

    let mut applied = 0;
    for _ in 0..config.ops {
        let peer = &peers[rng.random_range(0..peers.len())];
        let span = peer_span(&peer.session.peer(), &peer.label);
        if random_op(&peer.session, &mut rng).instrument(span).await? {
            applied += 1;
        }
        tokio::time::sleep(config.op_interval).await;
    }
    tokio::time::sleep(config.settle).await;

    if config.late_joiner {
        peers.push(SimPeer::join(&node, &hub, peer_label(config.peers)).await?);
        tokio::time::sleep(config.settle).await;
    }

    let first = peers[0].session.snapshot();
    let converged = peers
        .iter()
        .all(|p| p.session.snapshot().same_content(&first));
    let render_matches_store = peers.iter().all(SimPeer::render_matches_store);
    if !converged {
        warn!("Peers ended with different scenes");
    }

    let report = SimReport {
        seed: config.seed,
        ops_applied: applied,
        converged,
        render_matches_store,
        peers: peers.iter().map(SimPeer::report).collect(),
    };

    for peer in peers {
        peer.session.leave().await;
    }
    Ok(report)
}

fn peer_label(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{letter}{}", index / 26)
    }
}

fn random_vec(rng: &mut StdRng) -> Vec3 {
    Vec3::new(
        rng.random_range(-2.0..2.0),
        rng.random_range(0.0..1.5),
        rng.random_range(-3.0..-0.5),
    )
}

fn pick_entity(session: &SceneSession, rng: &mut StdRng) -> Option<EntityId> {
    let snapshot = session.snapshot();
    if snapshot.entities.is_empty() {
        return None;
    }
    let index = rng.random_range(0..snapshot.entities.len());
    snapshot.entities.keys().nth(index).copied()
}

/// Apply one random local edit; returns whether it changed anything
async fn random_op(session: &SceneSession, rng: &mut StdRng) -> anyhow::Result<bool> {
    let roll = rng.random_range(0..100);
    let target = pick_entity(session, rng);

    let changed = match (roll, target) {
        (0..20, _) | (_, None) => {
            let kind = EntityKind::ALL[rng.random_range(0..EntityKind::ALL.len())];
            session.spawn_entity(kind, Transform::at(random_vec(rng))).await?;
            true
        }
        (20..50, Some(id)) => session.move_entity(id, random_vec(rng)).await?,
        (50..58, Some(id)) => session.scale_entity(id, rng.random_range(0.5..2.0)).await?,
        (58..64, Some(id)) => {
            let yaw: f32 = rng.random_range(0.0..std::f32::consts::TAU);
            let rotation = Quat::new(0.0, (yaw / 2.0).sin(), 0.0, (yaw / 2.0).cos());
            session.rotate_entity(id, rotation).await?
        }
        (64..70, Some(id)) => session.set_hidden(id, rng.random_bool(0.5)).await?,
        (70..82, Some(id)) => {
            let action = Action::ALL[rng.random_range(1..Action::ALL.len())];
            session.trigger_action(id, action).await?
        }
        (82..92, _) => {
            let effect = EffectType::ALL[rng.random_range(0..EffectType::ALL.len())];
            session
                .spawn_effect(effect, random_vec(rng), rng.random_range(0.5..3.0))
                .await?;
            true
        }
        (_, Some(id)) => session.remove_entity(id).await?,
    };
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_labels() {
        assert_eq!(peer_label(0), "A");
        assert_eq!(peer_label(25), "Z");
        assert_eq!(peer_label(26), "A1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reliable_run_converges() {
        let report = run(SimConfig {
            peers: 3,
            ops: 40,
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(report.converged);
        assert!(report.render_matches_store);
        assert_eq!(report.peers.len(), 4);
        assert!(report.peers.iter().all(|p| p.roster == 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_peer_run() {
        let report = run(SimConfig {
            peers: 1,
            ops: 10,
            late_joiner: false,
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(report.converged);
        assert_eq!(report.peers[0].stats.decode_failures, 0);
    }

    #[tokio::test]
    async fn test_zero_peers_rejected() {
        let result = run(SimConfig {
            peers: 0,
            ..Default::default()
        })
        .await;
        assert!(result.is_err());
    }
}
