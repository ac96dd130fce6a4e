//! Membership selection: turn a scored topology into a recommended quorum.

use qbft_security::NodeIdentity;
use tracing::{info, warn};

use crate::scoring::{score, weight};
use crate::sizing::{minimum_membership_size, QuorumInfeasible, SizingConfig};
use crate::topology::NetworkTopology;

/// One selected peer and the weight it carries in the round, `[0.1, 2.0]`.
#[derive(Debug, Clone)]
pub struct WeightedPeer {
    pub node_id: NodeIdentity,
    pub weight: f64,
}

/// A recommended quorum: an ordered, weighted set of peers. Derived fresh
/// each time the strategy runs; never mutated in place.
#[derive(Debug, Clone)]
pub struct QuorumMembership {
    pub members: Vec<WeightedPeer>,
}

impl QuorumMembership {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, node_id: &NodeIdentity) -> bool {
        self.members.iter().any(|m| &m.node_id == node_id)
    }
}

/// Signals that should trigger a fresh membership recomputation.
#[derive(Debug, Clone, Copy)]
pub struct AdjustmentTriggers {
    pub peer_was_quarantined: bool,
    /// Mean consensus latency over the last `k = 10` rounds, in milliseconds.
    pub recent_latency_ms: Option<f64>,
    pub latency_threshold_ms: f64,
    /// Floor below which connectivity suggests a partition.
    pub connectivity_floor: f64,
    pub observed_connectivity: f64,
}

impl AdjustmentTriggers {
    pub fn should_recompute(&self) -> bool {
        self.peer_was_quarantined
            || self
                .recent_latency_ms
                .map(|latency| latency > self.latency_threshold_ms)
                .unwrap_or(false)
            || self.observed_connectivity < self.connectivity_floor
    }
}

/// Select the top-scoring `byzantineMin` peers as the next recommended
/// membership. The strategy never shrinks membership below `byzantineMin`;
/// if sizing is infeasible, it returns the diagnostic instead of degrading
/// safety.
pub fn select_membership(
    topology: &NetworkTopology,
    config: SizingConfig,
) -> Result<QuorumMembership, QuorumInfeasible> {
    let n = topology.len();
    let max_partition_size = topology.max_partition_size();
    let size = minimum_membership_size(n, max_partition_size, config)?;

    let mut scored: Vec<(NodeIdentity, f64, f64)> = topology
        .peers
        .values()
        .map(|peer| {
            let s = score(topology, peer);
            let w = weight(s, peer.latency_ms);
            (peer.node_id.clone(), s, w)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    if scored.len() < size {
        warn!(
            available = scored.len(),
            required = size,
            "fewer candidates than the sizing rule requires; selecting all available"
        );
    }

    let members = scored
        .into_iter()
        .take(size)
        .map(|(node_id, _, weight)| WeightedPeer { node_id, weight })
        .collect::<Vec<_>>();

    info!(selected = members.len(), required = size, "membership recomputed");

    Ok(QuorumMembership { members })
}
