//! Network topology inputs the strategy scores candidates against.
//!
//! This is a read-only view supplied by whatever out-of-band discovery
//! mechanism the surrounding system runs; the strategy never talks to peers
//! itself.

use std::collections::{HashMap, HashSet};

use qbft_security::NodeIdentity;

/// One candidate peer's observed network and reliability characteristics.
#[derive(Debug, Clone)]
pub struct PeerObservation {
    pub node_id: NodeIdentity,
    /// Peers this one can currently reach.
    pub connected_to: HashSet<NodeIdentity>,
    /// Trust score from the Peer Registry, in `[0.0, 1.0]`.
    pub trust_score: f64,
    /// Fraction of the recent observation window this peer was reachable.
    pub recent_uptime: f64,
    /// Round-trip latency estimate, in milliseconds.
    pub latency_ms: f64,
    /// Cluster/region label used for diversity scoring.
    pub cluster: String,
}

/// The full set of candidates and their connectivity, as seen by this node.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    pub peers: HashMap<NodeIdentity, PeerObservation>,
}

impl NetworkTopology {
    pub fn new(peers: Vec<PeerObservation>) -> Self {
        Self {
            peers: peers.into_iter().map(|p| (p.node_id.clone(), p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Connectivity factor: edges incident to `node_id` over total peers.
    pub fn connectivity(&self, node_id: &NodeIdentity) -> f64 {
        let total = self.peers.len();
        if total <= 1 {
            return 0.0;
        }
        self.peers
            .get(node_id)
            .map(|p| p.connected_to.len() as f64 / (total - 1) as f64)
            .unwrap_or(0.0)
    }

    /// Simple degree centrality as a fraction of the maximum possible degree.
    pub fn centrality(&self, node_id: &NodeIdentity) -> f64 {
        self.connectivity(node_id)
    }

    /// Estimate the largest set of mutually-reachable peers, used as the
    /// `maxPartitionSize` input to the sizing rule. A coarse approximation:
    /// the largest connected component under the observed adjacency.
    pub fn max_partition_size(&self) -> usize {
        let mut visited: HashSet<&NodeIdentity> = HashSet::new();
        let mut largest = 0usize;

        for start in self.peers.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut stack = vec![start];
            let mut component = HashSet::new();
            while let Some(node) = stack.pop() {
                if !component.insert(node) {
                    continue;
                }
                visited.insert(node);
                if let Some(obs) = self.peers.get(node) {
                    for neighbor_id in &obs.connected_to {
                        if let Some((key, _)) = self.peers.get_key_value(neighbor_id) {
                            if !component.contains(key) {
                                stack.push(key);
                            }
                        }
                    }
                }
            }
            largest = largest.max(component.len());
        }

        largest
    }

    /// Count of clusters represented among the known peers, used to detect
    /// under-represented clusters for the diversity factor.
    pub fn cluster_population(&self, cluster: &str) -> usize {
        self.peers.values().filter(|p| p.cluster == cluster).count()
    }
}
