//! Observable events emitted by the engine.
//!
//! Re-expressed as a tagged variant rather than the ad-hoc strings and plain
//! records a dynamically-typed original might throw: each variant carries
//! exactly the payload its listeners need.

use qbft_security::NodeIdentity;

#[derive(Debug, Clone)]
pub enum Event {
    PeerQuarantined { node_id: NodeIdentity },
    RoundAborted { proposal_id: String, reason: String },
    AuditTampering { first_tampered_index: u64 },
    ConsensusReached { proposal_id: String, approvals: u64 },
}
