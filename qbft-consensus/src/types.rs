//! Proposal and vote types, and the engine's tuning knobs.

use chrono::{DateTime, Utc};
use qbft_security::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for [`crate::engine::ConsensusEngine`].
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Configured maximum Byzantine tolerance `f`; membership must be at
    /// least `3f + 1` for a round to open.
    pub max_byzantine_faults: usize,
    /// Upper bound on how far in the future a caller-supplied deadline may
    /// sit.
    pub max_round_duration: Duration,
    /// Upper bound on proposal payload size, in bytes.
    pub max_payload_bytes: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_byzantine_faults: 2,
            max_round_duration: Duration::from_secs(30),
            max_payload_bytes: 1 << 20,
        }
    }
}

/// A unit of work submitted for consensus.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub proposal_id: String,
    pub payload: Vec<u8>,
    pub payload_hash: String,
    pub opened_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub round: u64,
}

/// The body of a `proposal`-kind wire message: what a peer actually
/// receives and must vote on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalBody {
    pub proposal_id: String,
    pub payload: Vec<u8>,
    pub payload_hash: String,
    pub deadline_at: DateTime<Utc>,
}

/// One peer's signed vote on a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub voter: NodeIdentity,
    pub proposal_id: String,
    pub decision: bool,
    pub nonce: String,
    pub timestamp: DateTime<Utc>,
    /// Hex-encoded signature over the canonical serialization of
    /// `(voter, proposal_id, decision, nonce, timestamp)`.
    pub signature: String,
}
