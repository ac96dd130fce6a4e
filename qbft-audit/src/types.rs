//! Shared record types: the settled outcome of a consensus round and the
//! hash-chained record that seals it into the audit log.

use chrono::{DateTime, Utc};
use qbft_security::NodeIdentity;
use serde::{Deserialize, Serialize};

/// The hex-encoded SHA-256 genesis hash: sixty-four `'0'` characters.
pub fn genesis_hash() -> String {
    "0".repeat(64)
}

/// Result of one consensus round, as handed from the engine to the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub proposal_id: String,
    pub payload_hash: String,
    pub total_votes: u64,
    pub valid_votes: u64,
    pub approvals: u64,
    pub consensus_reached: bool,
    pub byzantine_voters: Vec<NodeIdentity>,
    /// Signature by the committing node over `(payload_hash, total_votes,
    /// approvals, timestamp)`, hex-encoded.
    pub proof: String,
    pub timestamp: DateTime<Utc>,
}

/// One immutable, hash-linked, signed entry in the audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub index: u64,
    pub outcome: ConsensusOutcome,
    pub previous_hash: String,
    pub record_hash: String,
    /// Signature by the committing node over `record_hash`, hex-encoded.
    pub record_signature: String,
}
