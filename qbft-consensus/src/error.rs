//! Failure classes returned by the consensus engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Fewer authorized peers were supplied than `3f + 1`.
    #[error("insufficient quorum: need at least {required} peers, got {available}")]
    InsufficientQuorum { required: usize, available: usize },

    /// The round expired before enough verified votes arrived.
    #[error("deadline exceeded for proposal {proposal_id}: {verified_votes} verified votes of {membership_size} members")]
    DeadlineExceeded {
        proposal_id: String,
        verified_votes: usize,
        membership_size: usize,
    },

    /// More than `f` voters produced unverifiable or contradicting votes;
    /// every offending voter has been quarantined.
    #[error("byzantine majority detected for proposal {proposal_id}: {offenders} offending voters")]
    ByzantineMajority {
        proposal_id: String,
        offenders: usize,
    },

    /// The committing node's own signature over the outcome could not be
    /// produced. Fatal; must not be papered over.
    #[error("internal signature failure for proposal {proposal_id}: {detail}")]
    InternalSignatureFailure {
        proposal_id: String,
        detail: String,
    },

    /// A caller-supplied argument violates a precondition (oversized
    /// payload, deadline in the past, deadline beyond the configured
    /// maximum).
    #[error("malformed input: {0}")]
    InputMalformed(String),

    /// The transport offered for a peer does not meet the mandated
    /// security floor (TLS 1.3, AES-256-GCM or ChaCha20-Poly1305).
    #[error("transport for peer {node_id} does not meet the security floor")]
    InsecureTransport { node_id: String },

    #[error(transparent)]
    Security(#[from] qbft_security::SecurityError),

    #[error(transparent)]
    Audit(#[from] qbft_audit::AuditError),
}
