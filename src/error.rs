//! Top-level error type returned by the facade.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuorumCoreError {
    #[error(transparent)]
    Security(#[from] qbft_security::SecurityError),

    #[error(transparent)]
    Consensus(#[from] qbft_consensus::ConsensusError),

    #[error(transparent)]
    Audit(#[from] qbft_audit::AuditError),

    #[error(transparent)]
    Strategy(#[from] qbft_strategy::QuorumInfeasible),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
