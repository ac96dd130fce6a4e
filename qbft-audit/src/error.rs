//! Error types for the audit chain.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    /// The chain's on-disk store could not be opened or written.
    #[error("audit chain storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("audit chain encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The committing node's own signature over an outcome could not be
    /// produced. Treated as fatal by callers; corrupt signing state must not
    /// be papered over.
    #[error("failed to sign audit record: {0}")]
    SigningFailed(String),
}
