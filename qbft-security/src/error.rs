//! Error types for peer authentication and the Peer Registry.

use thiserror::Error;

/// Failures produced by the Peer Registry.
///
/// Every variant carries whatever the caller needs to act without reaching
/// into internal state: the offending node, and a human-readable detail.
#[derive(Error, Debug)]
pub enum SecurityError {
    /// The peer has been quarantined and cannot authenticate or be authorized.
    #[error("peer {node_id} is quarantined")]
    PeerQuarantined { node_id: String },

    /// `authorize` was called for a node the registry has never seen authenticated.
    #[error("peer {node_id} is unknown to the registry")]
    UnknownPeer { node_id: String },

    /// The peer's session handle has passed its expiry.
    #[error("session for peer {node_id} has expired")]
    SessionExpired { node_id: String },

    /// The presented public key does not meet the minimum strength policy.
    #[error("public key for peer {node_id} is {bits}-bit, below the {minimum}-bit policy floor")]
    WeakKey {
        node_id: String,
        bits: usize,
        minimum: usize,
    },

    /// No outstanding challenge matches, or it is older than the freshness window.
    #[error("no fresh outstanding challenge for peer {node_id}")]
    ChallengeMismatch { node_id: String },

    /// The authentication signature did not verify under the presented public key.
    #[error("signature verification failed for peer {node_id}")]
    InvalidSignature { node_id: String },

    /// Underlying RSA key operation failed (generation, encoding).
    #[error("rsa key error: {0}")]
    Rsa(#[from] rsa::Error),

    /// Underlying signature encoding/decoding failed.
    #[error("signature error: {0}")]
    Signature(#[from] rsa::signature::Error),
}
