//! The peer wire protocol and the transport abstraction the engine sends
//! it over.
//!
//! The protocol itself is transport-agnostic; what is not negotiable is the
//! channel's security properties. [`TransportSecurity`] is checked as a hard
//! precondition before the engine will dispatch anything to a peer.

use chrono::{DateTime, Utc};
use qbft_security::NodeIdentity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind discriminator for [`WireMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Challenge,
    Auth,
    Proposal,
    Vote,
    Outcome,
}

/// `to` target for a wire message: a specific peer, or a round-wide
/// broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Peer(NodeIdentity),
    Broadcast,
}

/// One inter-peer message. `signature` is computed over the canonical
/// serialization of `(message_kind, from, to, body, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub message_kind: MessageKind,
    pub from: NodeIdentity,
    pub to: Destination,
    pub body: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
}

/// Approved symmetric ciphers for the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    Aes256Gcm,
    ChaCha20Poly1305,
}

/// The security properties a [`PeerTransport`] implementation claims to
/// provide. Checked before any send; a transport that cannot assert TLS 1.3
/// with an approved cipher is refused outright.
#[derive(Debug, Clone, Copy)]
pub struct TransportSecurity {
    pub tls_1_3: bool,
    pub cipher: Cipher,
}

impl TransportSecurity {
    /// Whether this transport meets the protocol's hard security floor.
    pub fn meets_floor(&self) -> bool {
        self.tls_1_3
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport send to {node_id} failed: {detail}")]
    SendFailed { node_id: String, detail: String },

    #[error("transport to {node_id} timed out")]
    Timeout { node_id: String },
}

/// Sends wire messages to a single peer over an authenticated, confidential
/// channel. One implementation per peer connection.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// The security properties this transport provides. Checked once before
    /// the transport is admitted to a round.
    fn security(&self) -> TransportSecurity;

    /// Send `msg` to this transport's peer and await its reply.
    async fn send(&self, msg: WireMessage) -> Result<WireMessage, TransportError>;
}
