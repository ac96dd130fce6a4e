//! Drives one proposal at a time through authenticate → distribute →
//! collect votes → evaluate → commit, and binds every committed outcome
//! into the audit chain.

pub mod engine;
pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use engine::{ConsensusEngine, Member};
pub use error::ConsensusError;
pub use events::Event;
pub use transport::{Cipher, Destination, MessageKind, PeerTransport, TransportError, TransportSecurity, WireMessage};
pub use types::{ConsensusConfig, Proposal, ProposalBody, Vote};
