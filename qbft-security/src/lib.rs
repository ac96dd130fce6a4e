//! Peer identity, authentication, and quarantine for the BFT quorum.
//!
//! This crate is the Peer Registry: it issues authentication challenges,
//! verifies RSA-4096/PSS/SHA-384 signatures over them, tracks per-peer trust
//! scores, and quarantines peers that misbehave. Every other subsystem calls
//! through [`registry::PeerRegistry::authorize`] before trusting anything a
//! peer sends.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod registry;

pub use crypto::{check_key_strength, key_bits, NodeKeyPair, MIN_KEY_BITS};
pub use error::SecurityError;
pub use identity::{generate_node_identity, NodeIdentity};
pub use registry::{PeerRecord, PeerRegistry, PeerStatus, RegistryConfig};
