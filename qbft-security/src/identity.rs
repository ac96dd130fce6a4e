//! Node identity generation.
//!
//! A [`NodeIdentity`] is opaque, immutable for the life of the process, and
//! derived from fresh randomness bound to a monotonically increasing counter
//! so that two identities generated in the same process can never collide
//! even if the randomness source were to repeat.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque peer/node identifier. See spec section 3, `NodeIdentity`.
pub type NodeIdentity = String;

static IDENTITY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh node identity: `SHA-256(32 random bytes || counter)`.
pub fn generate_node_identity() -> NodeIdentity {
    let counter = IDENTITY_COUNTER.fetch_add(1, Ordering::SeqCst);

    let mut entropy = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut entropy);

    let mut hasher = Sha256::new();
    hasher.update(entropy);
    hasher.update(counter.to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique_across_calls() {
        let a = generate_node_identity();
        let b = generate_node_identity();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
