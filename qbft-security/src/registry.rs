//! The Peer Registry: authentication, trust scoring, and quarantine.
//!
//! This is the gate every other subsystem calls through before trusting a
//! peer's vote, proposal, or audit entry. A peer starts `Unknown`, becomes
//! `Authenticated` after a successful challenge/response, and can only ever
//! move forward to `Expired` (session lapsed, re-authenticate) or
//! `Quarantined` (misbehavior observed). `Quarantined` is absorbing: nothing
//! in this module moves a peer back out of it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::canonical::{canonical_bytes, Field};
use crate::crypto::{self, check_key_strength};
use crate::error::SecurityError;
use crate::identity::NodeIdentity;

/// How long an authenticated session remains valid before it must be
/// refreshed with a new challenge/response round.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// How long an issued challenge stays valid before it's considered stale.
const CHALLENGE_FRESHNESS: Duration = Duration::from_secs(60);

/// Sliding window used when counting recent suspicions against a peer.
const SUSPICION_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Trip the quarantine if more than this many suspicions land inside the
/// window above.
const SUSPICION_THRESHOLD: usize = 3;

/// Trip the quarantine if trust score drops below this.
const TRUST_QUARANTINE_FLOOR: f64 = 0.4;

/// Trip the quarantine if the peer's fraction of votes against the
/// committed majority exceeds this.
const CONFLICT_RATE_CEILING: f64 = 0.3;

/// Amount a valid, on-majority vote nudges trust score upward.
const TRUST_STEP_UP: f64 = 0.1;

/// Amount an invalid vote or detected fault nudges trust score downward.
const TRUST_STEP_DOWN: f64 = 0.2;

/// Multiplicative penalty applied when a peer votes against a round that
/// nonetheless reached consensus without it.
const MINORITY_VOTE_PENALTY_FACTOR: f64 = 0.9;

/// Cap on how many suspicion timestamps are retained per peer; old entries
/// fall off the front once the window has clearly passed.
const SUSPICION_LOG_CAPACITY: usize = 64;

/// Tunable policy knobs for a [`PeerRegistry`]: the minimum accepted RSA key
/// strength, the authenticated-session lifetime, and the suspicion count
/// that trips quarantine. See spec section 4.1's "configurable threshold
/// (default 3)".
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub min_key_bits: usize,
    pub session_lifetime: Duration,
    pub suspicion_threshold: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_key_bits: crate::crypto::MIN_KEY_BITS,
            session_lifetime: SESSION_LIFETIME,
            suspicion_threshold: SUSPICION_THRESHOLD,
        }
    }
}

/// Lifecycle state of a peer as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Unknown,
    Authenticated,
    Expired,
    Quarantined,
}

/// Everything the registry tracks about one peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub node_id: NodeIdentity,
    pub public_key: RsaPublicKey,
    pub session_handle: Option<String>,
    pub trust_score: f64,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub status: PeerStatus,
    suspicion_log: VecDeque<DateTime<Utc>>,
    votes_total: u64,
    votes_against_majority: u64,
}

impl PeerRecord {
    fn new(node_id: NodeIdentity, public_key: RsaPublicKey) -> Self {
        Self {
            node_id,
            public_key,
            session_handle: None,
            trust_score: 1.0,
            authenticated_at: None,
            session_expires_at: None,
            status: PeerStatus::Unknown,
            suspicion_log: VecDeque::new(),
            votes_total: 0,
            votes_against_majority: 0,
        }
    }

    /// Fraction of recorded votes that landed against the eventual majority.
    /// Zero votes means zero conflict, not undefined.
    fn conflict_rate(&self) -> f64 {
        if self.votes_total == 0 {
            0.0
        } else {
            self.votes_against_majority as f64 / self.votes_total as f64
        }
    }
}

/// A challenge issued to a peer awaiting authentication.
struct PendingChallenge {
    nonce: Vec<u8>,
    issued_at: SystemTime,
}

/// Peer identity, authentication, and trust state for the whole quorum.
pub struct PeerRegistry {
    peers: DashMap<NodeIdentity, PeerRecord>,
    challenges: DashMap<NodeIdentity, PendingChallenge>,
    quarantine_events: broadcast::Sender<NodeIdentity>,
    session_counter: AtomicU64,
    config: RegistryConfig,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    /// Build a registry with the default [`RegistryConfig`].
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Build a registry with explicit policy knobs, e.g. as loaded from the
    /// embedding application's configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            peers: DashMap::new(),
            challenges: DashMap::new(),
            quarantine_events: tx,
            session_counter: AtomicU64::new(0),
            config,
        }
    }

    /// Subscribe to quarantine events; fires once per peer the instant it
    /// crosses into `Quarantined`.
    pub fn subscribe_quarantine(&self) -> broadcast::Receiver<NodeIdentity> {
        self.quarantine_events.subscribe()
    }

    /// Issue a fresh authentication challenge for `node_id`, registering the
    /// peer as `Unknown` if this is the first time it's been seen.
    pub fn issue_challenge(&self, node_id: &NodeIdentity, public_key: RsaPublicKey) -> Vec<u8> {
        self.peers
            .entry(node_id.clone())
            .or_insert_with(|| PeerRecord::new(node_id.clone(), public_key));

        let mut nonce = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        self.challenges.insert(
            node_id.clone(),
            PendingChallenge {
                nonce: nonce.clone(),
                issued_at: SystemTime::now(),
            },
        );
        nonce
    }

    /// Complete authentication: the peer must present a signature over the
    /// canonical encoding of the outstanding challenge, computed with the
    /// key it registered for the challenge.
    pub fn authenticate(
        &self,
        node_id: &NodeIdentity,
        signature: &[u8],
    ) -> Result<String, SecurityError> {
        let mut record = self
            .peers
            .get_mut(node_id)
            .ok_or_else(|| SecurityError::UnknownPeer {
                node_id: node_id.clone(),
            })?;

        if record.status == PeerStatus::Quarantined {
            return Err(SecurityError::PeerQuarantined {
                node_id: node_id.clone(),
            });
        }

        check_key_strength(node_id, &record.public_key, self.config.min_key_bits)?;

        let challenge = self
            .challenges
            .remove(node_id)
            .map(|(_, c)| c)
            .ok_or_else(|| SecurityError::ChallengeMismatch {
                node_id: node_id.clone(),
            })?;

        if challenge
            .issued_at
            .elapsed()
            .map(|age| age > CHALLENGE_FRESHNESS)
            .unwrap_or(true)
        {
            return Err(SecurityError::ChallengeMismatch {
                node_id: node_id.clone(),
            });
        }

        let message = canonical_bytes(&[
            ("node_id", Field::Text(node_id.clone())),
            ("nonce", Field::Bytes(challenge.nonce)),
        ]);

        if !crypto::verify(&record.public_key, &message, signature) {
            return Err(SecurityError::InvalidSignature {
                node_id: node_id.clone(),
            });
        }

        let session_handle = self.mint_session_handle(node_id);
        let now = Utc::now();
        record.session_handle = Some(session_handle.clone());
        record.authenticated_at = Some(now);
        record.session_expires_at =
            Some(now + chrono::Duration::from_std(self.config.session_lifetime).unwrap());
        record.status = PeerStatus::Authenticated;

        info!(node_id = %node_id, "peer authenticated");
        Ok(session_handle)
    }

    fn mint_session_handle(&self, node_id: &NodeIdentity) -> String {
        let ordinal = self.session_counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(node_id.as_bytes());
        hasher.update(ordinal.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Gate used before trusting anything from `node_id`: the peer must be
    /// `Authenticated` with a session that has not yet expired.
    pub fn authorize(&self, node_id: &NodeIdentity) -> Result<(), SecurityError> {
        let record = self
            .peers
            .get(node_id)
            .ok_or_else(|| SecurityError::UnknownPeer {
                node_id: node_id.clone(),
            })?;

        match record.status {
            PeerStatus::Quarantined => Err(SecurityError::PeerQuarantined {
                node_id: node_id.clone(),
            }),
            PeerStatus::Authenticated => {
                if record
                    .session_expires_at
                    .map(|exp| Utc::now() > exp)
                    .unwrap_or(true)
                {
                    Err(SecurityError::SessionExpired {
                        node_id: node_id.clone(),
                    })
                } else {
                    Ok(())
                }
            }
            PeerStatus::Unknown | PeerStatus::Expired => Err(SecurityError::SessionExpired {
                node_id: node_id.clone(),
            }),
        }
    }

    /// Record that `node_id`'s vote landed on the committed majority (or a
    /// round with no majority to speak of, e.g. a solo acknowledgement).
    pub fn record_valid_vote(&self, node_id: &NodeIdentity) {
        if let Some(mut record) = self.peers.get_mut(node_id) {
            record.votes_total += 1;
            record.trust_score = (record.trust_score + TRUST_STEP_UP).min(1.0);
        }
    }

    /// Record that `node_id` voted against the eventual majority, and apply
    /// the proportional trust penalty for having been on the losing side of
    /// a round that still reached consensus.
    pub fn record_minority_vote(&self, node_id: &NodeIdentity) {
        if let Some(mut record) = self.peers.get_mut(node_id) {
            record.votes_total += 1;
            record.votes_against_majority += 1;
            record.trust_score *= MINORITY_VOTE_PENALTY_FACTOR;
        }
        self.evaluate_quarantine(node_id);
    }

    /// Record a concrete protocol fault: an invalid signature, a malformed
    /// payload, a double-vote. Lowers trust and logs a suspicion timestamp;
    /// may trip quarantine.
    pub fn record_suspicion(&self, node_id: &NodeIdentity) {
        let now = Utc::now();
        if let Some(mut record) = self.peers.get_mut(node_id) {
            record.trust_score = (record.trust_score - TRUST_STEP_DOWN).max(0.0);
            record.suspicion_log.push_back(now);
            while record.suspicion_log.len() > SUSPICION_LOG_CAPACITY {
                record.suspicion_log.pop_front();
            }
        }
        self.evaluate_quarantine(node_id);
    }

    /// Unconditionally quarantine `node_id` on independent evidence of
    /// Byzantine behavior — e.g. a round the consensus engine aborted for a
    /// Byzantine majority, where every offending voter must be quarantined
    /// regardless of whether its accumulated suspicion count or trust score
    /// alone would have tripped it. A no-op if the peer is unknown or
    /// already quarantined.
    pub fn quarantine(&self, node_id: &NodeIdentity) {
        let Some(mut record) = self.peers.get_mut(node_id) else {
            return;
        };
        if record.status == PeerStatus::Quarantined {
            return;
        }
        self.apply_quarantine(node_id, &mut record);
        warn!(node_id = %node_id, "peer quarantined on direct evidence");
    }

    /// Check all three quarantine triggers for `node_id` and, if any trips,
    /// move it to `Quarantined`, revoke its session, and broadcast the
    /// event. A no-op if the peer is unknown or already quarantined.
    fn evaluate_quarantine(&self, node_id: &NodeIdentity) {
        let Some(mut record) = self.peers.get_mut(node_id) else {
            return;
        };
        if record.status == PeerStatus::Quarantined {
            return;
        }

        let window_start = Utc::now() - chrono::Duration::from_std(SUSPICION_WINDOW).unwrap();
        let recent_suspicions = record
            .suspicion_log
            .iter()
            .filter(|ts| **ts >= window_start)
            .count();

        let trips = recent_suspicions > self.config.suspicion_threshold
            || record.trust_score < TRUST_QUARANTINE_FLOOR
            || record.conflict_rate() > CONFLICT_RATE_CEILING;

        if trips {
            let trust_score = record.trust_score;
            let conflict_rate = record.conflict_rate();
            self.apply_quarantine(node_id, &mut record);
            warn!(
                node_id = %node_id,
                trust_score,
                recent_suspicions,
                conflict_rate,
                "peer quarantined"
            );
        }
    }

    /// Move `record` to `Quarantined`, revoke its session, and broadcast the
    /// event. Callers are responsible for checking it isn't already
    /// quarantined and for logging with whatever context they have.
    fn apply_quarantine(&self, node_id: &NodeIdentity, record: &mut PeerRecord) {
        record.status = PeerStatus::Quarantined;
        record.session_handle = None;
        record.session_expires_at = None;
        let _ = self.quarantine_events.send(node_id.clone());
    }

    /// Move any `Authenticated` peer whose session has lapsed into
    /// `Expired`. Intended to run on a periodic timer.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        for mut entry in self.peers.iter_mut() {
            if entry.status == PeerStatus::Authenticated {
                if entry.session_expires_at.map(|exp| now > exp).unwrap_or(false) {
                    entry.status = PeerStatus::Expired;
                    entry.session_handle = None;
                }
            }
        }
    }

    /// Snapshot a peer's current record, if known.
    pub fn get(&self, node_id: &NodeIdentity) -> Option<PeerRecord> {
        self.peers.get(node_id).map(|r| r.clone())
    }

    /// Count of peers currently in `Authenticated` status.
    pub fn authenticated_count(&self) -> usize {
        self.peers
            .iter()
            .filter(|r| r.status == PeerStatus::Authenticated)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NodeKeyPair;

    fn authenticate_fresh_peer(registry: &PeerRegistry, node_id: &str) -> (NodeKeyPair, String) {
        let pair = NodeKeyPair::generate(4096).expect("keygen");
        let node_id = node_id.to_string();
        let nonce = registry.issue_challenge(&node_id, pair.public_key().clone());
        let message = canonical_bytes(&[
            ("node_id", Field::Text(node_id.clone())),
            ("nonce", Field::Bytes(nonce)),
        ]);
        let signature = pair.sign(&message).expect("sign");
        let handle = registry.authenticate(&node_id, &signature).expect("auth");
        (pair, handle)
    }

    #[test]
    fn authenticate_then_authorize_succeeds() {
        let registry = PeerRegistry::new();
        let node_id = "peer-1".to_string();
        authenticate_fresh_peer(&registry, &node_id);
        assert!(registry.authorize(&node_id).is_ok());
    }

    #[test]
    fn unknown_peer_cannot_authorize() {
        let registry = PeerRegistry::new();
        let err = registry.authorize(&"ghost".to_string()).unwrap_err();
        assert!(matches!(err, SecurityError::UnknownPeer { .. }));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let registry = PeerRegistry::new();
        let pair = NodeKeyPair::generate(4096).expect("keygen");
        let node_id = "peer-2".to_string();
        registry.issue_challenge(&node_id, pair.public_key().clone());
        let bogus_signature = pair.sign(b"not the challenge").expect("sign");
        let err = registry.authenticate(&node_id, &bogus_signature).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidSignature { .. }));
    }

    #[test]
    fn repeated_suspicions_trip_quarantine() {
        let registry = PeerRegistry::new();
        let node_id = "peer-3".to_string();
        authenticate_fresh_peer(&registry, &node_id);

        for _ in 0..=SUSPICION_THRESHOLD {
            registry.record_suspicion(&node_id);
        }

        let err = registry.authorize(&node_id).unwrap_err();
        assert!(matches!(err, SecurityError::PeerQuarantined { .. }));
    }

    #[test]
    fn conflict_rate_trips_quarantine_independent_of_suspicion_count() {
        let registry = PeerRegistry::new();
        let node_id = "peer-4".to_string();
        authenticate_fresh_peer(&registry, &node_id);

        registry.record_valid_vote(&node_id);
        registry.record_minority_vote(&node_id);
        registry.record_minority_vote(&node_id);
        registry.record_minority_vote(&node_id);

        let err = registry.authorize(&node_id).unwrap_err();
        assert!(matches!(err, SecurityError::PeerQuarantined { .. }));
    }

    #[test]
    fn quarantine_revokes_session_on_direct_evidence() {
        let registry = PeerRegistry::new();
        let node_id = "peer-6".to_string();
        authenticate_fresh_peer(&registry, &node_id);
        assert!(registry.authorize(&node_id).is_ok());

        registry.quarantine(&node_id);

        let err = registry.authorize(&node_id).unwrap_err();
        assert!(matches!(err, SecurityError::PeerQuarantined { .. }));
        let record = registry.get(&node_id).unwrap();
        assert!(record.session_handle.is_none());
    }

    #[test]
    fn quarantine_is_absorbing() {
        let registry = PeerRegistry::new();
        let node_id = "peer-5".to_string();
        authenticate_fresh_peer(&registry, &node_id);
        for _ in 0..=SUSPICION_THRESHOLD {
            registry.record_suspicion(&node_id);
        }
        // Valid votes afterward must not resurrect the peer.
        registry.record_valid_vote(&node_id);
        let record = registry.get(&node_id).unwrap();
        assert_eq!(record.status, PeerStatus::Quarantined);
    }
}
