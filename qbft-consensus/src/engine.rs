//! The consensus engine: drives one proposal at a time through
//! authenticate → distribute → collect votes → evaluate → commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use qbft_audit::{AuditChain, ConsensusOutcome};
use qbft_security::canonical::{canonical_bytes, Field};
use qbft_security::{crypto, NodeIdentity, NodeKeyPair, PeerRegistry};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tokio::time::timeout_at;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ConsensusError;
use crate::events::Event;
use crate::transport::{Destination, MessageKind, PeerTransport, WireMessage};
use crate::types::{ConsensusConfig, Proposal, ProposalBody, Vote};

/// One registered member of a round: identity, verifying key, and the
/// transport used to reach it.
pub struct Member {
    pub node_id: NodeIdentity,
    pub public_key: RsaPublicKey,
    pub transport: Arc<dyn PeerTransport>,
}

/// Drives proposals through the vote/evaluate/commit lifecycle and binds
/// every committed outcome into the audit chain.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    registry: Arc<PeerRegistry>,
    audit: Arc<AuditChain>,
    identity: NodeIdentity,
    keypair: Arc<NodeKeyPair>,
    round_counter: AtomicU64,
    events: broadcast::Sender<Event>,
}

impl ConsensusEngine {
    pub fn new(
        config: ConsensusConfig,
        registry: Arc<PeerRegistry>,
        audit: Arc<AuditChain>,
        identity: NodeIdentity,
        keypair: Arc<NodeKeyPair>,
    ) -> Self {
        let (events, _rx) = broadcast::channel(256);
        Self {
            config,
            registry,
            audit,
            identity,
            keypair,
            round_counter: AtomicU64::new(0),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Supermajority threshold `⌈2n/3⌉` for `n` voters.
    fn supermajority_threshold(n: usize) -> usize {
        (2 * n + 2) / 3
    }

    /// Run one proposal to completion: authenticate membership, distribute,
    /// collect votes up to `deadline`, evaluate, and (on commit) seal the
    /// outcome into the audit chain.
    pub async fn run_proposal(
        &self,
        payload: Vec<u8>,
        membership: &[Member],
        deadline: DateTime<Utc>,
    ) -> Result<ConsensusOutcome, ConsensusError> {
        if payload.len() > self.config.max_payload_bytes {
            return Err(ConsensusError::InputMalformed(format!(
                "payload of {} bytes exceeds the {}-byte limit",
                payload.len(),
                self.config.max_payload_bytes
            )));
        }

        let now = Utc::now();
        if deadline <= now {
            return Err(ConsensusError::InputMalformed(
                "deadline must be in the future".to_string(),
            ));
        }
        let max_deadline = now + chrono::Duration::from_std(self.config.max_round_duration).unwrap();
        if deadline > max_deadline {
            return Err(ConsensusError::InputMalformed(format!(
                "deadline exceeds the configured maximum round duration of {:?}",
                self.config.max_round_duration
            )));
        }

        let required = 3 * self.config.max_byzantine_faults + 1;
        if membership.len() < required {
            return Err(ConsensusError::InsufficientQuorum {
                required,
                available: membership.len(),
            });
        }

        for member in membership {
            if !member.transport.security().meets_floor() {
                return Err(ConsensusError::InsecureTransport {
                    node_id: member.node_id.clone(),
                });
            }
            self.registry.authorize(&member.node_id)?;
        }

        let round = self.round_counter.fetch_add(1, Ordering::SeqCst);
        let proposal_id = Uuid::new_v4().to_string();
        let payload_hash = hex::encode(hash_payload(&self.identity, now, &payload));

        let proposal = Proposal {
            proposal_id: proposal_id.clone(),
            payload,
            payload_hash: payload_hash.clone(),
            opened_at: now,
            deadline_at: deadline,
            round,
        };

        info!(proposal_id = %proposal.proposal_id, round, members = membership.len(), "proposal opened");

        let votes = self.collect_votes(&proposal, membership, deadline).await;

        self.evaluate_and_commit(proposal, membership, votes).await
    }

    /// Concurrently dispatch the proposal to every member and collect
    /// replies up to the deadline. One member's latency never blocks
    /// another's send or receipt.
    async fn collect_votes(
        &self,
        proposal: &Proposal,
        membership: &[Member],
        deadline: DateTime<Utc>,
    ) -> Vec<Vote> {
        let body = serde_json::to_vec(&ProposalBody {
            proposal_id: proposal.proposal_id.clone(),
            payload: proposal.payload.clone(),
            payload_hash: proposal.payload_hash.clone(),
            deadline_at: proposal.deadline_at,
        })
        .unwrap_or_default();

        let mut inflight = FuturesUnordered::new();
        for member in membership {
            let msg = WireMessage {
                message_kind: MessageKind::Proposal,
                from: self.identity.clone(),
                to: Destination::Peer(member.node_id.clone()),
                body: body.clone(),
                timestamp: Utc::now(),
                signature: String::new(),
            };
            inflight.push(async move { member.transport.send(msg).await });
        }

        let deadline_instant = deadline_to_instant(deadline);
        let mut votes = Vec::with_capacity(membership.len());

        loop {
            if votes.len() >= membership.len() {
                break;
            }
            let next = timeout_at(deadline_instant, inflight.next()).await;
            match next {
                Ok(Some(Ok(reply))) => {
                    if let Some(vote) = decode_vote(&reply) {
                        votes.push(vote);
                    }
                }
                Ok(Some(Err(_))) => {
                    // send/transport failure: silence, not Byzantine evidence.
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(proposal_id = %proposal.proposal_id, "round deadline reached while awaiting votes");
                    break;
                }
            }
        }

        votes
    }

    async fn evaluate_and_commit(
        &self,
        proposal: Proposal,
        membership: &[Member],
        votes: Vec<Vote>,
    ) -> Result<ConsensusOutcome, ConsensusError> {
        let mut verified = Vec::with_capacity(votes.len());
        let mut byzantine_voters = Vec::new();

        for vote in votes {
            match self.verify_vote(&proposal, membership, &vote) {
                Ok(()) => verified.push(vote),
                Err(node_id) => {
                    self.registry.record_suspicion(&node_id);
                    byzantine_voters.push(node_id);
                }
            }
        }

        let n = membership.len();
        let threshold = Self::supermajority_threshold(n);
        let v = verified.len();
        let a = verified.iter().filter(|vote| vote.decision).count();

        let f = self.config.max_byzantine_faults;
        if byzantine_voters.len() > f {
            for node_id in &byzantine_voters {
                self.registry.quarantine(node_id);
            }
            let _ = self.events.send(Event::RoundAborted {
                proposal_id: proposal.proposal_id.clone(),
                reason: "byzantine majority".to_string(),
            });
            return Err(ConsensusError::ByzantineMajority {
                proposal_id: proposal.proposal_id,
                offenders: byzantine_voters.len(),
            });
        }

        let consensus_reached = v >= threshold && (a as f64) / (v.max(1) as f64) >= 2.0 / 3.0;

        if !consensus_reached && v < threshold {
            let _ = self.events.send(Event::RoundAborted {
                proposal_id: proposal.proposal_id.clone(),
                reason: "deadline exceeded".to_string(),
            });
            return Err(ConsensusError::DeadlineExceeded {
                proposal_id: proposal.proposal_id,
                verified_votes: v,
                membership_size: n,
            });
        }

        for vote in &verified {
            if consensus_reached && vote.decision != (a * 3 >= v * 2) {
                self.registry.record_minority_vote(&vote.voter);
            } else {
                self.registry.record_valid_vote(&vote.voter);
            }
        }

        let timestamp = Utc::now();
        let proof_message = canonical_bytes(&[
            ("payload_hash", Field::Text(proposal.payload_hash.clone())),
            ("total_votes", Field::Int(v as i64)),
            ("approvals", Field::Int(a as i64)),
            ("timestamp", Field::Int(timestamp.timestamp())),
        ]);
        let proof = hex::encode(self.keypair.sign(&proof_message).map_err(|e| {
            ConsensusError::InternalSignatureFailure {
                proposal_id: proposal.proposal_id.clone(),
                detail: e.to_string(),
            }
        })?);

        let outcome = ConsensusOutcome {
            proposal_id: proposal.proposal_id.clone(),
            payload_hash: proposal.payload_hash.clone(),
            total_votes: votes_total(v, byzantine_voters.len()),
            valid_votes: v as u64,
            approvals: a as u64,
            consensus_reached,
            byzantine_voters,
            proof,
            timestamp,
        };

        if consensus_reached {
            let keypair = Arc::clone(&self.keypair);
            self.audit.append(outcome.clone(), move |bytes| {
                keypair.sign(bytes).map_err(|e| e.to_string())
            })?;
            let _ = self.events.send(Event::ConsensusReached {
                proposal_id: proposal.proposal_id.clone(),
                approvals: a as u64,
            });
        } else {
            let _ = self.events.send(Event::RoundAborted {
                proposal_id: proposal.proposal_id.clone(),
                reason: "supermajority not reached".to_string(),
            });
        }

        Ok(outcome)
    }

    /// Verify a vote's signature, proposal binding, timestamp window, and
    /// the voter's current authorization. Returns the offending voter's
    /// identity on any failure.
    fn verify_vote(
        &self,
        proposal: &Proposal,
        membership: &[Member],
        vote: &Vote,
    ) -> Result<(), NodeIdentity> {
        let member = membership
            .iter()
            .find(|m| m.node_id == vote.voter)
            .ok_or_else(|| vote.voter.clone())?;

        if vote.proposal_id != proposal.proposal_id {
            return Err(vote.voter.clone());
        }

        if vote.timestamp < proposal.opened_at || vote.timestamp > proposal.deadline_at {
            return Err(vote.voter.clone());
        }

        if self.registry.authorize(&vote.voter).is_err() {
            return Err(vote.voter.clone());
        }

        let message = canonical_bytes(&[
            ("voter", Field::Text(vote.voter.clone())),
            ("proposal_id", Field::Text(vote.proposal_id.clone())),
            ("decision", Field::Text(vote.decision.to_string())),
            ("nonce", Field::Text(vote.nonce.clone())),
            ("timestamp", Field::Int(vote.timestamp.timestamp())),
        ]);

        let signature = match hex::decode(&vote.signature) {
            Ok(sig) => sig,
            Err(_) => return Err(vote.voter.clone()),
        };

        if !crypto::verify(&member.public_key, &message, &signature) {
            return Err(vote.voter.clone());
        }

        Ok(())
    }
}

fn votes_total(verified: usize, byzantine: usize) -> u64 {
    (verified + byzantine) as u64
}

fn hash_payload(node_id: &NodeIdentity, now: DateTime<Utc>, payload: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(node_id.as_bytes());
    hasher.update(now.timestamp().to_be_bytes());
    hasher.update(payload);
    hasher.finalize().to_vec()
}

fn decode_vote(reply: &WireMessage) -> Option<Vote> {
    if reply.message_kind != MessageKind::Vote {
        return None;
    }
    serde_json::from_slice(&reply.body).ok()
}

fn deadline_to_instant(deadline: DateTime<Utc>) -> tokio::time::Instant {
    let now_chrono = Utc::now();
    let now_instant = tokio::time::Instant::now();
    let delta = deadline - now_chrono;
    match delta.to_std() {
        Ok(std_delta) => now_instant + std_delta,
        Err(_) => now_instant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_matches_ceiling_of_two_thirds() {
        assert_eq!(ConsensusEngine::supermajority_threshold(7), 5);
        assert_eq!(ConsensusEngine::supermajority_threshold(4), 3);
        assert_eq!(ConsensusEngine::supermajority_threshold(3), 2);
        assert_eq!(ConsensusEngine::supermajority_threshold(1), 1);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any number of voters tolerating `f ≤ (n-1)/3` Byzantine
        /// voters, the supermajority threshold this engine enforces is at
        /// least `⌈2n/3⌉`, the bound required for BFT safety.
        #[test]
        fn threshold_is_at_least_ceiling_two_thirds(n in 1usize..1000) {
            let threshold = ConsensusEngine::supermajority_threshold(n);
            let ceiling_two_thirds = (2 * n + 2) / 3;
            prop_assert_eq!(threshold, ceiling_two_thirds);
            prop_assert!(threshold * 3 >= 2 * n);
        }
    }
}
