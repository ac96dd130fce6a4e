//! End-to-end scenarios exercising the full round lifecycle: authenticate
//! a membership, submit a proposal, collect votes over a fake transport,
//! and check the resulting outcome and audit trail.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use qbft_audit::AuditChain;
use qbft_consensus::{
    Cipher, ConsensusConfig, ConsensusEngine, ConsensusError, Destination, Member, MessageKind,
    PeerTransport, ProposalBody, TransportError, TransportSecurity, Vote, WireMessage,
};
use qbft_security::canonical::{canonical_bytes, Field};
use qbft_security::{crypto, NodeKeyPair, PeerRegistry};

/// How a fake peer responds when it receives a proposal.
enum Behavior {
    /// Sign a genuine vote with the given decision.
    Honest(bool),
    /// Sign a vote over the wrong message, so it fails verification.
    Forged,
    /// Never reply.
    Silent,
}

struct FakeTransport {
    node_id: String,
    keypair: Arc<NodeKeyPair>,
    behavior: Behavior,
}

#[async_trait::async_trait]
impl PeerTransport for FakeTransport {
    fn security(&self) -> TransportSecurity {
        TransportSecurity {
            tls_1_3: true,
            cipher: Cipher::Aes256Gcm,
        }
    }

    async fn send(&self, msg: WireMessage) -> Result<WireMessage, TransportError> {
        match &self.behavior {
            Behavior::Silent => {
                tokio::time::sleep(StdDuration::from_secs(3600)).await;
                unreachable!("silent peers never reply");
            }
            Behavior::Honest(decision) => {
                let body: ProposalBody = serde_json::from_slice(&msg.body).unwrap();
                let vote = sign_vote(&self.node_id, &self.keypair, &body.proposal_id, *decision);
                Ok(vote_message(&self.node_id, vote))
            }
            Behavior::Forged => {
                let body: ProposalBody = serde_json::from_slice(&msg.body).unwrap();
                let mut vote = sign_vote(&self.node_id, &self.keypair, &body.proposal_id, true);
                // Sign over a tampered nonce so the signature no longer matches
                // the canonical message the engine recomputes.
                vote.signature = hex::encode(
                    self.keypair
                        .sign(b"not the real canonical message")
                        .expect("sign"),
                );
                Ok(vote_message(&self.node_id, vote))
            }
        }
    }
}

fn sign_vote(node_id: &str, keypair: &NodeKeyPair, proposal_id: &str, decision: bool) -> Vote {
    let timestamp = Utc::now();
    let nonce = uuid::Uuid::new_v4().to_string();
    let message = canonical_bytes(&[
        ("voter", Field::Text(node_id.to_string())),
        ("proposal_id", Field::Text(proposal_id.to_string())),
        ("decision", Field::Text(decision.to_string())),
        ("nonce", Field::Text(nonce.clone())),
        ("timestamp", Field::Int(timestamp.timestamp())),
    ]);
    let signature = hex::encode(keypair.sign(&message).expect("sign"));
    Vote {
        voter: node_id.to_string(),
        proposal_id: proposal_id.to_string(),
        decision,
        nonce,
        timestamp,
        signature,
    }
}

fn vote_message(node_id: &str, vote: Vote) -> WireMessage {
    WireMessage {
        message_kind: MessageKind::Vote,
        from: node_id.to_string(),
        to: Destination::Peer("committer".to_string()),
        body: serde_json::to_vec(&vote).unwrap(),
        timestamp: Utc::now(),
        signature: String::new(),
    }
}

/// Authenticate a fresh peer into `registry` and return its identity,
/// keypair, and public key.
fn authenticate_peer(registry: &PeerRegistry, label: &str) -> (String, Arc<NodeKeyPair>) {
    let keypair = Arc::new(NodeKeyPair::generate(4096).unwrap());
    let node_id = format!("peer-{label}");
    let nonce = registry.issue_challenge(&node_id, keypair.public_key().clone());
    let message = canonical_bytes(&[
        ("node_id", Field::Text(node_id.clone())),
        ("nonce", Field::Bytes(nonce)),
    ]);
    let signature = keypair.sign(&message).expect("sign");
    registry.authenticate(&node_id, &signature).unwrap();
    (node_id, keypair)
}

fn member(node_id: String, keypair: Arc<NodeKeyPair>, behavior: Behavior) -> Member {
    let public_key = keypair.public_key().clone();
    Member {
        node_id: node_id.clone(),
        public_key,
        transport: Arc::new(FakeTransport {
            node_id,
            keypair,
            behavior,
        }),
    }
}

fn test_engine(registry: Arc<PeerRegistry>, max_byzantine_faults: usize) -> (ConsensusEngine, Arc<AuditChain>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditChain::open(dir.path()).unwrap());
    let committer_key = Arc::new(NodeKeyPair::generate(4096).unwrap());
    let engine = ConsensusEngine::new(
        ConsensusConfig {
            max_byzantine_faults,
            max_round_duration: StdDuration::from_secs(30),
            max_payload_bytes: 1 << 20,
        },
        registry,
        Arc::clone(&audit),
        "committer".to_string(),
        committer_key,
    );
    (engine, audit, dir)
}

#[tokio::test]
async fn s1_clean_approval() {
    let registry = Arc::new(PeerRegistry::new());
    let (engine, audit, _dir) = test_engine(Arc::clone(&registry), 2);

    let membership: Vec<Member> = (0..7)
        .map(|i| {
            let (node_id, keypair) = authenticate_peer(&registry, &i.to_string());
            member(node_id, keypair, Behavior::Honest(true))
        })
        .collect();

    let deadline = Utc::now() + ChronoDuration::seconds(5);
    let outcome = engine
        .run_proposal(b"deploy-v42".to_vec(), &membership, deadline)
        .await
        .unwrap();

    assert!(outcome.consensus_reached);
    assert_eq!(outcome.approvals, 7);
    assert_eq!(audit.len(), 1);
    let record = audit.get_range(Some(0..1)).unwrap().remove(0);
    assert_eq!(record.outcome.proposal_id, outcome.proposal_id);
}

#[tokio::test]
async fn s2_two_byzantine_votes() {
    let registry = Arc::new(PeerRegistry::new());
    let (engine, _audit, _dir) = test_engine(Arc::clone(&registry), 2);

    let mut membership = Vec::new();
    let mut forgers = Vec::new();
    for i in 0..5 {
        let (node_id, keypair) = authenticate_peer(&registry, &format!("honest-{i}"));
        membership.push(member(node_id, keypair, Behavior::Honest(true)));
    }
    for i in 0..2 {
        let (node_id, keypair) = authenticate_peer(&registry, &format!("forger-{i}"));
        forgers.push(node_id.clone());
        membership.push(member(node_id, keypair, Behavior::Forged));
    }

    let deadline = Utc::now() + ChronoDuration::seconds(5);
    let outcome = engine
        .run_proposal(b"deploy-v43".to_vec(), &membership, deadline)
        .await
        .unwrap();

    assert!(outcome.consensus_reached);
    assert_eq!(outcome.approvals, 5);
    assert_eq!(outcome.byzantine_voters.len(), 2);
    for forger in &forgers {
        assert!(outcome.byzantine_voters.contains(forger));
        let record = registry.get(forger).unwrap();
        assert!(record.trust_score < 1.0);
    }
}

#[tokio::test]
async fn s3_deadline_miss() {
    let registry = Arc::new(PeerRegistry::new());
    let (engine, audit, _dir) = test_engine(Arc::clone(&registry), 2);

    let mut membership = Vec::new();
    let mut silent = Vec::new();
    for i in 0..3 {
        let (node_id, keypair) = authenticate_peer(&registry, &format!("responder-{i}"));
        membership.push(member(node_id, keypair, Behavior::Honest(true)));
    }
    for i in 0..4 {
        let (node_id, keypair) = authenticate_peer(&registry, &format!("silent-{i}"));
        silent.push(node_id.clone());
        membership.push(member(node_id, keypair, Behavior::Silent));
    }

    let deadline = Utc::now() + ChronoDuration::seconds(1);
    let err = engine
        .run_proposal(b"deploy-v44".to_vec(), &membership, deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, ConsensusError::DeadlineExceeded { .. }));
    assert_eq!(audit.len(), 0);
    for node_id in &silent {
        let record = registry.get(node_id).unwrap();
        assert_eq!(record.trust_score, 1.0);
    }
}

#[tokio::test]
async fn s5_insufficient_quorum() {
    let registry = Arc::new(PeerRegistry::new());
    let (engine, _audit, _dir) = test_engine(Arc::clone(&registry), 1);

    let membership: Vec<Member> = (0..3)
        .map(|i| {
            let (node_id, keypair) = authenticate_peer(&registry, &format!("peer-{i}"));
            member(node_id, keypair, Behavior::Honest(true))
        })
        .collect();

    let deadline = Utc::now() + ChronoDuration::seconds(5);
    let err = engine
        .run_proposal(b"deploy-v45".to_vec(), &membership, deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, ConsensusError::InsufficientQuorum { required: 4, available: 3 }));
}

#[tokio::test]
async fn s6_partition_recovery_falls_short() {
    let registry = Arc::new(PeerRegistry::new());
    let (engine, _audit, _dir) = test_engine(Arc::clone(&registry), 1);

    let mut membership = Vec::new();
    for i in 0..2 {
        let (node_id, keypair) = authenticate_peer(&registry, &format!("approve-{i}"));
        membership.push(member(node_id, keypair, Behavior::Honest(true)));
    }
    for i in 0..2 {
        let (node_id, keypair) = authenticate_peer(&registry, &format!("reject-{i}"));
        membership.push(member(node_id, keypair, Behavior::Honest(false)));
    }

    let deadline = Utc::now() + ChronoDuration::seconds(5);
    let outcome = engine
        .run_proposal(b"deploy-v46".to_vec(), &membership, deadline)
        .await
        .unwrap();

    assert!(!outcome.consensus_reached);
    assert_eq!(outcome.valid_votes, 4);
    assert_eq!(outcome.approvals, 2);
}
