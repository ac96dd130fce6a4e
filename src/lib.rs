//! A Byzantine-fault-tolerant verification quorum: peer registry, consensus
//! engine, audit chain, and quorum strategy, wired together as a single
//! embeddable facade.
//!
//! [`QuorumCore`] is the surface the rest of a host application uses. It
//! owns no network I/O itself — transports are supplied by the caller per
//! [`qbft_consensus::PeerTransport`] — and exposes no CLI; this is a pure
//! library.

pub mod config;
pub mod error;
pub mod telemetry;

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qbft_audit::{AuditChain, AuditRecord, ConsensusOutcome};
use qbft_consensus::{ConsensusEngine, Event, Member};
use qbft_security::{NodeIdentity, NodeKeyPair, PeerRegistry};
use qbft_strategy::{NetworkTopology, QuorumInfeasible, QuorumMembership, SizingConfig};
use rsa::RsaPublicKey;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub use config::QuorumConfig;
pub use error::QuorumCoreError;

/// Result of a successful `submit_proposal` call.
#[derive(Debug, Clone)]
pub struct ProposalOutcome {
    pub outcome: ConsensusOutcome,
    pub audit_index: u64,
}

/// Result of a `verify_audit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditVerification {
    pub valid: bool,
    pub first_tampered_index: Option<u64>,
}

/// Orchestrates the Peer Registry, Consensus Engine, Audit Chain, and
/// Quorum Strategy as one coherent core.
pub struct QuorumCore {
    identity: NodeIdentity,
    registry: Arc<PeerRegistry>,
    audit: Arc<AuditChain>,
    engine: Arc<ConsensusEngine>,
    keypair: Arc<NodeKeyPair>,
    strategy_config: SizingConfig,
    events: broadcast::Sender<Event>,
}

impl QuorumCore {
    /// Build a core rooted at `data_dir` for audit storage, using
    /// `identity`/`keypair` as this node's own signing credentials.
    pub async fn new(
        data_dir: &Path,
        identity: NodeIdentity,
        keypair: NodeKeyPair,
        config: QuorumConfig,
    ) -> Result<Self, QuorumCoreError> {
        info!(node_id = %identity, "initializing quorum core");

        let registry = Arc::new(PeerRegistry::with_config(config.security.into()));
        let audit = Arc::new(
            AuditChain::open_with_cache(data_dir, config.audit.tail_cache_size)
                .map_err(QuorumCoreError::Audit)?,
        );
        let keypair = Arc::new(keypair);

        let engine = Arc::new(ConsensusEngine::new(
            config.consensus.into(),
            Arc::clone(&registry),
            Arc::clone(&audit),
            identity.clone(),
            Arc::clone(&keypair),
        ));

        let (events, _rx) = broadcast::channel(256);
        spawn_event_forwarders(&engine, &registry, &events);

        Ok(Self {
            identity,
            registry,
            audit,
            engine,
            keypair,
            strategy_config: config.strategy.into(),
            events,
        })
    }

    /// This node's own identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Subscribe to the merged event stream: `PeerQuarantined`,
    /// `RoundAborted`, `AuditTampering`, `ConsensusReached`.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Register a peer's public key with the Peer Registry, issuing it an
    /// authentication challenge. The out-of-band bootstrap process is
    /// expected to deliver the returned challenge to the peer and present
    /// its signature back via [`PeerRegistry::authenticate`].
    pub fn register_peer(&self, node_id: &NodeIdentity, public_key: RsaPublicKey) -> Vec<u8> {
        self.registry.issue_challenge(node_id, public_key)
    }

    /// Recompute the recommended membership for the next round from a fresh
    /// topology snapshot.
    pub fn recommend_membership(
        &self,
        topology: &NetworkTopology,
    ) -> Result<QuorumMembership, QuorumInfeasible> {
        qbft_strategy::select_membership(topology, self.strategy_config)
    }

    /// Submit a proposal and drive it to completion.
    pub async fn submit_proposal(
        &self,
        payload: Vec<u8>,
        membership: &[Member],
        deadline: DateTime<Utc>,
    ) -> Result<ProposalOutcome, QuorumCoreError> {
        let outcome = self
            .engine
            .run_proposal(payload, membership, deadline)
            .await?;
        let audit_index = self
            .audit
            .get_range(None)
            .map_err(QuorumCoreError::Audit)?
            .last()
            .map(|r| r.index)
            .unwrap_or(0);
        Ok(ProposalOutcome {
            outcome,
            audit_index,
        })
    }

    /// Fetch a range of audit records, or the whole chain.
    pub fn get_audit_chain(&self, range: Option<Range<u64>>) -> Result<Vec<AuditRecord>, QuorumCoreError> {
        self.audit.get_range(range).map_err(QuorumCoreError::Audit)
    }

    /// Verify the audit chain against this node's own verifying key, and
    /// surface any tamper evidence through the event stream.
    pub fn verify_audit(&self) -> Result<AuditVerification, QuorumCoreError> {
        let report = self
            .audit
            .verify(None, self.keypair.public_key())
            .map_err(QuorumCoreError::Audit)?;

        if let Some(index) = report.first_tampered_index {
            warn!(index, "audit tampering detected");
            let _ = self.events.send(Event::AuditTampering {
                first_tampered_index: index,
            });
        }

        Ok(AuditVerification {
            valid: report.valid,
            first_tampered_index: report.first_tampered_index,
        })
    }

    /// Periodic maintenance: sweep expired peer sessions. Intended to run
    /// on roughly a one-minute cadence.
    pub fn sweep_expired_sessions(&self) {
        self.registry.sweep_expired();
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn audit_chain(&self) -> &Arc<AuditChain> {
        &self.audit
    }
}

fn spawn_event_forwarders(
    engine: &Arc<ConsensusEngine>,
    registry: &Arc<PeerRegistry>,
    sink: &broadcast::Sender<Event>,
) {
    let mut engine_events = engine.subscribe_events();
    let engine_sink = sink.clone();
    tokio::spawn(async move {
        while let Ok(event) = engine_events.recv().await {
            let _ = engine_sink.send(event);
        }
    });

    let mut quarantine_events = registry.subscribe_quarantine();
    let quarantine_sink = sink.clone();
    tokio::spawn(async move {
        while let Ok(node_id) = quarantine_events.recv().await {
            let _ = quarantine_sink.send(Event::PeerQuarantined { node_id });
        }
    });
}
