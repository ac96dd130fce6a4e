//! The tamper-evident audit chain.
//!
//! Every committed consensus outcome is sealed into one [`AuditRecord`] that
//! binds the hash of its predecessor. Appends are serialized through an
//! internal lock so there is never a race to decide what the "tail" is;
//! `verify` walks the chain without touching that lock, so it can run
//! concurrently with appends over whatever prefix was durable when it
//! started.

use std::collections::VecDeque;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use qbft_security::canonical::{canonical_bytes, Field};
use qbft_security::crypto;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::AuditError;
use crate::types::{genesis_hash, AuditRecord, ConsensusOutcome};

/// How many of the most recent records are kept resident in memory.
const DEFAULT_TAIL_CACHE: usize = 256;

/// Outcome of a `verify` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub valid: bool,
    pub first_tampered_index: Option<u64>,
}

pub struct AuditChain {
    db: sled::Db,
    append_lock: Mutex<()>,
    next_index: AtomicU64,
    tail_cache: Mutex<VecDeque<AuditRecord>>,
    tail_cache_capacity: usize,
}

impl AuditChain {
    /// Open (or create) an audit chain backed by a sled database at `path`.
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        Self::open_with_cache(path, DEFAULT_TAIL_CACHE)
    }

    pub fn open_with_cache(path: &Path, tail_cache_capacity: usize) -> Result<Self, AuditError> {
        let db = sled::open(path)?;
        let next_index = db
            .last()?
            .map(|(key, _)| u64::from_be_bytes(key.as_ref().try_into().unwrap()) + 1)
            .unwrap_or(0);

        let mut tail_cache = VecDeque::with_capacity(tail_cache_capacity);
        for entry in db.iter().rev().take(tail_cache_capacity) {
            let (_, value) = entry?;
            let record: AuditRecord = serde_json::from_slice(&value)?;
            tail_cache.push_front(record);
        }

        info!(next_index, "audit chain opened");
        Ok(Self {
            db,
            append_lock: Mutex::new(()),
            next_index: AtomicU64::new(next_index),
            tail_cache: Mutex::new(tail_cache),
            tail_cache_capacity,
        })
    }

    /// Append `outcome`, signed by the committing node's keypair, as the
    /// next record in the chain. Returns the new record's index.
    pub fn append(
        &self,
        outcome: ConsensusOutcome,
        sign: impl FnOnce(&[u8]) -> Result<Vec<u8>, String>,
    ) -> Result<u64, AuditError> {
        let _guard = self.append_lock.lock();

        let previous_hash = self
            .tail_cache
            .lock()
            .back()
            .map(|r| r.record_hash.clone())
            .unwrap_or_else(genesis_hash);

        let index = self.next_index.load(Ordering::SeqCst);
        let record_hash = compute_record_hash(index, &outcome, &previous_hash);
        let record_signature =
            hex::encode(sign(record_hash.as_bytes()).map_err(AuditError::SigningFailed)?);

        let record = AuditRecord {
            index,
            outcome,
            previous_hash,
            record_hash,
            record_signature,
        };

        let key = index.to_be_bytes();
        let value = serde_json::to_vec(&record)?;
        self.db.insert(key, value)?;
        self.db.flush()?;

        self.next_index.store(index + 1, Ordering::SeqCst);
        {
            let mut cache = self.tail_cache.lock();
            cache.push_back(record);
            while cache.len() > self.tail_cache_capacity {
                cache.pop_front();
            }
        }

        Ok(index)
    }

    /// Walk the chain (optionally restricted to `range`) verifying every
    /// hash link and signature. Returns the first index where something
    /// doesn't match, if any.
    pub fn verify(
        &self,
        range: Option<Range<u64>>,
        verifying_key: &RsaPublicKey,
    ) -> Result<VerifyReport, AuditError> {
        let mut expected_previous = genesis_hash();
        let mut first_tampered = None;

        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            match &range {
                Some(r) => Box::new(
                    self.db
                        .range(r.start.to_be_bytes()..r.end.to_be_bytes()),
                ),
                None => Box::new(self.db.iter()),
            };

        for entry in iter {
            let (_, value) = entry?;
            let record: AuditRecord = serde_json::from_slice(&value)?;

            let recomputed = compute_record_hash(record.index, &record.outcome, &expected_previous);
            let chain_ok = record.previous_hash == expected_previous;
            let hash_ok = record.record_hash == recomputed;
            let signature_ok = verify_hex_signature(
                verifying_key,
                record.record_hash.as_bytes(),
                &record.record_signature,
            );

            if !chain_ok || !hash_ok || !signature_ok {
                warn!(index = record.index, "audit chain tamper detected");
                first_tampered = Some(record.index);
                break;
            }

            expected_previous = record.record_hash;
        }

        Ok(VerifyReport {
            valid: first_tampered.is_none(),
            first_tampered_index: first_tampered,
        })
    }

    /// A content-addressed identifier for the chain's state at this instant:
    /// SHA-256 over the canonical serialization of every record hash plus
    /// `name` and the record count.
    pub fn snapshot(&self, name: &str) -> Result<String, AuditError> {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        let mut count: u64 = 0;
        for entry in self.db.iter() {
            let (_, value) = entry?;
            let record: AuditRecord = serde_json::from_slice(&value)?;
            hasher.update(record.record_hash.as_bytes());
            count += 1;
        }
        hasher.update(count.to_be_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Fetch a range of records (inclusive-exclusive), or the whole chain.
    pub fn get_range(&self, range: Option<Range<u64>>) -> Result<Vec<AuditRecord>, AuditError> {
        let iter: Box<dyn Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>> =
            match &range {
                Some(r) => Box::new(
                    self.db
                        .range(r.start.to_be_bytes()..r.end.to_be_bytes()),
                ),
                None => Box::new(self.db.iter()),
            };

        let mut out = Vec::new();
        for entry in iter {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn len(&self) -> u64 {
        self.next_index.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compute_record_hash(index: u64, outcome: &ConsensusOutcome, previous_hash: &str) -> String {
    let bytes = canonical_bytes(&[
        ("index", Field::Int(index as i64)),
        ("previous_hash", Field::Text(previous_hash.to_string())),
        ("proposal_id", Field::Text(outcome.proposal_id.clone())),
        ("payload_hash", Field::Text(outcome.payload_hash.clone())),
        ("total_votes", Field::Int(outcome.total_votes as i64)),
        ("valid_votes", Field::Int(outcome.valid_votes as i64)),
        ("approvals", Field::Int(outcome.approvals as i64)),
        (
            "consensus_reached",
            Field::Text(outcome.consensus_reached.to_string()),
        ),
        ("timestamp", Field::Int(outcome.timestamp.timestamp())),
    ]);
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

fn verify_hex_signature(public_key: &RsaPublicKey, message: &[u8], signature_hex: &str) -> bool {
    match hex::decode(signature_hex) {
        Ok(signature) => crypto::verify(public_key, message, &signature),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConsensusOutcome;
    use qbft_security::crypto::NodeKeyPair;

    fn sample_outcome(proposal_id: &str) -> ConsensusOutcome {
        ConsensusOutcome {
            proposal_id: proposal_id.to_string(),
            payload_hash: "deadbeef".to_string(),
            total_votes: 7,
            valid_votes: 7,
            approvals: 7,
            consensus_reached: true,
            byzantine_voters: vec![],
            proof: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn appends_form_a_valid_chain() {
        let dir = tempfile::tempdir().unwrap();
        let chain = AuditChain::open(dir.path()).unwrap();
        let keypair = NodeKeyPair::generate(4096).unwrap();

        for i in 0..5 {
            let outcome = sample_outcome(&format!("p{i}"));
            let index = chain
                .append(outcome, |bytes| keypair.sign(bytes).map_err(|e| e.to_string()))
                .unwrap();
            assert_eq!(index, i);
        }

        let report = chain.verify(None, keypair.public_key()).unwrap();
        assert!(report.valid);
        assert_eq!(report.first_tampered_index, None);
    }

    #[test]
    fn single_byte_mutation_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let chain = AuditChain::open(dir.path()).unwrap();
        let keypair = NodeKeyPair::generate(4096).unwrap();

        for i in 0..5 {
            chain
                .append(sample_outcome(&format!("p{i}")), |bytes| {
                    keypair.sign(bytes).map_err(|e| e.to_string())
                })
                .unwrap();
        }

        let mut tampered = chain.get_range(Some(3..4)).unwrap().remove(0);
        tampered.record_hash.replace_range(0..1, "f");
        let key = tampered.index.to_be_bytes();
        chain
            .db
            .insert(key, serde_json::to_vec(&tampered).unwrap())
            .unwrap();

        let report = chain.verify(None, keypair.public_key()).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_tampered_index, Some(3));
    }
}
