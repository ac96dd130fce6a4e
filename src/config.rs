//! Configuration loading and persistence for the quorum core.
//!
//! Settings are loaded from `config.json` in the working directory if
//! present; otherwise a default configuration is written there and used.
//! This mirrors how the facade expects to be embedded: no command-line
//! flags, no environment-variable plumbing beyond `RUST_LOG`.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use qbft_strategy::SizingConfig;

/// Root configuration for every subsystem the facade wires together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    pub security: SecurityConfig,
    pub consensus: ConsensusRoundConfig,
    pub strategy: StrategyConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Minimum RSA modulus size, in bits, accepted from a peer's key.
    pub min_key_bits: usize,
    #[serde(with = "duration_secs")]
    pub session_lifetime: Duration,
    pub suspicion_threshold: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        let defaults = qbft_security::RegistryConfig::default();
        Self {
            min_key_bits: defaults.min_key_bits,
            session_lifetime: defaults.session_lifetime,
            suspicion_threshold: defaults.suspicion_threshold,
        }
    }
}

impl From<SecurityConfig> for qbft_security::RegistryConfig {
    fn from(value: SecurityConfig) -> Self {
        qbft_security::RegistryConfig {
            min_key_bits: value.min_key_bits,
            session_lifetime: value.session_lifetime,
            suspicion_threshold: value.suspicion_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRoundConfig {
    pub max_byzantine_faults: usize,
    #[serde(with = "duration_secs")]
    pub max_round_duration: Duration,
    pub max_payload_bytes: usize,
}

impl Default for ConsensusRoundConfig {
    fn default() -> Self {
        let defaults = qbft_consensus::ConsensusConfig::default();
        Self {
            max_byzantine_faults: defaults.max_byzantine_faults,
            max_round_duration: defaults.max_round_duration,
            max_payload_bytes: defaults.max_payload_bytes,
        }
    }
}

impl From<ConsensusRoundConfig> for qbft_consensus::ConsensusConfig {
    fn from(value: ConsensusRoundConfig) -> Self {
        qbft_consensus::ConsensusConfig {
            max_byzantine_faults: value.max_byzantine_faults,
            max_round_duration: value.max_round_duration,
            max_payload_bytes: value.max_payload_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub floor: usize,
    pub ceiling: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let defaults = SizingConfig::default();
        Self {
            floor: defaults.floor,
            ceiling: defaults.ceiling,
        }
    }
}

impl From<StrategyConfig> for SizingConfig {
    fn from(value: StrategyConfig) -> Self {
        SizingConfig {
            floor: value.floor,
            ceiling: value.ceiling,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub data_dir: String,
    pub tail_cache_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: "quorum-audit".to_string(),
            tail_cache_size: 256,
        }
    }
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            security: SecurityConfig::default(),
            consensus: ConsensusRoundConfig::default(),
            strategy: StrategyConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl QuorumConfig {
    /// Load from `config.json`, writing out the defaults if absent.
    pub async fn load() -> Result<Self> {
        match tokio::fs::read_to_string("config.json").await {
            Ok(content) => serde_json::from_str(&content).context("failed to parse config.json"),
            Err(_) => {
                let default_config = Self::default();
                default_config.save().await?;
                Ok(default_config)
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write("config.json", content).await?;
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
