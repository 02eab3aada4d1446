//! Configuration Management Module
//!
//! Loads the relayer configuration from TOML: chain endpoints, the workers to run,
//! and how the worker pool reacts to a failing worker.
//!
//! Private keys are never stored in the file. The file names the environment
//! variable that holds the key.

use ethereum_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pool-wide settings
    #[serde(default)]
    pub relay: RelayConfig,
    /// Ethereum node, contracts, and submission settings
    pub ethereum: EthereumConfig,
    /// Parachain node settings (eth-relayer destination)
    pub parachain: ParachainConfig,
    /// Relay chain node settings (beefy-relayer source)
    pub relaychain: RelaychainConfig,
    /// Workers to run, in start order
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

/// Pool-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// How the pool reacts when one worker fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The first failure cancels every worker and is returned from the pool
    #[default]
    FailFast,
    /// Only the failing worker is stopped and restarted, up to `max_restarts` times
    Isolate {
        max_restarts: u32,
        restart_delay_ms: u64,
    },
}

/// Ethereum chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Number of descendant blocks after which a block is considered final
    #[serde(default = "default_descendants_until_final")]
    pub descendants_until_final: u64,
    /// Head polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Contracts whose logs are relayed to the parachain
    #[serde(default)]
    pub channel_addresses: Vec<Address>,
    /// Light client contract the beefy-relayer submits to
    #[serde(default)]
    pub beefy_light_client: Option<Address>,
    /// Environment variable name containing the relayer's secp256k1 private key (hex)
    /// Default: "RELAYER_ETH_PRIVATE_KEY"
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    /// JSON-RPC method that submits an initial commitment message
    #[serde(default = "default_submit_initial_method")]
    pub submit_initial_method: String,
    /// JSON-RPC method that submits a complete commitment message
    #[serde(default = "default_submit_complete_method")]
    pub submit_complete_method: String,
}

/// Parachain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParachainConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Storage key of the last imported Ethereum header id
    pub finalized_block_storage_key: String,
    /// JSON-RPC method that submits a relayed Ethereum message
    #[serde(default = "default_submit_message_method")]
    pub submit_message_method: String,
}

/// Relay chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaychainConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Finalized head polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Storage key of the current BEEFY authority set
    #[serde(default = "default_beefy_authorities_storage_key")]
    pub beefy_authorities_storage_key: String,
}

/// Kinds of workers the pool knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    /// Ethereum logs to the parachain
    EthRelayer,
    /// Relay chain BEEFY commitments to the Ethereum light client
    BeefyRelayer,
}

impl WorkerKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerKind::EthRelayer => "eth-relayer",
            WorkerKind::BeefyRelayer => "beefy-relayer",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub kind: WorkerKind,
    /// Disabled workers are built but never started
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Capacity of the listener to writer channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl WorkerConfig {
    pub fn new(kind: WorkerKind) -> Self {
        Self {
            kind,
            enabled: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_descendants_until_final() -> u64 {
    35
}

fn default_poll_interval_ms() -> u64 {
    6000
}

fn default_private_key_env() -> String {
    "RELAYER_ETH_PRIVATE_KEY".to_string()
}

fn default_submit_initial_method() -> String {
    "relayer_submitInitialSignatureCommitment".to_string()
}

fn default_submit_complete_method() -> String {
    "relayer_submitCompleteSignatureCommitment".to_string()
}

fn default_submit_message_method() -> String {
    "relayer_submitEthereumMessage".to_string()
}

/// twox128("Beefy") ++ twox128("Authorities")
fn default_beefy_authorities_storage_key() -> String {
    "0x08c41974a97dbf15cfbec28365bea2da5e0621c4869aa60c02be9adcc98a0d1d".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    1
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl EthereumConfig {
    /// Loads the relayer private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (hex encoded)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with the relayer's secp256k1 private key (hex encoded).",
                self.private_key_env
            )
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ParachainConfig {
    /// Parses the finalized header storage key.
    pub fn finalized_block_key(&self) -> anyhow::Result<Vec<u8>> {
        parse_storage_key("parachain.finalized_block_storage_key", &self.finalized_block_storage_key)
    }
}

impl RelaychainConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parses the BEEFY authorities storage key.
    pub fn authorities_key(&self) -> anyhow::Result<Vec<u8>> {
        parse_storage_key(
            "relaychain.beefy_authorities_storage_key",
            &self.beefy_authorities_storage_key,
        )
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// This function:
    /// 1. Uses the provided path, else RELAYER_CONFIG_PATH, else config/relayer.toml
    /// 2. If the file exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - Failed to load, missing file, or validation failed
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("RELAYER_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/relayer.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&content)?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/relayer.template.toml config/relayer.toml\n\
                Then edit config/relayer.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for consistency.
    ///
    /// Checks:
    /// - At least one worker is configured
    /// - No worker kind is listed twice
    /// - Channel capacities are non-zero
    /// - Poll intervals are non-zero
    /// - Enabled workers have the chain settings they need
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() {
            return Err(anyhow::anyhow!("No workers configured. Add at least one [[workers]] entry."));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if !seen.insert(worker.kind) {
                return Err(anyhow::anyhow!("Duplicate worker kind: {}", worker.kind));
            }
            if worker.channel_capacity == 0 {
                return Err(anyhow::anyhow!(
                    "Worker {} has channel_capacity 0; it must be at least 1",
                    worker.kind
                ));
            }
        }

        if self.ethereum.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("ethereum.poll_interval_ms must be greater than 0"));
        }
        if self.relaychain.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("relaychain.poll_interval_ms must be greater than 0"));
        }

        for worker in self.workers.iter().filter(|w| w.enabled) {
            match worker.kind {
                WorkerKind::EthRelayer => {
                    if self.ethereum.channel_addresses.is_empty() {
                        return Err(anyhow::anyhow!(
                            "eth-relayer is enabled but ethereum.channel_addresses is empty"
                        ));
                    }
                    self.parachain.finalized_block_key()?;
                }
                WorkerKind::BeefyRelayer => {
                    if self.ethereum.beefy_light_client.is_none() {
                        return Err(anyhow::anyhow!(
                            "beefy-relayer is enabled but ethereum.beefy_light_client is not set"
                        ));
                    }
                    self.relaychain.authorities_key()?;
                }
            }
        }

        Ok(())
    }
}

fn parse_storage_key(field: &str, value: &str) -> anyhow::Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let key = hex::decode(digits).map_err(|e| anyhow::anyhow!("Invalid {}: {}", field, e))?;
    if key.is_empty() {
        return Err(anyhow::anyhow!("{} must not be empty", field));
    }
    Ok(key)
}
