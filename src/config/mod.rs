//! Configuration for the wallet relay

pub mod rpc;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// Re-export RPC config
pub use rpc::{RpcConfig, RpcEndpoints};

/// Environment variable listing signer node URLs (comma separated, in order)
pub const SIGNER_NODES_ENV: &str = "SIGNER_NODES";

/// Default environment variable holding the custodial signing key
pub const SIGNER_KEY_ENV: &str = "SIGNER_PRIVATE_KEY";

/// Supported ledger networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Public,
    Testnet,
}

impl Network {
    /// Network passphrase mixed into every transaction hash
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Public => "bls-wallet-relay public network v1",
            Network::Testnet => "bls-wallet-relay test network v1",
        }
    }

    /// Lowercase path segment used by signer node routes
    pub fn name(&self) -> &'static str {
        match self {
            Network::Public => "public",
            Network::Testnet => "testnet",
        }
    }

    /// Parse a network name, accepting the usual aliases
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_uppercase().as_str() {
            "PUBLIC" | "MAINNET" | "PUBNET" => Ok(Network::Public),
            "TESTNET" | "TEST" => Ok(Network::Testnet),
            other => Err(Error::InvalidArgument(format!(
                "Unsupported network '{}' (use PUBLIC or TESTNET)",
                other
            ))),
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Network::parse(s)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One remote signer node; its index is its position in the configured list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerNodeConfig {
    pub endpoint: String,
}

/// How the aggregator dispatches signing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// One node after another, in configured order
    #[default]
    Sequential,
    /// All nodes at once; still N-of-N
    Concurrent,
}

/// Transaction submission tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Base inclusion fee (stroops) for freshly built envelopes
    pub base_fee: u64,
    /// Watchdog window before fee-bump escalation (milliseconds)
    pub watchdog_timeout_ms: u64,
    /// Interval between status polls (milliseconds)
    pub poll_interval_ms: u64,
    /// How long to keep polling after a fee-bump (milliseconds)
    pub confirm_timeout_ms: u64,
    /// Multiplier applied to the original fee when bumping
    pub bump_factor: u64,
    /// Minimum fee-bump fee (stroops)
    pub bump_floor: u64,
}

impl SubmissionConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    /// Fee for the bump wrapper: `max(original × factor, floor)`
    pub fn bumped_fee(&self, original_fee: u64) -> u64 {
        original_fee
            .saturating_mul(self.bump_factor)
            .max(self.bump_floor)
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            base_fee: 100,
            watchdog_timeout_ms: 10_000,
            poll_interval_ms: 1_000,
            confirm_timeout_ms: 30_000,
            bump_factor: 2,
            bump_floor: 10_000,
        }
    }
}

fn default_signer_key_env() -> String {
    SIGNER_KEY_ENV.to_string()
}

fn default_node_timeout_ms() -> u64 {
    15_000
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered signer nodes
    pub signer_nodes: Vec<SignerNodeConfig>,
    /// Node dispatch mode
    #[serde(default)]
    pub aggregation: AggregationMode,
    /// Per-request timeout for signer node calls (milliseconds)
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,
    /// Submission pipeline settings
    #[serde(default)]
    pub submission: SubmissionConfig,
    /// Wallet factory contract per network
    #[serde(default)]
    pub master_contracts: HashMap<Network, String>,
    /// Environment variable holding the custodial key
    #[serde(default = "default_signer_key_env")]
    pub signer_key_env: String,
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let mut config: Config =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override the signer node list from `SIGNER_NODES` if it is set
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(SIGNER_NODES_ENV) {
            let nodes = parse_node_list(&raw);
            if !nodes.is_empty() {
                tracing::debug!(count = nodes.len(), "Using signer nodes from SIGNER_NODES");
                self.signer_nodes = nodes;
            }
        }
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.signer_nodes.is_empty() {
            return Err(Error::Config("at least one signer node is required".into()));
        }
        for node in &self.signer_nodes {
            url::Url::parse(&node.endpoint).map_err(|e| {
                Error::Config(format!("invalid signer node endpoint {}: {}", node.endpoint, e))
            })?;
        }
        if self.submission.bump_factor < 1 {
            return Err(Error::Config("bump_factor must be at least 1".into()));
        }
        Ok(())
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// Wallet factory contract for a network
    pub fn master_contract(&self, network: Network) -> Result<&str> {
        self.master_contracts
            .get(&network)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::Config(format!("no master contract configured for {}", network)))
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            signer_nodes: Vec::new(),
            aggregation: AggregationMode::default(),
            node_timeout_ms: default_node_timeout_ms(),
            submission: SubmissionConfig::default(),
            master_contracts: HashMap::new(),
            signer_key_env: default_signer_key_env(),
        };
        config.apply_env();
        config
    }
}

fn parse_node_list(raw: &str) -> Vec<SignerNodeConfig> {
    raw.split(',')
        .map(|item| item.trim().trim_end_matches('/'))
        .filter(|item| !item.is_empty())
        .map(|endpoint| SignerNodeConfig {
            endpoint: endpoint.to_string(),
        })
        .collect()
}
