//! Ledger RPC endpoint configuration
//!
//! Endpoints speak the relay's JSON-RPC protocol (see `ledger::json_rpc`),
//! so there is no public fallback: a network is served only when its
//! primary endpoint is configured.
//!
//! Resolution per network:
//! 1. `PUBLIC_RPC_URL` / `TESTNET_RPC_URL` - primary endpoint, required
//! 2. `PUBLIC_RPC_URL_SECONDARY` / `TESTNET_RPC_URL_SECONDARY` - failover
//!    target; without it the secondary is the primary and failover is off
//!
//! # Examples
//!
//! ```bash
//! export TESTNET_RPC_URL="https://ledger-rpc.example.com/testnet"
//! export TESTNET_RPC_URL_SECONDARY="https://backup.example.com/testnet"
//! ```

use super::Network;
use std::collections::HashMap;

/// Environment variable names
mod env_vars {
    pub const PUBLIC_RPC_URL: &str = "PUBLIC_RPC_URL";
    pub const TESTNET_RPC_URL: &str = "TESTNET_RPC_URL";
    pub const PUBLIC_RPC_URL_SECONDARY: &str = "PUBLIC_RPC_URL_SECONDARY";
    pub const TESTNET_RPC_URL_SECONDARY: &str = "TESTNET_RPC_URL_SECONDARY";
}

/// Primary and secondary endpoint for one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoints {
    pub primary: String,
    pub secondary: String,
}

impl RpcEndpoints {
    pub fn has_failover(&self) -> bool {
        self.secondary != self.primary
    }
}

/// RPC configuration for all networks
#[derive(Debug, Clone)]
pub struct RpcConfig {
    endpoints: HashMap<Network, RpcEndpoints>,
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut endpoints = HashMap::new();
        for network in [Network::Public, Network::Testnet] {
            let (primary_var, secondary_var) = match network {
                Network::Public => (env_vars::PUBLIC_RPC_URL, env_vars::PUBLIC_RPC_URL_SECONDARY),
                Network::Testnet => (env_vars::TESTNET_RPC_URL, env_vars::TESTNET_RPC_URL_SECONDARY),
            };

            let Some(primary) = lookup(primary_var).filter(|url| !url.trim().is_empty()) else {
                tracing::debug!(network = %network, "{} not set, network disabled", primary_var);
                continue;
            };
            let secondary = match lookup(secondary_var).filter(|url| !url.trim().is_empty()) {
                Some(url) => url,
                None => {
                    tracing::warn!(
                        network = %network,
                        "{} not set, RPC failover disabled",
                        secondary_var
                    );
                    primary.clone()
                }
            };

            endpoints.insert(network, RpcEndpoints { primary, secondary });
        }

        Self { endpoints }
    }

    /// Create with explicit endpoints
    pub fn with_endpoints(endpoints: HashMap<Network, RpcEndpoints>) -> Self {
        Self { endpoints }
    }

    /// Endpoints for a network
    pub fn get(&self, network: Network) -> Option<&RpcEndpoints> {
        self.endpoints.get(&network)
    }

    /// Check if a network is configured
    pub fn has_network(&self, network: Network) -> bool {
        self.endpoints.contains_key(&network)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_unconfigured_networks_are_disabled() {
        let config = RpcConfig::resolve(lookup(&[]));
        assert!(!config.has_network(Network::Public));
        assert!(!config.has_network(Network::Testnet));
    }

    #[test]
    fn test_secondary_defaults_to_primary() {
        let config = RpcConfig::resolve(lookup(&[("TESTNET_RPC_URL", "http://primary")]));

        let testnet = config.get(Network::Testnet).unwrap();
        assert_eq!(testnet.primary, "http://primary");
        assert_eq!(testnet.secondary, "http://primary");
        assert!(!testnet.has_failover());
        assert!(!config.has_network(Network::Public));
    }

    #[test]
    fn test_explicit_secondary() {
        let config = RpcConfig::resolve(lookup(&[
            ("PUBLIC_RPC_URL", "http://primary"),
            ("PUBLIC_RPC_URL_SECONDARY", "http://secondary"),
            ("TESTNET_RPC_URL_SECONDARY", "http://orphan"),
        ]));

        let public = config.get(Network::Public).unwrap();
        assert_eq!(public.secondary, "http://secondary");
        assert!(public.has_failover());
        // A secondary alone does not enable a network
        assert!(!config.has_network(Network::Testnet));
    }

    #[test]
    fn test_with_endpoints() {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            Network::Testnet,
            RpcEndpoints {
                primary: "http://primary".to_string(),
                secondary: "http://secondary".to_string(),
            },
        );
        let config = RpcConfig::with_endpoints(endpoints);

        assert_eq!(
            config.get(Network::Testnet).map(|e| e.secondary.as_str()),
            Some("http://secondary")
        );
        assert!(config.get(Network::Public).is_none());
    }
}
