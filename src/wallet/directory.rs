//! Wallet lookup seam
//!
//! User records live outside the relay. The relay only needs to resolve a
//! user and network to a wallet contract id, and to record new wallets.

use crate::config::Network;
use crate::ledger::strkey::{self, StrKeyKind, STRKEY_LEN};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A wallet contract owned by a user on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub contract_id: String,
    pub network: Network,
    /// Hex-encoded passkey public key bound to the wallet
    pub passkey_public_key: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait WalletDirectory: Send + Sync {
    /// Wallet contract of `user_id` on `network`, if one exists
    async fn wallet_contract(&self, user_id: &str, network: Network) -> Result<Option<WalletRecord>>;

    async fn register_wallet(&self, user_id: &str, record: WalletRecord) -> Result<()>;
}

/// Process-local directory, for tests and the operator binary
#[derive(Debug, Clone, Default)]
pub struct InMemoryWalletDirectory {
    wallets: Arc<RwLock<HashMap<(String, Network), WalletRecord>>>,
}

impl InMemoryWalletDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.wallets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.wallets.read().await.is_empty()
    }
}

#[async_trait]
impl WalletDirectory for InMemoryWalletDirectory {
    async fn wallet_contract(&self, user_id: &str, network: Network) -> Result<Option<WalletRecord>> {
        Ok(self
            .wallets
            .read()
            .await
            .get(&(user_id.to_string(), network))
            .cloned())
    }

    async fn register_wallet(&self, user_id: &str, record: WalletRecord) -> Result<()> {
        let key = (user_id.to_string(), record.network);
        let mut wallets = self.wallets.write().await;
        if let Some(existing) = wallets.get(&key) {
            return Err(Error::InvalidArgument(format!(
                "user {} already has wallet {} on {}",
                user_id, existing.contract_id, record.network
            )));
        }
        wallets.insert(key, record);
        Ok(())
    }
}

/// Trim and uppercase a contract id, then check its shape and checksum
pub fn normalize_contract_id(raw: &str) -> Result<String> {
    let id = raw.trim().to_ascii_uppercase();
    let well_formed = id.len() == STRKEY_LEN
        && id.starts_with('C')
        && id[1..]
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b));
    if !well_formed {
        return Err(Error::InvalidArgument(format!(
            "'{}' is not a contract id",
            raw.trim()
        )));
    }
    strkey::decode(StrKeyKind::Contract, &id)
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(contract_id: &str) -> WalletRecord {
        WalletRecord {
            contract_id: contract_id.to_string(),
            network: Network::Testnet,
            passkey_public_key: "04aa".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let id = strkey::encode(StrKeyKind::Contract, &[9u8; 32]);
        let messy = format!("  {}\n", id.to_lowercase());
        assert_eq!(normalize_contract_id(&messy).unwrap(), id);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(normalize_contract_id("").is_err());
        assert!(normalize_contract_id("GABC").is_err());
        let account = strkey::encode(StrKeyKind::Account, &[9u8; 32]);
        assert!(normalize_contract_id(&account).is_err());
        // Right shape, wrong checksum
        let mut id = strkey::encode(StrKeyKind::Contract, &[9u8; 32]);
        id.replace_range(20..21, if &id[20..21] == "A" { "B" } else { "A" });
        assert!(normalize_contract_id(&id).is_err());
    }

    #[tokio::test]
    async fn in_memory_directory_resolves_per_network() {
        let directory = InMemoryWalletDirectory::new();
        directory.register_wallet("alice", record("CAAA")).await.unwrap();

        let found = directory
            .wallet_contract("alice", Network::Testnet)
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.contract_id), Some("CAAA".to_string()));
        assert!(directory
            .wallet_contract("alice", Network::Public)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let directory = InMemoryWalletDirectory::new();
        directory.register_wallet("bob", record("CAAA")).await.unwrap();
        assert!(directory.register_wallet("bob", record("CBBB")).await.is_err());
        assert_eq!(directory.len().await, 1);
    }
}
