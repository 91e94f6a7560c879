//! Transaction envelopes and their deterministic hashes
//!
//! The wire form is the serde JSON of `Submittable`: fields in declaration
//! order, a `kind` tag of `transaction` or `fee_bump`, then base64 (standard
//! alphabet, padded).
//!
//! The hash of an envelope is `sha256(network_id ‖ tag ‖ json)` where
//! `network_id = sha256(passphrase)`, `tag` is `envelope_tx` or
//! `envelope_fee_bump` and `json` is the envelope's serde JSON without
//! signatures. A fee-bump wrapper hashes under its own tag but keeps the inner
//! envelope, and therefore the inner hash, untouched.

use super::value::LedgerValue;
use crate::config::Network;
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TX_TAG: &[u8] = b"envelope_tx";
const FEE_BUMP_TAG: &[u8] = b"envelope_fee_bump";

/// Longest text memo the ledger accepts, in bytes
pub const MAX_MEMO_BYTES: usize = 28;

/// One contract invocation operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract_id: String,
    pub function: String,
    pub args: Vec<LedgerValue>,
}

/// Unsigned transaction envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub source_account: String,
    pub sequence: i64,
    /// Inclusion fee plus resource fee, in stroops
    pub fee: u64,
    /// Resource fee from simulation; zero until prepared
    pub resource_fee: u64,
    pub memo: Option<String>,
    /// Upper time bound; `None` means the envelope never expires
    pub max_time: Option<u64>,
    pub operation: ContractCall,
}

impl TransactionEnvelope {
    pub fn new(
        source_account: impl Into<String>,
        sequence: i64,
        base_fee: u64,
        operation: ContractCall,
        memo: Option<String>,
    ) -> Result<Self> {
        if let Some(memo) = &memo {
            if memo.len() > MAX_MEMO_BYTES {
                return Err(Error::InvalidArgument(format!(
                    "memo is {} bytes, limit is {}",
                    memo.len(),
                    MAX_MEMO_BYTES
                )));
            }
        }
        Ok(Self {
            source_account: source_account.into(),
            sequence,
            fee: base_fee,
            resource_fee: 0,
            memo,
            max_time: None,
            operation,
        })
    }

    /// Apply a simulated resource fee on top of the inclusion fee
    pub fn with_resource_fee(mut self, resource_fee: u64) -> Self {
        self.fee = self.fee.saturating_sub(self.resource_fee).saturating_add(resource_fee);
        self.resource_fee = resource_fee;
        self
    }

    pub fn hash(&self, network: Network) -> Result<[u8; 32]> {
        tagged_hash(network, TX_TAG, self)
    }
}

/// An ed25519 signature plus the last four bytes of the signer's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub envelope: TransactionEnvelope,
    pub signatures: Vec<DecoratedSignature>,
}

/// Fee-bump wrapper around an already signed inner transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBumpEnvelope {
    pub fee_source: String,
    pub max_fee: u64,
    pub inner: SignedTransaction,
}

impl FeeBumpEnvelope {
    pub fn wrap(fee_source: impl Into<String>, max_fee: u64, inner: SignedTransaction) -> Result<Self> {
        if max_fee <= inner.envelope.fee {
            return Err(Error::InvalidArgument(format!(
                "fee-bump max fee {} must exceed inner fee {}",
                max_fee, inner.envelope.fee
            )));
        }
        Ok(Self {
            fee_source: fee_source.into(),
            max_fee,
            inner,
        })
    }

    pub fn hash(&self, network: Network) -> Result<[u8; 32]> {
        tagged_hash(network, FEE_BUMP_TAG, self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedFeeBump {
    pub envelope: FeeBumpEnvelope,
    pub signatures: Vec<DecoratedSignature>,
}

/// Anything that can be handed to `sendTransaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submittable {
    Transaction(SignedTransaction),
    FeeBump(SignedFeeBump),
}

impl Submittable {
    /// Hash the ledger reports this submission under
    pub fn hash(&self, network: Network) -> Result<String> {
        let digest = match self {
            Submittable::Transaction(tx) => tx.envelope.hash(network)?,
            Submittable::FeeBump(bump) => bump.envelope.hash(network)?,
        };
        Ok(hex::encode(digest))
    }

    /// Hash of the inner transaction; identical for a transaction and its fee-bump
    pub fn inner_hash(&self, network: Network) -> Result<String> {
        let inner = match self {
            Submittable::Transaction(tx) => &tx.envelope,
            Submittable::FeeBump(bump) => &bump.envelope.inner.envelope,
        };
        Ok(hex::encode(inner.hash(network)?))
    }

    pub fn fee(&self) -> u64 {
        match self {
            Submittable::Transaction(tx) => tx.envelope.fee,
            Submittable::FeeBump(bump) => bump.envelope.max_fee,
        }
    }

    /// Base64 wire form sent to RPC endpoints
    pub fn to_wire(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn from_wire(wire: &str) -> Result<Self> {
        let raw = STANDARD
            .decode(wire.trim())
            .map_err(|e| Error::Format(format!("envelope is not base64: {}", e)))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl From<SignedTransaction> for Submittable {
    fn from(tx: SignedTransaction) -> Self {
        Submittable::Transaction(tx)
    }
}

impl From<SignedFeeBump> for Submittable {
    fn from(bump: SignedFeeBump) -> Self {
        Submittable::FeeBump(bump)
    }
}

pub fn network_id(network: Network) -> [u8; 32] {
    Sha256::digest(network.passphrase().as_bytes()).into()
}

fn tagged_hash<T: Serialize>(network: Network, tag: &[u8], body: &T) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(network_id(network));
    hasher.update(tag);
    hasher.update(serde_json::to_vec(body)?);
    Ok(hasher.finalize().into())
}
