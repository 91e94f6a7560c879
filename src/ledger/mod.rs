//! Ledger RPC surface
//!
//! The relay talks to ledger endpoints over its own JSON-RPC protocol, described
//! in `json_rpc`. `LedgerRpc` is the seam: `JsonRpcLedger` talks to an endpoint,
//! `FailoverLedger` composes two of them, and tests plug in in-memory ledgers.
//!
//! `send_transaction` only returns `Ok` once the ledger has accepted the
//! submission for inclusion (`PENDING` or `DUPLICATE`). `TRY_AGAIN_LATER`
//! surfaces as `Error::TransientTransport`, `ERROR` as `Error::LedgerRejection`.

pub mod envelope;
pub mod json_rpc;
pub mod nonce;
pub mod strkey;
pub mod value;

pub use envelope::{
    ContractCall, DecoratedSignature, FeeBumpEnvelope, SignedFeeBump, SignedTransaction,
    Submittable, TransactionEnvelope,
};
pub use json_rpc::JsonRpcLedger;
pub use nonce::NonceGate;
pub use value::{encode_args, CallArg, LedgerValue, MapEntry};

use crate::config::Network;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inclusion fee used for read-only simulations
pub const SIMULATION_BASE_FEE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub id: String,
    /// Last consumed sequence number; the next transaction uses `sequence + 1`
    pub sequence: i64,
}

impl AccountState {
    pub fn next_sequence(&self) -> i64 {
        self.sequence + 1
    }
}

/// Result of simulating an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Resource fee the ledger will charge, in stroops
    pub resource_fee: u64,
    /// Decoded return value of the simulated call
    pub result: Option<LedgerValue>,
    /// Why the call would revert
    pub error: Option<String>,
}

impl SimulationResult {
    pub fn success(resource_fee: u64, result: Option<LedgerValue>) -> Self {
        Self {
            resource_fee,
            result,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            resource_fee: 0,
            result: None,
            error: Some(reason.into()),
        }
    }

    pub fn into_result(self) -> Result<(u64, Option<LedgerValue>)> {
        match self.error {
            Some(reason) => Err(Error::Simulation(reason)),
            None => Ok((self.resource_fee, self.result)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Duplicate,
}

/// Acceptance receipt for a submitted envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub hash: String,
    pub status: SendStatus,
}

/// Status of a transaction looked up by hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    NotFound,
    Pending,
    Success { return_value: Option<LedgerValue> },
    Failed { result_code: String, reason: String },
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Success { .. } | TxStatus::Failed { .. })
    }
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Network this endpoint serves; transaction hashes depend on it
    fn network(&self) -> Network;

    /// Endpoint label for logs
    fn name(&self) -> &str;

    async fn get_account(&self, account_id: &str) -> Result<AccountState>;

    async fn simulate_transaction(&self, envelope: &TransactionEnvelope) -> Result<SimulationResult>;

    /// Simulate and fold the resource fee into the envelope
    async fn prepare_transaction(&self, envelope: TransactionEnvelope) -> Result<TransactionEnvelope> {
        let (resource_fee, _) = self.simulate_transaction(&envelope).await?.into_result()?;
        Ok(envelope.with_resource_fee(resource_fee))
    }

    async fn send_transaction(&self, submission: &Submittable) -> Result<SendResponse>;

    async fn get_transaction(&self, hash: &str) -> Result<TxStatus>;
}

/// Run a contract function in simulation only and return its value.
///
/// Nothing is signed or submitted, so any funded account can act as source.
pub async fn read_contract(
    ledger: &dyn LedgerRpc,
    source_account: &str,
    call: ContractCall,
) -> Result<Option<LedgerValue>> {
    let account = ledger.get_account(source_account).await?;
    let function = call.function.clone();
    let envelope = TransactionEnvelope::new(
        account.id.clone(),
        account.next_sequence(),
        SIMULATION_BASE_FEE,
        call,
        None,
    )?;

    let (_, result) = ledger.simulate_transaction(&envelope).await?.into_result()?;
    tracing::debug!(
        function = %function,
        endpoint = ledger.name(),
        has_result = result.is_some(),
        "Read-only contract call simulated"
    );
    Ok(result)
}
