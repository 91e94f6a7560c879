//! Primary/secondary RPC failover
//!
//! A transient transport error on the primary endpoint is retried exactly
//! once against the secondary. Anything else, ledger rejections included, is
//! returned as is: resubmitting cannot fix a logical rejection. There is no
//! backoff loop.

use crate::config::{Network, RpcConfig};
use crate::ledger::{
    AccountState, JsonRpcLedger, LedgerRpc, SendResponse, SimulationResult, Submittable,
    TransactionEnvelope, TxStatus,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Run `$call` against the primary, and once more against the secondary if
/// the primary failed transiently.
macro_rules! with_failover {
    ($self:ident, $op:literal, |$ledger:ident| $call:expr) => {{
        let $ledger: &dyn LedgerRpc = &*$self.primary;
        match $call.await {
            Err(primary_error) if primary_error.is_transient() => match &$self.secondary {
                Some(secondary) => {
                    tracing::warn!(
                        op = $op,
                        primary = $self.primary.name(),
                        secondary = secondary.name(),
                        error = %primary_error,
                        "Primary RPC failed, retrying once on secondary"
                    );
                    let $ledger: &dyn LedgerRpc = &**secondary;
                    $call.await.map_err(|e| settle($op, primary_error, e))
                }
                None => Err(primary_error),
            },
            other => other,
        }
    }};
}

/// Which error to surface when both endpoints failed
fn settle(op: &str, primary: Error, secondary: Error) -> Error {
    tracing::error!(op, primary = %primary, secondary = %secondary, "Secondary RPC failed too");
    match secondary {
        e @ Error::LedgerRejection { .. } => e,
        _ => primary,
    }
}

pub struct FailoverLedger {
    primary: Arc<dyn LedgerRpc>,
    secondary: Option<Arc<dyn LedgerRpc>>,
}

impl FailoverLedger {
    pub fn new(primary: Arc<dyn LedgerRpc>, secondary: Option<Arc<dyn LedgerRpc>>) -> Result<Self> {
        if let Some(secondary) = &secondary {
            if secondary.network() != primary.network() {
                return Err(Error::Config(format!(
                    "primary RPC serves {} but secondary serves {}",
                    primary.network(),
                    secondary.network()
                )));
            }
        }
        Ok(Self { primary, secondary })
    }

    /// JSON-RPC endpoints for `network` from the RPC config
    pub fn from_rpc_config(rpc: &RpcConfig, network: Network, timeout: Duration) -> Result<Self> {
        let endpoints = rpc
            .get(network)
            .ok_or_else(|| Error::Config(format!("no RPC endpoints configured for {}", network)))?;

        let primary = JsonRpcLedger::new(&endpoints.primary, network, timeout)?;
        let secondary = if endpoints.has_failover() {
            Some(Arc::new(JsonRpcLedger::new(&endpoints.secondary, network, timeout)?) as Arc<dyn LedgerRpc>)
        } else {
            None
        };
        tracing::info!(
            network = %network,
            primary = %endpoints.primary,
            secondary = secondary.as_ref().map(|s| s.name()).unwrap_or("<none>"),
            "Ledger RPC endpoints"
        );
        Self::new(Arc::new(primary), secondary)
    }
}

#[async_trait]
impl LedgerRpc for FailoverLedger {
    fn network(&self) -> Network {
        self.primary.network()
    }

    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn get_account(&self, account_id: &str) -> Result<AccountState> {
        with_failover!(self, "getAccount", |ledger| ledger.get_account(account_id))
    }

    async fn simulate_transaction(&self, envelope: &TransactionEnvelope) -> Result<SimulationResult> {
        with_failover!(self, "simulateTransaction", |ledger| ledger
            .simulate_transaction(envelope))
    }

    async fn send_transaction(&self, submission: &Submittable) -> Result<SendResponse> {
        with_failover!(self, "sendTransaction", |ledger| ledger
            .send_transaction(submission))
    }

    async fn get_transaction(&self, hash: &str) -> Result<TxStatus> {
        with_failover!(self, "getTransaction", |ledger| ledger.get_transaction(hash))
    }
}

impl std::fmt::Debug for FailoverLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverLedger")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.as_ref().map(|s| s.name()))
            .finish()
    }
}
