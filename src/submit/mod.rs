//! Transaction submission pipeline
//!
//! `Built → Prepared → Signed → Submitted → {Pending, Success, Failed}`
//!
//! The send and the confirmation polling run in their own task, raced against
//! a watchdog. When the watchdog fires first the task keeps running: the
//! original envelope may still be accepted later, and polling by its hash
//! stays valid. The pipeline then wraps the same signed envelope in a single
//! fee-bump, which shares the inner hash, and polls that hash to the end.
//!
//! All of this happens inside the source account's lane of the
//! `AccountSequenceQueue`, so sequence numbers are consumed strictly in order.

pub mod failover;
pub mod queue;

pub use failover::FailoverLedger;
pub use queue::AccountSequenceQueue;

use crate::config::{Network, SubmissionConfig};
use crate::error::RejectionCode;
use crate::ledger::{
    ContractCall, FeeBumpEnvelope, LedgerRpc, LedgerValue, SendResponse, SignedTransaction,
    Submittable, TransactionEnvelope, TxStatus,
};
use crate::progress::ProgressReporter;
use crate::wallet::CustodialSigner;
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const STEP: &str = "transaction submission";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Built,
    Prepared,
    Signed,
    Submitted,
    Pending,
    Success,
    Failed,
}

/// A transaction moving through the pipeline
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub source_account: String,
    pub sequence: i64,
    /// Current fee; the fee-bump max fee once replaced
    pub fee: u64,
    pub envelope: TransactionEnvelope,
    pub signed: Option<SignedTransaction>,
    /// Inner transaction hash, set once signed
    pub hash: Option<String>,
    pub state: TxState,
    /// Whether a fee-bump wrapper was submitted
    pub replaced: bool,
}

impl PendingTransaction {
    fn require(&self, state: TxState, step: &str) -> Result<()> {
        if self.state != state {
            return Err(Error::InvalidArgument(format!(
                "{} needs a {:?} transaction, this one is {:?}",
                step, state, self.state
            )));
        }
        Ok(())
    }

    fn signed_parts(&self) -> Result<(SignedTransaction, String)> {
        match (&self.signed, &self.hash) {
            (Some(signed), Some(hash)) => Ok((signed.clone(), hash.clone())),
            _ => Err(Error::InvalidArgument("transaction is not signed".to_string())),
        }
    }

    fn settle(&mut self, status: &TxStatus) {
        self.state = match status {
            TxStatus::Success { .. } => TxState::Success,
            TxStatus::Failed { .. } => TxState::Failed,
            TxStatus::Pending | TxStatus::NotFound => TxState::Pending,
        };
    }
}

/// Result of a confirmed submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    /// Inner transaction hash; stable across a fee-bump
    pub hash: String,
    pub sequence: i64,
    pub fee: u64,
    pub replaced: bool,
    pub return_value: Option<LedgerValue>,
}

pub struct TxSubmissionPipeline {
    ledger: Arc<dyn LedgerRpc>,
    signer: Arc<CustodialSigner>,
    queue: AccountSequenceQueue,
    config: SubmissionConfig,
}

impl TxSubmissionPipeline {
    pub fn new(ledger: Arc<dyn LedgerRpc>, signer: Arc<CustodialSigner>, config: SubmissionConfig) -> Self {
        Self {
            ledger,
            signer,
            queue: AccountSequenceQueue::new(),
            config,
        }
    }

    pub fn network(&self) -> Network {
        self.ledger.network()
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerRpc> {
        &self.ledger
    }

    pub fn signer(&self) -> &CustodialSigner {
        &self.signer
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Fresh envelope at the account's next sequence number, base fee, no expiry
    pub async fn build(
        &self,
        source_account: &str,
        call: ContractCall,
        memo: Option<String>,
    ) -> Result<PendingTransaction> {
        let account = self.ledger.get_account(source_account).await?;
        let sequence = account.next_sequence();
        let envelope =
            TransactionEnvelope::new(account.id.clone(), sequence, self.config.base_fee, call, memo)?;
        tracing::debug!(
            source = %account.id,
            sequence,
            function = %envelope.operation.function,
            "Built transaction"
        );
        Ok(PendingTransaction {
            source_account: account.id,
            sequence,
            fee: envelope.fee,
            envelope,
            signed: None,
            hash: None,
            state: TxState::Built,
            replaced: false,
        })
    }

    /// Simulate to fix the resource fee. Fails with `Error::Simulation` if the call would revert.
    pub async fn prepare(&self, pending: &mut PendingTransaction) -> Result<()> {
        pending.require(TxState::Built, "prepare")?;
        let prepared = self.ledger.prepare_transaction(pending.envelope.clone()).await?;
        tracing::debug!(
            resource_fee = prepared.resource_fee,
            fee = prepared.fee,
            "Prepared transaction"
        );
        pending.fee = prepared.fee;
        pending.envelope = prepared;
        pending.state = TxState::Prepared;
        Ok(())
    }

    pub fn sign(&self, pending: &mut PendingTransaction) -> Result<()> {
        pending.require(TxState::Prepared, "sign")?;
        let network = self.network();
        let signed = self.signer.sign_transaction(pending.envelope.clone(), network)?;
        pending.hash = Some(hex::encode(signed.envelope.hash(network)?));
        pending.signed = Some(signed);
        pending.state = TxState::Signed;
        Ok(())
    }

    /// Send and wait for a terminal status, racing the watchdog.
    ///
    /// Returns `None` when the watchdog fired first; the send keeps running.
    pub async fn submit_with_watchdog(&self, pending: &mut PendingTransaction) -> Result<Option<TxStatus>> {
        pending.require(TxState::Signed, "submit")?;
        let (signed, hash) = pending.signed_parts()?;
        pending.state = TxState::Submitted;

        let mut task = tokio::spawn(send_and_confirm(
            self.ledger.clone(),
            Submittable::Transaction(signed),
            hash.clone(),
            self.config.poll_interval(),
            self.config.confirm_timeout(),
        ));

        let watchdog = self.config.watchdog_timeout();
        let raced = tokio::time::timeout(watchdog, &mut task).await;
        match raced {
            Ok(Ok(Ok(status))) => {
                pending.settle(&status);
                Ok(Some(status))
            }
            Ok(Ok(Err(Error::WatchdogTimeout { .. }))) => {
                pending.state = TxState::Pending;
                Ok(None)
            }
            Ok(Ok(Err(e))) => Err(e.with_hash(&hash)),
            Ok(Err(join_error)) => Err(Error::TransientTransport(format!(
                "submission task for {} stopped: {}",
                hash, join_error
            ))
            .with_hash(&hash)),
            Err(_) => {
                pending.state = TxState::Pending;
                tracing::warn!(
                    hash = %hash,
                    watchdog_ms = watchdog.as_millis() as u64,
                    "No terminal status within watchdog window"
                );
                // The original send is not cancelled; record how it ends
                let late_hash = hash;
                tokio::spawn(async move {
                    match task.await {
                        Ok(Ok(status)) => {
                            tracing::info!(hash = %late_hash, status = ?status, "Original submission settled after watchdog")
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(hash = %late_hash, error = %e, "Original submission ended without confirmation")
                        }
                        Err(e) => tracing::warn!(hash = %late_hash, error = %e, "Original submission task failed"),
                    }
                });
                Ok(None)
            }
        }
    }

    /// Wrap the same signed envelope in a fee-bump and drive it to a terminal status
    pub async fn escalate_fee_bump(&self, pending: &mut PendingTransaction) -> Result<TxStatus> {
        pending.require(TxState::Pending, "fee-bump")?;
        let (signed, hash) = pending.signed_parts()?;

        // It may have settled while the watchdog was racing
        match self.ledger.get_transaction(&hash).await {
            Ok(status) if status.is_terminal() => {
                tracing::info!(hash = %hash, "Transaction settled before fee-bump was needed");
                pending.settle(&status);
                return Ok(status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(hash = %hash, error = %e, "Status re-check failed, escalating anyway"),
        }

        let original_fee = pending.fee;
        let bump_fee = self.config.bumped_fee(original_fee).max(original_fee + 1);
        let wrapper = FeeBumpEnvelope::wrap(self.signer.account_id(), bump_fee, signed)?;
        let bump: Submittable = self.signer.sign_fee_bump(wrapper, self.network())?.into();
        pending.fee = bump_fee;
        pending.replaced = true;
        tracing::info!(hash = %hash, original_fee, bump_fee, "Submitting fee-bump");

        if let Err(e) = send(self.ledger.as_ref(), &bump).await {
            // A late acceptance of the original can make the bump redundant
            if let Ok(status) = self.ledger.get_transaction(&hash).await {
                if status.is_terminal() {
                    pending.settle(&status);
                    return Ok(status);
                }
            }
            return Err(e.with_hash(&hash));
        }

        let status = wait_for_terminal(
            self.ledger.as_ref(),
            &hash,
            self.config.poll_interval(),
            self.config.confirm_timeout(),
        )
        .await?;
        pending.settle(&status);
        Ok(status)
    }

    /// Build, prepare, sign and submit `call` from the custodial account
    pub async fn submit(
        &self,
        call: ContractCall,
        memo: Option<String>,
        progress: &ProgressReporter,
    ) -> Result<SubmissionOutcome> {
        let source = self.signer.account_id().to_string();
        let function = call.function.clone();
        let started = Instant::now();

        let result = self
            .queue
            .enqueue(&source, || self.run(&source, call, memo, progress))
            .await;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    function = %function,
                    hash = %outcome.hash,
                    sequence = outcome.sequence,
                    replaced = outcome.replaced,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Transaction confirmed"
                );
                progress.success(STEP, format!("Transaction {} confirmed", outcome.hash));
            }
            Err(e) => {
                tracing::error!(
                    function = %function,
                    hash = e.tx_hash().unwrap_or("<unsent>"),
                    error = %e,
                    "Transaction submission failed"
                );
                progress.error(STEP, e.to_string());
            }
        }
        result
    }

    async fn run(
        &self,
        source: &str,
        call: ContractCall,
        memo: Option<String>,
        progress: &ProgressReporter,
    ) -> Result<SubmissionOutcome> {
        progress.progress(STEP, "Building transaction");
        let mut pending = self.build(source, call, memo).await?;

        progress.progress(STEP, "Simulating transaction");
        self.prepare(&mut pending).await?;
        self.sign(&mut pending)?;
        let (_, hash) = pending.signed_parts()?;

        progress.progress(STEP, format!("Submitting transaction {}", hash));
        let status = match self.submit_with_watchdog(&mut pending).await? {
            Some(status) => status,
            None => {
                progress.progress(STEP, "Confirmation is slow, escalating with fee-bump");
                self.escalate_fee_bump(&mut pending).await?
            }
        };

        match status {
            TxStatus::Success { return_value } => Ok(SubmissionOutcome {
                hash,
                sequence: pending.sequence,
                fee: pending.fee,
                replaced: pending.replaced,
                return_value,
            }),
            TxStatus::Failed { result_code, reason } => Err(Error::LedgerRejection {
                hash: Some(hash),
                code: RejectionCode::from_result_code(&result_code),
                reason,
            }),
            TxStatus::Pending | TxStatus::NotFound => Err(Error::WatchdogTimeout { hash }),
        }
    }
}

impl std::fmt::Debug for TxSubmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSubmissionPipeline")
            .field("ledger", &self.ledger.name())
            .field("signer", &self.signer)
            .field("config", &self.config)
            .finish()
    }
}

async fn send_and_confirm(
    ledger: Arc<dyn LedgerRpc>,
    submission: Submittable,
    hash: String,
    poll_interval: Duration,
    confirm_timeout: Duration,
) -> Result<TxStatus> {
    send(ledger.as_ref(), &submission).await?;
    wait_for_terminal(ledger.as_ref(), &hash, poll_interval, confirm_timeout).await
}

/// Every send of the pipeline goes through here. Failover is whatever the
/// ledger provides: build the pipeline over a `FailoverLedger` to get the
/// single primary → secondary retry.
async fn send(ledger: &dyn LedgerRpc, submission: &Submittable) -> Result<SendResponse> {
    let response = ledger.send_transaction(submission).await?;
    tracing::debug!(
        hash = %response.hash,
        status = ?response.status,
        fee_bump = matches!(submission, Submittable::FeeBump(_)),
        "Submission accepted"
    );
    Ok(response)
}

/// Poll `hash` until it is terminal. Transient lookup failures are retried on
/// the next tick.
async fn wait_for_terminal(
    ledger: &dyn LedgerRpc,
    hash: &str,
    poll_interval: Duration,
    confirm_timeout: Duration,
) -> Result<TxStatus> {
    let started = Instant::now();
    loop {
        match ledger.get_transaction(hash).await {
            Ok(status) if status.is_terminal() => return Ok(status),
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                tracing::debug!(hash = %hash, error = %e, "Status lookup failed, polling again")
            }
            Err(e) => return Err(e.with_hash(hash)),
        }
        if started.elapsed() >= confirm_timeout {
            return Err(Error::WatchdogTimeout {
                hash: hash.to_string(),
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}
