//! Smart wallet flows
//!
//! `SmartWalletService` composes the pieces per network:
//! nonce → N-of-N aggregate → contract call with the aggregate as its last
//! argument → submission pipeline. It also runs wallet creation, which
//! provisions key shares on every node before deploying the wallet contract.

use crate::bls::{PartialSigner, SignatureAggregator};
use crate::config::{Config, Network, RpcConfig};
use crate::ledger::json_rpc::DEFAULT_RPC_TIMEOUT;
use crate::ledger::{encode_args, CallArg, ContractCall, LedgerValue, NonceGate};
use crate::nodes::{KeyProvisioning, SignerNodeClient};
use crate::progress::{ProgressReporter, ProgressSink, StepStatus};
use crate::submit::{FailoverLedger, SubmissionOutcome, TxSubmissionPipeline};
use crate::wallet::{normalize_contract_id, CustodialSigner, WalletDirectory, WalletRecord};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function on the master contract
pub const CREATE_WALLET_FUNCTION: &str = "create_wallet";

struct NetworkContext {
    pipeline: Arc<TxSubmissionPipeline>,
    nonces: NonceGate,
    master_contract: Option<String>,
}

pub struct SmartWalletService {
    aggregator: SignatureAggregator,
    nodes: Vec<SignerNodeClient>,
    networks: HashMap<Network, NetworkContext>,
    progress: Arc<dyn ProgressSink>,
}

impl SmartWalletService {
    pub fn new(
        aggregator: SignatureAggregator,
        nodes: Vec<SignerNodeClient>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            aggregator,
            nodes,
            networks: HashMap::new(),
            progress,
        }
    }

    /// Serve the pipeline's network; `master_contract` enables wallet creation there
    pub fn with_network(mut self, pipeline: Arc<TxSubmissionPipeline>, master_contract: Option<String>) -> Self {
        let network = pipeline.network();
        let nonces = NonceGate::new(pipeline.ledger().clone());
        self.networks.insert(
            network,
            NetworkContext {
                pipeline,
                nonces,
                master_contract,
            },
        );
        self
    }

    /// Wire up every network that has RPC endpoints
    pub fn from_config(
        config: &Config,
        rpc: &RpcConfig,
        signer: Arc<CustodialSigner>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        let nodes = SignerNodeClient::from_config(config)?;
        let signers = nodes
            .iter()
            .cloned()
            .map(|client| Arc::new(client) as Arc<dyn PartialSigner>)
            .collect();
        let aggregator = SignatureAggregator::new(signers, config.aggregation)?;

        let mut service = Self::new(aggregator, nodes, progress);
        for network in [Network::Public, Network::Testnet] {
            if !rpc.has_network(network) {
                continue;
            }
            let ledger = FailoverLedger::from_rpc_config(rpc, network, DEFAULT_RPC_TIMEOUT)?;
            let pipeline =
                TxSubmissionPipeline::new(Arc::new(ledger), signer.clone(), config.submission.clone());
            service = service.with_network(
                Arc::new(pipeline),
                config.master_contracts.get(&network).cloned(),
            );
        }
        Ok(service)
    }

    fn context(&self, network: Network) -> Result<&NetworkContext> {
        self.networks
            .get(&network)
            .ok_or_else(|| Error::Config(format!("network {} is not configured", network)))
    }

    pub fn networks(&self) -> Vec<Network> {
        self.networks.keys().copied().collect()
    }

    pub fn aggregator(&self) -> &SignatureAggregator {
        &self.aggregator
    }

    /// Current nonce of a wallet, read with the custodial account as source
    pub async fn fetch_nonce(&self, network: Network, wallet_contract_id: &str) -> Result<Vec<u8>> {
        let context = self.context(network)?;
        let wallet = normalize_contract_id(wallet_contract_id)?;
        context
            .nonces
            .fetch_nonce(context.pipeline.signer().account_id(), network, &wallet)
            .await
    }

    /// Provision key shares on every node and deploy a wallet contract for `user_id`
    pub async fn create_wallet(
        &self,
        session_id: &str,
        network: Network,
        user_id: &str,
        username: &str,
        passkey_public_key: &str,
        directory: &dyn WalletDirectory,
    ) -> Result<WalletRecord> {
        let progress = ProgressReporter::new(self.progress.clone(), session_id);
        let result = self
            .create_wallet_inner(&progress, network, user_id, username, passkey_public_key, directory)
            .await;
        match &result {
            Ok(record) => {
                tracing::info!(user = %user_id, wallet = %record.contract_id, network = %network, "Wallet created");
                progress.success("account creation", "Account Creation Successful");
            }
            Err(e) => {
                tracing::error!(user = %user_id, network = %network, error = %e, "Wallet creation failed");
                progress.error("account creation", e.to_string());
            }
        }
        result
    }

    async fn create_wallet_inner(
        &self,
        progress: &ProgressReporter,
        network: Network,
        user_id: &str,
        username: &str,
        passkey_public_key: &str,
        directory: &dyn WalletDirectory,
    ) -> Result<WalletRecord> {
        let context = self.context(network)?;
        let master_contract = context
            .master_contract
            .clone()
            .ok_or_else(|| Error::Config(format!("no master contract configured for {}", network)))?;
        let passkey = hex::decode(passkey_public_key.trim_start_matches("0x"))
            .map_err(|e| Error::InvalidArgument(format!("passkey public key: {}", e)))?;

        progress.report("key generation", StepStatus::Start, "Generating Wallet BLS Keys");
        let provisioning = KeyProvisioning::begin(&self.nodes, network).await?;
        let bls_keys = match provisioning.public_keys() {
            Ok(keys) => keys.into_iter().map(LedgerValue::Bytes).collect(),
            Err(e) => {
                provisioning.abort().await;
                return Err(e);
            }
        };
        let call = ContractCall {
            contract_id: master_contract,
            function: CREATE_WALLET_FUNCTION.to_string(),
            args: vec![
                LedgerValue::String(username.to_string()),
                LedgerValue::Bytes(passkey.clone()),
                LedgerValue::Vec(bls_keys),
            ],
        };

        progress.report("contract deployment", StepStatus::Start, "Deploying Account Contract");
        let outcome = match context.pipeline.submit(call, None, progress).await {
            Ok(outcome) => outcome,
            Err(e) if deployment_never_happened(&e) => {
                provisioning.abort().await;
                return Err(e);
            }
            Err(e) => {
                // The deployment may still land; its shares stay reserved
                tracing::warn!(
                    user = %user_id,
                    hash = e.tx_hash().unwrap_or("<unsent>"),
                    error = %e,
                    "Wallet deployment outcome unknown, key shares left reserved"
                );
                return Err(e);
            }
        };

        // From here on the factory has run with these shares
        let passkey_hex = hex::encode(&passkey);
        let contract_id = match outcome
            .return_value
            .as_ref()
            .and_then(LedgerValue::as_address)
        {
            Some(address) => address.to_string(),
            None => {
                tracing::error!(
                    user = %user_id,
                    hash = %outcome.hash,
                    value = ?outcome.return_value,
                    "Wallet deployed without an address in its result, key shares left reserved"
                );
                return Err(Error::Format(format!(
                    "{} returned {:?}, expected an address",
                    CREATE_WALLET_FUNCTION, outcome.return_value
                ))
                .with_hash(&outcome.hash));
            }
        };
        let contract_id = match normalize_contract_id(&contract_id) {
            Ok(normalized) => normalized,
            Err(e) => {
                provisioning.commit(&passkey_hex, &contract_id).await;
                return Err(e.with_hash(&outcome.hash));
            }
        };
        provisioning.commit(&passkey_hex, &contract_id).await;

        progress.report("account profile", StepStatus::Start, "Creating User Profile");
        let record = WalletRecord {
            contract_id,
            network,
            passkey_public_key: passkey_hex,
            created_at: Utc::now(),
        };
        directory
            .register_wallet(user_id, record.clone())
            .await
            .map_err(|e| e.with_hash(&outcome.hash))?;
        Ok(record)
    }

    /// Call `function` on a wallet, authorised by a fresh N-of-N signature over
    /// the wallet nonce. The aggregate is appended as the last argument.
    pub async fn invoke_signed(
        &self,
        session_id: &str,
        network: Network,
        passkey_public_key: &str,
        wallet_contract_id: &str,
        function: &str,
        args: Vec<CallArg>,
    ) -> Result<SubmissionOutcome> {
        let progress = ProgressReporter::new(self.progress.clone(), session_id);
        let context = self.context(network)?;
        let wallet = normalize_contract_id(wallet_contract_id)?;
        let source = context.pipeline.signer().account_id();
        let mut values = encode_args(args)?;

        progress.progress("transaction creation", "Fetching Transaction Nonce");
        let nonce = match context.nonces.fetch_nonce(source, network, &wallet).await {
            Ok(nonce) => nonce,
            Err(e) => {
                progress.error("transaction creation", e.to_string());
                return Err(e);
            }
        };

        progress.progress("transaction submission", "Computing BLS Signatures");
        let aggregate = match self
            .aggregator
            .aggregate(network, passkey_public_key, &wallet, &nonce)
            .await
        {
            Ok(aggregate) => aggregate,
            Err(e) => {
                progress.error("transaction submission", e.to_string());
                return Err(e);
            }
        };
        values.push(LedgerValue::Bytes(aggregate.into()));

        progress.progress("transaction submission", "Submitting Signed Transaction");
        let call = ContractCall {
            contract_id: wallet.clone(),
            function: function.to_string(),
            args: values,
        };
        match context.pipeline.submit(call, None, &progress).await {
            Err(e @ (Error::Simulation(_) | Error::LedgerRejection { .. })) => {
                Err(self.classify_rejection(context, network, &wallet, &nonce, e).await)
            }
            other => other,
        }
    }

    /// `invoke_signed` on the wallet `user_id` owns on `network`
    pub async fn invoke_for_user(
        &self,
        session_id: &str,
        user_id: &str,
        network: Network,
        directory: &dyn WalletDirectory,
        function: &str,
        args: Vec<CallArg>,
    ) -> Result<SubmissionOutcome> {
        let record = directory
            .wallet_contract(user_id, network)
            .await?
            .ok_or_else(|| {
                Error::InvalidArgument(format!("user {} has no wallet on {}", user_id, network))
            })?;
        self.invoke_signed(
            session_id,
            network,
            &record.passkey_public_key,
            &record.contract_id,
            function,
            args,
        )
        .await
    }

    /// A rejection after the wallet nonce moved on means the signature went stale
    async fn classify_rejection(
        &self,
        context: &NetworkContext,
        network: Network,
        wallet: &str,
        signed_nonce: &[u8],
        error: Error,
    ) -> Error {
        let source = context.pipeline.signer().account_id();
        match context.nonces.fetch_nonce(source, network, wallet).await {
            Ok(current) if current != signed_nonce => {
                tracing::warn!(
                    wallet = %wallet,
                    signed = %hex::encode(signed_nonce),
                    current = %hex::encode(&current),
                    "Aggregate signature is stale"
                );
                Error::StaleSignature {
                    hash: error.tx_hash().map(str::to_string),
                    reason: format!(
                        "signed nonce {} but the wallet is at {} ({})",
                        hex::encode(signed_nonce),
                        hex::encode(&current),
                        error
                    ),
                }
            }
            _ => error,
        }
    }
}

impl std::fmt::Debug for SmartWalletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartWalletService")
            .field("nodes", &self.aggregator.node_count())
            .field("networks", &self.networks())
            .finish()
    }
}

/// True when the factory call cannot have executed: it was rejected, reverted
/// in simulation, or failed before anything was signed.
fn deployment_never_happened(error: &Error) -> bool {
    match error {
        Error::LedgerRejection { .. } | Error::Simulation(_) => true,
        other => other.tx_hash().is_none(),
    }
}
