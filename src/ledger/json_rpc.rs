//! JSON-RPC 2.0 client for a ledger RPC endpoint
//!
//! The relay defines its own protocol. Every request is a JSON-RPC 2.0 POST
//! with named params; amounts and sequence numbers travel as decimal strings.
//!
//! | method | params | result |
//! |---|---|---|
//! | `getAccount` | `account` | `id`, `sequence` (last consumed) |
//! | `simulateTransaction` | `transaction`: base64 of the unsigned envelope JSON | `minResourceFee`, `results[].returnValue`, or `error` |
//! | `sendTransaction` | `transaction`: base64 of the `Submittable` JSON | `status` (`PENDING`, `DUPLICATE`, `TRY_AGAIN_LATER`, `ERROR`), `hash`, `errorResultCode` |
//! | `getTransaction` | `hash`: hex inner hash | `status` (`NOT_FOUND`, `PENDING`, `SUCCESS`, `FAILED`), `returnValue`, `resultCode` |
//!
//! Envelope JSON and hashes are defined in `ledger::envelope`; values use the
//! `LedgerValue` serde form.
//!
//! Error classification happens here, once:
//! - connection failures, timeouts, HTTP 5xx/429, `TRY_AGAIN_LATER` and
//!   server-side error objects (`-32603`, `-32000..=-32099`) become
//!   `Error::TransientTransport` and qualify for failover
//! - other error objects become `Error::Rpc`: the request itself is wrong
//! - `ERROR` send statuses become `Error::LedgerRejection` and are final

use super::envelope::{Submittable, TransactionEnvelope};
use super::value::LedgerValue;
use super::{AccountState, LedgerRpc, SendResponse, SendStatus, SimulationResult, TxStatus};
use crate::config::Network;
use crate::error::RejectionCode;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Per-request timeout for RPC calls
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountReply {
    id: String,
    sequence: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateReply {
    #[serde(default)]
    min_resource_fee: Option<String>,
    #[serde(default)]
    results: Vec<SimulatedCall>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    return_value: Option<LedgerValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendReply {
    status: String,
    hash: String,
    #[serde(default)]
    error_result_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReply {
    status: String,
    #[serde(default)]
    return_value: Option<LedgerValue>,
    #[serde(default)]
    result_code: Option<String>,
    #[serde(default)]
    result_message: Option<String>,
}

/// Ledger RPC endpoint reached over HTTP
#[derive(Debug, Clone)]
pub struct JsonRpcLedger {
    url: String,
    network: Network,
    client: Client,
}

impl JsonRpcLedger {
    pub fn new(url: impl Into<String>, network: Network, timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url).map_err(|e| Error::Config(format!("invalid RPC URL '{}': {}", url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url,
            network,
            client,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": method,
            "params": params,
        });
        tracing::debug!(method, url = %self.url, "Ledger RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(method, e))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::TransientTransport(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }
        let reply: RpcReply<T> = response
            .error_for_status()?
            .json()
            .await
            .map_err(|e| classify_transport(method, e))?;

        if let Some(error) = reply.error {
            return Err(classify_rpc_error(method, error));
        }
        reply
            .result
            .ok_or_else(|| Error::Format(format!("{} reply has neither result nor error", method)))
    }
}

#[async_trait]
impl LedgerRpc for JsonRpcLedger {
    fn network(&self) -> Network {
        self.network
    }

    fn name(&self) -> &str {
        &self.url
    }

    async fn get_account(&self, account_id: &str) -> Result<AccountState> {
        let reply: AccountReply = self
            .call("getAccount", json!({ "account": account_id }))
            .await?;
        let sequence = reply
            .sequence
            .parse()
            .map_err(|e| Error::Format(format!("account sequence '{}': {}", reply.sequence, e)))?;
        Ok(AccountState {
            id: reply.id,
            sequence,
        })
    }

    async fn simulate_transaction(&self, envelope: &TransactionEnvelope) -> Result<SimulationResult> {
        // Simulation takes the unsigned envelope
        let wire = base64_json(envelope)?;
        let reply: SimulateReply = self
            .call("simulateTransaction", json!({ "transaction": wire }))
            .await?;

        if let Some(error) = reply.error {
            return Ok(SimulationResult::failed(parse_failure_reason(&error)));
        }
        let resource_fee = match reply.min_resource_fee {
            Some(fee) => fee
                .parse()
                .map_err(|e| Error::Format(format!("minResourceFee '{}': {}", fee, e)))?,
            None => 0,
        };
        let result = reply.results.into_iter().next().and_then(|call| call.return_value);
        Ok(SimulationResult::success(resource_fee, result))
    }

    async fn send_transaction(&self, submission: &Submittable) -> Result<SendResponse> {
        let reply: SendReply = self
            .call("sendTransaction", json!({ "transaction": submission.to_wire()? }))
            .await?;

        match reply.status.as_str() {
            "PENDING" => Ok(SendResponse {
                hash: reply.hash,
                status: SendStatus::Pending,
            }),
            "DUPLICATE" => Ok(SendResponse {
                hash: reply.hash,
                status: SendStatus::Duplicate,
            }),
            "TRY_AGAIN_LATER" => Err(Error::TransientTransport(format!(
                "{} asked to try {} again later",
                self.url, reply.hash
            ))),
            "ERROR" => {
                let code = reply.error_result_code.unwrap_or_default();
                Err(Error::LedgerRejection {
                    hash: Some(reply.hash),
                    code: RejectionCode::from_result_code(&code),
                    reason: reply.error_message.unwrap_or(code),
                })
            }
            other => Err(Error::Format(format!("unknown send status '{}'", other))),
        }
    }

    async fn get_transaction(&self, hash: &str) -> Result<TxStatus> {
        let reply: TransactionReply = self.call("getTransaction", json!({ "hash": hash })).await?;
        match reply.status.as_str() {
            "NOT_FOUND" => Ok(TxStatus::NotFound),
            "PENDING" => Ok(TxStatus::Pending),
            "SUCCESS" => Ok(TxStatus::Success {
                return_value: reply.return_value,
            }),
            "FAILED" => {
                let result_code = reply.result_code.unwrap_or_default();
                Ok(TxStatus::Failed {
                    reason: reply.result_message.unwrap_or_else(|| result_code.clone()),
                    result_code,
                })
            }
            other => Err(Error::Format(format!("unknown transaction status '{}'", other))),
        }
    }
}

fn base64_json(envelope: &TransactionEnvelope) -> Result<String> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    Ok(STANDARD.encode(serde_json::to_vec(envelope)?))
}

/// Internal and implementation-defined server errors are endpoint faults
/// and qualify for failover; anything else is a fault in the request.
fn classify_rpc_error(method: &str, error: RpcErrorObject) -> Error {
    match error.code {
        -32603 | -32099..=-32000 => Error::TransientTransport(format!(
            "{} failed on the endpoint ({}): {}",
            method, error.code, error.message
        )),
        code => Error::Rpc {
            method: method.to_string(),
            code,
            message: error.message,
        },
    }
}

fn classify_transport(method: &str, error: reqwest::Error) -> Error {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        Error::TransientTransport(format!("{}: {}", method, error))
    } else {
        Error::Http(error)
    }
}

/// Reduce a host error dump to its first meaningful line
fn parse_failure_reason(error: &str) -> String {
    let first_line = error
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("simulation failed");

    if let Some(start) = first_line.find("Error(Contract, #") {
        let code = &first_line[start + "Error(Contract, #".len()..];
        if let Some(end) = code.find(')') {
            return format!("contract error #{}", &code[..end]);
        }
    }
    first_line
        .strip_prefix("HostError: ")
        .unwrap_or(first_line)
        .to_string()
}
