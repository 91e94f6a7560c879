//! HTTP client for one remote signer node
//!
//! SECURITY NOTE:
//! - Nodes never see the custodial ledger key
//! - Only the passkey public key, wallet id and nonce payload are sent

use crate::bls::{decode_point_hex, CurvePoint, PartialSigner, SigningRound};
use crate::config::{Config, Network};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A configured signer node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerNode {
    pub endpoint: String,
    pub index: usize,
}

/// Key share reserved on a node for a wallet that is being created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypairReservation {
    /// Hex-encoded BLS public key share
    pub public_key: String,
    /// POST here once the wallet is durably created
    pub success_callback: String,
    /// DELETE here to release the reservation
    pub failure_callback: String,
}

#[derive(Debug, Serialize)]
struct SignPayloadRequest<'a> {
    passkey: &'a str,
    wallet_id: &'a str,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct SignPayloadResponse {
    signature: String,
}

#[derive(Debug, Serialize)]
struct CreationAck<'a> {
    passkey: &'a str,
    wallet_id: &'a str,
}

/// Client for a single signer node
#[derive(Debug, Clone)]
pub struct SignerNodeClient {
    node: SignerNode,
    client: Client,
}

impl SignerNodeClient {
    pub fn new(node: SignerNode, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { node, client })
    }

    /// One client per configured node, indexed by position
    pub fn from_config(config: &Config) -> Result<Vec<Self>> {
        config
            .signer_nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                Self::new(
                    SignerNode {
                        endpoint: node.endpoint.trim_end_matches('/').to_string(),
                        index,
                    },
                    config.node_timeout(),
                )
            })
            .collect()
    }

    pub fn node(&self) -> &SignerNode {
        &self.node
    }

    fn route(&self, path: &str, network: Network) -> String {
        format!(
            "{}/{}/{}",
            self.node.endpoint.trim_end_matches('/'),
            path,
            network.name()
        )
    }

    fn unavailable(&self, reason: impl ToString) -> Error {
        Error::NodeUnavailable {
            node: self.node.index,
            reason: reason.to_string(),
        }
    }

    async fn check(&self, response: std::result::Result<Response, reqwest::Error>) -> Result<Response> {
        let response = response.map_err(|e| self.unavailable(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("HTTP {}: {}", status, body)));
        }
        Ok(response)
    }

    /// Reserve a fresh key share for a new wallet
    pub async fn request_keypair(&self, network: Network) -> Result<KeypairReservation> {
        let url = self.route("generate-bls-keypair", network);
        tracing::debug!(node = self.node.index, url = %url, "Requesting BLS keypair");

        let response = self
            .check(self.client.post(&url).json(&serde_json::json!({})).send().await)
            .await?;
        let reservation: KeypairReservation = response
            .json()
            .await
            .map_err(|e| Error::Format(format!("node {} keypair response: {}", self.node.index, e)))?;

        hex::decode(&reservation.public_key).map_err(|e| {
            Error::Format(format!("node {} returned non-hex public key: {}", self.node.index, e))
        })?;
        Ok(reservation)
    }

    /// Ask the node to sign `message` for the given wallet
    pub async fn request_partial_signature(
        &self,
        network: Network,
        passkey_public_key: &str,
        wallet_contract_id: &str,
        message: &[u8],
    ) -> Result<CurvePoint> {
        let url = self.route("sign/payload", network);
        let body = SignPayloadRequest {
            passkey: passkey_public_key,
            wallet_id: wallet_contract_id,
            payload: hex::encode(message),
        };

        let response = self
            .check(self.client.post(&url).json(&body).send().await)
            .await?;
        let signed: SignPayloadResponse = response
            .json()
            .await
            .map_err(|e| Error::Format(format!("node {} sign response: {}", self.node.index, e)))?;

        decode_point_hex(&signed.signature)
    }

    /// Acknowledge durable wallet creation
    pub async fn notify_success(
        &self,
        success_callback: &str,
        passkey_public_key: &str,
        wallet_contract_id: &str,
    ) -> Result<()> {
        let body = CreationAck {
            passkey: passkey_public_key,
            wallet_id: wallet_contract_id,
        };
        self.check(self.client.post(success_callback).json(&body).send().await)
            .await?;
        Ok(())
    }

    /// Release a reserved but unused key share
    pub async fn notify_failure(&self, failure_callback: &str) -> Result<()> {
        self.check(self.client.delete(failure_callback).send().await)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PartialSigner for SignerNodeClient {
    fn index(&self) -> usize {
        self.node.index
    }

    async fn partial_signature(&self, round: &SigningRound) -> Result<CurvePoint> {
        self.request_partial_signature(
            round.network,
            &round.passkey_public_key,
            &round.wallet_contract_id,
            &round.message,
        )
        .await
    }
}
