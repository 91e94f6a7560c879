//! Key share reservation for wallet creation
//!
//! Every node must reserve a share (N-of-N). The reservation is later either
//! committed once the wallet exists, or released so the nodes can discard
//! the unused share.

use super::client::{KeypairReservation, SignerNodeClient};
use crate::config::Network;
use crate::{Error, Result};

/// Reserved key shares across all signer nodes
#[derive(Debug)]
pub struct KeyProvisioning {
    network: Network,
    reserved: Vec<(SignerNodeClient, KeypairReservation)>,
}

impl KeyProvisioning {
    /// Reserve a share on every node, rolling back earlier reservations if one fails
    pub async fn begin(clients: &[SignerNodeClient], network: Network) -> Result<Self> {
        let mut provisioning = Self {
            network,
            reserved: Vec::with_capacity(clients.len()),
        };

        for client in clients {
            match client.request_keypair(network).await {
                Ok(reservation) => provisioning.reserved.push((client.clone(), reservation)),
                Err(e) => {
                    let node = client.node().index;
                    tracing::warn!(
                        node,
                        error = %e,
                        reserved = provisioning.reserved.len(),
                        "Key generation failed, releasing reserved shares"
                    );
                    provisioning.abort().await;
                    return Err(match e {
                        e @ Error::NodeUnavailable { .. } => e,
                        other => Error::NodeUnavailable {
                            node,
                            reason: other.to_string(),
                        },
                    });
                }
            }
        }

        tracing::info!(
            nodes = provisioning.reserved.len(),
            network = %network,
            "Reserved BLS key shares"
        );
        Ok(provisioning)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Public key shares in node order
    pub fn public_keys(&self) -> Result<Vec<Vec<u8>>> {
        self.reserved
            .iter()
            .map(|(_, reservation)| {
                hex::decode(&reservation.public_key)
                    .map_err(|e| Error::Format(format!("public key share: {}", e)))
            })
            .collect()
    }

    /// Confirm the wallet on every node. Failures are logged and otherwise ignored.
    pub async fn commit(self, passkey_public_key: &str, wallet_contract_id: &str) {
        for (client, reservation) in &self.reserved {
            if let Err(e) = client
                .notify_success(
                    &reservation.success_callback,
                    passkey_public_key,
                    wallet_contract_id,
                )
                .await
            {
                tracing::warn!(
                    node = client.node().index,
                    error = %e,
                    "Success callback failed; wallet stays created"
                );
            }
        }
    }

    /// Release every reserved share
    pub async fn abort(self) {
        for (client, reservation) in &self.reserved {
            if let Err(e) = client.notify_failure(&reservation.failure_callback).await {
                tracing::warn!(
                    node = client.node().index,
                    error = %e,
                    "Failed to release key reservation"
                );
            }
        }
    }
}
