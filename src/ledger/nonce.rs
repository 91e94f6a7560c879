//! Replay-protection nonce lookup
//!
//! The nonce returned here is the message every signer node signs. It is read
//! fresh for each signing round and never cached, so an aggregate signature is
//! always bound to the wallet state it was produced against.

use super::envelope::ContractCall;
use super::{read_contract, LedgerRpc, LedgerValue};
use crate::config::Network;
use crate::{Error, Result};
use std::sync::Arc;

/// Contract view function holding the wallet nonce
pub const NONCE_FUNCTION: &str = "get_nonce";

#[derive(Clone)]
pub struct NonceGate {
    ledger: Arc<dyn LedgerRpc>,
}

impl NonceGate {
    pub fn new(ledger: Arc<dyn LedgerRpc>) -> Self {
        Self { ledger }
    }

    /// Read the current nonce of `wallet_contract_id` via simulation
    pub async fn fetch_nonce(
        &self,
        signer_public_key: &str,
        network: Network,
        wallet_contract_id: &str,
    ) -> Result<Vec<u8>> {
        if self.ledger.network() != network {
            return Err(Error::Config(format!(
                "nonce requested on {} but the ledger endpoint serves {}",
                network,
                self.ledger.network()
            )));
        }

        let call = ContractCall {
            contract_id: wallet_contract_id.to_string(),
            function: NONCE_FUNCTION.to_string(),
            args: vec![],
        };
        let value = read_contract(self.ledger.as_ref(), signer_public_key, call).await?;

        match value {
            Some(LedgerValue::Bytes(nonce)) => {
                tracing::debug!(
                    wallet = %wallet_contract_id,
                    nonce = %hex::encode(&nonce),
                    "Fetched wallet nonce"
                );
                Ok(nonce)
            }
            Some(other) => Err(Error::Format(format!(
                "{} returned {:?}, expected bytes",
                NONCE_FUNCTION, other
            ))),
            None => Err(Error::Format(format!(
                "{} on {} returned no value",
                NONCE_FUNCTION, wallet_contract_id
            ))),
        }
    }
}

impl std::fmt::Debug for NonceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceGate")
            .field("ledger", &self.ledger.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::SimulationResult;

    #[tokio::test]
    async fn returns_nonce_bytes() {
        let ledger = MockLedger::new(Network::Testnet).with_simulate(|envelope| {
            assert_eq!(envelope.operation.function, NONCE_FUNCTION);
            assert!(envelope.operation.args.is_empty());
            SimulationResult::success(0, Some(LedgerValue::Bytes(vec![0xde, 0xad])))
        });
        let gate = NonceGate::new(Arc::new(ledger));
        let nonce = gate
            .fetch_nonce("GSIGNER", Network::Testnet, "CWALLET")
            .await
            .unwrap();
        assert_eq!(nonce, vec![0xde, 0xad]);
    }

    #[tokio::test]
    async fn non_bytes_value_is_a_format_error() {
        let ledger = MockLedger::new(Network::Testnet)
            .with_simulate(|_| SimulationResult::success(0, Some(LedgerValue::U32(3))));
        let gate = NonceGate::new(Arc::new(ledger));
        let err = gate
            .fetch_nonce("GSIGNER", Network::Testnet, "CWALLET")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[tokio::test]
    async fn network_mismatch_is_rejected() {
        let gate = NonceGate::new(Arc::new(MockLedger::new(Network::Testnet)));
        let err = gate
            .fetch_nonce("GSIGNER", Network::Public, "CWALLET")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
