//! Custodial ledger key
//!
//! SECURITY: This is the ONLY place where the ledger private key exists.
//! - The seed is read through `secrecy` and never kept as a plain `String`
//! - The key is never serialized and never logged
//! - Signer nodes never see it; they only hold BLS shares

use crate::config::Network;
use crate::ledger::envelope::{
    DecoratedSignature, FeeBumpEnvelope, SignedFeeBump, SignedTransaction, TransactionEnvelope,
};
use crate::ledger::strkey::{self, StrKeyKind};
use crate::{Error, Result};
use ed25519_dalek::{Signer, SigningKey};
use secrecy::{ExposeSecret, SecretString};

/// The relay's single ledger key, used as source and fee source of every
/// transaction it submits.
///
/// Signing is a pure computation; the signer is shared read-only across tasks.
pub struct CustodialSigner {
    key: SigningKey,
    account_id: String,
}

impl CustodialSigner {
    /// Load the key from an environment variable holding a hex seed or an `S...` secret
    pub fn from_env(var_name: &str) -> Result<Self> {
        let secret = std::env::var(var_name).map(SecretString::from).map_err(|_| {
            Error::Signer(format!(
                "Environment variable {} not set. Required for transaction signing.",
                var_name
            ))
        })?;
        Self::from_secret(&secret)
    }

    pub fn from_secret(secret: &SecretString) -> Result<Self> {
        let raw = secret.expose_secret().trim();
        if raw.starts_with('S') {
            let seed = strkey::decode(StrKeyKind::Seed, raw)
                .map_err(|_| Error::Signer("invalid secret seed".to_string()))?;
            return Ok(Self::from_seed(seed));
        }
        Self::from_hex(raw)
    }

    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        let seed_hex = seed_hex.strip_prefix("0x").unwrap_or(seed_hex);
        let bytes = hex::decode(seed_hex)
            .map_err(|e| Error::Signer(format!("Invalid private key: {}", e)))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::Signer(format!("Invalid private key: expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(seed))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let account_id = strkey::encode(StrKeyKind::Account, key.verifying_key().as_bytes());
        Self { key, account_id }
    }

    /// Public account id (`G...`), safe to share
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    fn decorated(&self, hash: &[u8; 32]) -> DecoratedSignature {
        let public_key = self.public_key();
        DecoratedSignature {
            hint: hex::encode(&public_key[28..]),
            signature: hex::encode(self.key.sign(hash).to_bytes()),
        }
    }

    pub fn sign_transaction(
        &self,
        envelope: TransactionEnvelope,
        network: Network,
    ) -> Result<SignedTransaction> {
        let hash = envelope.hash(network)?;
        Ok(SignedTransaction {
            signatures: vec![self.decorated(&hash)],
            envelope,
        })
    }

    pub fn sign_fee_bump(&self, envelope: FeeBumpEnvelope, network: Network) -> Result<SignedFeeBump> {
        let hash = envelope.hash(network)?;
        Ok(SignedFeeBump {
            signatures: vec![self.decorated(&hash)],
            envelope,
        })
    }
}

impl std::fmt::Debug for CustodialSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialSigner")
            .field("account_id", &self.account_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::envelope::ContractCall;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    // Test seed (DO NOT use in production!)
    const TEST_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn envelope(source: &str) -> TransactionEnvelope {
        TransactionEnvelope::new(
            source,
            1,
            100,
            ContractCall {
                contract_id: "CWALLET".to_string(),
                function: "noop".to_string(),
                args: vec![],
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn account_id_is_a_valid_strkey() {
        let signer = CustodialSigner::from_hex(TEST_SEED).unwrap();
        assert!(signer.account_id().starts_with('G'));
        assert_eq!(
            strkey::decode(StrKeyKind::Account, signer.account_id()).unwrap(),
            signer.public_key()
        );
    }

    #[test]
    fn accepts_seed_strkey() {
        let seed: [u8; 32] = hex::decode(TEST_SEED).unwrap().try_into().unwrap();
        let secret = SecretString::from(strkey::encode(StrKeyKind::Seed, &seed));
        let signer = CustodialSigner::from_secret(&secret).unwrap();
        assert_eq!(signer.public_key(), CustodialSigner::from_seed(seed).public_key());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(matches!(
            CustodialSigner::from_hex("abcd"),
            Err(Error::Signer(_))
        ));
    }

    #[test]
    fn signature_verifies_against_envelope_hash() {
        let signer = CustodialSigner::from_hex(TEST_SEED).unwrap();
        let signed = signer
            .sign_transaction(envelope(signer.account_id()), Network::Testnet)
            .unwrap();

        let hash = signed.envelope.hash(Network::Testnet).unwrap();
        let raw: [u8; 64] = hex::decode(&signed.signatures[0].signature)
            .unwrap()
            .try_into()
            .unwrap();
        let key = VerifyingKey::from_bytes(&signer.public_key()).unwrap();
        assert!(key.verify(&hash, &Signature::from_bytes(&raw)).is_ok());
        assert_eq!(signed.signatures[0].hint.len(), 8);
    }

    #[test]
    fn debug_redacts_key() {
        let signer = CustodialSigner::from_hex(TEST_SEED).unwrap();
        let debug_str = format!("{:?}", signer);
        assert!(!debug_str.contains("9d61b19d"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
