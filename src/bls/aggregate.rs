//! N-of-N signature aggregation across the signer nodes
//!
//! Every configured node signs the same message; the partial signatures are
//! summed in G2. Any single failure aborts the round and is reported with
//! the index of the node that caused it.

use super::codec::{decode_point, encode_point, CurvePoint, POINT_BYTES};
use crate::config::{AggregationMode, Config, Network};
use crate::nodes::SignerNodeClient;
use crate::{Error, Result};
use async_trait::async_trait;
use blst::min_pk::{AggregateSignature as G2Accumulator, Signature as G2Point};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// One signing request, bound to the nonce fetched right before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRound {
    pub network: Network,
    pub wallet_contract_id: String,
    /// Hex-encoded passkey public key of the wallet owner
    pub passkey_public_key: String,
    /// Nonce bytes every node signs
    pub message: Vec<u8>,
}

/// Source of one partial signature
#[async_trait]
pub trait PartialSigner: Send + Sync {
    /// Position of this signer in the configured node list
    fn index(&self) -> usize;

    /// Produce this signer's share for the round
    async fn partial_signature(&self, round: &SigningRound) -> Result<CurvePoint>;
}

/// Group sum of all partial signatures, in 192-byte wire form
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AggregateSignature([u8; POINT_BYTES]);

impl AggregateSignature {
    pub fn as_bytes(&self) -> &[u8; POINT_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for AggregateSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregateSignature({})", self.to_hex())
    }
}

impl From<AggregateSignature> for Vec<u8> {
    fn from(value: AggregateSignature) -> Self {
        value.0.to_vec()
    }
}

/// Running G2 sum, seeded with the first share
struct Accumulator(Option<G2Accumulator>);

impl Accumulator {
    fn new() -> Self {
        Self(None)
    }

    fn add(&mut self, point: &CurvePoint) -> Result<()> {
        let share = G2Point::deserialize(&encode_point(point)).map_err(|e| {
            Error::Format(format!("partial signature is not a G2 point: {:?}", e))
        })?;
        match self.0.as_mut() {
            None => {
                let seed = G2Accumulator::aggregate(&[&share], true).map_err(|e| {
                    Error::Format(format!("partial signature rejected: {:?}", e))
                })?;
                self.0 = Some(seed);
            }
            Some(acc) => acc
                .add_signature(&share, true)
                .map_err(|e| Error::Format(format!("partial signature rejected: {:?}", e)))?,
        }
        Ok(())
    }

    fn finish(self) -> Result<AggregateSignature> {
        let acc = self
            .0
            .ok_or_else(|| Error::InvalidArgument("no partial signatures to aggregate".into()))?;
        // serialize() normalises to affine coordinates
        let affine = acc.to_signature().serialize();
        let point = decode_point(&affine)?;
        Ok(AggregateSignature(encode_point(&point)))
    }
}

/// Orchestrates one signing round across every configured signer
pub struct SignatureAggregator {
    signers: Vec<Arc<dyn PartialSigner>>,
    mode: AggregationMode,
}

impl SignatureAggregator {
    pub fn new(signers: Vec<Arc<dyn PartialSigner>>, mode: AggregationMode) -> Result<Self> {
        if signers.is_empty() {
            return Err(Error::Config("aggregator needs at least one signer".into()));
        }
        Ok(Self { signers, mode })
    }

    /// Build HTTP clients for every configured signer node
    pub fn from_config(config: &Config) -> Result<Self> {
        let signers = SignerNodeClient::from_config(config)?
            .into_iter()
            .map(|client| Arc::new(client) as Arc<dyn PartialSigner>)
            .collect();
        Self::new(signers, config.aggregation)
    }

    pub fn node_count(&self) -> usize {
        self.signers.len()
    }

    /// Collect a share from every node for `message` and sum them.
    ///
    /// Nothing is cached: each call performs N fresh requests.
    pub async fn aggregate(
        &self,
        network: Network,
        passkey_public_key: &str,
        wallet_contract_id: &str,
        message: &[u8],
    ) -> Result<AggregateSignature> {
        let round = SigningRound {
            network,
            wallet_contract_id: wallet_contract_id.to_string(),
            passkey_public_key: passkey_public_key.to_string(),
            message: message.to_vec(),
        };
        let started = Instant::now();

        let signature = match self.mode {
            AggregationMode::Sequential => self.aggregate_sequential(&round).await,
            AggregationMode::Concurrent => self.aggregate_concurrent(&round).await,
        }?;

        tracing::info!(
            nodes = self.signers.len(),
            wallet = %wallet_contract_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregated BLS signature"
        );
        Ok(signature)
    }

    async fn aggregate_sequential(&self, round: &SigningRound) -> Result<AggregateSignature> {
        let mut acc = Accumulator::new();
        for signer in &self.signers {
            let node = signer.index();
            tracing::debug!(node, "Requesting partial signature");
            let share = signer
                .partial_signature(round)
                .await
                .map_err(|e| attribute(node, e))?;
            acc.add(&share).map_err(|e| attribute(node, e))?;
        }
        acc.finish()
    }

    async fn aggregate_concurrent(&self, round: &SigningRound) -> Result<AggregateSignature> {
        let requests = self.signers.iter().map(|signer| async move {
            (signer.index(), signer.partial_signature(round).await)
        });
        let mut results = futures::future::join_all(requests).await;
        results.sort_by_key(|(node, _)| *node);

        let mut acc = Accumulator::new();
        for (node, result) in results {
            let share = result.map_err(|e| attribute(node, e))?;
            acc.add(&share).map_err(|e| attribute(node, e))?;
        }
        acc.finish()
    }
}

fn attribute(node: usize, error: Error) -> Error {
    tracing::warn!(node, error = %error, "Signer node failed, aborting aggregation");
    Error::Aggregation {
        node,
        source: Box::new(error),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use blst::min_pk::SecretKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const TEST_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

    /// Signer backed by a local secret key
    pub(crate) struct KeySigner {
        pub index: usize,
        pub key: SecretKey,
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl KeySigner {
        pub(crate) fn new(index: usize) -> Self {
            let ikm = [index as u8 + 1; 32];
            Self {
                index,
                key: SecretKey::key_gen(&ikm, &[]).unwrap(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub(crate) fn failing(index: usize) -> Self {
            Self {
                fail: true,
                ..Self::new(index)
            }
        }

        pub(crate) fn share(&self, message: &[u8]) -> [u8; POINT_BYTES] {
            self.key.sign(message, TEST_DST, &[]).serialize()
        }
    }

    #[async_trait]
    impl PartialSigner for KeySigner {
        fn index(&self) -> usize {
            self.index
        }

        async fn partial_signature(&self, round: &SigningRound) -> Result<CurvePoint> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::NodeUnavailable {
                    node: self.index,
                    reason: "503 Service Unavailable".to_string(),
                });
            }
            decode_point(&self.share(&round.message))
        }
    }

    /// Independent G2 sum over the raw blst bindings
    pub(crate) fn reference_sum(shares: &[[u8; POINT_BYTES]]) -> [u8; POINT_BYTES] {
        unsafe {
            let mut acc = blst::blst_p2::default();
            for (i, bytes) in shares.iter().enumerate() {
                let mut affine = blst::blst_p2_affine::default();
                assert_eq!(
                    blst::blst_p2_deserialize(&mut affine, bytes.as_ptr()),
                    blst::BLST_ERROR::BLST_SUCCESS
                );
                let mut point = blst::blst_p2::default();
                blst::blst_p2_from_affine(&mut point, &affine);
                if i == 0 {
                    acc = point;
                } else {
                    let previous = acc;
                    blst::blst_p2_add_or_double(&mut acc, &previous, &point);
                }
            }
            let mut affine = blst::blst_p2_affine::default();
            blst::blst_p2_to_affine(&mut affine, &acc);
            let mut out = [0u8; POINT_BYTES];
            blst::blst_p2_affine_serialize(out.as_mut_ptr(), &affine);
            out
        }
    }

    fn aggregator(signers: Vec<Arc<KeySigner>>, mode: AggregationMode) -> SignatureAggregator {
        let signers = signers
            .into_iter()
            .map(|s| s as Arc<dyn PartialSigner>)
            .collect();
        SignatureAggregator::new(signers, mode).unwrap()
    }

    fn nonce_message() -> Vec<u8> {
        let mut message = vec![0x00, 0x11, 0x22, 0x33];
        message.extend((4u8..32).map(|i| i.wrapping_mul(0x11)));
        message
    }

    #[tokio::test]
    async fn matches_reference_point_addition() {
        let message = nonce_message();
        assert_eq!(message.len(), 32);
        let signers: Vec<_> = (0..3).map(|i| Arc::new(KeySigner::new(i))).collect();
        let shares: Vec<_> = signers.iter().map(|s| s.share(&message)).collect();

        let aggregate = aggregator(signers, AggregationMode::Sequential)
            .aggregate(Network::Testnet, "aa", "CWALLET", &message)
            .await
            .unwrap();

        assert_eq!(aggregate.as_bytes(), &reference_sum(&shares));
    }

    #[tokio::test]
    async fn order_of_nodes_does_not_change_aggregate() {
        let message = nonce_message();
        let orders = [[0, 1, 2], [2, 0, 1], [1, 2, 0], [2, 1, 0]];
        let mut results = Vec::new();
        for order in orders {
            let signers = order.iter().map(|i| Arc::new(KeySigner::new(*i))).collect();
            let aggregate = aggregator(signers, AggregationMode::Sequential)
                .aggregate(Network::Testnet, "aa", "CWALLET", &message)
                .await
                .unwrap();
            results.push(aggregate);
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn one_failing_node_aborts_round() {
        let signers = vec![
            Arc::new(KeySigner::new(0)),
            Arc::new(KeySigner::failing(1)),
            Arc::new(KeySigner::new(2)),
        ];
        let err = aggregator(signers.clone(), AggregationMode::Sequential)
            .aggregate(Network::Testnet, "aa", "CWALLET", &nonce_message())
            .await
            .unwrap_err();

        assert_eq!(err.failed_node(), Some(1));
        assert!(matches!(err, Error::Aggregation { node: 1, .. }));
        // sequential mode never reaches the node after the failure
        assert_eq!(signers[2].calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_mode_matches_sequential() {
        let message = nonce_message();
        let make = || (0..3).map(|i| Arc::new(KeySigner::new(i))).collect::<Vec<_>>();
        let sequential = aggregator(make(), AggregationMode::Sequential)
            .aggregate(Network::Public, "aa", "CWALLET", &message)
            .await
            .unwrap();
        let concurrent = aggregator(make(), AggregationMode::Concurrent)
            .aggregate(Network::Public, "aa", "CWALLET", &message)
            .await
            .unwrap();
        assert_eq!(sequential, concurrent);
    }

    #[tokio::test]
    async fn concurrent_mode_reports_lowest_failing_node() {
        let signers = vec![
            Arc::new(KeySigner::new(0)),
            Arc::new(KeySigner::failing(1)),
            Arc::new(KeySigner::failing(2)),
        ];
        let err = aggregator(signers.clone(), AggregationMode::Concurrent)
            .aggregate(Network::Testnet, "aa", "CWALLET", &nonce_message())
            .await
            .unwrap_err();
        assert_eq!(err.failed_node(), Some(1));
        assert!(signers.iter().all(|s| s.calls.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn every_round_hits_every_node() {
        let signers: Vec<_> = (0..3).map(|i| Arc::new(KeySigner::new(i))).collect();
        let agg = aggregator(signers.clone(), AggregationMode::Sequential);

        let first = agg
            .aggregate(Network::Testnet, "aa", "CWALLET", b"nonce-1")
            .await
            .unwrap();
        let second = agg
            .aggregate(Network::Testnet, "aa", "CWALLET", b"nonce-2")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(signers.iter().all(|s| s.calls.load(Ordering::SeqCst) == 2));
    }

    #[tokio::test]
    async fn malformed_share_is_attributed() {
        struct Garbage;

        #[async_trait]
        impl PartialSigner for Garbage {
            fn index(&self) -> usize {
                1
            }

            async fn partial_signature(&self, _round: &SigningRound) -> Result<CurvePoint> {
                decode_point(&[0x11u8; POINT_BYTES])
            }
        }

        let signers: Vec<Arc<dyn PartialSigner>> =
            vec![Arc::new(KeySigner::new(0)), Arc::new(Garbage)];
        let err = SignatureAggregator::new(signers, AggregationMode::Sequential)
            .unwrap()
            .aggregate(Network::Testnet, "aa", "CWALLET", b"m")
            .await
            .unwrap_err();

        match err {
            Error::Aggregation { node, source } => {
                assert_eq!(node, 1);
                assert!(matches!(*source, Error::Format(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_signer_list_is_rejected() {
        assert!(SignatureAggregator::new(Vec::new(), AggregationMode::Sequential).is_err());
    }
}
