//! BLS Wallet Relay
//!
//! Custodial relay for smart wallets whose authorisation key is split across
//! N remote signer nodes:
//! - Collects one BLS partial signature per node and sums them in G2
//! - Binds every aggregate to the wallet nonce read right before signing
//! - Submits contract calls with a watchdog, a single fee-bump escalation and
//!   primary/secondary RPC failover, serialised per source account
//!
//! # Security Model
//!
//! - Signer nodes never reveal key shares; the relay only sees public keys and signatures
//! - The custodial ed25519 key is loaded from the environment and never logged
//! - Every aggregation is N-of-N: one failing node aborts the round

pub mod bls;
pub mod config;
pub mod ledger;
pub mod nodes;
pub mod progress;
pub mod service;
pub mod submit;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, Network, RpcConfig, SubmissionConfig};
pub use error::{Error, RejectionCode, Result};
pub use service::SmartWalletService;
