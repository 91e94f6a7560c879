//! Custodial key and wallet lookup
//!
//! The ledger private key NEVER leaves `signer`. Wallet records are owned by
//! an external user store reached through `WalletDirectory`.

mod directory;
mod signer;

pub use directory::{normalize_contract_id, InMemoryWalletDirectory, WalletDirectory, WalletRecord};
pub use signer::CustodialSigner;
