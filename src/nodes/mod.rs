//! Remote signer nodes
//!
//! Each node holds one BLS key share per wallet. The relay talks to them
//! over plain HTTP and never sees share secrets.

mod client;
mod provision;

pub use client::{KeypairReservation, SignerNode, SignerNodeClient};
pub use provision::KeyProvisioning;
