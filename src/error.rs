//! Error types for the wallet relay

use std::fmt;
use thiserror::Error;

/// Ledger-level rejection reasons.
///
/// None of these are fixed by resubmitting the same envelope, so neither
/// failover nor fee-bump ever retries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionCode {
    BadSequence,
    InsufficientFee,
    InvalidOperation,
    Reverted,
    Other(String),
}

impl RejectionCode {
    /// Map a ledger result code (`txBAD_SEQ`, `txFAILED`, ...) to a rejection code
    pub fn from_result_code(code: &str) -> Self {
        match code {
            "txBAD_SEQ" => RejectionCode::BadSequence,
            "txINSUFFICIENT_FEE" | "txINSUFFICIENT_BALANCE" => RejectionCode::InsufficientFee,
            "txMALFORMED" | "txBAD_AUTH" | "txNOT_SUPPORTED" => {
                RejectionCode::InvalidOperation
            }
            "txFAILED" => RejectionCode::Reverted,
            other => RejectionCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionCode::BadSequence => write!(f, "bad sequence"),
            RejectionCode::InsufficientFee => write!(f, "insufficient fee"),
            RejectionCode::InvalidOperation => write!(f, "invalid operation"),
            RejectionCode::Reverted => write!(f, "reverted"),
            RejectionCode::Other(code) => write!(f, "{}", code),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed data: {0}")]
    Format(String),

    #[error("Value out of range: {0}")]
    Range(String),

    #[error("Signer node {node} unavailable: {reason}")]
    NodeUnavailable { node: usize, reason: String },

    #[error("Aggregation aborted at signer node {node}: {source}")]
    Aggregation {
        node: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Signature for transaction {} no longer matches the wallet nonce: {reason}", .hash.as_deref().unwrap_or("<unsent>"))]
    StaleSignature {
        hash: Option<String>,
        reason: String,
    },

    #[error("Transport error: {0}")]
    TransientTransport(String),

    #[error("No terminal status for transaction {hash} within the watchdog window")]
    WatchdogTimeout { hash: String },

    #[error("Ledger rejected transaction {}: {code} ({reason})", .hash.as_deref().unwrap_or("<unsent>"))]
    LedgerRejection {
        hash: Option<String>,
        code: RejectionCode,
        reason: String,
    },

    #[error("RPC {method} failed with code {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Transaction simulation failed: {0}")]
    Simulation(String),

    #[error("Submission of transaction {hash} failed: {source}")]
    Submission {
        hash: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Index of the signer node an aggregation or provisioning failure is attributed to
    pub fn failed_node(&self) -> Option<usize> {
        match self {
            Error::Aggregation { node, .. } | Error::NodeUnavailable { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Last known transaction hash, so callers can poll independently
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Error::Submission { hash, .. } | Error::WatchdogTimeout { hash } => Some(hash),
            Error::LedgerRejection { hash, .. } | Error::StaleSignature { hash, .. } => {
                hash.as_deref()
            }
            _ => None,
        }
    }

    /// Whether this error qualifies for the single RPC failover retry
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientTransport(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Whether this error is a confirmed final failure rather than an
    /// intermediate state (timeout, single retry)
    pub fn is_final(&self) -> bool {
        match self {
            Error::WatchdogTimeout { .. } => false,
            Error::Submission { source, .. } => source.is_final(),
            other => !other.is_transient(),
        }
    }

    pub(crate) fn with_hash(self, hash: &str) -> Self {
        match self {
            Error::LedgerRejection {
                hash: None,
                code,
                reason,
            } => Error::LedgerRejection {
                hash: Some(hash.to_string()),
                code,
                reason,
            },
            e @ (Error::LedgerRejection { .. }
            | Error::Submission { .. }
            | Error::StaleSignature { .. }
            | Error::WatchdogTimeout { .. }) => e,
            other => Error::Submission {
                hash: hash.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_map_from_ledger_results() {
        assert_eq!(
            RejectionCode::from_result_code("txBAD_SEQ"),
            RejectionCode::BadSequence
        );
        assert_eq!(
            RejectionCode::from_result_code("txINSUFFICIENT_FEE"),
            RejectionCode::InsufficientFee
        );
        assert_eq!(
            RejectionCode::from_result_code("txWEIRD"),
            RejectionCode::Other("txWEIRD".to_string())
        );
    }

    #[test]
    fn aggregation_error_reports_failed_node() {
        let err = Error::Aggregation {
            node: 1,
            source: Box::new(Error::NodeUnavailable {
                node: 1,
                reason: "connection refused".to_string(),
            }),
        };
        assert_eq!(err.failed_node(), Some(1));
        assert!(err.to_string().contains("signer node 1"));
    }

    #[test]
    fn with_hash_attaches_hash_once() {
        let err = Error::TransientTransport("reset".to_string()).with_hash("abcd");
        assert_eq!(err.tx_hash(), Some("abcd"));
        assert!(!err.is_final());

        let rejection = Error::LedgerRejection {
            hash: None,
            code: RejectionCode::BadSequence,
            reason: "txBAD_SEQ".to_string(),
        }
        .with_hash("ffff");
        assert_eq!(rejection.tx_hash(), Some("ffff"));
        assert!(rejection.is_final());
    }

    #[test]
    fn watchdog_timeout_is_not_final() {
        let err = Error::WatchdogTimeout {
            hash: "aa".to_string(),
        };
        assert!(!err.is_final());
        assert_eq!(err.tx_hash(), Some("aa"));
    }
}
