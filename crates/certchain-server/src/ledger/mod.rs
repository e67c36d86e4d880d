//! Ledger access: contract calls against the document registry.
//!
//! [`LedgerClient`] drives the simulate, sign, send and confirm sequence over
//! a [`LedgerRpc`] transport and resolves signing keys through a
//! [`SignerSource`].

pub mod client;
pub mod http;
pub mod rpc;
pub mod signer;
pub mod value;

pub use client::{LedgerClient, LedgerSettings, Receipt};
pub use http::HttpLedgerRpc;
pub use rpc::{LedgerRpc, LookupStatus, RpcError, SendResponse, SendStatus, Simulation, TxLookup};
pub use signer::{LedgerSigner, SignerSource, StaticSignerSource};
pub use value::ScValue;

/// Failure of a ledger operation, tagged with the phase it happened in.
///
/// `Display` never includes the raw payload; use [`LedgerError::payload`]
/// for logging.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Simulation failed for {method}")]
    Simulation { method: String, payload: String },

    #[error("Submission failed for {method}")]
    Submission { method: String, payload: String },

    #[error("Transaction {tx_hash} for {method} was rejected by the ledger ({status})")]
    Rejected {
        method: String,
        tx_hash: String,
        status: String,
        payload: String,
    },

    #[error("Transaction {tx_hash} for {method} not confirmed after {waited_ms} ms")]
    Pending {
        method: String,
        tx_hash: String,
        waited_ms: u64,
    },

    #[error("Ledger endpoint unreachable during {method}")]
    Transport { method: String, message: String },

    #[error("Invalid signer: {0}")]
    InvalidSigner(String),

    #[error("Unexpected ledger response for {method}")]
    Decode { method: String, message: String },
}

impl LedgerError {
    pub fn method(&self) -> Option<&str> {
        match self {
            LedgerError::Simulation { method, .. }
            | LedgerError::Submission { method, .. }
            | LedgerError::Rejected { method, .. }
            | LedgerError::Pending { method, .. }
            | LedgerError::Transport { method, .. }
            | LedgerError::Decode { method, .. } => Some(method),
            LedgerError::InvalidSigner(_) => None,
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            LedgerError::Rejected { tx_hash, .. } | LedgerError::Pending { tx_hash, .. } => {
                Some(tx_hash)
            }
            _ => None,
        }
    }

    /// Raw detail for audit logs. Not for callers.
    pub fn payload(&self) -> Option<&str> {
        match self {
            LedgerError::Simulation { payload, .. }
            | LedgerError::Submission { payload, .. }
            | LedgerError::Rejected { payload, .. } => Some(payload),
            LedgerError::Transport { message, .. } | LedgerError::Decode { message, .. } => {
                Some(message)
            }
            LedgerError::Pending { .. } | LedgerError::InvalidSigner(_) => None,
        }
    }
}

/// Shortens a hash or address for log fields.
pub fn short(value: &str, len: usize) -> &str {
    match value.char_indices().nth(len) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
