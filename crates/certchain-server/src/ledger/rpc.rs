//! Transport boundary to the ledger gateway.

use async_trait::async_trait;
use certchain_crypto::ContractCall;
use serde::{Deserialize, Serialize};

use super::value::ScValue;

/// Result of simulating a contract call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    /// Set when the contract or host rejected the call.
    pub error: Option<String>,
    pub retval: Option<ScValue>,
    #[serde(default)]
    pub diagnostic_events: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error,
}

/// Immediate answer to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub status: SendStatus,
    pub hash: Option<String>,
    pub error_result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStatus {
    /// Not yet observed in a closed ledger.
    NotFound,
    Success,
    Failed,
}

impl LookupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupStatus::NotFound => "NOT_FOUND",
            LookupStatus::Success => "SUCCESS",
            LookupStatus::Failed => "FAILED",
        }
    }
}

/// State of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxLookup {
    pub status: LookupStatus,
    pub ledger: Option<u64>,
    pub fee_charged: Option<String>,
    pub return_value: Option<ScValue>,
    pub result: Option<serde_json::Value>,
}

impl TxLookup {
    pub fn not_found() -> Self {
        Self {
            status: LookupStatus::NotFound,
            ledger: None,
            fee_charged: None,
            return_value: None,
            result: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Calls exposed by the ledger gateway.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn simulate(&self, call: &ContractCall) -> Result<Simulation, RpcError>;

    /// Submits a signed call.
    async fn send(&self, call: &ContractCall) -> Result<SendResponse, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<TxLookup, RpcError>;

    /// Asks the testnet faucet to fund `address`.
    async fn fund_account(&self, address: &str) -> Result<serde_json::Value, RpcError>;
}
