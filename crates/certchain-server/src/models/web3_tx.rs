//! Audit records of ledger interactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::certificate::Network;

/// Why a ledger transaction was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "tx_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxPurpose {
    Issue,
    Validate,
    Revoke,
    Whitelist,
    RemoveWhitelist,
    Transfer,
    Init,
    Other,
}

/// Outcome of a ledger transaction as far as this service knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "tx_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Submitted,
    Confirmed,
    Failed,
}

impl TxStatus {
    /// Status may move out of `Submitted` exactly once.
    pub fn can_settle_to(self, next: TxStatus) -> bool {
        self == TxStatus::Submitted && next != TxStatus::Submitted
    }
}

/// One ledger interaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Web3Tx {
    pub id: Uuid,
    pub network: Network,
    pub purpose: TxPurpose,
    /// Weak reference; may point at a certificate that was never saved.
    pub certificate_id: Option<Uuid>,
    pub submitted_by_user_id: Option<Uuid>,
    pub tx_hash: Option<String>,
    pub status: TxStatus,
    pub latency_ms: Option<i64>,
    pub request_dump: serde_json::Value,
    pub response_dump: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to record a ledger interaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWeb3Tx {
    pub network: Network,
    pub purpose: TxPurpose,
    pub certificate_id: Option<Uuid>,
    pub submitted_by_user_id: Option<Uuid>,
    pub tx_hash: Option<String>,
    pub status: TxStatus,
    pub latency_ms: Option<i64>,
    pub request_dump: serde_json::Value,
    pub response_dump: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Final outcome written onto a `Submitted` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSettlement {
    pub status: TxStatus,
    pub tx_hash: Option<String>,
    pub latency_ms: Option<i64>,
    pub response_dump: Option<serde_json::Value>,
    pub error: Option<String>,
}
