//! Regulatory bodies that validate certificates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Regulator {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewRegulator {
    pub name: String,
    pub contact_email: Option<String>,
    pub wallet_address: Option<String>,
}
