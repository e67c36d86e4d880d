//! Append-only certificate events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::user::UserRole;

/// Kind of lifecycle fact recorded for a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "certificate_event_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Requested,
    Issued,
    Validated,
    Revoked,
    Comment,
}

/// Who caused an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    #[sqlx(rename = "actor_user_id")]
    pub user_id: Option<Uuid>,
    #[sqlx(rename = "actor_role")]
    pub role: Option<UserRole>,
}

/// An immutable event in a certificate's history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CertificateEvent {
    pub id: Uuid,
    pub certificate_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[sqlx(flatten)]
    pub actor: Actor,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Data required to append an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificateEvent {
    pub certificate_id: Uuid,
    pub event_type: EventType,
    pub actor: Actor,
    pub details: serde_json::Value,
}
