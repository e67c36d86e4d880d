//! Certificate model and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Lifecycle states of a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "certificate_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    /// Recorded locally, not yet anchored on the ledger.
    Requested,
    /// Anchored on the ledger.
    Issued,
    /// Validated by a regulator.
    Validated,
    /// Withdrawn after issuance.
    Revoked,
    /// Past its expiry date.
    Expired,
}

/// Transitions that move a certificate between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateAction {
    Issue,
    Validate,
    Revoke,
    Expire,
}

impl CertificateStatus {
    /// Returns the state reached by applying `action`, or `None` if the
    /// transition is not allowed from the current state.
    pub fn apply(self, action: CertificateAction) -> Option<CertificateStatus> {
        use CertificateAction::*;
        use CertificateStatus::*;
        match (self, action) {
            (Requested, Issue) => Some(Issued),
            (Issued, Validate) => Some(Validated),
            (Issued | Validated, Revoke) => Some(Revoked),
            (Issued | Validated, Expire) => Some(Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Requested => "requested",
            CertificateStatus::Issued => "issued",
            CertificateStatus::Validated => "validated",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Expired => "expired",
        }
    }

    /// Parse a status from its lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested),
            "issued" => Some(Self::Issued),
            "validated" => Some(Self::Validated),
            "revoked" => Some(Self::Revoked),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Ledger network a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "ledger_network", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Mainnet,
}

/// Where a certificate artifact lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "storage_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// File under the upload directory.
    Local,
    /// Hashed from an in-memory buffer and never written.
    Memory,
}

/// Storage metadata of the backing artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    #[sqlx(rename = "storage_provider")]
    pub provider: Option<StorageProvider>,
    /// Path relative to the upload base directory.
    #[sqlx(rename = "storage_path")]
    pub path: Option<String>,
    #[sqlx(rename = "storage_public_url")]
    pub public_url: Option<String>,
}

impl StorageInfo {
    pub fn none() -> Self {
        Self {
            provider: None,
            path: None,
            public_url: None,
        }
    }
}

/// Local cache of the certificate's ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub network: Network,
    pub contract_id: Option<String>,
    pub on_chain_id: Option<String>,
    pub tx_hash_issue: Option<String>,
    pub tx_hash_validate: Option<String>,
}

/// A certified artifact.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub certificate_name: String,
    pub subject: String,
    /// Lowercase hex SHA-256 of the artifact.
    pub metadata_hash: String,
    pub original_filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    #[sqlx(flatten)]
    pub storage: StorageInfo,
    #[sqlx(flatten)]
    pub chain: ChainInfo,
    pub status: CertificateStatus,
    pub company_id: Option<Uuid>,
    pub requested_by_user_id: Option<Uuid>,
    pub expiry_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every update.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// True once the certificate has a ledger anchor.
    pub fn is_anchored(&self) -> bool {
        self.chain.on_chain_id.is_some()
    }

    /// True when an expiry date is set and has passed.
    pub fn is_past_expiry(&self) -> bool {
        self.expiry_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }
}

/// Data required to create a new certificate.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub certificate_name: String,
    pub subject: String,
    pub metadata_hash: String,
    pub original_filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub storage: StorageInfo,
    pub chain: ChainInfo,
    pub status: CertificateStatus,
    pub company_id: Option<Uuid>,
    pub requested_by_user_id: Option<Uuid>,
    pub expiry_at: Option<DateTime<Utc>>,
}

/// Partial update applied with a version check. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct CertificatePatch {
    pub certificate_name: Option<String>,
    pub subject: Option<String>,
    pub status: Option<CertificateStatus>,
    pub metadata_hash: Option<String>,
    pub original_filename: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub storage: Option<StorageInfo>,
    pub network: Option<Network>,
    pub on_chain_id: Option<String>,
    pub tx_hash_issue: Option<String>,
    pub tx_hash_validate: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
}

impl CertificatePatch {
    pub fn is_empty(&self) -> bool {
        self.certificate_name.is_none()
            && self.subject.is_none()
            && self.status.is_none()
            && self.metadata_hash.is_none()
            && self.original_filename.is_none()
            && self.mime_type.is_none()
            && self.size.is_none()
            && self.storage.is_none()
            && self.network.is_none()
            && self.on_chain_id.is_none()
            && self.tx_hash_issue.is_none()
            && self.tx_hash_validate.is_none()
            && self.expiry_at.is_none()
    }

    /// Applies the patch to an in-memory copy, bumping version and timestamp.
    pub fn apply_to(&self, cert: &mut Certificate) {
        if let Some(v) = &self.certificate_name {
            cert.certificate_name = v.clone();
        }
        if let Some(v) = &self.subject {
            cert.subject = v.clone();
        }
        if let Some(v) = self.status {
            cert.status = v;
        }
        if let Some(v) = &self.metadata_hash {
            cert.metadata_hash = v.clone();
        }
        if let Some(v) = &self.original_filename {
            cert.original_filename = Some(v.clone());
        }
        if let Some(v) = &self.mime_type {
            cert.mime_type = Some(v.clone());
        }
        if let Some(v) = self.size {
            cert.size = Some(v);
        }
        if let Some(v) = &self.storage {
            cert.storage = v.clone();
        }
        if let Some(v) = self.network {
            cert.chain.network = v;
        }
        if let Some(v) = &self.on_chain_id {
            cert.chain.on_chain_id = Some(v.clone());
        }
        if let Some(v) = &self.tx_hash_issue {
            cert.chain.tx_hash_issue = Some(v.clone());
        }
        if let Some(v) = &self.tx_hash_validate {
            cert.chain.tx_hash_validate = Some(v.clone());
        }
        if let Some(v) = self.expiry_at {
            cert.expiry_at = Some(v);
        }
        cert.version += 1;
        cert.updated_at = Utc::now();
    }
}
