//! Persistence boundary for certificates, audit records and accounts.
//!
//! Everything the service persists goes through [`Store`]. The Postgres
//! implementation is used in production; [`MemoryStore`] backs tests and
//! local runs and can be told to fail individual operations.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Certificate, CertificateEvent, CertificatePatch, CertificateStatus, Company, EventType,
    NewCertificate, NewCertificateEvent, NewCompany, NewRegulator, NewUser, NewWeb3Tx, Regulator,
    TxSettlement, User, UserRole, Web3Tx,
};

pub use memory::{MemoryStore, StoreOp};
pub use postgres::PgStore;

/// Errors raised by a [`Store`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique value (email, company name) is already taken.
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub const MAX_PAGE_SIZE: i64 = 100;

/// Highest page number whose offset still fits in an `i64`.
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// Resolves client paging into `(page, limit)` within the supported bounds.
pub fn clamp_paging(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> (i64, i64) {
    let limit = limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
    let page = page.unwrap_or(1).clamp(1, MAX_PAGE);
    (page, limit)
}

/// Column a certificate listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    CertificateName,
    Subject,
    Status,
}

impl SortField {
    /// Accepts the camelCase names used by the HTTP API.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "createdAt" => Some(Self::CreatedAt),
            "updatedAt" => Some(Self::UpdatedAt),
            "certificateName" => Some(Self::CertificateName),
            "subject" => Some(Self::Subject),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::CertificateName => "certificate_name",
            Self::Subject => "subject",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filters, ordering and paging for certificate listings.
#[derive(Debug, Clone)]
pub struct CertificateQuery {
    pub status: Option<CertificateStatus>,
    pub company_id: Option<Uuid>,
    /// Case-insensitive match against name, subject and original filename.
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    /// 1-based page number.
    pub page: i64,
    pub limit: i64,
}

impl Default for CertificateQuery {
    fn default() -> Self {
        Self {
            status: None,
            company_id: None,
            search: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: 50,
        }
    }
}

impl CertificateQuery {
    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.limit)
    }
}

/// Name search and paging for company and regulator listings.
#[derive(Debug, Clone)]
pub struct DirectoryQuery {
    /// Case-insensitive match against the name.
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
}

impl DirectoryQuery {
    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.limit)
    }
}

/// Row offset of a 1-based page. Saturates instead of overflowing.
fn page_offset(page: i64, limit: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(limit.max(0))
}

/// One page of certificates plus the unpaged total.
#[derive(Debug, Clone)]
pub struct CertificatePage {
    pub items: Vec<Certificate>,
    pub total: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Certificates

    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate>;

    async fn get_certificate(&self, id: Uuid) -> StoreResult<Option<Certificate>>;

    /// Applies `patch` only if the stored version equals `expected_version`.
    /// Returns `None` when the row is missing or the version moved on.
    async fn update_certificate(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: &CertificatePatch,
    ) -> StoreResult<Option<Certificate>>;

    /// Returns the number of rows removed (0 or 1).
    async fn delete_certificate(&self, id: Uuid) -> StoreResult<u64>;

    async fn list_certificates(&self, query: &CertificateQuery) -> StoreResult<CertificatePage>;

    // Events

    async fn insert_event(&self, new: NewCertificateEvent) -> StoreResult<CertificateEvent>;

    /// Events of one certificate, newest first.
    async fn list_events(&self, certificate_id: Uuid) -> StoreResult<Vec<CertificateEvent>>;

    /// The newest event of `event_type` for each of the given certificates.
    async fn latest_events(
        &self,
        certificate_ids: &[Uuid],
        event_type: EventType,
    ) -> StoreResult<Vec<CertificateEvent>>;

    async fn delete_events(&self, certificate_id: Uuid) -> StoreResult<u64>;

    // Ledger transactions

    async fn insert_web3_tx(&self, new: NewWeb3Tx) -> StoreResult<Web3Tx>;

    /// Moves a `submitted` row to its final status. Returns `None` if the row
    /// does not exist or was already settled.
    async fn settle_web3_tx(&self, id: Uuid, settlement: &TxSettlement)
        -> StoreResult<Option<Web3Tx>>;

    /// Transactions of one certificate, newest first.
    async fn list_web3_txs(&self, certificate_id: Uuid) -> StoreResult<Vec<Web3Tx>>;

    async fn delete_web3_txs(&self, certificate_id: Uuid) -> StoreResult<u64>;

    // Accounts

    async fn insert_company(&self, new: NewCompany) -> StoreResult<Company>;

    async fn find_company_by_name(&self, name: &str) -> StoreResult<Option<Company>>;

    async fn get_companies(&self, ids: &[Uuid]) -> StoreResult<Vec<Company>>;

    /// Companies ordered by name.
    async fn list_companies(&self, query: &DirectoryQuery) -> StoreResult<Vec<Company>>;

    async fn insert_regulator(&self, new: NewRegulator) -> StoreResult<Regulator>;

    async fn find_regulator_by_name(&self, name: &str) -> StoreResult<Option<Regulator>>;

    async fn get_regulator(&self, id: Uuid) -> StoreResult<Option<Regulator>>;

    /// Regulators ordered by name.
    async fn list_regulators(&self, query: &DirectoryQuery) -> StoreResult<Vec<Regulator>>;

    async fn insert_user(&self, new: NewUser) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn count_users_with_role(&self, role: UserRole) -> StoreResult<i64>;
}
