//! In-process [`Store`] with per-operation fault injection.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    CertificatePage, CertificateQuery, DirectoryQuery, SortField, SortOrder, Store, StoreError,
    StoreResult,
};
use crate::models::{
    Certificate, CertificateEvent, CertificatePatch, Company, EventType, NewCertificate,
    NewCertificateEvent, NewCompany, NewRegulator, NewUser, NewWeb3Tx, Regulator, TxSettlement,
    User, UserRole, Web3Tx,
};

/// Store operations that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    InsertCertificate,
    GetCertificate,
    UpdateCertificate,
    DeleteCertificate,
    ListCertificates,
    InsertEvent,
    DeleteEvents,
    InsertWeb3Tx,
    SettleWeb3Tx,
    DeleteWeb3Txs,
}

#[derive(Default)]
struct Inner {
    certificates: Vec<Certificate>,
    events: Vec<CertificateEvent>,
    web3_txs: Vec<Web3Tx>,
    companies: Vec<Company>,
    regulators: Vec<Regulator>,
    users: Vec<User>,
    faults: HashSet<StoreOp>,
}

impl Inner {
    fn check(&self, op: StoreOp) -> StoreResult<()> {
        if self.faults.contains(&op) {
            return Err(StoreError::Unavailable(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }
}

fn name_matches(name: &str, search: Option<&str>) -> bool {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(search) => name.to_lowercase().contains(&search.to_lowercase()),
        None => true,
    }
}

fn page_of<T: Clone>(rows: Vec<&T>, query: &DirectoryQuery) -> Vec<T> {
    rows.into_iter()
        .skip(query.offset().max(0) as usize)
        .take(query.limit.max(0) as usize)
        .cloned()
        .collect()
}

/// Vectors in insertion order behind a mutex. Nothing awaits while the lock is held.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent call of `op` fail until cleared.
    pub fn fail_on(&self, op: StoreOp) {
        self.lock().faults.insert(op);
    }

    pub fn clear_fault(&self, op: StoreOp) {
        self.lock().faults.remove(&op);
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.lock().certificates.clone()
    }

    pub fn events(&self) -> Vec<CertificateEvent> {
        self.lock().events.clone()
    }

    pub fn web3_txs(&self) -> Vec<Web3Tx> {
        self.lock().web3_txs.clone()
    }
}

fn matches(cert: &Certificate, query: &CertificateQuery) -> bool {
    if query.status.is_some_and(|s| s != cert.status) {
        return false;
    }
    if query.company_id.is_some() && query.company_id != cert.company_id {
        return false;
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        let hit = cert.certificate_name.to_lowercase().contains(&needle)
            || cert.subject.to_lowercase().contains(&needle)
            || cert
                .original_filename
                .as_deref()
                .is_some_and(|f| f.to_lowercase().contains(&needle));
        if !hit {
            return false;
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
        let mut inner = self.lock();
        inner.check(StoreOp::InsertCertificate)?;
        let now = Utc::now();
        let cert = Certificate {
            id: Uuid::new_v4(),
            certificate_name: new.certificate_name,
            subject: new.subject,
            metadata_hash: new.metadata_hash,
            original_filename: new.original_filename,
            mime_type: new.mime_type,
            size: new.size,
            storage: new.storage,
            chain: new.chain,
            status: new.status,
            company_id: new.company_id,
            requested_by_user_id: new.requested_by_user_id,
            expiry_at: new.expiry_at,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        inner.certificates.push(cert.clone());
        Ok(cert)
    }

    async fn get_certificate(&self, id: Uuid) -> StoreResult<Option<Certificate>> {
        let inner = self.lock();
        inner.check(StoreOp::GetCertificate)?;
        Ok(inner.certificates.iter().find(|c| c.id == id).cloned())
    }

    async fn update_certificate(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: &CertificatePatch,
    ) -> StoreResult<Option<Certificate>> {
        let mut inner = self.lock();
        inner.check(StoreOp::UpdateCertificate)?;
        let Some(cert) = inner
            .certificates
            .iter_mut()
            .find(|c| c.id == id && c.version == expected_version)
        else {
            return Ok(None);
        };
        patch.apply_to(cert);
        Ok(Some(cert.clone()))
    }

    async fn delete_certificate(&self, id: Uuid) -> StoreResult<u64> {
        let mut inner = self.lock();
        inner.check(StoreOp::DeleteCertificate)?;
        let before = inner.certificates.len();
        inner.certificates.retain(|c| c.id != id);
        Ok((before - inner.certificates.len()) as u64)
    }

    async fn list_certificates(&self, query: &CertificateQuery) -> StoreResult<CertificatePage> {
        let inner = self.lock();
        inner.check(StoreOp::ListCertificates)?;
        let mut items: Vec<Certificate> = inner
            .certificates
            .iter()
            .filter(|c| matches(c, query))
            .cloned()
            .collect();
        let total = items.len() as i64;

        items.sort_by(|a, b| match query.sort_by {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::CertificateName => a.certificate_name.cmp(&b.certificate_name),
            SortField::Subject => a.subject.cmp(&b.subject),
            SortField::Status => a.status.cmp(&b.status),
        });
        if query.sort_order == SortOrder::Desc {
            items.reverse();
        }

        let items = items
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok(CertificatePage { items, total })
    }

    async fn insert_event(&self, new: NewCertificateEvent) -> StoreResult<CertificateEvent> {
        let mut inner = self.lock();
        inner.check(StoreOp::InsertEvent)?;
        let event = CertificateEvent {
            id: Uuid::new_v4(),
            certificate_id: new.certificate_id,
            event_type: new.event_type,
            actor: new.actor,
            details: new.details,
            created_at: Utc::now(),
        };
        inner.events.push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, certificate_id: Uuid) -> StoreResult<Vec<CertificateEvent>> {
        let inner = self.lock();
        Ok(inner
            .events
            .iter()
            .rev()
            .filter(|e| e.certificate_id == certificate_id)
            .cloned()
            .collect())
    }

    async fn latest_events(
        &self,
        certificate_ids: &[Uuid],
        event_type: EventType,
    ) -> StoreResult<Vec<CertificateEvent>> {
        let inner = self.lock();
        let mut seen = HashSet::new();
        Ok(inner
            .events
            .iter()
            .rev()
            .filter(|e| e.event_type == event_type && certificate_ids.contains(&e.certificate_id))
            .filter(|e| seen.insert(e.certificate_id))
            .cloned()
            .collect())
    }

    async fn delete_events(&self, certificate_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.lock();
        inner.check(StoreOp::DeleteEvents)?;
        let before = inner.events.len();
        inner.events.retain(|e| e.certificate_id != certificate_id);
        Ok((before - inner.events.len()) as u64)
    }

    async fn insert_web3_tx(&self, new: NewWeb3Tx) -> StoreResult<Web3Tx> {
        let mut inner = self.lock();
        inner.check(StoreOp::InsertWeb3Tx)?;
        let now = Utc::now();
        let tx = Web3Tx {
            id: Uuid::new_v4(),
            network: new.network,
            purpose: new.purpose,
            certificate_id: new.certificate_id,
            submitted_by_user_id: new.submitted_by_user_id,
            tx_hash: new.tx_hash,
            status: new.status,
            latency_ms: new.latency_ms,
            request_dump: new.request_dump,
            response_dump: new.response_dump,
            error: new.error,
            created_at: now,
            updated_at: now,
        };
        inner.web3_txs.push(tx.clone());
        Ok(tx)
    }

    async fn settle_web3_tx(
        &self,
        id: Uuid,
        settlement: &TxSettlement,
    ) -> StoreResult<Option<Web3Tx>> {
        let mut inner = self.lock();
        inner.check(StoreOp::SettleWeb3Tx)?;
        let Some(tx) = inner
            .web3_txs
            .iter_mut()
            .find(|t| t.id == id && t.status.can_settle_to(settlement.status))
        else {
            return Ok(None);
        };
        tx.status = settlement.status;
        if settlement.tx_hash.is_some() {
            tx.tx_hash = settlement.tx_hash.clone();
        }
        tx.latency_ms = settlement.latency_ms;
        tx.response_dump = settlement.response_dump.clone();
        tx.error = settlement.error.clone();
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn list_web3_txs(&self, certificate_id: Uuid) -> StoreResult<Vec<Web3Tx>> {
        let inner = self.lock();
        Ok(inner
            .web3_txs
            .iter()
            .rev()
            .filter(|t| t.certificate_id == Some(certificate_id))
            .cloned()
            .collect())
    }

    async fn delete_web3_txs(&self, certificate_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.lock();
        inner.check(StoreOp::DeleteWeb3Txs)?;
        let before = inner.web3_txs.len();
        inner
            .web3_txs
            .retain(|t| t.certificate_id != Some(certificate_id));
        Ok((before - inner.web3_txs.len()) as u64)
    }

    async fn insert_company(&self, new: NewCompany) -> StoreResult<Company> {
        let mut inner = self.lock();
        if inner.companies.iter().any(|c| c.name == new.name) {
            return Err(StoreError::Duplicate("Company".into()));
        }
        let company = Company {
            id: Uuid::new_v4(),
            name: new.name,
            contact_email: new.contact_email,
            contact_phone: new.contact_phone,
            wallet_address: new.wallet_address,
            created_at: Utc::now(),
        };
        inner.companies.push(company.clone());
        Ok(company)
    }

    async fn find_company_by_name(&self, name: &str) -> StoreResult<Option<Company>> {
        Ok(self.lock().companies.iter().find(|c| c.name == name).cloned())
    }

    async fn get_companies(&self, ids: &[Uuid]) -> StoreResult<Vec<Company>> {
        Ok(self
            .lock()
            .companies
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn list_companies(&self, query: &DirectoryQuery) -> StoreResult<Vec<Company>> {
        let inner = self.lock();
        let mut rows: Vec<&Company> = inner
            .companies
            .iter()
            .filter(|c| name_matches(&c.name, query.search.as_deref()))
            .collect();
        rows.sort_by_key(|row| row.name.to_lowercase());
        Ok(page_of(rows, query))
    }

    async fn insert_regulator(&self, new: NewRegulator) -> StoreResult<Regulator> {
        let mut inner = self.lock();
        if inner.regulators.iter().any(|r| r.name == new.name) {
            return Err(StoreError::Duplicate("Regulator".into()));
        }
        let regulator = Regulator {
            id: Uuid::new_v4(),
            name: new.name,
            contact_email: new.contact_email,
            wallet_address: new.wallet_address,
            created_at: Utc::now(),
        };
        inner.regulators.push(regulator.clone());
        Ok(regulator)
    }

    async fn find_regulator_by_name(&self, name: &str) -> StoreResult<Option<Regulator>> {
        Ok(self.lock().regulators.iter().find(|r| r.name == name).cloned())
    }

    async fn get_regulator(&self, id: Uuid) -> StoreResult<Option<Regulator>> {
        Ok(self.lock().regulators.iter().find(|r| r.id == id).cloned())
    }

    async fn list_regulators(&self, query: &DirectoryQuery) -> StoreResult<Vec<Regulator>> {
        let inner = self.lock();
        let mut rows: Vec<&Regulator> = inner
            .regulators
            .iter()
            .filter(|r| name_matches(&r.name, query.search.as_deref()))
            .collect();
        rows.sort_by_key(|row| row.name.to_lowercase());
        Ok(page_of(rows, query))
    }

    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate("User".into()));
        }
        if new.role == UserRole::SuperAdmin
            && inner.users.iter().any(|u| u.role == UserRole::SuperAdmin)
        {
            return Err(StoreError::Duplicate("super_admin".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            role: new.role,
            company_id: new.company_id,
            regulator_id: new.regulator_id,
            created_at: Utc::now(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn count_users_with_role(&self, role: UserRole) -> StoreResult<i64> {
        Ok(self.lock().users.iter().filter(|u| u.role == role).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChainInfo, CertificateStatus, Network, StorageInfo};

    fn new_cert(name: &str) -> NewCertificate {
        NewCertificate {
            certificate_name: name.to_string(),
            subject: "Jane Doe".into(),
            metadata_hash: format!("{:0>64}", name.len()),
            original_filename: Some(format!("{}.pdf", name)),
            mime_type: Some("application/pdf".into()),
            size: Some(10),
            storage: StorageInfo::none(),
            chain: ChainInfo {
                network: Network::Testnet,
                contract_id: None,
                on_chain_id: None,
                tx_hash_issue: None,
                tx_hash_validate: None,
            },
            status: CertificateStatus::Requested,
            company_id: None,
            requested_by_user_id: None,
            expiry_at: None,
        }
    }

    #[tokio::test]
    async fn test_update_requires_current_version() {
        let store = MemoryStore::new();
        let cert = store.insert_certificate(new_cert("diploma")).await.unwrap();
        let patch = CertificatePatch {
            subject: Some("John Roe".into()),
            ..Default::default()
        };

        let updated = store.update_certificate(cert.id, 0, &patch).await.unwrap().unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.subject, "John Roe");

        // Stale version loses.
        assert!(store.update_certificate(cert.id, 0, &patch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_fault_and_clear() {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::InsertCertificate);
        assert!(matches!(
            store.insert_certificate(new_cert("a")).await,
            Err(StoreError::Unavailable(_))
        ));
        store.clear_fault(StoreOp::InsertCertificate);
        assert!(store.insert_certificate(new_cert("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = MemoryStore::new();
        store.insert_certificate(new_cert("Bachelor Diploma")).await.unwrap();
        store.insert_certificate(new_cert("Safety Training")).await.unwrap();

        let page = store
            .list_certificates(&CertificateQuery {
                search: Some("diploma".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].certificate_name, "Bachelor Diploma");
    }

    #[tokio::test]
    async fn test_settle_only_once() {
        let store = MemoryStore::new();
        let tx = store
            .insert_web3_tx(NewWeb3Tx {
                network: Network::Testnet,
                purpose: crate::models::TxPurpose::Issue,
                certificate_id: None,
                submitted_by_user_id: None,
                tx_hash: None,
                status: crate::models::TxStatus::Submitted,
                latency_ms: None,
                request_dump: serde_json::json!({}),
                response_dump: None,
                error: None,
            })
            .await
            .unwrap();
        let confirm = TxSettlement {
            status: crate::models::TxStatus::Confirmed,
            tx_hash: Some("ab".repeat(32)),
            latency_ms: Some(5),
            response_dump: None,
            error: None,
        };
        assert!(store.settle_web3_tx(tx.id, &confirm).await.unwrap().is_some());
        assert!(store.settle_web3_tx(tx.id, &confirm).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_single_super_admin() {
        let store = MemoryStore::new();
        let admin = |email: &str| NewUser {
            email: email.into(),
            name: "Root".into(),
            password_hash: "x".into(),
            role: UserRole::SuperAdmin,
            company_id: None,
            regulator_id: None,
        };
        store.insert_user(admin("a@x.test")).await.unwrap();
        assert!(matches!(
            store.insert_user(admin("b@x.test")).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_list_companies_searches_and_pages_by_name() {
        let store = MemoryStore::new();
        for name in ["Umbrella", "Acme Labs", "acme Foods", "Globex"] {
            store
                .insert_company(NewCompany {
                    name: name.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let acme = store
            .list_companies(&DirectoryQuery {
                search: Some("ACME".into()),
                page: 1,
                limit: 10,
            })
            .await
            .unwrap();
        let names: Vec<_> = acme.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["acme Foods", "Acme Labs"]);

        let second = store
            .list_companies(&DirectoryQuery {
                search: None,
                page: 2,
                limit: 3,
            })
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "Umbrella");
    }
}
