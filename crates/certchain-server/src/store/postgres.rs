//! Postgres-backed [`Store`].

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    CertificatePage, CertificateQuery, DirectoryQuery, SortOrder, Store, StoreError, StoreResult,
};
use crate::models::{
    Certificate, CertificateEvent, CertificatePatch, Company, EventType, NewCertificate,
    NewCertificateEvent, NewCompany, NewRegulator, NewUser, NewWeb3Tx, Regulator, TxSettlement,
    User, UserRole, Web3Tx,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps a unique-constraint violation to [`StoreError::Duplicate`].
fn unique_as_duplicate(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(what.to_string())
        }
        _ => StoreError::Database(err),
    }
}

/// Name filter, ordering and paging shared by the directory listings.
fn push_directory_filter(qb: &mut QueryBuilder<'_, Postgres>, query: &DirectoryQuery) {
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        qb.push(" WHERE name ILIKE ").push_bind(like_pattern(search));
    }
    qb.push(" ORDER BY lower(name) ASC LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset());
}

/// Escapes LIKE wildcards in user-supplied search text.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &CertificateQuery) {
    qb.push(" WHERE TRUE");
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(company_id) = query.company_id {
        qb.push(" AND company_id = ").push_bind(company_id);
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(search.trim());
        qb.push(" AND (certificate_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR subject ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR original_filename ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
        let row = sqlx::query_as::<_, Certificate>(
            r#"
            INSERT INTO certificates (
                id, certificate_name, subject, metadata_hash, original_filename, mime_type, size,
                storage_provider, storage_path, storage_public_url,
                network, contract_id, on_chain_id, tx_hash_issue, tx_hash_validate,
                status, company_id, requested_by_user_id, expiry_at,
                version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, 0, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.certificate_name)
        .bind(&new.subject)
        .bind(&new.metadata_hash)
        .bind(&new.original_filename)
        .bind(&new.mime_type)
        .bind(new.size)
        .bind(new.storage.provider)
        .bind(&new.storage.path)
        .bind(&new.storage.public_url)
        .bind(new.chain.network)
        .bind(&new.chain.contract_id)
        .bind(&new.chain.on_chain_id)
        .bind(&new.chain.tx_hash_issue)
        .bind(&new.chain.tx_hash_validate)
        .bind(new.status)
        .bind(new.company_id)
        .bind(new.requested_by_user_id)
        .bind(new.expiry_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_certificate(&self, id: Uuid) -> StoreResult<Option<Certificate>> {
        let row = sqlx::query_as::<_, Certificate>("SELECT * FROM certificates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_certificate(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: &CertificatePatch,
    ) -> StoreResult<Option<Certificate>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "UPDATE certificates SET version = version + 1, updated_at = NOW()",
        );
        if let Some(v) = &patch.certificate_name {
            qb.push(", certificate_name = ").push_bind(v.clone());
        }
        if let Some(v) = &patch.subject {
            qb.push(", subject = ").push_bind(v.clone());
        }
        if let Some(v) = patch.status {
            qb.push(", status = ").push_bind(v);
        }
        if let Some(v) = &patch.metadata_hash {
            qb.push(", metadata_hash = ").push_bind(v.clone());
        }
        if let Some(v) = &patch.original_filename {
            qb.push(", original_filename = ").push_bind(v.clone());
        }
        if let Some(v) = &patch.mime_type {
            qb.push(", mime_type = ").push_bind(v.clone());
        }
        if let Some(v) = patch.size {
            qb.push(", size = ").push_bind(v);
        }
        if let Some(storage) = &patch.storage {
            qb.push(", storage_provider = ")
                .push_bind(storage.provider)
                .push(", storage_path = ")
                .push_bind(storage.path.clone())
                .push(", storage_public_url = ")
                .push_bind(storage.public_url.clone());
        }
        if let Some(v) = patch.network {
            qb.push(", network = ").push_bind(v);
        }
        if let Some(v) = &patch.on_chain_id {
            qb.push(", on_chain_id = ").push_bind(v.clone());
        }
        if let Some(v) = &patch.tx_hash_issue {
            qb.push(", tx_hash_issue = ").push_bind(v.clone());
        }
        if let Some(v) = &patch.tx_hash_validate {
            qb.push(", tx_hash_validate = ").push_bind(v.clone());
        }
        if let Some(v) = patch.expiry_at {
            qb.push(", expiry_at = ").push_bind(v);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND version = ")
            .push_bind(expected_version)
            .push(" RETURNING *");

        let row = qb
            .build_query_as::<Certificate>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_certificate(&self, id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM certificates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_certificates(&self, query: &CertificateQuery) -> StoreResult<CertificatePage> {
        let mut count: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM certificates");
        push_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let order = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let mut select: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM certificates");
        push_filters(&mut select, query);
        select
            .push(format!(" ORDER BY {} {}, id", query.sort_by.column(), order))
            .push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset());

        let items = select
            .build_query_as::<Certificate>()
            .fetch_all(&self.pool)
            .await?;

        Ok(CertificatePage { items, total })
    }

    async fn insert_event(&self, new: NewCertificateEvent) -> StoreResult<CertificateEvent> {
        let row = sqlx::query_as::<_, CertificateEvent>(
            r#"
            INSERT INTO certificate_events (id, certificate_id, event_type, actor_user_id, actor_role, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.certificate_id)
        .bind(new.event_type)
        .bind(new.actor.user_id)
        .bind(new.actor.role)
        .bind(&new.details)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_events(&self, certificate_id: Uuid) -> StoreResult<Vec<CertificateEvent>> {
        let rows = sqlx::query_as::<_, CertificateEvent>(
            "SELECT * FROM certificate_events WHERE certificate_id = $1 ORDER BY created_at DESC, id",
        )
        .bind(certificate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn latest_events(
        &self,
        certificate_ids: &[Uuid],
        event_type: EventType,
    ) -> StoreResult<Vec<CertificateEvent>> {
        if certificate_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, CertificateEvent>(
            r#"
            SELECT DISTINCT ON (certificate_id) *
            FROM certificate_events
            WHERE certificate_id = ANY($1) AND event_type = $2
            ORDER BY certificate_id, created_at DESC
            "#,
        )
        .bind(certificate_ids)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_events(&self, certificate_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM certificate_events WHERE certificate_id = $1")
            .bind(certificate_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_web3_tx(&self, new: NewWeb3Tx) -> StoreResult<Web3Tx> {
        let row = sqlx::query_as::<_, Web3Tx>(
            r#"
            INSERT INTO web3_txs (
                id, network, purpose, certificate_id, submitted_by_user_id, tx_hash, status,
                latency_ms, request_dump, response_dump, error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.network)
        .bind(new.purpose)
        .bind(new.certificate_id)
        .bind(new.submitted_by_user_id)
        .bind(&new.tx_hash)
        .bind(new.status)
        .bind(new.latency_ms)
        .bind(&new.request_dump)
        .bind(&new.response_dump)
        .bind(&new.error)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn settle_web3_tx(
        &self,
        id: Uuid,
        settlement: &TxSettlement,
    ) -> StoreResult<Option<Web3Tx>> {
        let row = sqlx::query_as::<_, Web3Tx>(
            r#"
            UPDATE web3_txs
            SET status = $2,
                tx_hash = COALESCE($3, tx_hash),
                latency_ms = $4,
                response_dump = $5,
                error = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = 'submitted'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(settlement.status)
        .bind(&settlement.tx_hash)
        .bind(settlement.latency_ms)
        .bind(&settlement.response_dump)
        .bind(&settlement.error)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_web3_txs(&self, certificate_id: Uuid) -> StoreResult<Vec<Web3Tx>> {
        let rows = sqlx::query_as::<_, Web3Tx>(
            "SELECT * FROM web3_txs WHERE certificate_id = $1 ORDER BY created_at DESC, id",
        )
        .bind(certificate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_web3_txs(&self, certificate_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM web3_txs WHERE certificate_id = $1")
            .bind(certificate_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_company(&self, new: NewCompany) -> StoreResult<Company> {
        sqlx::query_as::<_, Company>(
            r#"
            INSERT INTO companies (id, name, contact_email, contact_phone, wallet_address, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.contact_email)
        .bind(&new.contact_phone)
        .bind(&new.wallet_address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_as_duplicate(e, "Company"))
    }

    async fn find_company_by_name(&self, name: &str) -> StoreResult<Option<Company>> {
        let row = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_companies(&self, ids: &[Uuid]) -> StoreResult<Vec<Company>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_companies(&self, query: &DirectoryQuery) -> StoreResult<Vec<Company>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM companies");
        push_directory_filter(&mut qb, query);
        let rows = qb.build_query_as::<Company>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn insert_regulator(&self, new: NewRegulator) -> StoreResult<Regulator> {
        sqlx::query_as::<_, Regulator>(
            r#"
            INSERT INTO regulators (id, name, contact_email, wallet_address, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.contact_email)
        .bind(&new.wallet_address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_as_duplicate(e, "Regulator"))
    }

    async fn find_regulator_by_name(&self, name: &str) -> StoreResult<Option<Regulator>> {
        let row = sqlx::query_as::<_, Regulator>("SELECT * FROM regulators WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_regulator(&self, id: Uuid) -> StoreResult<Option<Regulator>> {
        let row = sqlx::query_as::<_, Regulator>("SELECT * FROM regulators WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_regulators(&self, query: &DirectoryQuery) -> StoreResult<Vec<Regulator>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM regulators");
        push_directory_filter(&mut qb, query);
        let rows = qb.build_query_as::<Regulator>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn insert_user(&self, new: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, company_id, regulator_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.role)
        .bind(new.company_id)
        .bind(new.regulator_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_as_duplicate(e, "User"))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_users_with_role(&self, role: UserRole) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
