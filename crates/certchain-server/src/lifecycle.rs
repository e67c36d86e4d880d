//! Certificate lifecycle orchestration.
//!
//! Coordinates hashing, duplicate detection, ledger submission, local
//! persistence and compensating cleanup. Ledger submissions are irreversible,
//! so once one succeeds the local record is written on a best-effort basis
//! and any failure to do so is logged with the transaction hash for
//! reconciliation. Audit side-writes go through the [`AuditOutbox`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::access::{authorize, scoped_company, Action, Principal, Resource};
use crate::artifact::{ArtifactStore, StoredArtifact};
use crate::audit::{AuditOutbox, AuditRecord};
use crate::error::AppError;
use crate::ledger::{short, LedgerClient, LedgerError, LedgerSigner, Receipt};
use crate::models::{
    Actor, Certificate, CertificateAction, CertificateEvent, CertificatePatch, CertificateStatus,
    ChainInfo, EventType, NewCertificate, NewCertificateEvent, NewWeb3Tx, Network,
    TxPurpose, TxSettlement, TxStatus, Web3Tx,
};
use crate::store::{clamp_paging, CertificateQuery, SortField, SortOrder, Store};

/// In-process claims on digests currently being anchored.
#[derive(Clone, Default)]
pub struct HashReservations {
    held: Arc<Mutex<HashSet<String>>>,
}

/// Releases the digest when dropped.
pub struct Reservation {
    held: Arc<Mutex<HashSet<String>>>,
    digest: String,
}

impl HashReservations {
    /// Returns `None` if another create holds the digest.
    pub fn reserve(&self, digest: &str) -> Option<Reservation> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(digest.to_string()).then(|| Reservation {
            held: self.held.clone(),
            digest: digest.to_string(),
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.digest);
    }
}

/// Rows removed by a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCounts {
    pub certificate: u64,
    pub events: u64,
    pub transactions: u64,
    pub files_deleted: u64,
}

pub struct CreateCertificate {
    pub certificate_name: String,
    pub subject: String,
    pub company_id: Option<Uuid>,
    pub artifact: StoredArtifact,
    pub signer: Option<LedgerSigner>,
}

#[derive(Debug, Serialize)]
pub struct CreateOutcome {
    #[serde(rename = "cert")]
    pub certificate: Certificate,
    #[serde(rename = "tx")]
    pub receipt: Receipt,
}

/// Intake of a certificate that is anchored later via [`CertificateService::issue`].
pub struct RequestCertificate {
    pub certificate_name: String,
    pub subject: String,
    pub company_id: Option<Uuid>,
    pub artifact: StoredArtifact,
}

#[derive(Debug, Serialize)]
pub struct CheckOutcome {
    pub issued: bool,
    pub value: Option<Value>,
}

#[derive(Default)]
pub struct IssueCertificate {
    pub notes: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub signer: Option<LedgerSigner>,
}

#[derive(Debug, Serialize)]
pub struct TransitionOutcome {
    pub certificate: Certificate,
    pub tx: Web3Tx,
}

#[derive(Default)]
pub struct UpdateCertificate {
    pub certificate_name: Option<String>,
    pub subject: Option<String>,
    pub artifact: Option<StoredArtifact>,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<CertificateStatus>,
    pub company_id: Option<Uuid>,
    pub search: Option<String>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyRef {
    pub id: Uuid,
    pub name: String,
}

/// Compact listing row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    pub id: Uuid,
    pub certificate_name: String,
    pub subject: String,
    pub status: CertificateStatus,
    pub company: Option<CompanyRef>,
    pub issued_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub on_chain_id: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    /// Actor of the latest `issued` event, else the requester.
    pub signed_by: Option<Uuid>,
    pub signer_role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificatePageView {
    pub data: Vec<CertificateSummary>,
    pub pagination: Pagination,
}

/// A certificate with its history, newest first.
#[derive(Debug, Serialize)]
pub struct CertificateDetail {
    pub certificate: Certificate,
    pub events: Vec<CertificateEvent>,
    pub transactions: Vec<Web3Tx>,
}

#[derive(Debug, Serialize)]
pub struct PublicVerification {
    pub certificate: Certificate,
    pub chain: ChainInfo,
}

fn actor_of(principal: &Principal) -> Actor {
    Actor {
        user_id: Some(principal.user_id),
        role: Some(principal.role),
    }
}

fn required_text(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn settlement_for(result: &Result<Receipt, LedgerError>) -> Option<TxSettlement> {
    match result {
        Ok(receipt) => Some(TxSettlement {
            status: TxStatus::Confirmed,
            tx_hash: Some(receipt.tx_hash.clone()),
            latency_ms: Some(receipt.latency_ms),
            response_dump: serde_json::to_value(receipt).ok(),
            error: None,
        }),
        // The transaction may still land; leave the row submitted.
        Err(LedgerError::Pending { .. }) => None,
        Err(e) => Some(TxSettlement {
            status: TxStatus::Failed,
            tx_hash: e.tx_hash().map(str::to_string),
            latency_ms: None,
            response_dump: e.payload().map(|p| json!({ "payload": p })),
            error: Some(e.to_string()),
        }),
    }
}

fn with_settlement(mut tx: Web3Tx, settlement: &TxSettlement) -> Web3Tx {
    tx.status = settlement.status;
    if settlement.tx_hash.is_some() {
        tx.tx_hash = settlement.tx_hash.clone();
    }
    tx.latency_ms = settlement.latency_ms;
    tx.response_dump = settlement.response_dump.clone();
    tx.error = settlement.error.clone();
    tx.updated_at = Utc::now();
    tx
}

pub struct CertificateService {
    store: Arc<dyn Store>,
    ledger: Arc<LedgerClient>,
    artifacts: Arc<ArtifactStore>,
    outbox: Arc<AuditOutbox>,
    reservations: HashReservations,
    network: Network,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<LedgerClient>,
        artifacts: Arc<ArtifactStore>,
        outbox: Arc<AuditOutbox>,
        network: Network,
    ) -> Self {
        Self {
            store,
            ledger,
            artifacts,
            outbox,
            reservations: HashReservations::default(),
            network,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Certificate, AppError> {
        self.store
            .get_certificate(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Certificate not found".into()))
    }

    fn emit_event(&self, certificate_id: Uuid, event_type: EventType, actor: Actor, details: Value) {
        self.outbox.emit(AuditRecord::Event(NewCertificateEvent {
            certificate_id,
            event_type,
            actor,
            details,
        }));
    }

    /// Hashes, checks for an existing anchor, anchors on the ledger and saves
    /// the certificate as `issued`.
    pub async fn create(
        &self,
        actor: &Principal,
        input: CreateCertificate,
    ) -> Result<CreateOutcome, AppError> {
        let artifact = input.artifact;
        let result = self
            .anchor_and_save(
                actor,
                input.certificate_name,
                input.subject,
                input.company_id,
                &artifact,
                input.signer,
            )
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // An anchor that landed, or may still land, keeps its file so
                // the record can be rebuilt.
                let may_be_anchored = matches!(
                    e,
                    AppError::Persistence { .. } | AppError::Ledger(LedgerError::Pending { .. })
                );
                if !may_be_anchored {
                    artifact.source.discard().await;
                }
                Err(e)
            }
        }
    }

    async fn anchor_and_save(
        &self,
        actor: &Principal,
        certificate_name: String,
        subject: String,
        company_id: Option<Uuid>,
        artifact: &StoredArtifact,
        signer: Option<LedgerSigner>,
    ) -> Result<CreateOutcome, AppError> {
        let company_id = scoped_company(actor, company_id);
        authorize(Some(actor), Action::CreateCertificate, Resource::Company(company_id))?;
        let certificate_name = required_text(&certificate_name, "certificateName")?;
        let subject = required_text(&subject, "subject")?;

        let digest = artifact.source.digest().await?;
        let _reservation = self.reservations.reserve(&digest).ok_or_else(|| {
            AppError::Conflict("A certificate for this document is already being created".into())
        })?;

        if self.ledger.read_document(&digest).await?.is_some() {
            info!(hash = short(&digest, 16), "Document already anchored");
            return Err(AppError::Conflict(
                "A document with the same hash already exists on chain".into(),
            ));
        }

        info!(
            hash = short(&digest, 16),
            user_id = %actor.user_id,
            company_id = ?company_id,
            "Anchoring certificate"
        );
        let receipt = match self
            .ledger
            .store_document(&certificate_name, &digest, signer.as_ref())
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                if let LedgerError::Pending { tx_hash, .. } = &e {
                    self.outbox.emit(AuditRecord::Transaction(NewWeb3Tx {
                        network: self.network,
                        purpose: TxPurpose::Issue,
                        certificate_id: None,
                        submitted_by_user_id: Some(actor.user_id),
                        tx_hash: Some(tx_hash.clone()),
                        status: TxStatus::Submitted,
                        latency_ms: None,
                        request_dump: json!({
                            "method": "store_document",
                            "certificateName": certificate_name,
                            "subject": subject,
                            "metadataHash": digest,
                            "companyId": company_id,
                            "storagePath": artifact.relative_path,
                        }),
                        response_dump: None,
                        error: Some(e.to_string()),
                    }));
                }
                return Err(e.into());
            }
        };

        let new = NewCertificate {
            certificate_name: certificate_name.clone(),
            subject: subject.clone(),
            metadata_hash: digest.clone(),
            original_filename: Some(artifact.meta.original_filename.clone()),
            mime_type: Some(artifact.meta.mime_type.clone()),
            size: Some(artifact.meta.size),
            storage: artifact.storage_info(),
            chain: ChainInfo {
                network: self.network,
                contract_id: Some(self.ledger.contract_id().to_string()),
                on_chain_id: Some(receipt.tx_hash.clone()),
                tx_hash_issue: Some(receipt.tx_hash.clone()),
                tx_hash_validate: None,
            },
            status: CertificateStatus::Issued,
            company_id,
            requested_by_user_id: Some(actor.user_id),
            expiry_at: None,
        };

        let request_dump = json!({
            "method": "store_document",
            "args": [receipt.signer, certificate_name, digest],
            "subject": subject,
            "companyId": company_id,
        });

        let certificate = match self.store.insert_certificate(new).await {
            Ok(cert) => cert,
            Err(e) => {
                error!(
                    tx_hash = %receipt.tx_hash,
                    method = "store_document",
                    args = %request_dump,
                    "Reconciliation required: ledger accepted the document but the certificate was not saved: {}",
                    e
                );
                self.outbox.emit(AuditRecord::Transaction(NewWeb3Tx {
                    network: self.network,
                    purpose: TxPurpose::Issue,
                    certificate_id: None,
                    submitted_by_user_id: Some(actor.user_id),
                    tx_hash: Some(receipt.tx_hash.clone()),
                    status: TxStatus::Confirmed,
                    latency_ms: Some(receipt.latency_ms),
                    request_dump,
                    response_dump: serde_json::to_value(&receipt).ok(),
                    error: Some(format!("certificate insert failed: {}", e)),
                }));
                return Err(AppError::Persistence {
                    message: e.to_string(),
                    tx_hash: receipt.tx_hash,
                });
            }
        };

        self.outbox.emit(AuditRecord::Transaction(NewWeb3Tx {
            network: self.network,
            purpose: TxPurpose::Issue,
            certificate_id: Some(certificate.id),
            submitted_by_user_id: Some(actor.user_id),
            tx_hash: Some(receipt.tx_hash.clone()),
            status: TxStatus::Confirmed,
            latency_ms: Some(receipt.latency_ms),
            request_dump,
            response_dump: serde_json::to_value(&receipt).ok(),
            error: None,
        }));
        self.emit_event(
            certificate.id,
            EventType::Issued,
            actor_of(actor),
            json!({ "txHash": receipt.tx_hash, "ledger": receipt.ledger_seq }),
        );

        info!(
            certificate_id = %certificate.id,
            tx_hash = %receipt.tx_hash,
            "Certificate created"
        );
        Ok(CreateOutcome {
            certificate,
            receipt,
        })
    }

    /// Records a certificate in `requested` state without touching the ledger.
    pub async fn request(
        &self,
        actor: &Principal,
        input: RequestCertificate,
    ) -> Result<Certificate, AppError> {
        let artifact = input.artifact;
        let result = async {
            let company_id = scoped_company(actor, input.company_id);
            authorize(Some(actor), Action::CreateCertificate, Resource::Company(company_id))?;
            let certificate_name = required_text(&input.certificate_name, "certificateName")?;
            let subject = required_text(&input.subject, "subject")?;
            let digest = artifact.source.digest().await?;

            let cert = self
                .store
                .insert_certificate(NewCertificate {
                    certificate_name,
                    subject,
                    metadata_hash: digest,
                    original_filename: Some(artifact.meta.original_filename.clone()),
                    mime_type: Some(artifact.meta.mime_type.clone()),
                    size: Some(artifact.meta.size),
                    storage: artifact.storage_info(),
                    chain: ChainInfo {
                        network: self.network,
                        contract_id: Some(self.ledger.contract_id().to_string()),
                        on_chain_id: None,
                        tx_hash_issue: None,
                        tx_hash_validate: None,
                    },
                    status: CertificateStatus::Requested,
                    company_id,
                    requested_by_user_id: Some(actor.user_id),
                    expiry_at: None,
                })
                .await?;
            Ok::<_, AppError>(cert)
        }
        .await;

        match result {
            Ok(cert) => {
                self.emit_event(cert.id, EventType::Requested, actor_of(actor), json!({}));
                info!(certificate_id = %cert.id, "Certificate requested");
                Ok(cert)
            }
            Err(e) => {
                artifact.source.discard().await;
                Err(e)
            }
        }
    }

    /// Hashes an upload and asks the ledger whether it is anchored. The
    /// upload is never kept.
    pub async fn check_issued(
        &self,
        actor: &Principal,
        artifact: StoredArtifact,
        signer: Option<LedgerSigner>,
    ) -> Result<CheckOutcome, AppError> {
        let result = async {
            authorize(Some(actor), Action::CheckCertificate, Resource::Global)?;
            let digest = artifact.source.digest().await?;
            let value = self.ledger.verify_document(&digest, signer.as_ref()).await?;
            info!(hash = short(&digest, 16), issued = value.is_some(), "Checked document");
            Ok::<_, AppError>(CheckOutcome {
                issued: value.is_some(),
                value,
            })
        }
        .await;
        artifact.source.discard().await;
        result
    }

    /// Inserts a `submitted` row, runs the ledger call and queues the row's
    /// settlement.
    async fn tracked<F>(
        &self,
        cert: &Certificate,
        actor: &Principal,
        purpose: TxPurpose,
        request_dump: Value,
        call: F,
    ) -> Result<(Web3Tx, Result<Receipt, LedgerError>), AppError>
    where
        F: Future<Output = Result<Receipt, LedgerError>>,
    {
        let row = self
            .store
            .insert_web3_tx(NewWeb3Tx {
                network: cert.chain.network,
                purpose,
                certificate_id: Some(cert.id),
                submitted_by_user_id: Some(actor.user_id),
                tx_hash: None,
                status: TxStatus::Submitted,
                latency_ms: None,
                request_dump,
                response_dump: None,
                error: None,
            })
            .await?;

        let result = call.await;
        let row = match settlement_for(&result) {
            Some(settlement) => {
                self.outbox.emit(AuditRecord::Settlement {
                    tx_id: row.id,
                    settlement: settlement.clone(),
                });
                with_settlement(row, &settlement)
            }
            None => {
                warn!(
                    tx_id = %row.id,
                    tx_hash = result.as_ref().err().and_then(|e| e.tx_hash()).unwrap_or("-"),
                    "Ledger confirmation still pending; transaction row left submitted"
                );
                row
            }
        };
        Ok((row, result))
    }

    /// Writes a post-ledger status change. A failure here is a reconciliation
    /// gap and is logged with the transaction hash.
    async fn save_after_ledger(
        &self,
        cert: &Certificate,
        patch: &CertificatePatch,
        receipt: &Receipt,
    ) -> Result<Certificate, AppError> {
        match self.store.update_certificate(cert.id, cert.version, patch).await {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => {
                error!(
                    certificate_id = %cert.id,
                    tx_hash = %receipt.tx_hash,
                    method = %receipt.method,
                    "Reconciliation required: certificate changed while the ledger call was in flight"
                );
                Err(AppError::Conflict(format!(
                    "Certificate was modified concurrently; ledger transaction {} was recorded",
                    receipt.tx_hash
                )))
            }
            Err(e) => {
                error!(
                    certificate_id = %cert.id,
                    tx_hash = %receipt.tx_hash,
                    method = %receipt.method,
                    "Reconciliation required: ledger call succeeded but the certificate was not updated: {}",
                    e
                );
                Err(AppError::Persistence {
                    message: e.to_string(),
                    tx_hash: receipt.tx_hash.clone(),
                })
            }
        }
    }

    /// Anchors a `requested` certificate.
    pub async fn issue(
        &self,
        id: Uuid,
        actor: &Principal,
        input: IssueCertificate,
    ) -> Result<TransitionOutcome, AppError> {
        let cert = self.load(id).await?;
        authorize(Some(actor), Action::IssueCertificate, Resource::Certificate(&cert))?;

        let Some(next) = cert.status.apply(CertificateAction::Issue) else {
            return Err(AppError::Conflict(format!(
                "Certificate cannot be issued from status {}",
                cert.status.as_str()
            )));
        };
        if let Some(expiry) = input.expiry_at {
            if expiry <= Utc::now() {
                return Err(AppError::BadRequest("Expiry date must be in the future".into()));
            }
        }

        let request_dump = json!({
            "method": "store_document",
            "metadataHash": cert.metadata_hash,
            "notes": input.notes,
            "expiryAt": input.expiry_at,
        });
        let (tx, result) = self
            .tracked(
                &cert,
                actor,
                TxPurpose::Issue,
                request_dump,
                self.ledger.store_document(
                    &cert.certificate_name,
                    &cert.metadata_hash,
                    input.signer.as_ref(),
                ),
            )
            .await?;
        let receipt = result.map_err(|e| {
            warn!(certificate_id = %cert.id, "Issuance failed: {}", e);
            AppError::from(e)
        })?;

        let patch = CertificatePatch {
            status: Some(next),
            network: Some(cert.chain.network),
            on_chain_id: Some(receipt.tx_hash.clone()),
            tx_hash_issue: Some(receipt.tx_hash.clone()),
            expiry_at: input.expiry_at,
            ..Default::default()
        };
        let certificate = self.save_after_ledger(&cert, &patch, &receipt).await?;
        self.emit_event(
            certificate.id,
            EventType::Issued,
            actor_of(actor),
            json!({ "notes": input.notes, "txHash": receipt.tx_hash }),
        );

        info!(certificate_id = %certificate.id, tx_hash = %receipt.tx_hash, "Certificate issued");
        Ok(TransitionOutcome { certificate, tx })
    }

    /// Confirms an anchored certificate on the ledger.
    pub async fn validate(
        &self,
        id: Uuid,
        actor: &Principal,
        signer: Option<LedgerSigner>,
    ) -> Result<TransitionOutcome, AppError> {
        let cert = self.load(id).await?;
        authorize(Some(actor), Action::ValidateCertificate, Resource::Certificate(&cert))?;

        if !cert.is_anchored() {
            return Err(AppError::BadRequest("Certificate not anchored on chain".into()));
        }
        let Some(next) = cert.status.apply(CertificateAction::Validate) else {
            return Err(AppError::Conflict(format!(
                "Certificate cannot be validated from status {}",
                cert.status.as_str()
            )));
        };
        // The anchor must cover the current digest; a replaced artifact is not on chain.
        if self.ledger.read_document(&cert.metadata_hash).await?.is_none() {
            warn!(
                certificate_id = %cert.id,
                hash = short(&cert.metadata_hash, 16),
                "Validation refused: hash not anchored"
            );
            return Err(AppError::Conflict(
                "Certificate hash is not anchored on chain".into(),
            ));
        }

        let request_dump = json!({
            "method": "verify_document",
            "metadataHash": cert.metadata_hash,
            "onChainId": cert.chain.on_chain_id,
        });
        let (tx, result) = self
            .tracked(
                &cert,
                actor,
                TxPurpose::Validate,
                request_dump,
                self.ledger
                    .validate_document(&cert.metadata_hash, signer.as_ref()),
            )
            .await?;
        let receipt = result.map_err(|e| {
            warn!(certificate_id = %cert.id, "Validation failed: {}", e);
            AppError::from(e)
        })?;

        let patch = CertificatePatch {
            status: Some(next),
            tx_hash_validate: Some(receipt.tx_hash.clone()),
            ..Default::default()
        };
        let certificate = self.save_after_ledger(&cert, &patch, &receipt).await?;
        self.emit_event(
            certificate.id,
            EventType::Validated,
            actor_of(actor),
            serde_json::to_value(&receipt).unwrap_or(Value::Null),
        );

        info!(certificate_id = %certificate.id, tx_hash = %receipt.tx_hash, "Certificate validated");
        Ok(TransitionOutcome { certificate, tx })
    }

    /// Edits name and subject, or replaces the artifact. The old file is
    /// removed only after the record update succeeds.
    pub async fn update(
        &self,
        id: Uuid,
        actor: &Principal,
        input: UpdateCertificate,
    ) -> Result<Certificate, AppError> {
        let new_artifact = input.artifact.clone();
        let result = self.apply_update(id, actor, input).await;
        if result.is_err() {
            if let Some(artifact) = new_artifact {
                artifact.source.discard().await;
            }
        }
        result
    }

    async fn apply_update(
        &self,
        id: Uuid,
        actor: &Principal,
        input: UpdateCertificate,
    ) -> Result<Certificate, AppError> {
        let cert = self.load(id).await?;
        authorize(Some(actor), Action::UpdateCertificate, Resource::Certificate(&cert))?;

        let mut patch = CertificatePatch::default();
        let mut updated_fields = Vec::new();
        if let Some(name) = &input.certificate_name {
            patch.certificate_name = Some(required_text(name, "certificateName")?);
            updated_fields.push("certificateName");
        }
        if let Some(subject) = &input.subject {
            patch.subject = Some(required_text(subject, "subject")?);
            updated_fields.push("subject");
        }
        if let Some(artifact) = &input.artifact {
            patch.metadata_hash = Some(artifact.source.digest().await?);
            patch.original_filename = Some(artifact.meta.original_filename.clone());
            patch.mime_type = Some(artifact.meta.mime_type.clone());
            patch.size = Some(artifact.meta.size);
            patch.storage = Some(artifact.storage_info());
            updated_fields.extend(["metadataHash", "originalFilename", "mimeType", "size", "storage"]);
        }
        if patch.is_empty() {
            return Err(AppError::BadRequest("Nothing to update".into()));
        }

        let updated = self
            .store
            .update_certificate(cert.id, cert.version, &patch)
            .await?
            .ok_or_else(|| AppError::Conflict("Certificate was modified concurrently".into()))?;

        let has_new_file = input.artifact.is_some();
        if has_new_file {
            if let Err(e) = self.artifacts.remove_stored(&cert.storage).await {
                warn!(certificate_id = %cert.id, "Failed to remove replaced artifact: {}", e);
            }
        }
        self.emit_event(
            updated.id,
            EventType::Comment,
            actor_of(actor),
            json!({
                "action": "updated",
                "updatedFields": updated_fields,
                "hasNewFile": has_new_file,
            }),
        );

        info!(certificate_id = %updated.id, has_new_file, "Certificate updated");
        Ok(updated)
    }

    /// Removes a certificate with its events, transactions and file.
    pub async fn delete(&self, id: Uuid, actor: &Principal) -> Result<DeletedCounts, AppError> {
        let cert = self.load(id).await?;
        authorize(Some(actor), Action::DeleteCertificate, Resource::Certificate(&cert))?;

        let mut counts = DeletedCounts::default();
        let mut failures = Vec::new();

        match self.store.delete_events(id).await {
            Ok(n) => counts.events = n,
            Err(e) => failures.push(format!("events: {}", e)),
        }
        match self.store.delete_web3_txs(id).await {
            Ok(n) => counts.transactions = n,
            Err(e) => failures.push(format!("transactions: {}", e)),
        }
        match self.store.delete_certificate(id).await {
            Ok(n) => counts.certificate = n,
            Err(e) => failures.push(format!("certificate: {}", e)),
        }

        if counts.certificate == 1 {
            match self.artifacts.remove_stored(&cert.storage).await {
                Ok(true) => counts.files_deleted = 1,
                Ok(false) => {}
                Err(e) => warn!(certificate_id = %id, "Failed to remove artifact: {}", e),
            }
        }

        if !failures.is_empty() {
            error!(certificate_id = %id, ?counts, failures = ?failures, "Certificate delete incomplete");
            return Err(AppError::PartialDelete {
                message: failures.join("; "),
                counts,
            });
        }

        info!(certificate_id = %id, ?counts, "Certificate deleted");
        Ok(counts)
    }

    /// Paginated compact listing, scoped to the caller's company for
    /// company admins.
    pub async fn list(
        &self,
        actor: &Principal,
        query: ListQuery,
    ) -> Result<CertificatePageView, AppError> {
        let company_id = scoped_company(actor, query.company_id);
        authorize(Some(actor), Action::ListCertificates, Resource::Company(company_id))?;

        let (page, limit) = clamp_paging(query.page, query.limit, 50);
        let store_query = CertificateQuery {
            status: query.status,
            company_id,
            search: query.search,
            sort_by: query.sort_by.unwrap_or_default(),
            sort_order: query.sort_order.unwrap_or_default(),
            page,
            limit,
        };
        let result = self.store.list_certificates(&store_query).await?;

        let ids: Vec<Uuid> = result.items.iter().map(|c| c.id).collect();
        let issued: HashMap<Uuid, CertificateEvent> = self
            .store
            .latest_events(&ids, EventType::Issued)
            .await?
            .into_iter()
            .map(|e| (e.certificate_id, e))
            .collect();
        let company_ids: Vec<Uuid> = result
            .items
            .iter()
            .filter_map(|c| c.company_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let companies: HashMap<Uuid, String> = self
            .store
            .get_companies(&company_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let data = result
            .items
            .into_iter()
            .map(|c| {
                let event = issued.get(&c.id);
                CertificateSummary {
                    id: c.id,
                    company: c.company_id.and_then(|id| {
                        companies.get(&id).map(|name| CompanyRef {
                            id,
                            name: name.clone(),
                        })
                    }),
                    issued_at: c.created_at,
                    tx_hash: c.chain.tx_hash_issue,
                    on_chain_id: c.chain.on_chain_id,
                    file_name: c.original_filename,
                    file_url: c.storage.public_url,
                    mime_type: c.mime_type,
                    size: c.size,
                    signed_by: event
                        .and_then(|e| e.actor.user_id)
                        .or(c.requested_by_user_id),
                    signer_role: event
                        .and_then(|e| e.actor.role)
                        .map(|r| r.as_str().to_string()),
                    certificate_name: c.certificate_name,
                    subject: c.subject,
                    status: c.status,
                }
            })
            .collect::<Vec<_>>();

        let total_pages = (result.total + limit - 1) / limit;
        info!(
            user_id = %actor.user_id,
            total = result.total,
            returned = data.len(),
            page,
            "Listed certificates"
        );
        Ok(CertificatePageView {
            data,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total: result.total,
                limit,
            },
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Certificate, AppError> {
        self.load(id).await
    }

    /// Certificate with full event and transaction history.
    pub async fn get_detail(&self, id: Uuid, actor: &Principal) -> Result<CertificateDetail, AppError> {
        let certificate = self.load(id).await?;
        authorize(
            Some(actor),
            Action::ViewCertificateHistory,
            Resource::Certificate(&certificate),
        )?;
        let events = self.store.list_events(id).await?;
        let transactions = self.store.list_web3_txs(id).await?;
        Ok(CertificateDetail {
            certificate,
            events,
            transactions,
        })
    }

    /// Unauthenticated verification view.
    pub async fn verify_public(&self, id: Uuid) -> Result<PublicVerification, AppError> {
        let certificate = self.load(id).await?;
        let chain = certificate.chain.clone();
        Ok(PublicVerification { certificate, chain })
    }
}
