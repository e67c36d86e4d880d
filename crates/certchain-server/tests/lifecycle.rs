//! Certificate lifecycle tests against the in-memory store and a fake
//! ledger. No HTTP involved.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use certchain_crypto::sha256_hex;
use certchain_server::artifact::StoredArtifact;
use certchain_server::error::AppError;
use certchain_server::lifecycle::{
    CreateCertificate, IssueCertificate, ListQuery, RequestCertificate, UpdateCertificate,
};
use certchain_server::models::{CertificateStatus, EventType, TxPurpose, TxStatus, UserRole};
use certchain_server::store::{Store, StoreOp};
use common::{principal, regulator, super_admin, Harness, Settle};
use uuid::Uuid;

async fn upload(h: &Harness, name: &str, bytes: &[u8]) -> StoredArtifact {
    h.state
        .artifacts
        .accept(name, "application/pdf", bytes)
        .await
        .unwrap()
}

/// Name of the file an upload was written to.
fn stored_name(artifact: &StoredArtifact) -> String {
    let relative = artifact.relative_path.clone().unwrap();
    relative.rsplit('/').next().unwrap().to_string()
}

fn create_input(artifact: StoredArtifact) -> CreateCertificate {
    CreateCertificate {
        certificate_name: "ISO 9001".into(),
        subject: "Acme Manufacturing".into(),
        company_id: None,
        artifact,
        signer: None,
    }
}

#[tokio::test]
async fn test_create_anchors_digest_of_uploaded_bytes() {
    let h = Harness::new();
    let bytes = b"%PDF-1.7 certificate body";
    let artifact = upload(&h, "iso.pdf", bytes).await;

    let outcome = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap();

    let cert = outcome.certificate;
    assert_eq!(cert.metadata_hash, sha256_hex(bytes));
    assert_eq!(cert.status, CertificateStatus::Issued);
    assert_eq!(cert.chain.on_chain_id.as_deref(), Some(outcome.receipt.tx_hash.as_str()));
    assert_eq!(cert.chain.tx_hash_issue, cert.chain.on_chain_id);
    assert!(h.ledger.is_anchored(&cert.metadata_hash));
    assert_eq!(h.stored_files().len(), 1);

    h.state.outbox.drain().await;
    let txs = h.store.web3_txs();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].purpose, TxPurpose::Issue);
    assert_eq!(txs[0].status, TxStatus::Confirmed);
    assert_eq!(txs[0].certificate_id, Some(cert.id));
    let events = h.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Issued);
}

#[tokio::test]
async fn test_duplicate_content_is_rejected_before_submission() {
    let h = Harness::new();
    let bytes = b"same content";
    let first = upload(&h, "a.pdf", bytes).await;
    let first_file = stored_name(&first);
    h.state
        .certificates
        .create(&super_admin(), create_input(first))
        .await
        .unwrap();

    let second = upload(&h, "b.pdf", bytes).await;
    let err = h
        .state
        .certificates
        .create(&super_admin(), create_input(second))
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(h.ledger.submitted_methods(), vec!["store_document"]);
    assert_eq!(h.store.certificates().len(), 1);
    // Only the first upload remains on disk.
    assert_eq!(h.stored_files(), vec![first_file]);
}

#[tokio::test]
async fn test_ledger_failure_leaves_no_record_and_no_file() {
    let h = Harness::new();
    h.ledger.set_settle(Settle::Reject);
    let artifact = upload(&h, "rejected.pdf", b"rejected").await;

    let err = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    assert!(h.store.certificates().is_empty());
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn test_simulation_failure_never_submits() {
    let h = Harness::new();
    h.ledger.set_settle(Settle::SimulationError);
    let artifact = upload(&h, "trap.pdf", b"trap").await;

    let err = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Ledger(_)));
    assert!(h.ledger.submissions().is_empty());
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn test_insert_failure_after_anchoring_is_recorded_for_reconciliation() {
    let h = Harness::new();
    h.store.fail_on(StoreOp::InsertCertificate);
    let artifact = upload(&h, "gap.pdf", b"reconcile me").await;

    let err = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap_err();

    let tx_hash = match &err {
        AppError::Persistence { tx_hash, .. } => tx_hash.clone(),
        other => panic!("expected persistence error, got {:?}", other),
    };
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.ledger.is_anchored(&sha256_hex(b"reconcile me")));
    assert!(h.store.certificates().is_empty());
    // The artifact is kept so the record can be rebuilt.
    assert_eq!(h.stored_files().len(), 1);

    h.state.outbox.drain().await;
    let txs = h.store.web3_txs();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].tx_hash.as_deref(), Some(tx_hash.as_str()));
    assert_eq!(txs[0].status, TxStatus::Confirmed);
    assert!(txs[0].certificate_id.is_none());
    assert!(txs[0].error.is_some());
}

#[tokio::test]
async fn test_unconfirmed_submission_is_pending() {
    let h = Harness::new();
    h.ledger.set_settle(Settle::Never);
    let artifact = upload(&h, "slow.pdf", b"slow").await;

    let err = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(h.store.certificates().is_empty());
    // The transaction may still land, so the upload stays for rebuilding.
    let files = h.stored_files();
    assert_eq!(files.len(), 1);

    h.state.outbox.drain().await;
    let txs = h.store.web3_txs();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].status, TxStatus::Submitted);
    assert!(txs[0].tx_hash.is_some());
    let path = txs[0].request_dump["storagePath"].as_str().unwrap();
    assert!(path.ends_with(&files[0]));
    assert_eq!(txs[0].request_dump["subject"], "Acme Manufacturing");
}

#[tokio::test]
async fn test_concurrent_creates_of_same_bytes_anchor_once() {
    let h = Harness::new();
    h.ledger.set_settle(Settle::Slow(Duration::from_millis(40)));
    let bytes = b"raced certificate";
    let first = upload(&h, "first.pdf", bytes).await;
    let second = upload(&h, "second.pdf", bytes).await;
    let admin = super_admin();

    let (a, b) = tokio::join!(
        h.state.certificates.create(&admin, create_input(first)),
        h.state.certificates.create(&admin, create_input(second)),
    );

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected one success and one conflict, got {:?} / {:?}", a.is_ok(), b.is_ok()),
    };
    assert_eq!(lost.status(), StatusCode::CONFLICT);
    assert_eq!(won.certificate.metadata_hash, sha256_hex(bytes));
    assert_eq!(h.ledger.submitted_methods(), vec!["store_document"]);
    assert_eq!(h.store.certificates().len(), 1);
    assert_eq!(h.stored_files().len(), 1);
}

#[tokio::test]
async fn test_company_admin_certificate_bound_to_own_company() {
    let h = Harness::new();
    let company = Uuid::new_v4();
    let admin = principal(UserRole::CompanyAdmin, Some(company));
    let artifact = upload(&h, "own.pdf", b"own").await;

    let mut input = create_input(artifact);
    input.company_id = Some(Uuid::new_v4());
    let outcome = h.state.certificates.create(&admin, input).await.unwrap();

    assert_eq!(outcome.certificate.company_id, Some(company));
}

#[tokio::test]
async fn test_regulator_cannot_create() {
    let h = Harness::new();
    let artifact = upload(&h, "nope.pdf", b"nope").await;

    let err = h
        .state
        .certificates
        .create(&regulator(), create_input(artifact))
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert!(h.ledger.submissions().is_empty());
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn test_check_reports_anchored_and_discards_upload() {
    let h = Harness::new();
    h.ledger.anchor(&sha256_hex(b"known"), "Known");
    let checker = regulator();

    let known = upload(&h, "known.pdf", b"known").await;
    let outcome = h
        .state
        .certificates
        .check_issued(&checker, known, None)
        .await
        .unwrap();
    assert!(outcome.issued);
    assert_eq!(outcome.value.unwrap()["name"], "Known");

    let unknown = upload(&h, "unknown.pdf", b"unknown").await;
    let outcome = h
        .state
        .certificates
        .check_issued(&checker, unknown, None)
        .await
        .unwrap();
    assert!(!outcome.issued);
    assert!(outcome.value.is_none());

    assert!(h.stored_files().is_empty());
    assert!(h.ledger.submissions().is_empty());
}

async fn requested(h: &Harness, bytes: &[u8]) -> Uuid {
    let artifact = upload(h, "requested.pdf", bytes).await;
    h.state
        .certificates
        .request(
            &super_admin(),
            RequestCertificate {
                certificate_name: "Safety audit".into(),
                subject: "Plant 4".into(),
                company_id: None,
                artifact,
            },
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_validate_requires_anchor() {
    let h = Harness::new();
    let id = requested(&h, b"not anchored").await;

    let err = h
        .state
        .certificates
        .validate(id, &regulator(), None)
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert!(h.ledger.submissions().is_empty());
    assert!(h.store.web3_txs().is_empty());
    let cert = h.state.certificates.get(id).await.unwrap();
    assert_eq!(cert.status, CertificateStatus::Requested);
}

#[tokio::test]
async fn test_issue_once_then_reject_reissue() {
    let h = Harness::new();
    let id = requested(&h, b"issue me").await;
    let issuer = regulator();

    let outcome = h
        .state
        .certificates
        .issue(
            id,
            &issuer,
            IssueCertificate {
                notes: Some("checked on site".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.certificate.status, CertificateStatus::Issued);
    assert_eq!(outcome.tx.status, TxStatus::Confirmed);
    assert!(outcome.certificate.chain.on_chain_id.is_some());

    let err = h
        .state
        .certificates
        .issue(id, &issuer, IssueCertificate::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);

    h.state.outbox.drain().await;
    let issue_txs: Vec<_> = h
        .store
        .web3_txs()
        .into_iter()
        .filter(|t| t.purpose == TxPurpose::Issue)
        .collect();
    assert_eq!(issue_txs.len(), 1);
    assert_eq!(issue_txs[0].status, TxStatus::Confirmed);
    assert_eq!(h.ledger.submissions().len(), 1);
}

#[tokio::test]
async fn test_issue_rejects_past_expiry() {
    let h = Harness::new();
    let id = requested(&h, b"expired").await;

    let err = h
        .state
        .certificates
        .issue(
            id,
            &regulator(),
            IssueCertificate {
                expiry_at: Some(chrono::Utc::now() - chrono::Duration::days(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert!(h.store.web3_txs().is_empty());
}

#[tokio::test]
async fn test_validate_after_create() {
    let h = Harness::new();
    let artifact = upload(&h, "v.pdf", b"validate me").await;
    let created = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap();

    let outcome = h
        .state
        .certificates
        .validate(created.certificate.id, &regulator(), None)
        .await
        .unwrap();

    assert_eq!(outcome.certificate.status, CertificateStatus::Validated);
    assert_eq!(
        outcome.certificate.chain.tx_hash_validate,
        outcome.tx.tx_hash
    );
    assert_eq!(outcome.tx.purpose, TxPurpose::Validate);

    // A second validation is not a legal transition.
    let err = h
        .state
        .certificates
        .validate(created.certificate.id, &regulator(), None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);

    h.state.outbox.drain().await;
    let events = h
        .state
        .store
        .list_events(created.certificate.id)
        .await
        .unwrap();
    let kinds: Vec<_> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![EventType::Validated, EventType::Issued]);
}

#[tokio::test]
async fn test_validate_refuses_replaced_artifact_that_is_not_anchored() {
    let h = Harness::new();
    let artifact = upload(&h, "orig.pdf", b"anchored bytes").await;
    let created = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap();
    let id = created.certificate.id;

    let replacement = upload(&h, "swap.pdf", b"swapped bytes").await;
    h.state
        .certificates
        .update(
            id,
            &super_admin(),
            UpdateCertificate {
                artifact: Some(replacement),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .state
        .certificates
        .validate(id, &regulator(), None)
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(h.ledger.submitted_methods(), vec!["store_document"]);
    let cert = h.state.certificates.get(id).await.unwrap();
    assert_eq!(cert.status, CertificateStatus::Issued);
    assert_eq!(cert.metadata_hash, sha256_hex(b"swapped bytes"));
    assert!(cert.chain.tx_hash_validate.is_none());
}

#[tokio::test]
async fn test_failed_validation_keeps_status_and_records_failure() {
    let h = Harness::new();
    let artifact = upload(&h, "f.pdf", b"fail validation").await;
    let created = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap();

    h.ledger.set_settle(Settle::Reject);
    let err = h
        .state
        .certificates
        .validate(created.certificate.id, &regulator(), None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

    let cert = h.state.certificates.get(created.certificate.id).await.unwrap();
    assert_eq!(cert.status, CertificateStatus::Issued);

    h.state.outbox.drain().await;
    let failed: Vec<_> = h
        .store
        .web3_txs()
        .into_iter()
        .filter(|t| t.purpose == TxPurpose::Validate)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, TxStatus::Failed);
    assert!(failed[0].error.is_some());
}

#[tokio::test]
async fn test_delete_cascades_to_history_and_file() {
    let h = Harness::new();
    let artifact = upload(&h, "gone.pdf", b"delete me").await;
    let created = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap();
    let id = created.certificate.id;
    h.state
        .certificates
        .validate(id, &regulator(), None)
        .await
        .unwrap();
    h.state.outbox.drain().await;

    let counts = h.state.certificates.delete(id, &super_admin()).await.unwrap();

    assert_eq!(counts.certificate, 1);
    assert_eq!(counts.events, 2);
    assert_eq!(counts.transactions, 2);
    assert_eq!(counts.files_deleted, 1);
    assert!(h.store.certificates().is_empty());
    assert!(h.store.events().is_empty());
    assert!(h.store.web3_txs().is_empty());
    assert!(h.stored_files().is_empty());

    let err = h.state.certificates.get(id).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_reports_partial_counts() {
    let h = Harness::new();
    let artifact = upload(&h, "partial.pdf", b"partial").await;
    let created = h
        .state
        .certificates
        .create(&super_admin(), create_input(artifact))
        .await
        .unwrap();
    h.state.outbox.drain().await;
    h.store.fail_on(StoreOp::DeleteWeb3Txs);

    let err = h
        .state
        .certificates
        .delete(created.certificate.id, &super_admin())
        .await
        .unwrap_err();

    match err {
        AppError::PartialDelete { counts, .. } => {
            assert_eq!(counts.events, 1);
            assert_eq!(counts.transactions, 0);
        }
        other => panic!("expected partial delete, got {:?}", other),
    }
    assert_eq!(h.store.web3_txs().len(), 1);
}

#[tokio::test]
async fn test_only_super_admin_deletes() {
    let h = Harness::new();
    let id = requested(&h, b"keep").await;

    let err = h.state.certificates.delete(id, &regulator()).await.unwrap_err();

    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.store.certificates().len(), 1);
}

#[tokio::test]
async fn test_update_replaces_artifact_after_record_update() {
    let h = Harness::new();
    let id = requested(&h, b"old content").await;
    let before = h.state.certificates.get(id).await.unwrap();
    assert_eq!(h.stored_files().len(), 1);

    let replacement = upload(&h, "replacement.pdf", b"new content").await;
    let replacement_file = stored_name(&replacement);
    let updated = h
        .state
        .certificates
        .update(
            id,
            &super_admin(),
            UpdateCertificate {
                subject: Some("Plant 5".into()),
                artifact: Some(replacement),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.subject, "Plant 5");
    assert_eq!(updated.metadata_hash, sha256_hex(b"new content"));
    assert_eq!(updated.version, before.version + 1);
    assert_eq!(h.stored_files(), vec![replacement_file]);

    h.state.outbox.drain().await;
    let comment = h
        .store
        .events()
        .into_iter()
        .find(|e| e.event_type == EventType::Comment)
        .unwrap();
    assert_eq!(comment.details["action"], "updated");
    assert_eq!(comment.details["hasNewFile"], true);
}

#[tokio::test]
async fn test_failed_update_keeps_old_file_and_drops_new_one() {
    let h = Harness::new();
    let id = requested(&h, b"original").await;
    let original_files = h.stored_files();
    h.store.fail_on(StoreOp::UpdateCertificate);

    let replacement = upload(&h, "other.pdf", b"other").await;
    let err = h
        .state
        .certificates
        .update(
            id,
            &super_admin(),
            UpdateCertificate {
                artifact: Some(replacement),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.stored_files(), original_files);
}

#[tokio::test]
async fn test_empty_update_is_rejected() {
    let h = Harness::new();
    let id = requested(&h, b"unchanged").await;

    let err = h
        .state
        .certificates
        .update(id, &super_admin(), UpdateCertificate::default())
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_paginates() {
    let h = Harness::new();
    for i in 0..25 {
        requested(&h, format!("certificate {}", i).as_bytes()).await;
    }

    let page = h
        .state
        .certificates
        .list(
            &super_admin(),
            ListQuery {
                page: Some(2),
                limit: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(page.data.len(), 10);
    assert_eq!(page.pagination.total, 25);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.current_page, 2);
}

#[tokio::test]
async fn test_list_with_huge_page_is_empty() {
    let h = Harness::new();
    requested(&h, b"only one").await;

    let page = h
        .state
        .certificates
        .list(
            &super_admin(),
            ListQuery {
                page: Some(i64::MAX),
                limit: Some(i64::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(page.data.is_empty());
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn test_list_is_scoped_for_company_admin() {
    let h = Harness::new();
    let company = Uuid::new_v4();
    let admin = principal(UserRole::CompanyAdmin, Some(company));

    let own = upload(&h, "own.pdf", b"own company").await;
    h.state
        .certificates
        .create(&admin, create_input(own))
        .await
        .unwrap();
    let other = upload(&h, "other.pdf", b"other company").await;
    h.state
        .certificates
        .create(&super_admin(), create_input(other))
        .await
        .unwrap();
    h.state.outbox.drain().await;

    let page = h
        .state
        .certificates
        .list(&admin, ListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].signed_by, Some(admin.user_id));
    assert_eq!(page.data[0].signer_role.as_deref(), Some("company_admin"));

    let all = h
        .state
        .certificates
        .list(&super_admin(), ListQuery::default())
        .await
        .unwrap();
    assert_eq!(all.pagination.total, 2);
}
