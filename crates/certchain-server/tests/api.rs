//! End-to-end tests through the HTTP router.
//!
//! Run with: cargo test --test api

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use certchain_server::create_router;
use certchain_server::models::TxPurpose;
use common::Harness;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "certchain-test-boundary";

/// Helper to parse JSON response body.
async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&body).expect("Failed to parse JSON response")
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, mime, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, filename, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to send request");
    let status = response.status();
    (status, json_body(response).await)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(uri: &str, token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

/// Registers an account and returns its access token.
async fn register_and_login(app: &Router, registration: Value) -> String {
    let email = registration["email"].as_str().unwrap().to_string();
    let password = registration["password"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        json_request("POST", "/api/v1/auth/register", None, registration),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            json!({ "email": email, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    assert_eq!(body["data"]["tokenType"], "Bearer");
    body["data"]["accessToken"].as_str().unwrap().to_string()
}

struct Accounts {
    super_admin: String,
    company: String,
    regulator: String,
}

async fn accounts(app: &Router) -> Accounts {
    Accounts {
        super_admin: register_and_login(
            app,
            json!({ "email": "root@example.com", "password": "correct horse", "role": "super_admin" }),
        )
        .await,
        company: register_and_login(
            app,
            json!({
                "email": "ops@acme.test",
                "password": "battery staple",
                "role": "company_admin",
                "company": { "name": "Acme" }
            }),
        )
        .await,
        regulator: register_and_login(
            app,
            json!({
                "email": "audit@regulator.test",
                "password": "stapled horse",
                "role": "regulator_admin",
                "regulator": { "name": "Standards Board" }
            }),
        )
        .await,
    }
}

fn certificate_form(bytes: &[u8]) -> Vec<u8> {
    multipart_body(
        &[("certificateName", "ISO 14001"), ("subject", "Acme Plant 2")],
        Some(("iso14001.pdf", "application/pdf", bytes)),
    )
}

#[tokio::test]
async fn test_certificate_flow_end_to_end() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    let tokens = accounts(&app).await;

    // Anonymous create is refused.
    let (status, _) = send(
        &app,
        multipart_request("/api/v1/certificates", None, certificate_form(b"doc")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        multipart_request(
            "/api/v1/certificates",
            Some(&tokens.company),
            certificate_form(b"%PDF environmental"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["cert"]["status"], "issued");
    let id = body["cert"]["id"].as_str().unwrap().to_string();
    let tx_hash = body["tx"]["txHash"].as_str().unwrap().to_string();
    assert_eq!(body["cert"]["onChainId"], tx_hash.as_str());

    // Same bytes again.
    let (status, body) = send(
        &app,
        multipart_request(
            "/api/v1/certificates",
            Some(&tokens.company),
            certificate_form(b"%PDF environmental"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "conflict");

    // Public verification needs no token.
    let (status, body) = send(
        &app,
        empty_request("GET", &format!("/api/v1/certificates/{}/verify", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["certificate"]["id"], id.as_str());
    assert_eq!(body["data"]["chain"]["txHashIssue"], tx_hash.as_str());

    // History is only shown to authorized callers.
    let (_, anonymous) = send(
        &app,
        empty_request("GET", &format!("/api/v1/certificates/{}", id), None),
    )
    .await;
    assert!(anonymous.get("history").is_none());

    // Company admins may not validate.
    let (status, _) = send(
        &app,
        empty_request(
            "POST",
            &format!("/api/v1/certificates/{}/validate", id),
            Some(&tokens.company),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        empty_request(
            "POST",
            &format!("/api/v1/certificates/{}/validate", id),
            Some(&tokens.regulator),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "validate failed: {}", body);
    assert_eq!(body["data"]["certificate"]["status"], "validated");
    assert_eq!(body["data"]["tx"]["purpose"], "validate");

    h.state.outbox.drain().await;
    let (_, detailed) = send(
        &app,
        empty_request(
            "GET",
            &format!("/api/v1/certificates/{}", id),
            Some(&tokens.regulator),
        ),
    )
    .await;
    assert_eq!(detailed["history"]["events"].as_array().unwrap().len(), 2);
    assert_eq!(detailed["history"]["transactions"].as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        empty_request(
            "GET",
            "/api/v1/certificates/admin/all?page=1&limit=10&sortBy=createdAt&sortOrder=asc",
            Some(&tokens.company),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["company"]["name"], "Acme");
    assert_eq!(body["data"][0]["status"], "validated");

    // Only the super admin deletes.
    let (status, _) = send(
        &app,
        empty_request(
            "DELETE",
            &format!("/api/v1/certificates/admin/{}", id),
            Some(&tokens.regulator),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        empty_request(
            "DELETE",
            &format!("/api/v1/certificates/admin/{}", id),
            Some(&tokens.super_admin),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCounts"]["certificate"], 1);
    assert_eq!(body["deletedCounts"]["filesDeleted"], 1);

    let (status, _) = send(
        &app,
        empty_request("GET", &format!("/api/v1/certificates/{}/verify", id), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_validation_errors() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    let tokens = accounts(&app).await;

    let missing_subject = multipart_body(
        &[("certificateName", "No subject")],
        Some(("a.pdf", "application/pdf", b"a")),
    );
    let (status, body) = send(
        &app,
        multipart_request("/api/v1/certificates", Some(&tokens.super_admin), missing_subject),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let missing_file = multipart_body(&[("certificateName", "x"), ("subject", "y")], None);
    let (status, _) = send(
        &app,
        multipart_request("/api/v1/certificates", Some(&tokens.super_admin), missing_file),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let wrong_type = multipart_body(
        &[("certificateName", "x"), ("subject", "y")],
        Some(("a.exe", "application/x-msdownload", b"MZ")),
    );
    let (status, _) = send(
        &app,
        multipart_request("/api/v1/certificates", Some(&tokens.super_admin), wrong_type),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_large = vec![b'x'; 64 * 1024 + 1];
    let (status, body) = send(
        &app,
        multipart_request(
            "/api/v1/certificates",
            Some(&tokens.super_admin),
            certificate_form(&too_large),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "payload_too_large");

    assert!(h.stored_files().is_empty());
    assert!(h.ledger.submissions().is_empty());
}

#[tokio::test]
async fn test_check_endpoint() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    let tokens = accounts(&app).await;
    h.ledger
        .anchor(&certchain_crypto::sha256_hex(b"anchored"), "Anchored doc");

    let form = multipart_body(&[], Some(("c.pdf", "application/pdf", b"anchored")));
    let (status, body) = send(
        &app,
        multipart_request("/api/v1/certificates/check", Some(&tokens.regulator), form),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issued"], true);
    assert_eq!(body["value"]["name"], "Anchored doc");
    assert!(h.stored_files().is_empty());
}

#[tokio::test]
async fn test_request_then_issue() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    let tokens = accounts(&app).await;

    let (status, body) = send(
        &app,
        multipart_request(
            "/api/v1/certificates/requests",
            Some(&tokens.company),
            certificate_form(b"awaiting issuance"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "request failed: {}", body);
    assert_eq!(body["data"]["status"], "requested");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/v1/certificates/{}/issue", id),
            Some(&tokens.regulator),
            json!({ "notes": "site visit complete", "expiryAt": "2099-01-01T00:00:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "issue failed: {}", body);
    assert_eq!(body["data"]["certificate"]["status"], "issued");
    assert_eq!(body["data"]["certificate"]["expiryAt"], "2099-01-01T00:00:00Z");
    assert_eq!(body["data"]["tx"]["status"], "confirmed");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/v1/certificates/{}/issue", id),
            Some(&tokens.regulator),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_single_super_admin() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    accounts(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "email": "second@example.com", "password": "another one", "role": "super_admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/auth/login",
            None,
            json!({ "email": "root@example.com", "password": "wrong password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ledger_proxy_permissions_and_audit() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    let tokens = accounts(&app).await;
    let address = "did:key:z6MkWhitelisted";

    let (status, _) = send(
        &app,
        json_request("POST", "/api/v1/ledger/whitelist", None, json!({ "address": address })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/ledger/whitelist",
            Some(&tokens.company),
            json!({ "address": address }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/ledger/whitelist",
            Some(&tokens.regulator),
            json!({ "address": address }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "whitelist failed: {}", body);
    assert!(body["data"]["tx"]["txHash"].is_string());

    let (status, body) = send(
        &app,
        empty_request(
            "GET",
            &format!("/api/v1/ledger/is_whitelisted/{}", address),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["whitelisted"], true);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/ledger/transfer_ownership",
            Some(&tokens.regulator),
            json!({ "newOwner": address }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        empty_request("POST", "/api/v1/ledger/init", Some(&tokens.super_admin)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "init failed: {}", body);

    let (status, body) = send(&app, empty_request("GET", "/api/v1/ledger/owner", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["owner"], common::OWNER);

    h.state.outbox.drain().await;
    let purposes: Vec<TxPurpose> = h.store.web3_txs().iter().map(|t| t.purpose).collect();
    assert_eq!(purposes, vec![TxPurpose::Whitelist, TxPurpose::Init]);
}

#[tokio::test]
async fn test_wallet_helpers() {
    let h = Harness::new();
    let app = create_router(h.state.clone());

    let (status, body) = send(
        &app,
        empty_request("POST", "/api/v1/ledger/helpers/create_wallet", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let address = body["data"]["wallet"]["address"].as_str().unwrap().to_string();
    assert!(address.starts_with("did:key:"));
    assert_eq!(body["data"]["wallet"]["secretKey"].as_str().unwrap().len(), 64);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/ledger/helpers/fund_wallet",
            None,
            json!({ "publicKey": address }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"]["funded"], address.as_str());
}

#[tokio::test]
async fn test_store_document_proxy_writes_one_audit_row() {
    let h = Harness::new();
    let app = create_router(h.state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/ledger/store_document",
            None,
            json!({ "name": "Direct", "hash": "ab".repeat(32) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "store failed: {}", body);

    let (status, body) = send(
        &app,
        empty_request("GET", &format!("/api/v1/ledger/read/{}", "ab".repeat(32)), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["document"]["name"], "Direct");

    h.state.outbox.drain().await;
    let txs = h.store.web3_txs();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].purpose, TxPurpose::Other);
}

#[tokio::test]
async fn test_company_and_regulator_directory() {
    let h = Harness::new();
    let app = create_router(h.state.clone());
    let tokens = accounts(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/companies",
            Some(&tokens.super_admin),
            json!({ "name": "Globex", "contactEmail": "info@globex.test" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    assert_eq!(body["data"]["name"], "Globex");
    assert_eq!(body["data"]["contactEmail"], "info@globex.test");
    let globex = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/companies",
            Some(&tokens.regulator),
            json!({ "name": "Rogue" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        empty_request("GET", "/api/v1/companies?search=glo", Some(&tokens.super_admin)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // The company admin registered with Acme and sees nothing else.
    let (status, body) = send(
        &app,
        empty_request("GET", "/api/v1/companies", Some(&tokens.company)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["data"].as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["name"], "Acme");

    let (status, _) = send(
        &app,
        empty_request(
            "GET",
            &format!("/api/v1/companies/{}", globex),
            Some(&tokens.company),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        empty_request("GET", "/api/v1/regulators", Some(&tokens.regulator)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "Standards Board");

    let (status, _) = send(
        &app,
        empty_request("GET", "/api/v1/regulators", Some(&tokens.company)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, empty_request("GET", "/api/v1/companies", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
