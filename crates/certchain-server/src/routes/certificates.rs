//! Certificate endpoints.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::upload::{parse_signer, read_form, UploadForm};
use super::{data, envelope, Data, Envelope};
use crate::access::{authorize, Action, Resource};
use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::AppError;
use crate::lifecycle::{
    CertificateDetail, CertificatePageView, CheckOutcome, CreateCertificate, CreateOutcome,
    DeletedCounts, IssueCertificate, ListQuery, PublicVerification, RequestCertificate,
    TransitionOutcome, UpdateCertificate,
};
use crate::models::{Certificate, CertificateEvent, CertificateStatus, Web3Tx};
use crate::state::AppState;
use crate::store::{SortField, SortOrder};

/// Multipart overhead allowed on top of the file size limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the certificates router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.artifacts.max_bytes() + FORM_OVERHEAD_BYTES;
    Router::new()
        .route("/", post(create_certificate))
        .route("/requests", post(request_certificate))
        .route("/check", post(check_certificate))
        .route("/admin/all", get(list_certificates))
        .route(
            "/admin/{id}",
            get(get_certificate_admin)
                .put(update_certificate)
                .delete(delete_certificate),
        )
        .route("/{id}", get(get_certificate))
        .route("/{id}/verify", get(verify_public))
        .route("/{id}/issue", post(issue_certificate))
        .route("/{id}/validate", post(validate_certificate))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn required_field(form: &UploadForm, name: &str) -> Result<String, AppError> {
    form.text(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("certificateName and subject are required".into()))
}

fn optional_uuid(form: &UploadForm, name: &str) -> Result<Option<Uuid>, AppError> {
    match form.text(name).map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("{} must be a UUID", name))),
        None => Ok(None),
    }
}

/// Everything a create or request form carries besides the file.
struct FormFields {
    certificate_name: String,
    subject: String,
    company_id: Option<Uuid>,
}

fn form_fields(form: &UploadForm) -> Result<FormFields, AppError> {
    Ok(FormFields {
        certificate_name: required_field(form, "certificateName")?,
        subject: required_field(form, "subject")?,
        company_id: optional_uuid(form, "companyId")?,
    })
}

/// POST /api/v1/certificates
///
/// Multipart: `file`, `certificateName`, `subject`, optional `companyId`
/// and `signerSecret`. Anchors the file's digest and stores the certificate.
async fn create_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<CreateOutcome>>), AppError> {
    let mut form = read_form(&state.artifacts, multipart).await?;
    let parsed = form_fields(&form).and_then(|fields| Ok((fields, form.signer()?)));
    let (fields, signer) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            form.discard().await;
            return Err(e);
        }
    };
    let artifact = form.take_artifact()?;

    let outcome = state
        .certificates
        .create(
            &principal,
            CreateCertificate {
                certificate_name: fields.certificate_name,
                subject: fields.subject,
                company_id: fields.company_id,
                artifact,
                signer,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, envelope(outcome)))
}

/// POST /api/v1/certificates/requests
///
/// Records a certificate awaiting issuance.
async fn request_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<Data<Certificate>>>), AppError> {
    let mut form = read_form(&state.artifacts, multipart).await?;
    let fields = match form_fields(&form) {
        Ok(fields) => fields,
        Err(e) => {
            form.discard().await;
            return Err(e);
        }
    };
    let artifact = form.take_artifact()?;

    let certificate = state
        .certificates
        .request(
            &principal,
            RequestCertificate {
                certificate_name: fields.certificate_name,
                subject: fields.subject,
                company_id: fields.company_id,
                artifact,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, data(certificate)))
}

/// POST /api/v1/certificates/check
///
/// Reports whether the uploaded file's digest is anchored. The file is not kept.
async fn check_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    multipart: Multipart,
) -> Result<Json<Envelope<CheckOutcome>>, AppError> {
    let mut form = read_form(&state.artifacts, multipart).await?;
    let signer = match form.signer() {
        Ok(signer) => signer,
        Err(e) => {
            form.discard().await;
            return Err(e);
        }
    };
    let artifact = form.take_artifact()?;
    let outcome = state
        .certificates
        .check_issued(&principal, artifact, signer)
        .await?;
    Ok(envelope(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub company_id: Option<Uuid>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<ListQuery, AppError> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                CertificateStatus::parse(raw)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown status: {}", raw)))?,
            ),
            None => None,
        };
        let sort_by = match self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(
                SortField::parse(raw)
                    .ok_or_else(|| AppError::BadRequest(format!("Cannot sort by {}", raw)))?,
            ),
            None => None,
        };
        let sort_order = match self.sort_order.as_deref() {
            Some("asc") => Some(SortOrder::Asc),
            Some("desc") => Some(SortOrder::Desc),
            Some("") | None => None,
            Some(other) => {
                return Err(AppError::BadRequest(format!(
                    "sortOrder must be asc or desc, got {}",
                    other
                )))
            }
        };
        Ok(ListQuery {
            page: self.page,
            limit: self.limit,
            status,
            company_id: self.company_id,
            search: self.search.filter(|s| !s.trim().is_empty()),
            sort_by,
            sort_order,
        })
    }
}

/// GET /api/v1/certificates/admin/all
async fn list_certificates(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Envelope<CertificatePageView>>, AppError> {
    let page = state
        .certificates
        .list(&principal, params.into_query()?)
        .await?;
    Ok(envelope(page))
}

/// GET /api/v1/certificates/admin/{id}
async fn get_certificate_admin(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Data<CertificateDetail>>>, AppError> {
    let detail = state.certificates.get_detail(id, &principal).await?;
    Ok(data(detail))
}

#[derive(Debug, Serialize)]
pub struct History {
    pub events: Vec<CertificateEvent>,
    pub transactions: Vec<Web3Tx>,
}

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    pub data: Certificate,
    /// Present when the caller may see the certificate's history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,
}

/// GET /api/v1/certificates/{id}
async fn get_certificate(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<CertificateResponse>>, AppError> {
    let certificate = state.certificates.get(id).await?;
    let can_view_history = authorize(
        principal.as_ref(),
        Action::ViewCertificateHistory,
        Resource::Certificate(&certificate),
    )
    .is_ok();

    let response = match (principal, can_view_history) {
        (Some(principal), true) => {
            let CertificateDetail {
                certificate,
                events,
                transactions,
            } = state.certificates.get_detail(id, &principal).await?;
            CertificateResponse {
                data: certificate,
                history: Some(History {
                    events,
                    transactions,
                }),
            }
        }
        _ => CertificateResponse {
            data: certificate,
            history: None,
        },
    };
    Ok(envelope(response))
}

/// GET /api/v1/certificates/{id}/verify
///
/// Public, unauthenticated.
async fn verify_public(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Data<PublicVerification>>>, AppError> {
    let verification = state.certificates.verify_public(id).await?;
    info!(certificate_id = %id, "Certificate publicly verified");
    Ok(data(verification))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueBody {
    pub notes: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub signer_secret: Option<String>,
}

/// POST /api/v1/certificates/{id}/issue
async fn issue_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<IssueBody>>,
) -> Result<Json<Envelope<Data<TransitionOutcome>>>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let signer = parse_signer(body.signer_secret.as_deref())?;
    let outcome = state
        .certificates
        .issue(
            id,
            &principal,
            IssueCertificate {
                notes: body.notes,
                expiry_at: body.expiry_at,
                signer,
            },
        )
        .await?;
    Ok(data(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    pub signer_secret: Option<String>,
}

/// POST /api/v1/certificates/{id}/validate
async fn validate_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ValidateBody>>,
) -> Result<Json<Envelope<Data<TransitionOutcome>>>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let signer = parse_signer(body.signer_secret.as_deref())?;
    let outcome = state
        .certificates
        .validate(id, &principal, signer)
        .await?;
    Ok(data(outcome))
}

/// PUT /api/v1/certificates/admin/{id}
///
/// Multipart with any of `certificateName`, `subject` and `file`.
async fn update_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<Envelope<Data<Certificate>>>, AppError> {
    let mut form = read_form(&state.artifacts, multipart).await?;
    let input = UpdateCertificate {
        certificate_name: form.text_owned("certificateName"),
        subject: form.text_owned("subject"),
        artifact: form.artifact.take(),
    };
    let certificate = state.certificates.update(id, &principal, input).await?;
    Ok(data(certificate))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub message: &'static str,
    pub deleted_counts: DeletedCounts,
}

/// DELETE /api/v1/certificates/admin/{id}
async fn delete_certificate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<DeleteResponse>>, AppError> {
    let counts = state.certificates.delete(id, &principal).await?;
    Ok(envelope(DeleteResponse {
        message: "Certificate and related records deleted successfully",
        deleted_counts: counts,
    }))
}
