//! Multipart form handling shared by the certificate endpoints.

use std::collections::HashMap;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tracing::debug;

use crate::artifact::{ArtifactStore, StoredArtifact};
use crate::error::AppError;
use crate::ledger::LedgerSigner;

const FILE_FIELD: &str = "file";

/// A parsed multipart body: at most one stored file plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub artifact: Option<StoredArtifact>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn text_owned(&self, name: &str) -> Option<String> {
        self.text(name).map(str::to_string)
    }

    /// Optional per-request signer override.
    pub fn signer(&self) -> Result<Option<LedgerSigner>, AppError> {
        parse_signer(self.text("signerSecret"))
    }

    /// Removes the stored file, if any.
    pub async fn discard(self) {
        if let Some(artifact) = self.artifact {
            artifact.source.discard().await;
        }
    }

    pub fn take_artifact(&mut self) -> Result<StoredArtifact, AppError> {
        self.artifact
            .take()
            .ok_or_else(|| AppError::BadRequest("file is required".into()))
    }
}

pub fn parse_signer(secret: Option<&str>) -> Result<Option<LedgerSigner>, AppError> {
    match secret.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => Ok(Some(LedgerSigner::from_secret_hex(secret)?)),
        None => Ok(None),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Reads the whole form. On any error the partially received file is
/// removed before returning.
pub async fn read_form(
    artifacts: &ArtifactStore,
    mut multipart: Multipart,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                form.discard().await;
                return Err(multipart_error(e));
            }
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == FILE_FIELD {
            if form.artifact.is_some() {
                form.discard().await;
                return Err(AppError::BadRequest("Only one file may be uploaded".into()));
            }
            match receive_file(artifacts, field).await {
                Ok(artifact) => form.artifact = Some(artifact),
                Err(e) => {
                    form.discard().await;
                    return Err(e);
                }
            }
        } else {
            match field.text().await {
                Ok(value) => {
                    form.fields.insert(name, value);
                }
                Err(e) => {
                    form.discard().await;
                    return Err(multipart_error(e));
                }
            }
        }
    }
    Ok(form)
}

async fn receive_file(
    artifacts: &ArtifactStore,
    mut field: Field<'_>,
) -> Result<StoredArtifact, AppError> {
    let filename = field
        .file_name()
        .map(str::to_string)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::BadRequest("file name is required".into()))?;
    let mime = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    if !artifacts.is_allowed_mime(&mime) {
        return Err(AppError::BadRequest(format!("Unsupported file type: {}", mime)));
    }

    let mut writer = artifacts.begin(&filename, &mime).await?;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = writer.write_chunk(&chunk).await {
                    writer.abort().await;
                    return Err(e.into());
                }
            }
            Ok(None) => break,
            Err(e) => {
                writer.abort().await;
                return Err(multipart_error(e));
            }
        }
    }
    let artifact = writer.finish().await?;
    debug!(
        filename = %artifact.meta.original_filename,
        size = artifact.meta.size,
        "Received upload"
    );
    Ok(artifact)
}
