//! Uploaded certificate artifacts: storage, hashing and cleanup.
//!
//! An upload either lands in a file under the upload directory or stays in
//! memory, depending on configuration. Both cases are an [`ArtifactSource`],
//! which knows how to hash itself and how to discard itself.

use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::{Bytes, BytesMut};
use certchain_crypto::{sha256_hex, sha256_reader, ContentHasher};
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::UploadConfig;
use crate::error::AppError;
use crate::models::{StorageInfo, StorageProvider};

/// Hashing failed.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("artifact file is missing: {0}")]
    Missing(String),

    #[error("failed to read artifact: {0}")]
    Io(#[from] io::Error),
}

impl From<HashError> for AppError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::Missing(path) => AppError::BadRequest(format!("Uploaded file is missing: {}", path)),
            HashError::Io(e) => AppError::Internal(format!("Failed to hash artifact: {}", e)),
        }
    }
}

/// Receiving an upload failed.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("failed to store upload: {0}")]
    Io(#[from] io::Error),
}

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::TooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ArtifactError::Io(e) => AppError::Internal(format!("Failed to store upload: {}", e)),
        }
    }
}

/// Where the artifact bytes are.
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// Written to this file. `digest` is the hash taken while the bytes were
    /// streamed in; without it the file is read back.
    Disk {
        path: PathBuf,
        digest: Option<String>,
    },
    Memory { bytes: Bytes },
}

impl ArtifactSource {
    /// Lowercase hex SHA-256 of the artifact.
    pub async fn digest(&self) -> Result<String, HashError> {
        match self {
            ArtifactSource::Memory { bytes } => Ok(sha256_hex(bytes)),
            ArtifactSource::Disk {
                path,
                digest: Some(digest),
            } => match fs::metadata(path).await {
                Ok(_) => Ok(digest.clone()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Err(HashError::Missing(path.display().to_string()))
                }
                Err(e) => Err(HashError::Io(e)),
            },
            ArtifactSource::Disk { path, digest: None } => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || {
                    let file = std::fs::File::open(&path).map_err(|e| {
                        if e.kind() == io::ErrorKind::NotFound {
                            HashError::Missing(path.display().to_string())
                        } else {
                            HashError::Io(e)
                        }
                    })?;
                    Ok(sha256_reader(file)?)
                })
                .await
                .map_err(|e| HashError::Io(io::Error::other(e)))?
            }
        }
    }

    /// Removes a written file. Returns whether a file was deleted; failures
    /// are logged.
    pub async fn discard(&self) -> bool {
        match self {
            ArtifactSource::Memory { .. } => false,
            ArtifactSource::Disk { path, .. } => match fs::remove_file(path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Discarded artifact");
                    true
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => {
                    warn!(path = %path.display(), "Failed to discard artifact: {}", e);
                    false
                }
            },
        }
    }

    pub fn provider(&self) -> StorageProvider {
        match self {
            ArtifactSource::Disk { .. } => StorageProvider::Local,
            ArtifactSource::Memory { .. } => StorageProvider::Memory,
        }
    }
}

/// Client-reported file details.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
}

/// A received upload.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub source: ArtifactSource,
    pub meta: FileMeta,
    /// Path relative to the upload base directory, for disk uploads.
    pub relative_path: Option<String>,
    pub public_url: Option<String>,
}

impl StoredArtifact {
    pub fn storage_info(&self) -> StorageInfo {
        StorageInfo {
            provider: Some(self.source.provider()),
            path: self.relative_path.clone(),
            public_url: self.public_url.clone(),
        }
    }
}

/// Builds `{millis}-{16 hex}{ext}` without using the client's file stem.
pub fn secure_filename(original: &str) -> String {
    let ext: String = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(19)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let random = hex::encode(rand::random::<[u8; 8]>());
    format!("{}-{}{}", Utc::now().timestamp_millis(), random, ext)
}

/// Rejects absolute paths and parent-directory hops.
fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    !relative.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Upload directory plus the policy for accepting files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_dir: PathBuf,
    cert_dir: String,
    public_base_url: String,
    allowed_mime_types: Vec<String>,
    max_bytes: usize,
    use_disk: bool,
}

impl ArtifactStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            base_dir: PathBuf::from(&config.base_dir),
            cert_dir: config.cert_dir.trim_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            allowed_mime_types: config.allowed_mime_types.clone(),
            max_bytes: config.max_bytes,
            use_disk: config.use_disk,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn uses_disk(&self) -> bool {
        self.use_disk
    }

    pub fn is_allowed_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime)
    }

    /// Creates the certificate directory when uploads go to disk.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        if self.use_disk {
            fs::create_dir_all(self.base_dir.join(&self.cert_dir)).await?;
        }
        Ok(())
    }

    fn public_url_for(&self, filename: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.cert_dir, filename)
    }

    /// Starts receiving an upload.
    pub async fn begin(
        &self,
        original_filename: &str,
        mime_type: &str,
    ) -> Result<ArtifactWriter, ArtifactError> {
        let sink = if self.use_disk {
            let filename = secure_filename(original_filename);
            let dir = self.base_dir.join(&self.cert_dir);
            fs::create_dir_all(&dir).await?;
            let path = dir.join(&filename);
            let file = fs::File::create(&path).await?;
            Sink::Disk {
                file,
                path,
                hasher: ContentHasher::new(),
                relative: format!("{}/{}", self.cert_dir, filename),
                public_url: self.public_url_for(&filename),
            }
        } else {
            Sink::Memory(BytesMut::new())
        };

        Ok(ArtifactWriter {
            original_filename: original_filename.to_string(),
            mime_type: mime_type.to_string(),
            written: 0,
            limit: self.max_bytes,
            sink,
        })
    }

    /// Convenience for callers that already hold the whole body.
    pub async fn accept(
        &self,
        original_filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, ArtifactError> {
        let mut writer = self.begin(original_filename, mime_type).await?;
        if let Err(e) = writer.write_chunk(bytes).await {
            writer.abort().await;
            return Err(e);
        }
        writer.finish().await
    }

    /// Deletes the file behind a persisted certificate. Returns whether a
    /// file was removed.
    pub async fn remove_stored(&self, storage: &StorageInfo) -> io::Result<bool> {
        let (Some(StorageProvider::Local), Some(relative)) = (storage.provider, &storage.path)
        else {
            return Ok(false);
        };
        if !is_contained(relative) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to delete path outside upload directory: {}", relative),
            ));
        }
        match fs::remove_file(self.base_dir.join(relative)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

enum Sink {
    Disk {
        file: fs::File,
        path: PathBuf,
        hasher: ContentHasher,
        relative: String,
        public_url: String,
    },
    Memory(BytesMut),
}

/// An upload in progress. Call [`ArtifactWriter::abort`] on any failure so a
/// partial file does not stay behind.
pub struct ArtifactWriter {
    original_filename: String,
    mime_type: String,
    written: usize,
    limit: usize,
    sink: Sink,
}

impl ArtifactWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ArtifactError> {
        self.written += chunk.len();
        if self.written > self.limit {
            return Err(ArtifactError::TooLarge { limit: self.limit });
        }
        match &mut self.sink {
            Sink::Disk { file, hasher, .. } => {
                file.write_all(chunk).await?;
                hasher.update(chunk);
            }
            Sink::Memory(buf) => buf.extend_from_slice(chunk),
        }
        Ok(())
    }

    pub async fn finish(self) -> Result<StoredArtifact, ArtifactError> {
        let meta = FileMeta {
            original_filename: self.original_filename,
            mime_type: self.mime_type,
            size: self.written as i64,
        };
        match self.sink {
            Sink::Disk {
                mut file,
                path,
                hasher,
                relative,
                public_url,
            } => {
                if let Err(e) = file.flush().await.and(file.sync_all().await) {
                    drop(file);
                    let _ = fs::remove_file(&path).await;
                    return Err(e.into());
                }
                Ok(StoredArtifact {
                    source: ArtifactSource::Disk {
                        path,
                        digest: Some(hasher.finalize_hex()),
                    },
                    meta,
                    relative_path: Some(relative),
                    public_url: Some(public_url),
                })
            }
            Sink::Memory(buf) => Ok(StoredArtifact {
                source: ArtifactSource::Memory {
                    bytes: buf.freeze(),
                },
                meta,
                relative_path: None,
                public_url: None,
            }),
        }
    }

    /// Drops the upload, deleting any partial file.
    pub async fn abort(self) {
        if let Sink::Disk { file, path, .. } = self.sink {
            drop(file);
            ArtifactSource::Disk { path, digest: None }.discard().await;
        }
    }
}
