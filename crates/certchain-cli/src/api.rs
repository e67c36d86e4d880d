// Thin blocking client for the public certchain endpoints

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Document {
    pub document: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateView {
    pub id: String,
    pub certificate_name: String,
    pub subject: String,
    pub metadata_hash: String,
    pub status: String,
    pub expiry_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainView {
    pub network: String,
    pub contract_id: Option<String>,
    pub on_chain_id: Option<String>,
    pub tx_hash_issue: Option<String>,
    pub tx_hash_validate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Verification {
    pub certificate: CertificateView,
    pub chain: ChainView,
}

pub struct Client {
    base: String,
}

impl Client {
    pub fn new(server: &str) -> Self {
        Self {
            base: format!("{}/api/v1", server.trim_end_matches('/')),
        }
    }

    /// Looks up an anchored document by its content hash.
    pub fn verify_hash(&self, hash: &str) -> Result<Document> {
        self.get(&format!("/ledger/verify/{}", hash))
    }

    pub fn certificate_status(&self, id: &str) -> Result<Verification> {
        self.get(&format!("/certificates/{}/verify", id))
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base, path);
        match ureq::get(&url).call() {
            Ok(response) => {
                let envelope: DataEnvelope<T> = response
                    .into_json()
                    .with_context(|| format!("Unexpected response from {}", url))?;
                Ok(envelope.data)
            }
            Err(ureq::Error::Status(status, response)) => {
                let body: Option<ErrorBody> = response.into_json().ok();
                let (code, message) = body
                    .map(|b| (b.code, b.message))
                    .unwrap_or((None, None));
                Err(anyhow!(
                    "Server returned {} ({}): {}",
                    status,
                    code.unwrap_or_else(|| "unknown".to_string()),
                    message.unwrap_or_else(|| "no message".to_string())
                ))
            }
            Err(e) => Err(anyhow!("Request to {} failed: {}", url, e)),
        }
    }
}
