//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::models::Network;

/// Default network passphrase (public test network).
pub const DEFAULT_NETWORK_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Which persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Config(format!(
                "STORE_BACKEND must be 'postgres' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

/// Ledger endpoint and signer settings.
#[derive(Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger gateway
    pub rpc_url: String,
    /// Address of the document registry contract
    pub contract_id: String,
    /// Passphrase of the target network
    pub network_passphrase: String,
    /// Network tag recorded on certificates and transactions
    pub network: Network,
    /// Hex seed of the service signer
    pub service_secret: String,
    /// Owner address passed to the contract's `init`
    pub owner_address: Option<String>,
    /// Testnet funding endpoint
    pub friendbot_url: String,
    /// Interval between confirmation polls
    pub poll_interval: Duration,
    /// Maximum time to wait for a terminal status
    pub confirm_timeout: Duration,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_id", &self.contract_id)
            .field("network_passphrase", &self.network_passphrase)
            .field("network", &self.network)
            .field("service_secret", &"<redacted>")
            .field("owner_address", &self.owner_address)
            .field("friendbot_url", &self.friendbot_url)
            .field("poll_interval", &self.poll_interval)
            .field("confirm_timeout", &self.confirm_timeout)
            .finish()
    }
}

/// Upload handling settings.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Base directory for stored artifacts
    pub base_dir: String,
    /// Sub-directory (and URL segment) for certificate artifacts
    pub cert_dir: String,
    /// Accepted MIME types
    pub allowed_mime_types: Vec<String>,
    /// Maximum upload size in bytes
    pub max_bytes: usize,
    /// Write uploads to disk (true) or keep them in memory (false)
    pub use_disk: bool,
    /// Base URL used to build public artifact links
    pub public_base_url: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Persistence backend
    pub store_backend: StoreBackend,
    /// Database connection URL (required for the Postgres backend)
    pub database_url: Option<String>,
    /// Server bind address (host:port)
    pub bind_address: String,
    /// Ledger settings
    pub ledger: LedgerConfig,
    /// Upload settings
    pub upload: UploadConfig,
    /// HMAC secret for bearer tokens
    pub jwt_secret: String,
    /// Access token lifetime in minutes
    pub jwt_access_ttl_minutes: i64,
    /// Outbox write attempts before a record is dead-lettered
    pub audit_max_attempts: u32,
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Config(format!("{} not set", name)))
}

fn or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Splits a comma-separated list, dropping empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        let store_backend: StoreBackend = or_default("STORE_BACKEND", "postgres").parse()?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL not set".into()));
        }

        let network = match or_default("NETWORK", "testnet").as_str() {
            "testnet" => Network::Testnet,
            "mainnet" => Network::Mainnet,
            other => {
                return Err(AppError::Config(format!(
                    "NETWORK must be 'testnet' or 'mainnet', got '{}'",
                    other
                )))
            }
        };

        let ledger = LedgerConfig {
            rpc_url: required("RPC_URL")?,
            contract_id: required("CONTRACT_ID")?,
            network_passphrase: or_default("NETWORK_PASSPHRASE", DEFAULT_NETWORK_PASSPHRASE),
            network,
            service_secret: required("SERVICE_SECRET")?,
            owner_address: env::var("OWNER_ADDRESS").ok().filter(|s| !s.is_empty()),
            friendbot_url: or_default("FRIENDBOT_URL", "https://friendbot.stellar.org"),
            poll_interval: Duration::from_millis(parsed("LEDGER_POLL_INTERVAL_MS", 1000u64)?),
            confirm_timeout: Duration::from_secs(parsed("LEDGER_CONFIRM_TIMEOUT_SECS", 60u64)?),
        };

        let upload = UploadConfig {
            base_dir: or_default("UPLOAD_BASE_DIR", "./uploads"),
            cert_dir: or_default("CERT_UPLOAD_DIR", "certificates"),
            allowed_mime_types: split_list(&or_default(
                "ALLOWED_MIMETYPES",
                "application/pdf,image/png,image/jpeg",
            )),
            max_bytes: parsed("MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize)?,
            use_disk: parsed("USE_DISK_UPLOAD", true)?,
            public_base_url: or_default("APP_PUBLIC_BASE_URL", ""),
        };

        Ok(Self {
            store_backend,
            database_url,
            bind_address: or_default("BIND_ADDRESS", "0.0.0.0:8080"),
            ledger,
            upload,
            jwt_secret: required("JWT_ACCESS_SECRET")?,
            jwt_access_ttl_minutes: parsed("JWT_ACCESS_TTL_MINUTES", 15i64)?,
            audit_max_attempts: parsed("AUDIT_MAX_ATTEMPTS", 5u32)?,
        })
    }
}
