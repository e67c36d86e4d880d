//! Shared application state handed to every route.

use std::sync::Arc;

use bcrypt::DEFAULT_COST;

use crate::artifact::ArtifactStore;
use crate::audit::AuditOutbox;
use crate::auth::{AccountService, TokenService};
use crate::config::Config;
use crate::directory::DirectoryService;
use crate::ledger::{LedgerClient, LedgerRpc, LedgerSettings, SignerSource};
use crate::ledger_admin::LedgerAdmin;
use crate::lifecycle::CertificateService;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenService>,
    pub accounts: Arc<AccountService>,
    pub certificates: Arc<CertificateService>,
    pub directory: Arc<DirectoryService>,
    pub ledger_admin: Arc<LedgerAdmin>,
    pub artifacts: Arc<ArtifactStore>,
    pub outbox: Arc<AuditOutbox>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        rpc: Arc<dyn LedgerRpc>,
        signers: Arc<dyn SignerSource>,
    ) -> Self {
        Self::with_bcrypt_cost(config, store, rpc, signers, DEFAULT_COST)
    }

    /// Same as [`AppState::new`] with an explicit password hashing cost.
    pub fn with_bcrypt_cost(
        config: &Config,
        store: Arc<dyn Store>,
        rpc: Arc<dyn LedgerRpc>,
        signers: Arc<dyn SignerSource>,
        bcrypt_cost: u32,
    ) -> Self {
        let ledger = Arc::new(LedgerClient::new(
            rpc,
            signers,
            LedgerSettings {
                network_passphrase: config.ledger.network_passphrase.clone(),
                contract_id: config.ledger.contract_id.clone(),
                poll_interval: config.ledger.poll_interval,
                confirm_timeout: config.ledger.confirm_timeout,
            },
        ));
        let tokens = Arc::new(TokenService::new(
            &config.jwt_secret,
            config.jwt_access_ttl_minutes,
        ));
        let outbox = Arc::new(AuditOutbox::new(store.clone(), config.audit_max_attempts));
        let artifacts = Arc::new(ArtifactStore::new(&config.upload));

        let accounts = Arc::new(AccountService::with_cost(
            store.clone(),
            tokens.clone(),
            bcrypt_cost,
        ));
        let certificates = Arc::new(CertificateService::new(
            store.clone(),
            ledger.clone(),
            artifacts.clone(),
            outbox.clone(),
            config.ledger.network,
        ));
        let directory = Arc::new(DirectoryService::new(store.clone()));
        let ledger_admin = Arc::new(LedgerAdmin::new(
            ledger,
            outbox.clone(),
            config.ledger.network,
            config.ledger.owner_address.clone(),
        ));

        Self {
            store,
            tokens,
            accounts,
            certificates,
            directory,
            ledger_admin,
            artifacts,
            outbox,
        }
    }
}
