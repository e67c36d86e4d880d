//! Direct contract operations exposed by the ledger proxy.
//!
//! Every state-changing call writes exactly one `web3_txs` row through the
//! audit outbox, whether it succeeded or failed. Read-only queries are not
//! recorded.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use certchain_crypto::{generate_keypair, pubkey_to_address, signing_key_to_hex};

use crate::access::{authorize, Action, Principal, Resource};
use crate::audit::{AuditOutbox, AuditRecord};
use crate::error::AppError;
use crate::ledger::{short, LedgerClient, LedgerError, LedgerSigner, Receipt};
use crate::models::{NewWeb3Tx, Network, TxPurpose, TxStatus};

/// A freshly generated ledger account. The secret is shown once.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub address: String,
    pub secret_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistStatus {
    pub address: String,
    pub whitelisted: bool,
}

pub struct LedgerAdmin {
    ledger: Arc<LedgerClient>,
    outbox: Arc<AuditOutbox>,
    network: Network,
    owner_address: Option<String>,
}

impl LedgerAdmin {
    pub fn new(
        ledger: Arc<LedgerClient>,
        outbox: Arc<AuditOutbox>,
        network: Network,
        owner_address: Option<String>,
    ) -> Self {
        Self {
            ledger,
            outbox,
            network,
            owner_address,
        }
    }

    fn record(
        &self,
        purpose: TxPurpose,
        actor: Option<&Principal>,
        request_dump: Value,
        result: &Result<Receipt, LedgerError>,
    ) {
        let tx = match result {
            Ok(receipt) => NewWeb3Tx {
                network: self.network,
                purpose,
                certificate_id: None,
                submitted_by_user_id: actor.map(|p| p.user_id),
                tx_hash: Some(receipt.tx_hash.clone()),
                status: TxStatus::Confirmed,
                latency_ms: Some(receipt.latency_ms),
                request_dump,
                response_dump: serde_json::to_value(receipt).ok(),
                error: None,
            },
            Err(e) => {
                warn!(?purpose, "Ledger call failed: {}", e);
                NewWeb3Tx {
                    network: self.network,
                    purpose,
                    certificate_id: None,
                    submitted_by_user_id: actor.map(|p| p.user_id),
                    tx_hash: e.tx_hash().map(str::to_string),
                    status: match e {
                        LedgerError::Pending { .. } => TxStatus::Submitted,
                        _ => TxStatus::Failed,
                    },
                    latency_ms: None,
                    request_dump,
                    response_dump: e.payload().map(|p| json!({ "payload": p })),
                    error: Some(e.to_string()),
                }
            }
        };
        self.outbox.emit(AuditRecord::Transaction(tx));
    }

    /// Anchors a hash directly, without a certificate record.
    pub async fn store_document(
        &self,
        actor: Option<&Principal>,
        name: &str,
        hash: &str,
        signer: Option<LedgerSigner>,
    ) -> Result<Receipt, AppError> {
        if name.trim().is_empty() || hash.trim().is_empty() {
            return Err(AppError::BadRequest("name and hash are required".into()));
        }
        let result = self.ledger.store_document(name, hash, signer.as_ref()).await;
        self.record(
            TxPurpose::Other,
            actor,
            json!({ "method": "store_document", "name": name, "hash": hash }),
            &result,
        );
        Ok(result?)
    }

    pub async fn verify_document(
        &self,
        hash: &str,
        signer: Option<LedgerSigner>,
    ) -> Result<Option<Value>, AppError> {
        Ok(self.ledger.verify_document(hash, signer.as_ref()).await?)
    }

    pub async fn read_document(&self, hash: &str) -> Result<Option<Value>, AppError> {
        Ok(self.ledger.read_document(hash).await?)
    }

    pub async fn is_whitelisted(&self, address: &str) -> Result<WhitelistStatus, AppError> {
        let whitelisted = self.ledger.is_whitelisted(address).await?;
        Ok(WhitelistStatus {
            address: address.to_string(),
            whitelisted,
        })
    }

    pub async fn owner(&self) -> Result<Option<String>, AppError> {
        Ok(self.ledger.owner_address().await?)
    }

    pub async fn whitelist(
        &self,
        actor: Option<&Principal>,
        address: &str,
        signer: Option<LedgerSigner>,
    ) -> Result<Receipt, AppError> {
        authorize(actor, Action::ManageWhitelist, Resource::Global)?;
        let result = self.ledger.whitelist_address(address, signer.as_ref()).await;
        self.record(
            TxPurpose::Whitelist,
            actor,
            json!({ "method": "whitelist_address", "address": address }),
            &result,
        );
        let receipt = result?;
        info!(address = short(address, 24), "Address whitelisted");
        Ok(receipt)
    }

    pub async fn remove_whitelist(
        &self,
        actor: Option<&Principal>,
        address: &str,
        signer: Option<LedgerSigner>,
    ) -> Result<Receipt, AppError> {
        authorize(actor, Action::ManageWhitelist, Resource::Global)?;
        let result = self
            .ledger
            .remove_from_whitelist(address, signer.as_ref())
            .await;
        self.record(
            TxPurpose::RemoveWhitelist,
            actor,
            json!({ "method": "remove_from_whitelist", "address": address }),
            &result,
        );
        let receipt = result?;
        info!(address = short(address, 24), "Address removed from whitelist");
        Ok(receipt)
    }

    pub async fn transfer_ownership(
        &self,
        actor: Option<&Principal>,
        new_owner: &str,
        signer: Option<LedgerSigner>,
    ) -> Result<Receipt, AppError> {
        authorize(actor, Action::ManageContract, Resource::Global)?;
        let result = self
            .ledger
            .transfer_ownership(new_owner, signer.as_ref())
            .await;
        self.record(
            TxPurpose::Transfer,
            actor,
            json!({ "method": "transfer_ownership", "newOwner": new_owner }),
            &result,
        );
        let receipt = result?;
        info!(new_owner = short(new_owner, 24), "Contract ownership transferred");
        Ok(receipt)
    }

    /// Initializes the contract. Falls back to the configured owner.
    pub async fn init(
        &self,
        actor: Option<&Principal>,
        owner: Option<String>,
        signer: Option<LedgerSigner>,
    ) -> Result<Receipt, AppError> {
        authorize(actor, Action::ManageContract, Resource::Global)?;
        let owner = owner
            .filter(|o| !o.trim().is_empty())
            .or_else(|| self.owner_address.clone())
            .ok_or_else(|| AppError::BadRequest("owner address is required".into()))?;
        let result = self.ledger.init(&owner, signer.as_ref()).await;
        self.record(
            TxPurpose::Init,
            actor,
            json!({ "method": "init", "owner": owner }),
            &result,
        );
        Ok(result?)
    }

    pub fn create_wallet(&self) -> Wallet {
        let (signing, verifying) = generate_keypair();
        let address = pubkey_to_address(&verifying);
        info!(address = short(&address, 24), "Generated wallet");
        Wallet {
            address,
            secret_key: signing_key_to_hex(&signing),
        }
    }

    /// Funds an address from the network faucet. Only meaningful on testnet.
    pub async fn fund_wallet(&self, address: &str) -> Result<Value, AppError> {
        if self.network != Network::Testnet {
            return Err(AppError::BadRequest("Funding is only available on testnet".into()));
        }
        let response = self.ledger.fund_account(address).await?;
        info!(address = short(address, 24), "Funded wallet");
        Ok(response)
    }
}
