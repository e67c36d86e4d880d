//! Submit, confirm and query contract calls.

use std::sync::Arc;
use std::time::Duration;

use certchain_crypto::{sign_call, CallArg, ContractCall};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::rpc::{LedgerRpc, LookupStatus, RpcError, SendStatus};
use super::signer::{LedgerSigner, SignerSource};
use super::{short, LedgerError};

/// Validity window placed on every call envelope.
const CALL_TIMEOUT_SECS: u64 = 30;

/// Fixed parameters of the target contract and confirmation policy.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub network_passphrase: String,
    pub contract_id: String,
    pub poll_interval: Duration,
    /// Upper bound on confirmation polling; exceeding it yields
    /// [`LedgerError::Pending`].
    pub confirm_timeout: Duration,
}

/// Confirmed outcome of a submitted call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub method: String,
    pub tx_hash: String,
    pub status: String,
    pub ledger_seq: Option<u64>,
    pub fee_charged: Option<String>,
    pub return_value: Option<Value>,
    pub signer: String,
    pub latency_ms: i64,
}

pub struct LedgerClient {
    rpc: Arc<dyn LedgerRpc>,
    signers: Arc<dyn SignerSource>,
    settings: LedgerSettings,
}

fn transport(method: &str, err: RpcError) -> LedgerError {
    LedgerError::Transport {
        method: method.to_string(),
        message: err.to_string(),
    }
}

fn random_nonce() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

impl LedgerClient {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        signers: Arc<dyn SignerSource>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            rpc,
            signers,
            settings,
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.settings.contract_id
    }

    /// The explicit signer if given, otherwise the source's key for `method`.
    pub fn resolve_signer(
        &self,
        method: &str,
        explicit: Option<&LedgerSigner>,
    ) -> Result<LedgerSigner, LedgerError> {
        match explicit {
            Some(signer) => Ok(signer.clone()),
            None => self.signers.signer_for(method),
        }
    }

    fn build_call(&self, method: &str, args: Vec<CallArg>, source: &str) -> ContractCall {
        ContractCall::new(
            self.settings.network_passphrase.clone(),
            self.settings.contract_id.clone(),
            method.to_string(),
            args,
            source.to_string(),
            random_nonce(),
            CALL_TIMEOUT_SECS,
        )
    }

    /// Simulates, signs, sends and waits for a terminal status.
    pub async fn submit(
        &self,
        method: &str,
        args: Vec<CallArg>,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        let signer = self.resolve_signer(method, signer)?;
        self.submit_as(&signer, method, args).await
    }

    async fn submit_as(
        &self,
        signer: &LedgerSigner,
        method: &str,
        args: Vec<CallArg>,
    ) -> Result<Receipt, LedgerError> {
        let started = Instant::now();
        info!(
            method,
            args = args.len(),
            signer = short(signer.address(), 16),
            "Submitting contract call"
        );

        let call = self.build_call(method, args, signer.address());
        let simulation = self
            .rpc
            .simulate(&call)
            .await
            .map_err(|e| transport(method, e))?;
        if let Some(error) = simulation.error {
            let payload = json!({
                "error": error,
                "diagnosticEvents": simulation.diagnostic_events,
            })
            .to_string();
            return Err(LedgerError::Simulation {
                method: method.to_string(),
                payload,
            });
        }

        let signed = sign_call(signer.key(), call)
            .map_err(|e| LedgerError::InvalidSigner(e.to_string()))?;

        let sent = self
            .rpc
            .send(&signed)
            .await
            .map_err(|e| transport(method, e))?;
        // TRY_AGAIN_LATER means the gateway did not accept the call at all.
        let refused = matches!(sent.status, SendStatus::Error | SendStatus::TryAgainLater);
        if refused || sent.error_result.is_some() {
            return Err(LedgerError::Submission {
                method: method.to_string(),
                payload: json!({
                    "status": sent.status,
                    "errorResult": sent.error_result,
                })
                .to_string(),
            });
        }
        let Some(tx_hash) = sent.hash.filter(|h| !h.is_empty()) else {
            return Err(LedgerError::Submission {
                method: method.to_string(),
                payload: "response carried no transaction hash".to_string(),
            });
        };

        let deadline = started + self.settings.confirm_timeout;
        loop {
            match self.rpc.get_transaction(&tx_hash).await {
                Ok(lookup) => match lookup.status {
                    LookupStatus::Success => {
                        let latency_ms = started.elapsed().as_millis() as i64;
                        info!(
                            method,
                            tx_hash = %tx_hash,
                            ledger = lookup.ledger,
                            latency_ms,
                            "Contract call confirmed"
                        );
                        return Ok(Receipt {
                            method: method.to_string(),
                            tx_hash,
                            status: LookupStatus::Success.as_str().to_string(),
                            ledger_seq: lookup.ledger,
                            fee_charged: lookup.fee_charged,
                            return_value: lookup.return_value.map(|v| v.normalize()),
                            signer: signer.address().to_string(),
                            latency_ms,
                        });
                    }
                    LookupStatus::Failed => {
                        return Err(LedgerError::Rejected {
                            method: method.to_string(),
                            tx_hash,
                            status: LookupStatus::Failed.as_str().to_string(),
                            payload: lookup
                                .result
                                .map(|r| r.to_string())
                                .unwrap_or_default(),
                        });
                    }
                    LookupStatus::NotFound => {
                        debug!(method, tx_hash = %tx_hash, "Transaction not yet observed");
                    }
                },
                Err(e) => warn!(method, tx_hash = %tx_hash, "Confirmation poll failed: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LedgerError::Pending {
                    method: method.to_string(),
                    tx_hash,
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    /// Simulates a read-only call and returns its normalized value.
    /// Never signs or submits.
    pub async fn query(
        &self,
        method: &str,
        args: Vec<CallArg>,
        signer: Option<&LedgerSigner>,
    ) -> Result<Option<Value>, LedgerError> {
        let source = self.resolve_signer(method, signer)?;
        let call = self.build_call(method, args, source.address());
        let simulation = self
            .rpc
            .simulate(&call)
            .await
            .map_err(|e| transport(method, e))?;
        if let Some(error) = simulation.error {
            return Err(LedgerError::Simulation {
                method: method.to_string(),
                payload: error,
            });
        }

        let value = simulation
            .retval
            .map(|v| v.normalize())
            .filter(|v| !v.is_null());
        debug!(method, has_value = value.is_some(), "Contract query finished");
        Ok(value)
    }

    /// Anchors `hash` under `name`, acting as the signer's address.
    pub async fn store_document(
        &self,
        name: &str,
        hash: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        let signer = self.resolve_signer("store_document", signer)?;
        let args = vec![
            CallArg::address(signer.address()),
            CallArg::string(name),
            CallArg::string(hash),
        ];
        self.submit_as(&signer, "store_document", args).await
    }

    /// Submits a verification of `hash` as a transaction.
    pub async fn validate_document(
        &self,
        hash: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        self.submit("verify_document", vec![CallArg::string(hash)], signer)
            .await
    }

    pub async fn verify_document(
        &self,
        hash: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Option<Value>, LedgerError> {
        self.query("verify_document", vec![CallArg::string(hash)], signer)
            .await
    }

    pub async fn read_document(&self, hash: &str) -> Result<Option<Value>, LedgerError> {
        self.query("read_document", vec![CallArg::string(hash)], None)
            .await
    }

    pub async fn is_whitelisted(&self, address: &str) -> Result<bool, LedgerError> {
        let value = self
            .query("is_whitelisted", vec![CallArg::address(address)], None)
            .await?;
        Ok(matches!(value, Some(Value::Bool(true))))
    }

    pub async fn whitelist_address(
        &self,
        address: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        self.submit("whitelist_address", vec![CallArg::address(address)], signer)
            .await
    }

    pub async fn remove_from_whitelist(
        &self,
        address: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        self.submit(
            "remove_from_whitelist",
            vec![CallArg::address(address)],
            signer,
        )
        .await
    }

    pub async fn transfer_ownership(
        &self,
        new_owner: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        self.submit(
            "transfer_ownership",
            vec![CallArg::address(new_owner)],
            signer,
        )
        .await
    }

    pub async fn owner_address(&self) -> Result<Option<String>, LedgerError> {
        let value = self.query("owner_address", vec![], None).await?;
        match value {
            None => Ok(None),
            Some(Value::String(owner)) => Ok(Some(owner)),
            Some(other) => Err(LedgerError::Decode {
                method: "owner_address".to_string(),
                message: format!("expected an address, got {}", other),
            }),
        }
    }

    pub async fn init(
        &self,
        owner: &str,
        signer: Option<&LedgerSigner>,
    ) -> Result<Receipt, LedgerError> {
        self.submit("init", vec![CallArg::address(owner)], signer)
            .await
    }

    pub async fn fund_account(&self, address: &str) -> Result<Value, LedgerError> {
        self.rpc
            .fund_account(address)
            .await
            .map_err(|e| transport("fund_account", e))
    }
}
