//! Shared fixtures: an in-process fake of the registry contract and a
//! fully wired application state over the in-memory store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use certchain_crypto::{CallArg, ContractCall};
use certchain_server::access::Principal;
use certchain_server::config::{Config, LedgerConfig, StoreBackend, UploadConfig};
use certchain_server::ledger::value::ScMapEntry;
use certchain_server::ledger::{
    LedgerRpc, LookupStatus, RpcError, ScValue, SendResponse, SendStatus, Simulation,
    StaticSignerSource, TxLookup,
};
use certchain_server::models::{Network, UserRole};
use certchain_server::store::MemoryStore;
use certchain_server::AppState;
use serde_json::{json, Value};
use uuid::Uuid;

pub const SERVICE_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
pub const OWNER: &str = "did:key:z6MkOwner";

/// How the fake ledger settles submitted transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Settle {
    #[default]
    Confirm,
    /// Reports FAILED for every submission.
    Reject,
    /// Never reports a terminal status.
    Never,
    /// Rejects mutating calls during simulation.
    SimulationError,
    /// Confirms, but each status lookup takes this long.
    Slow(Duration),
}

/// The registry contract, kept in memory.
#[derive(Default)]
pub struct FakeLedger {
    documents: Mutex<HashMap<String, String>>,
    in_flight: Mutex<HashMap<String, (String, String)>>,
    whitelist: Mutex<Vec<String>>,
    sent: Mutex<Vec<ContractCall>>,
    counter: AtomicU64,
    settle: Mutex<Settle>,
}

fn string_arg(call: &ContractCall, idx: usize) -> Option<String> {
    match call.args.get(idx) {
        Some(CallArg::String(s)) | Some(CallArg::Address(s)) => Some(s.clone()),
        _ => None,
    }
}

fn document_value(name: &str, hash: &str) -> ScValue {
    ScValue::Map(vec![
        ScMapEntry {
            key: ScValue::Symbol("name".into()),
            val: ScValue::String(name.into()),
        },
        ScMapEntry {
            key: ScValue::Symbol("hash".into()),
            val: ScValue::String(hash.into()),
        },
    ])
}

impl FakeLedger {
    pub fn set_settle(&self, settle: Settle) {
        *self.settle.lock().unwrap() = settle;
    }

    pub fn anchor(&self, hash: &str, name: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(hash.to_string(), name.to_string());
    }

    pub fn is_anchored(&self, hash: &str) -> bool {
        self.documents.lock().unwrap().contains_key(hash)
    }

    /// Signed submissions received so far.
    pub fn submissions(&self) -> Vec<ContractCall> {
        self.sent.lock().unwrap().clone()
    }

    pub fn submitted_methods(&self) -> Vec<String> {
        self.submissions().into_iter().map(|c| c.method).collect()
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn simulate(&self, call: &ContractCall) -> Result<Simulation, RpcError> {
        let mut simulation = Simulation::default();
        match call.method.as_str() {
            "read_document" | "verify_document" => {
                let hash = string_arg(call, 0).unwrap_or_default();
                simulation.retval = Some(
                    match self.documents.lock().unwrap().get(&hash) {
                        Some(name) => document_value(name, &hash),
                        None => ScValue::Void,
                    },
                );
            }
            "is_whitelisted" => {
                let address = string_arg(call, 0).unwrap_or_default();
                let listed = self.whitelist.lock().unwrap().contains(&address);
                simulation.retval = Some(ScValue::Bool(listed));
            }
            "owner_address" => simulation.retval = Some(ScValue::Address(OWNER.into())),
            "store_document" => {
                let hash = string_arg(call, 2).unwrap_or_default();
                if self.documents.lock().unwrap().contains_key(&hash) {
                    simulation.error = Some("HostError: document already exists".into());
                }
            }
            _ => {}
        }
        let mutating = matches!(
            call.method.as_str(),
            "store_document"
                | "whitelist_address"
                | "remove_from_whitelist"
                | "transfer_ownership"
                | "init"
        );
        if mutating && *self.settle.lock().unwrap() == Settle::SimulationError {
            simulation.error = Some("HostError: contract trapped".into());
        }
        Ok(simulation)
    }

    async fn send(&self, call: &ContractCall) -> Result<SendResponse, RpcError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = format!("{:064x}", n);
        if call.method == "store_document" {
            let name = string_arg(call, 1).unwrap_or_default();
            let doc = string_arg(call, 2).unwrap_or_default();
            self.in_flight
                .lock()
                .unwrap()
                .insert(hash.clone(), (doc, name));
        }
        if call.method == "whitelist_address" {
            if let Some(address) = string_arg(call, 0) {
                self.whitelist.lock().unwrap().push(address);
            }
        }
        self.sent.lock().unwrap().push(call.clone());
        Ok(SendResponse {
            status: SendStatus::Pending,
            hash: Some(hash),
            error_result: None,
        })
    }

    async fn get_transaction(&self, hash: &str) -> Result<TxLookup, RpcError> {
        let settle = *self.settle.lock().unwrap();
        match settle {
            Settle::Never => Ok(TxLookup::not_found()),
            Settle::Reject => Ok(TxLookup {
                status: LookupStatus::Failed,
                ledger: Some(7),
                fee_charged: None,
                return_value: None,
                result: Some(json!({"code": "txFailed"})),
            }),
            Settle::Confirm | Settle::SimulationError | Settle::Slow(_) => {
                if let Settle::Slow(delay) = settle {
                    tokio::time::sleep(delay).await;
                }
                if let Some((doc, name)) = self.in_flight.lock().unwrap().remove(hash) {
                    self.anchor(&doc, &name);
                }
                Ok(TxLookup {
                    status: LookupStatus::Success,
                    ledger: Some(1000 + self.counter.load(Ordering::SeqCst)),
                    fee_charged: Some("100".into()),
                    return_value: None,
                    result: None,
                })
            }
        }
    }

    async fn fund_account(&self, address: &str) -> Result<Value, RpcError> {
        Ok(json!({ "funded": address }))
    }
}

pub fn test_config(upload_dir: &Path) -> Config {
    Config {
        store_backend: StoreBackend::Memory,
        database_url: None,
        bind_address: "127.0.0.1:0".into(),
        ledger: LedgerConfig {
            rpc_url: "http://ledger.invalid".into(),
            contract_id: "CREGISTRY".into(),
            network_passphrase: "Test SDF Network ; September 2015".into(),
            network: Network::Testnet,
            service_secret: SERVICE_SEED.into(),
            owner_address: Some(OWNER.into()),
            friendbot_url: "http://friendbot.invalid".into(),
            poll_interval: Duration::from_millis(5),
            confirm_timeout: Duration::from_millis(150),
        },
        upload: UploadConfig {
            base_dir: upload_dir.display().to_string(),
            cert_dir: "certificates".into(),
            allowed_mime_types: vec!["application/pdf".into(), "text/plain".into()],
            max_bytes: 64 * 1024,
            use_disk: true,
            public_base_url: "http://localhost:4000/uploads".into(),
        },
        jwt_secret: "test-secret-with-enough-entropy".into(),
        jwt_access_ttl_minutes: 60,
        audit_max_attempts: 3,
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<FakeLedger>,
    pub upload_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(FakeLedger::default());
        let config = test_config(upload_dir.path());
        let signers = Arc::new(StaticSignerSource::from_secret_hex(SERVICE_SEED).unwrap());
        let state = AppState::with_bcrypt_cost(&config, store.clone(), ledger.clone(), signers, 4);
        Self {
            state,
            store,
            ledger,
            upload_dir,
        }
    }

    /// Files currently in the certificate upload directory.
    pub fn stored_files(&self) -> Vec<String> {
        let dir = self.upload_dir.path().join("certificates");
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => vec![],
        }
    }
}

pub fn principal(role: UserRole, company_id: Option<Uuid>) -> Principal {
    Principal {
        user_id: Uuid::new_v4(),
        role,
        company_id,
        regulator_id: None,
    }
}

pub fn super_admin() -> Principal {
    principal(UserRole::SuperAdmin, None)
}

pub fn regulator() -> Principal {
    Principal {
        regulator_id: Some(Uuid::new_v4()),
        ..principal(UserRole::RegulatorAdmin, None)
    }
}
