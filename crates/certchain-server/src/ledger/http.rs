//! JSON-RPC transport to the ledger gateway over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use certchain_crypto::ContractCall;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::rpc::{LedgerRpc, RpcError, SendResponse, Simulation, TxLookup};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct HttpLedgerRpc {
    client: reqwest::Client,
    rpc_url: String,
    friendbot_url: String,
    next_id: AtomicU64,
}

impl HttpLedgerRpc {
    pub fn new(rpc_url: String, friendbot_url: String) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            rpc_url,
            friendbot_url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RpcError::Transport(format!(
                "{} returned HTTP {}",
                method,
                resp.status()
            )));
        }

        let envelope: RpcEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| RpcError::Decode(format!("{} response has no result", method)))
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn simulate(&self, call: &ContractCall) -> Result<Simulation, RpcError> {
        self.call("simulateTransaction", json!({ "call": call })).await
    }

    async fn send(&self, call: &ContractCall) -> Result<SendResponse, RpcError> {
        self.call("sendTransaction", json!({ "call": call })).await
    }

    async fn get_transaction(&self, hash: &str) -> Result<TxLookup, RpcError> {
        self.call("getTransaction", json!({ "hash": hash })).await
    }

    async fn fund_account(&self, address: &str) -> Result<Value, RpcError> {
        let resp = self
            .client
            .get(&self.friendbot_url)
            .query(&[("addr", address)])
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        if !status.is_success() {
            return Err(RpcError::Remote {
                code: i64::from(status.as_u16()),
                message: body.to_string(),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_error() {
        let envelope: RpcEnvelope<Simulation> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32602, "message": "invalid params"}
        }))
        .unwrap();
        assert!(envelope.result.is_none());
        assert_eq!(envelope.error.unwrap().code, -32602);
    }

    #[test]
    fn test_lookup_wire_format() {
        let envelope: RpcEnvelope<TxLookup> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": {"status": "SUCCESS", "ledger": 1234, "feeCharged": "100"}
        }))
        .unwrap();
        let lookup = envelope.result.unwrap();
        assert_eq!(lookup.status, crate::ledger::LookupStatus::Success);
        assert_eq!(lookup.ledger, Some(1234));
    }
}
