//! Contract-call envelope types.
//!
//! A contract call is the unit the ledger gateway simulates, and, once signed,
//! submits. It is signed over its RFC 8785 canonical form with the
//! `signature` field set to the empty string.

use serde::{Deserialize, Serialize};

/// Envelope version emitted by this crate.
pub const CALL_VERSION: &str = "1.0";

/// Envelope type tag.
pub const CALL_TYPE: &str = "contract-call";

/// Signature algorithm tag.
pub const CALL_ALGO: &str = "ed25519";

/// A typed argument to a contract method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CallArg {
    /// Ledger account or contract address.
    Address(String),
    /// UTF-8 string.
    String(String),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// Raw bytes, hex-encoded.
    Bytes(String),
}

impl CallArg {
    pub fn address(value: impl Into<String>) -> Self {
        CallArg::Address(value.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        CallArg::String(value.into())
    }
}

/// One invocation of a smart-contract method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractCall {
    /// Envelope version, always "1.0"
    pub version: String,

    /// Envelope type, always "contract-call"
    #[serde(rename = "type")]
    pub call_type: String,

    /// Signature algorithm, "ed25519"
    pub algo: String,

    /// Passphrase of the network the call is bound to
    pub network_passphrase: String,

    /// Address of the target contract
    pub contract_id: String,

    /// Contract method name
    pub method: String,

    /// Positional method arguments
    pub args: Vec<CallArg>,

    /// Address of the account paying for and authorizing the call
    pub source: String,

    /// Random hex nonce; makes two otherwise identical calls distinct
    pub nonce: String,

    /// Seconds the gateway may hold the call before it becomes invalid
    pub timeout_secs: u64,

    /// Base64-encoded signature (empty string while unsigned)
    pub signature: String,
}

impl ContractCall {
    /// Creates an unsigned call with default version, type, and algorithm.
    pub fn new(
        network_passphrase: String,
        contract_id: String,
        method: String,
        args: Vec<CallArg>,
        source: String,
        nonce: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            version: CALL_VERSION.to_string(),
            call_type: CALL_TYPE.to_string(),
            algo: CALL_ALGO.to_string(),
            network_passphrase,
            contract_id,
            method,
            args,
            source,
            nonce,
            timeout_secs,
            signature: String::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}
