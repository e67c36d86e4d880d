// Contract-call signing
//
// A call is signed over its JCS canonical bytes with the signature field
// emptied, the same way the gateway reconstructs it for verification.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};

use crate::address::pubkey_to_address;
use crate::jcs::jcs_canonical_bytes;
use crate::types::ContractCall;

/// Signs a contract call and returns it with the base64 signature filled in.
///
/// The call's `source` must be the address of `signing_key`; signing on
/// behalf of another account is rejected here rather than at the gateway.
pub fn sign_call(signing_key: &SigningKey, call: ContractCall) -> Result<ContractCall> {
    let expected_source = pubkey_to_address(&signing_key.verifying_key());
    if call.source != expected_source {
        return Err(anyhow!(
            "Call source '{}' does not match the signing key",
            call.source
        ));
    }

    let mut call = call;
    call.signature = String::new();

    let canonical_bytes = jcs_canonical_bytes(&call)?;
    let signature = signing_key.sign(&canonical_bytes);
    call.signature = BASE64_STANDARD.encode(signature.to_bytes());

    Ok(call)
}
