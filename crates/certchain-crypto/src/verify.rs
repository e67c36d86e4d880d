// Contract-call verification

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier};

use crate::address::address_to_verifying_key;
use crate::jcs::jcs_canonical_bytes;
use crate::types::{ContractCall, CALL_ALGO, CALL_TYPE, CALL_VERSION};

/// Verifies that a signed contract call was authorized by its `source` account.
///
/// Checks the envelope tags, resolves the verifying key from the source
/// address, re-canonicalizes the call with an empty signature, and verifies
/// the Ed25519 signature over those bytes.
pub fn verify_call(call: &ContractCall) -> Result<()> {
    if call.version != CALL_VERSION {
        return Err(anyhow!(
            "Unsupported call version: '{}' (expected '{}')",
            call.version,
            CALL_VERSION
        ));
    }

    if call.call_type != CALL_TYPE {
        return Err(anyhow!(
            "Invalid call type: '{}' (expected '{}')",
            call.call_type,
            CALL_TYPE
        ));
    }

    if call.algo != CALL_ALGO {
        return Err(anyhow!(
            "Unsupported signature algorithm: '{}' (expected '{}')",
            call.algo,
            CALL_ALGO
        ));
    }

    if !call.is_signed() {
        return Err(anyhow!("Call is not signed"));
    }

    let verifying_key = address_to_verifying_key(&call.source)?;

    let mut unsigned = call.clone();
    unsigned.signature = String::new();
    let canonical_bytes = jcs_canonical_bytes(&unsigned)?;

    let signature_bytes = BASE64_STANDARD
        .decode(&call.signature)
        .map_err(|e| anyhow!("Invalid base64 signature: {}", e))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid signature length: expected 64 bytes"))?;

    verifying_key
        .verify(&canonical_bytes, &Signature::from_bytes(&signature_array))
        .map_err(|_| anyhow!("Signature verification failed: invalid signature"))?;

    Ok(())
}
