// Ledger account addresses derived from Ed25519 public keys
// Uses the did:key encoding (multicodec 0xed01, base58btc)

use anyhow::{anyhow, Result};
use ed25519_dalek::VerifyingKey;

/// Multicodec prefix for Ed25519 public keys
/// 0xed = Ed25519, 0x01 = varint encoding of the codec
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

/// Prefix shared by every address this crate produces.
const ADDRESS_PREFIX: &str = "did:key:z";

/// Converts an Ed25519 public key to the address used as the `source` of a
/// contract call.
///
/// Layout: `did:key:z` + base58btc(0xed 0x01 || 32 public key bytes).
pub fn pubkey_to_address(public_key: &VerifyingKey) -> String {
    let pubkey_bytes = public_key.as_bytes();

    let mut multicodec_bytes = Vec::with_capacity(2 + pubkey_bytes.len());
    multicodec_bytes.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
    multicodec_bytes.extend_from_slice(pubkey_bytes);

    format!(
        "{}{}",
        ADDRESS_PREFIX,
        bs58::encode(&multicodec_bytes).into_string()
    )
}

/// Parses an address produced by [`pubkey_to_address`] back into a verifying key.
pub fn address_to_verifying_key(address: &str) -> Result<VerifyingKey> {
    let encoded = address
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or_else(|| anyhow!("Address must start with '{}'", ADDRESS_PREFIX))?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| anyhow!("Invalid base58 in address: {}", e))?;

    if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC_PREFIX {
        return Err(anyhow!("Address does not encode an Ed25519 public key"));
    }

    let key_bytes: [u8; 32] = decoded[2..]
        .try_into()
        .map_err(|_| anyhow!("Invalid public key length"))?;

    VerifyingKey::from_bytes(&key_bytes).map_err(|e| anyhow!("Invalid public key: {}", e))
}
