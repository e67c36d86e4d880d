// Key generation and seed encoding for ledger signers

use anyhow::{anyhow, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Generates a new Ed25519 keypair using secure random bytes from the OS.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Parses a signing key from its hex-encoded 32-byte seed.
///
/// Surrounding whitespace is ignored so values read from env files work as-is.
pub fn signing_key_from_hex(seed_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(seed_hex.trim()).map_err(|_| anyhow!("Secret is not valid hex"))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow!("Secret must be exactly 32 bytes"))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Hex-encodes the seed of a signing key.
pub fn signing_key_to_hex(signing_key: &SigningKey) -> String {
    hex::encode(signing_key.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, Verifier};

    #[test]
    fn test_generate_keypair_signs_and_verifies() {
        let (signing_key, verifying_key) = generate_keypair();

        let message = b"certchain test message";
        let signature = signing_key.sign(message);

        assert!(verifying_key.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_generate_keypair_produces_different_keys() {
        let (_, verifying_key1) = generate_keypair();
        let (_, verifying_key2) = generate_keypair();

        assert_ne!(verifying_key1.as_bytes(), verifying_key2.as_bytes());
    }

    #[test]
    fn test_seed_hex_round_trip() {
        let (signing_key, _) = generate_keypair();
        let encoded = signing_key_to_hex(&signing_key);
        assert_eq!(encoded.len(), 64);

        let decoded = signing_key_from_hex(&format!("  {}\n", encoded)).unwrap();
        assert_eq!(decoded.to_bytes(), signing_key.to_bytes());
    }

    #[test]
    fn test_seed_hex_rejects_bad_input() {
        let err = signing_key_from_hex("zz").unwrap_err();
        assert!(err.to_string().contains("not valid hex"));

        let err = signing_key_from_hex("abcd").unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }
}
