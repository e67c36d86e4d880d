//! Signing keys for contract calls.

use std::fmt;

use certchain_crypto::{pubkey_to_address, signing_key_from_hex};
use ed25519_dalek::SigningKey;

use super::LedgerError;

/// An Ed25519 key together with its ledger address.
#[derive(Clone)]
pub struct LedgerSigner {
    key: SigningKey,
    address: String,
}

impl LedgerSigner {
    pub fn from_key(key: SigningKey) -> Self {
        let address = pubkey_to_address(&key.verifying_key());
        Self { key, address }
    }

    /// Parses a hex-encoded 32-byte seed.
    pub fn from_secret_hex(secret: &str) -> Result<Self, LedgerError> {
        let key = signing_key_from_hex(secret)
            .map_err(|e| LedgerError::InvalidSigner(e.to_string()))?;
        Ok(Self::from_key(key))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("address", &self.address)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Provides the signer used for a contract method when the caller does not
/// supply one.
pub trait SignerSource: Send + Sync {
    fn signer_for(&self, method: &str) -> Result<LedgerSigner, LedgerError>;
}

/// Always hands out the same service key.
#[derive(Debug, Clone)]
pub struct StaticSignerSource {
    signer: LedgerSigner,
}

impl StaticSignerSource {
    pub fn new(signer: LedgerSigner) -> Self {
        Self { signer }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, LedgerError> {
        Ok(Self::new(LedgerSigner::from_secret_hex(secret)?))
    }
}

impl SignerSource for StaticSignerSource {
    fn signer_for(&self, _method: &str) -> Result<LedgerSigner, LedgerError> {
        Ok(self.signer.clone())
    }
}
