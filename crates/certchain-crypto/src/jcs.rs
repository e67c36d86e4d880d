// JCS (JSON Canonicalization Scheme) - RFC 8785

use anyhow::Result;
use serde::Serialize;

/// Canonicalizes a serializable value according to RFC 8785 (JCS) and returns the UTF-8 bytes.
///
/// Contract calls are signed over these bytes, so the gateway can rebuild the
/// exact message regardless of how it orders object keys.
pub fn jcs_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let canonical = serde_jcs::to_string(value)?;
    Ok(canonical.into_bytes())
}
