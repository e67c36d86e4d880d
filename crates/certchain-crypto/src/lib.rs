// certchain crypto - content hashing and contract-call signing primitives

pub mod address;
pub mod hash;
pub mod jcs;
pub mod keys;
pub mod sign;
pub mod types;
pub mod verify;

pub use address::{address_to_verifying_key, pubkey_to_address};
pub use hash::{sha256_hex, sha256_reader, ContentHasher};
pub use jcs::jcs_canonical_bytes;
pub use keys::{generate_keypair, signing_key_from_hex, signing_key_to_hex};
pub use sign::sign_call;
pub use types::{CallArg, ContractCall};
pub use verify::verify_call;
