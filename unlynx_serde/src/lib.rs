#![warn(missing_docs)]
#![deny(clippy::correctness)]

//! UnLynx serialization utilities

#[macro_use]
mod macros;
mod bytes;
pub use self::bytes::{deserialize, serialize, FromBytes, ToBytes};
mod error;
pub use self::error::{Error, Result};

/// Encodes bytes as URL-safe base64 without padding
pub fn to_base64(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

/// Decodes URL-safe base64 without padding
pub fn from_base64(s: &str) -> Result<Vec<u8>> {
    let bytes = base64::decode_config(s, base64::URL_SAFE_NO_PAD)?;
    Ok(bytes)
}
