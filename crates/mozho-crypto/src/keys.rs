use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::{CryptoError, Result};

/// AES-256 key size in bytes.
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Generate a random 256-bit key from the OS CSPRNG, base64-encoded.
pub fn generate_symmetric_key() -> Result<String> {
    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok(encode_key(&key))
}

/// Encode a key to base64 for storage/sharing.
pub fn encode_key(key: &[u8]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 key and check it is exactly 32 bytes.
pub fn decode_symmetric_key(encoded: &str) -> Result<[u8; SYMMETRIC_KEY_LEN]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| CryptoError::InvalidKeyEncoding)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: SYMMETRIC_KEY_LEN,
        actual,
    })
}
