use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand_core::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{CryptoError, Result};

/// Accepts SPKI (`PUBLIC KEY`) and PKCS#1 (`RSA PUBLIC KEY`) PEM.
fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Accepts PKCS#1 (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) PEM.
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// OAEP-SHA256 overhead: two digests plus two framing bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// Largest plaintext a single OAEP-SHA256 block can carry for `key`.
fn max_plaintext_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_SHA256_OVERHEAD)
}

/// Encrypt for the holder of `public_key_pem` with RSA-OAEP(SHA-256).
/// Output is base64.
pub fn encrypt_asymmetric(plaintext: &[u8], public_key_pem: &str) -> Result<String> {
    let key = parse_public_key(public_key_pem)?;
    let max = max_plaintext_len(&key);
    if plaintext.len() > max {
        return Err(CryptoError::PlaintextTooLong {
            max,
            actual: plaintext.len(),
        });
    }
    let ciphertext = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(BASE64.encode(ciphertext))
}

pub fn decrypt_asymmetric(ciphertext_b64: &str, private_key_pem: &str) -> Result<Vec<u8>> {
    let key = parse_private_key(private_key_pem)?;
    let data = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
    key.decrypt(Oaep::new::<Sha256>(), &data)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Generate an RSA keypair. Returns `(public SPKI PEM, private PKCS#1 PEM)`,
/// the formats the encrypt/decrypt functions expect by default.
pub fn generate_keypair(bits: usize) -> Result<(String, String)> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let public_pem = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok((public_pem, private_pem.to_string()))
}
