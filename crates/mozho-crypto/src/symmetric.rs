use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::{CryptoError, Result};
use crate::keys::SYMMETRIC_KEY_LEN;

/// AES-GCM nonce size in bytes.
pub const NONCE_LEN: usize = 12;

fn cipher(raw_key: &[u8]) -> Result<Aes256Gcm> {
    if raw_key.len() != SYMMETRIC_KEY_LEN {
        return Err(CryptoError::InvalidKeyLength {
            expected: SYMMETRIC_KEY_LEN,
            actual: raw_key.len(),
        });
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(raw_key)))
}

/// Encrypt with AES-256-GCM under a fresh random nonce.
/// Returns base64(nonce || ciphertext || tag).
pub fn encrypt_symmetric(plaintext: &[u8], raw_key: &[u8]) -> Result<String> {
    let cipher = cipher(raw_key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(BASE64.encode(out))
}

/// Decrypt the output of [`encrypt_symmetric`].
pub fn decrypt_symmetric(ciphertext_b64: &str, raw_key: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher(raw_key)?;

    let data = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
    if data.len() < NONCE_LEN {
        return Err(CryptoError::MalformedCiphertext(format!(
            "{} bytes is shorter than the {}-byte nonce",
            data.len(),
            NONCE_LEN
        )));
    }

    let (nonce, body) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), body)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{decode_symmetric_key, generate_symmetric_key};

    fn fresh_key() -> [u8; 32] {
        decode_symmetric_key(&generate_symmetric_key().unwrap()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = fresh_key();
        for message in [&b""[..], b"hello", b"Hello from Mozho!", &[0xffu8; 4096][..]] {
            let sealed = encrypt_symmetric(message, &key).unwrap();
            assert_eq!(decrypt_symmetric(&sealed, &key).unwrap(), message);
        }
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = fresh_key();
        let a = encrypt_symmetric(b"same text", &key).unwrap();
        let b = encrypt_symmetric(b"same text", &key).unwrap();
        assert_ne!(a, b);

        let nonce_a = &BASE64.decode(&a).unwrap()[..NONCE_LEN];
        let nonce_b = &BASE64.decode(&b).unwrap()[..NONCE_LEN];
        assert_ne!(nonce_a, nonce_b);
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = encrypt_symmetric(b"Secret message", &fresh_key()).unwrap();
        assert_eq!(
            decrypt_symmetric(&sealed, &fresh_key()),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn any_flipped_byte_fails_authentication() {
        let key = fresh_key();
        let sealed = BASE64.decode(encrypt_symmetric(b"tamper me", &key).unwrap()).unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                decrypt_symmetric(&BASE64.encode(&tampered), &key),
                Err(CryptoError::AuthenticationFailed),
                "flip at byte {i} went unnoticed"
            );
        }
    }

    #[test]
    fn bad_key_lengths_are_rejected() {
        let sealed = encrypt_symmetric(b"x", &fresh_key()).unwrap();
        for len in [0usize, 1, 16, 31, 33, 64] {
            let key = vec![0x42u8; len];
            let err = CryptoError::InvalidKeyLength { expected: 32, actual: len };
            assert_eq!(encrypt_symmetric(b"x", &key), Err(err.clone()));
            assert_eq!(decrypt_symmetric(&sealed, &key), Err(err));
        }
    }

    #[test]
    fn too_short_ciphertext_is_malformed() {
        let short = BASE64.encode([0u8; NONCE_LEN - 1]);
        assert!(matches!(
            decrypt_symmetric(&short, &fresh_key()),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn non_base64_ciphertext_is_malformed() {
        assert!(matches!(
            decrypt_symmetric("%%%", &fresh_key()),
            Err(CryptoError::MalformedCiphertext(_))
        ));
    }
}
