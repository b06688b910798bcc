use thiserror::Error;

/// Failures of the sealing primitives. None of these are worth retrying:
/// the same inputs reproduce the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("symmetric key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("symmetric key is not valid base64")]
    InvalidKeyEncoding,

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("ciphertext failed authentication")]
    AuthenticationFailed,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("plaintext of {actual} bytes exceeds the {max} bytes this key can seal")]
    PlaintextTooLong { max: usize, actual: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
