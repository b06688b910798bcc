use mozho_crypto::CryptoError;
use mozho_types::models::UnknownAlgorithm;
use thiserror::Error;

/// Failures reported by the storage collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage operation timed out")]
    Timeout,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A unique constraint rejected the write, e.g. a second direct room for
    /// a pair that already has one.
    #[error("write conflicts with an existing record")]
    Conflict,

    #[error("referenced record does not exist")]
    MissingReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("unsupported encryption algorithm: {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("RSA encryption requires the recipient public key")]
    MissingPublicKey,

    #[error("user is already a member of this room")]
    AlreadyMember,

    #[error("room is full")]
    RoomFull,

    #[error("user is not a member of this room")]
    NotMember,

    #[error("not authorized for this room")]
    NotAuthorized,

    #[error("direct room creation kept losing to concurrent writers")]
    DuplicateRoomRace,

    #[error("room not found")]
    RoomNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("storage operation timed out")]
    Timeout,

    /// A write outlived its deadline and may still have committed.
    #[error("storage write timed out; it may still have been applied")]
    OutcomeUnknown,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    /// Stable, machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crypto(e) => match e {
                CryptoError::InvalidKeyLength { .. } => "invalid_key_length",
                CryptoError::InvalidKeyEncoding => "invalid_key_encoding",
                CryptoError::MalformedCiphertext(_) => "malformed_ciphertext",
                CryptoError::AuthenticationFailed => "authentication_failed",
                CryptoError::InvalidPublicKey(_) => "invalid_public_key",
                CryptoError::InvalidPrivateKey(_) => "invalid_private_key",
                CryptoError::PlaintextTooLong { .. } => "plaintext_too_long",
                CryptoError::EncryptionFailed(_) => "encryption_failed",
                CryptoError::DecryptionFailed => "decryption_failed",
                CryptoError::KeyGeneration(_) => "key_generation_error",
            },
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::MissingPublicKey => "missing_public_key",
            Self::AlreadyMember => "already_member",
            Self::RoomFull => "room_full",
            Self::NotMember => "not_member",
            Self::NotAuthorized => "not_authorized",
            Self::DuplicateRoomRace => "duplicate_room_race",
            Self::RoomNotFound => "room_not_found",
            Self::MessageNotFound => "message_not_found",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::Timeout => "timeout",
            Self::OutcomeUnknown => "outcome_unknown",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Only collaborator failures that left nothing behind may succeed on a
    /// later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::StorageUnavailable(_))
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout => Self::Timeout,
            StoreError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StoreError::Conflict => Self::DuplicateRoomRace,
            StoreError::MissingReference => {
                Self::StorageUnavailable("referenced record does not exist".into())
            }
        }
    }
}

impl From<UnknownAlgorithm> for ChatError {
    fn from(e: UnknownAlgorithm) -> Self {
        Self::UnsupportedAlgorithm(e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_failures_are_not_retryable() {
        let err = ChatError::from(CryptoError::AuthenticationFailed);
        assert_eq!(err.kind(), "authentication_failed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn store_failures_keep_their_kind() {
        assert_eq!(ChatError::from(StoreError::Timeout), ChatError::Timeout);
        assert!(ChatError::from(StoreError::Unavailable("down".into())).is_retryable());
    }
}
