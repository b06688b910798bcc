use axum::{
    Json,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use mozho_chat::ChatError;
use mozho_crypto::CryptoError;
use mozho_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// An extractor refused the request before the handler ran.
    #[error("invalid request: {message}")]
    Rejected { status: StatusCode, message: String },
}

macro_rules! from_rejection {
    ($($rejection:ty),*) => {
        $(impl From<$rejection> for ApiError {
            fn from(r: $rejection) -> Self {
                Self::Rejected {
                    status: r.status(),
                    message: r.body_text(),
                }
            }
        })*
    };
}

from_rejection!(JsonRejection, QueryRejection, PathRejection, MultipartRejection);

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        Self::Chat(e.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Chat(e) => match e {
                ChatError::Crypto(c) => match c {
                    CryptoError::EncryptionFailed(_) | CryptoError::KeyGeneration(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    CryptoError::PlaintextTooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    CryptoError::AuthenticationFailed | CryptoError::DecryptionFailed => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    _ => StatusCode::BAD_REQUEST,
                },
                ChatError::UnsupportedAlgorithm(_)
                | ChatError::MissingPublicKey
                | ChatError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
                ChatError::AlreadyMember
                | ChatError::RoomFull
                | ChatError::NotMember
                | ChatError::DuplicateRoomRace => StatusCode::CONFLICT,
                ChatError::NotAuthorized => StatusCode::FORBIDDEN,
                ChatError::RoomNotFound | ChatError::MessageNotFound => StatusCode::NOT_FOUND,
                ChatError::Timeout | ChatError::OutcomeUnknown => StatusCode::GATEWAY_TIMEOUT,
                ChatError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Rejected { .. } => "invalid_request",
            ApiError::Chat(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
            status.canonical_reason().unwrap_or("internal error").to_string()
        } else {
            warn!(kind = self.kind(), status = status.as_u16(), "Request rejected: {}", self);
            self.to_string()
        };

        let body = ErrorResponse {
            error: message,
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_problems_are_client_errors() {
        let err = ApiError::from(CryptoError::InvalidKeyLength { expected: 32, actual: 10 });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "invalid_key_length");
    }

    #[test]
    fn membership_errors_map_to_conflict_and_forbidden() {
        assert_eq!(ApiError::from(ChatError::RoomFull).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(ChatError::NotAuthorized).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(ChatError::Timeout).status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError::from(ChatError::OutcomeUnknown).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn oversized_rsa_plaintext_is_a_client_error() {
        let err = ApiError::from(CryptoError::PlaintextTooLong { max: 190, actual: 300 });
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.kind(), "plaintext_too_long");
    }
}
