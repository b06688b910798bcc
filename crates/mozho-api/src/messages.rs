use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use mozho_chat::{AttachmentUpload, SendMessage, SendTarget, parse_id};
use mozho_types::api::{Claims, GenerateKeyResponse, MessageQuery, StatusResponse};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiMultipart, ApiPath, ApiQuery};
use crate::state::AppState;

/// Text fields of a send form, collected before the target is resolved.
#[derive(Default)]
struct SendForm {
    recipient_id: Option<String>,
    room_id: Option<String>,
    content: Option<String>,
    algorithm: Option<String>,
    encryption_key: Option<String>,
    attachments: Vec<AttachmentUpload>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<SendForm> {
    let mut form = SendForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read {file_name}: {e}")))?;
            form.attachments.push(AttachmentUpload { file_name, bytes });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read field {name}: {e}")))?;
        match name.as_str() {
            // receiver_id is the older name for the same field
            "recipient_id" | "receiver_id" => form.recipient_id = Some(value),
            "room_id" => form.room_id = Some(value),
            "content" => form.content = Some(value),
            "algorithm" => form.algorithm = Some(value),
            "encryption_key" => form.encryption_key = Some(value),
            other => debug!("Ignoring unknown form field {}", other),
        }
    }

    Ok(form)
}

/// POST /messages/send: multipart form with `recipient_id` or `room_id`,
/// `content`, `algorithm`, optional `encryption_key` and any number of file
/// parts as attachments.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiMultipart(multipart): ApiMultipart,
) -> ApiResult<impl IntoResponse> {
    let form = read_form(multipart).await?;

    let target = SendTarget::from_parts(form.recipient_id.as_deref(), form.room_id.as_deref())?;
    let content = form
        .content
        .ok_or_else(|| ApiError::BadRequest("content is required".into()))?;
    let algorithm = form
        .algorithm
        .ok_or_else(|| ApiError::BadRequest("algorithm is required".into()))?;

    let me = claims.sub;
    if let SendTarget::Room(room_id) = target {
        state
            .with_rooms(move |rooms| rooms.authorize(room_id, me))
            .await?;
    }

    let message = state
        .broker
        .send(SendMessage {
            sender_id: me,
            target,
            plaintext: content,
            algorithm,
            provided_key: form.encryption_key,
            attachments: form.attachments,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/{room_id}?limit&offset, members only, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let room_id = parse_id("room_id", &room_id)?;
    let me = claims.sub;
    state
        .with_rooms(move |rooms| rooms.authorize(room_id, me))
        .await?;

    let messages = state
        .broker
        .list_messages(room_id, query.limit, query.offset)
        .await?;
    Ok(Json(messages))
}

/// Resolve a message id and check the caller belongs to its room.
async fn authorized_message(state: &AppState, raw_id: &str, user_id: Uuid) -> ApiResult<Uuid> {
    let message_id = parse_id("message_id", raw_id)?;
    let message = state.broker.message(message_id).await?;
    let room_id = message.room_id;
    state
        .with_rooms(move |rooms| rooms.authorize(room_id, user_id))
        .await?;
    Ok(message_id)
}

pub async fn mark_read(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = authorized_message(&state, &message_id, claims.sub).await?;
    let status = state.broker.mark_read(claims.sub, message_id).await?;
    Ok(Json(StatusResponse::from(status)))
}

pub async fn mark_unread(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = authorized_message(&state, &message_id, claims.sub).await?;
    let status = state.broker.mark_unread(claims.sub, message_id).await?;
    Ok(Json(StatusResponse::from(status)))
}

pub async fn mark_delivered(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = authorized_message(&state, &message_id, claims.sub).await?;
    let status = state.broker.mark_delivered(claims.sub, message_id).await?;
    Ok(Json(StatusResponse::from(status)))
}

pub async fn mark_undelivered(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = authorized_message(&state, &message_id, claims.sub).await?;
    let status = state.broker.mark_undelivered(claims.sub, message_id).await?;
    Ok(Json(StatusResponse::from(status)))
}

pub async fn get_status(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let message_id = authorized_message(&state, &message_id, claims.sub).await?;
    let status = state.broker.status(claims.sub, message_id).await?;
    Ok(Json(StatusResponse::from(status)))
}

/// A fresh base64 AES-256 key for clients that want to supply their own.
pub async fn generate_key() -> ApiResult<impl IntoResponse> {
    let key = mozho_crypto::generate_symmetric_key()?;
    Ok(Json(GenerateKeyResponse { key }))
}
