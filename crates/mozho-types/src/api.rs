use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Algorithm, Attachment, ChatRoom, ChatRoomMember, Message, MessageStatus,
};

// -- JWT Claims --

/// Bearer token claims. Tokens are issued elsewhere; this service only
/// validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    /// Parsed by the handler so a bad id reports as an invalid identifier.
    pub other_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub room_id: Uuid,
    /// True when the caller was the last member and the room is gone.
    pub reclaimed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

impl From<ChatRoomMember> for MemberResponse {
    fn from(member: ChatRoomMember) -> Self {
        Self {
            user_id: member.user_id,
            joined_at: member.joined_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub is_group: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<MemberResponse>,
}

impl RoomResponse {
    pub fn new(room: ChatRoom, members: Vec<ChatRoomMember>) -> Self {
        Self {
            id: room.id,
            name: room.name,
            is_group: room.is_group,
            created_at: room.created_at,
            members: members.into_iter().map(MemberResponse::from).collect(),
        }
    }
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Algorithm only; the key is never sent back to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub url: String,
}

impl From<Attachment> for AttachmentResponse {
    fn from(a: Attachment) -> Self {
        Self {
            id: a.id,
            file_name: a.file_name,
            mime_type: a.mime_type,
            size: a.size,
            url: a.url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub chat_room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub encrypted: bool,
    pub encryption: EncryptionInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentResponse>,
    pub created_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn new(message: Message, attachments: Vec<Attachment>) -> Self {
        Self {
            id: message.id,
            chat_room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content,
            encrypted: true,
            encryption: EncryptionInfo {
                algorithm: message.encryption.algorithm,
            },
            attachments: attachments.into_iter().map(AttachmentResponse::from).collect(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub delivered: bool,
    pub read: bool,
}

impl From<MessageStatus> for StatusResponse {
    fn from(s: MessageStatus) -> Self {
        Self {
            message_id: s.message_id,
            user_id: s.user_id,
            delivered: s.delivered,
            read: s.read,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateKeyResponse {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}
