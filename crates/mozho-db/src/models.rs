//! Row types as read from SQLite, plus their conversion into the chat models.
//! Ids and timestamps stay text until converted.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use uuid::Uuid;

use mozho_types::models::{
    Algorithm, Attachment, ChatRoom, ChatRoomMember, DirectPair, EncryptionMetadata, Message,
    MessageStatus,
};

use crate::error::bad_column;

pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| bad_column(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, e))
}

pub struct RoomRow {
    pub id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub pair_key: Option<String>,
    pub created_at: String,
}

pub const ROOM_COLUMNS: &str = "r.id, r.name, r.is_group, r.pair_key, r.created_at";

pub fn room_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoom> {
    let pair_key: Option<String> = row.get(3)?;
    let direct_pair = match pair_key {
        Some(key) => Some(DirectPair::from_key(&key).ok_or_else(|| {
            bad_column(3, std::io::Error::other(format!("bad pair key {key:?}")))
        })?),
        None => None,
    };
    Ok(ChatRoom {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        is_group: row.get(2)?,
        direct_pair,
        created_at: time_at(row, 4)?,
    })
}

impl RoomRow {
    pub fn from_room(room: &ChatRoom) -> Self {
        Self {
            id: room.id.to_string(),
            name: room.name.clone(),
            is_group: room.is_group,
            pair_key: room.direct_pair.map(|p| p.key()),
            created_at: format_time(&room.created_at),
        }
    }
}

pub fn member_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoomMember> {
    Ok(ChatRoomMember {
        room_id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        joined_at: time_at(row, 2)?,
    })
}

pub const MESSAGE_COLUMNS: &str =
    "id, room_id, sender_id, content, algorithm, encryption_key, created_at";

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub algorithm: &'static str,
    pub encryption_key: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn from_message(m: &Message) -> Self {
        Self {
            id: m.id.to_string(),
            room_id: m.room_id.to_string(),
            sender_id: m.sender_id.to_string(),
            content: m.content.clone(),
            algorithm: m.encryption.algorithm.as_str(),
            encryption_key: m.encryption.key.clone(),
            created_at: format_time(&m.created_at),
        }
    }
}

pub fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let algorithm: String = row.get(4)?;
    let algorithm: Algorithm = algorithm.parse().map_err(|e| bad_column(4, e))?;
    Ok(Message {
        id: uuid_at(row, 0)?,
        room_id: uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        content: row.get(3)?,
        encryption: EncryptionMetadata {
            algorithm,
            key: row.get(5)?,
        },
        created_at: time_at(row, 6)?,
    })
}

pub const ATTACHMENT_COLUMNS: &str =
    "id, message_id, object_key, file_name, mime_type, size, url, created_at";

pub fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    let size: i64 = row.get(5)?;
    Ok(Attachment {
        id: uuid_at(row, 0)?,
        message_id: uuid_at(row, 1)?,
        key: row.get(2)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        size: u64::try_from(size).map_err(|e| bad_column(5, e))?,
        url: row.get(6)?,
        created_at: time_at(row, 7)?,
    })
}

pub const STATUS_COLUMNS: &str = "message_id, user_id, is_delivered, is_read, updated_at";

pub fn status_from_row(row: &Row<'_>) -> rusqlite::Result<MessageStatus> {
    Ok(MessageStatus {
        message_id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        delivered: row.get(2)?,
        read: row.get(3)?,
        updated_at: time_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_times_sort_like_the_times() {
        let early = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.000001Z")
            .unwrap()
            .with_timezone(&Utc);
        let late = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.1Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(format_time(&early) < format_time(&late));
        assert_eq!(format_time(&late), "2026-01-02T03:04:05.100000Z");
    }
}
