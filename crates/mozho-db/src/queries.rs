use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use mozho_chat::{
    JoinOutcome, LeaveOutcome, MessageStore, RoomStore, StatusFlag, StoreError, StoreResult,
};
use mozho_types::models::{
    Attachment, ChatRoom, ChatRoomMember, DirectPair, Message, MessageStatus,
};

use crate::Database;
use crate::models::{
    ATTACHMENT_COLUMNS, MESSAGE_COLUMNS, MessageRow, ROOM_COLUMNS, RoomRow, STATUS_COLUMNS,
    attachment_from_row, format_time, member_from_row, message_from_row, room_from_row,
    status_from_row,
};

impl RoomStore for Database {
    fn insert_room(&self, room: &ChatRoom, members: &[Uuid]) -> StoreResult<()> {
        let row = RoomRow::from_room(room);
        let joined_at = format_time(&Utc::now());

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO chat_rooms (id, name, is_group, pair_key, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![row.id, row.name, row.is_group, row.pair_key, row.created_at],
            )?;
            for user_id in members {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_room_members (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                    (&row.id, user_id.to_string(), &joined_at),
                )?;
            }
            tx.commit()
        })
    }

    fn get_room(&self, room_id: Uuid) -> StoreResult<Option<ChatRoom>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms r WHERE r.id = ?1"),
                [room_id.to_string()],
                room_from_row,
            )
            .optional()
        })
    }

    fn find_direct_room(&self, pair: &DirectPair) -> StoreResult<Option<ChatRoom>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms r WHERE r.pair_key = ?1"),
                [pair.key()],
                room_from_row,
            )
            .optional()
        })
    }

    fn list_rooms_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ChatRoom>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROOM_COLUMNS}
                 FROM chat_rooms r
                 JOIN chat_room_members m ON m.room_id = r.id
                 WHERE m.user_id = ?1
                 ORDER BY r.created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id.to_string()], room_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn list_members(&self, room_id: Uuid) -> StoreResult<Vec<ChatRoomMember>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT room_id, user_id, joined_at FROM chat_room_members
                 WHERE room_id = ?1 ORDER BY joined_at, rowid",
            )?;
            let rows = stmt
                .query_map([room_id.to_string()], member_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn is_member(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_room_members WHERE room_id = ?1 AND user_id = ?2)",
                (room_id.to_string(), user_id.to_string()),
                |row| row.get(0),
            )
        })
    }

    fn member_count(&self, room_id: Uuid) -> StoreResult<u64> {
        self.with_conn(|conn| count_members(conn, &room_id.to_string()))
    }

    fn add_member(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        capacity: Option<u64>,
    ) -> StoreResult<JoinOutcome> {
        let (room, user) = (room_id.to_string(), user_id.to_string());
        let joined_at = format_time(&Utc::now());

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_rooms WHERE id = ?1)",
                [&room],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(JoinOutcome::RoomMissing);
            }

            let already: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_room_members WHERE room_id = ?1 AND user_id = ?2)",
                (&room, &user),
                |row| row.get(0),
            )?;
            if already {
                return Ok(JoinOutcome::AlreadyMember);
            }

            if let Some(cap) = capacity {
                if count_members(&tx, &room)? >= cap {
                    return Ok(JoinOutcome::Full);
                }
            }

            tx.execute(
                "INSERT INTO chat_room_members (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                (&room, &user, &joined_at),
            )?;
            tx.commit()?;
            Ok(JoinOutcome::Joined)
        })
    }

    fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<LeaveOutcome> {
        let (room, user) = (room_id.to_string(), user_id.to_string());

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let removed = tx.execute(
                "DELETE FROM chat_room_members WHERE room_id = ?1 AND user_id = ?2",
                (&room, &user),
            )?;
            if removed == 0 {
                return Ok(LeaveOutcome::NotMember);
            }

            let remaining = count_members(&tx, &room)?;
            let outcome = if remaining == 0 {
                // Cascades to messages, attachments and statuses.
                tx.execute("DELETE FROM chat_rooms WHERE id = ?1", [&room])?;
                LeaveOutcome::Reclaimed
            } else {
                LeaveOutcome::Left { remaining }
            };
            tx.commit()?;
            Ok(outcome)
        })
    }

    fn delete_room(&self, room_id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM chat_rooms WHERE id = ?1", [room_id.to_string()])?;
            Ok(deleted > 0)
        })
    }
}

impl MessageStore for Database {
    fn insert_message(&self, message: &Message) -> StoreResult<()> {
        let row = MessageRow::from_message(message);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, sender_id, content, algorithm, encryption_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.room_id,
                    row.sender_id,
                    row.content,
                    row.algorithm,
                    row.encryption_key,
                    row.created_at
                ],
            )?;
            Ok(())
        })
    }

    fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [message_id.to_string()],
                message_from_row,
            )
            .optional()
        })
    }

    fn list_messages(&self, room_id: Uuid, limit: u32, offset: u32) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages
                 WHERE room_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![room_id.to_string(), limit, offset],
                    message_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn insert_attachment(&self, attachment: &Attachment) -> StoreResult<()> {
        let size = i64::try_from(attachment.size)
            .map_err(|_| StoreError::Unavailable("attachment too large to record".into()))?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attachments (id, message_id, object_key, file_name, mime_type, size, url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    attachment.id.to_string(),
                    attachment.message_id.to_string(),
                    attachment.key,
                    attachment.file_name,
                    attachment.mime_type,
                    size,
                    attachment.url,
                    format_time(&attachment.created_at)
                ],
            )?;
            Ok(())
        })
    }

    /// Batch-fetch attachments for a set of message IDs.
    fn attachments_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Attachment>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE message_id IN ({}) ORDER BY created_at, rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), attachment_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn ensure_status(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_status (message_id, user_id, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id, user_id) DO NOTHING",
                (message_id.to_string(), user_id.to_string(), format_time(&Utc::now())),
            )?;
            Ok(())
        })
    }

    fn set_status_flag(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        flag: StatusFlag,
        value: bool,
    ) -> StoreResult<MessageStatus> {
        let column = match flag {
            StatusFlag::Read => "is_read",
            StatusFlag::Delivered => "is_delivered",
        };
        let (message, user) = (message_id.to_string(), user_id.to_string());

        let status = self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO message_status (message_id, user_id, {column}, updated_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(message_id, user_id) DO UPDATE SET {column} = excluded.{column}, updated_at = excluded.updated_at"
                ),
                (&message, &user, value, format_time(&Utc::now())),
            )?;
            conn.query_row(
                &format!("SELECT {STATUS_COLUMNS} FROM message_status WHERE message_id = ?1 AND user_id = ?2"),
                (&message, &user),
                status_from_row,
            )
        })?;

        debug!(message_id = %message_id, user_id = %user_id, column, value, "Status row upserted");
        Ok(status)
    }

    fn get_status(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<Option<MessageStatus>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {STATUS_COLUMNS} FROM message_status WHERE message_id = ?1 AND user_id = ?2"),
                (message_id.to_string(), user_id.to_string()),
                status_from_row,
            )
            .optional()
        })
    }
}

fn count_members(conn: &Connection, room_id: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chat_room_members WHERE room_id = ?1",
        [room_id],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mozho_types::models::{Algorithm, EncryptionMetadata};

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn direct(db: &Database) -> (ChatRoom, Uuid, Uuid) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = ChatRoom::direct(DirectPair::new(a, b).unwrap());
        db.insert_room(&room, &[a, b]).unwrap();
        (room, a, b)
    }

    fn message_in(room: &ChatRoom, sender: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id: room.id,
            sender_id: sender,
            content: "Y2lwaGVy".into(),
            encryption: EncryptionMetadata {
                algorithm: Algorithm::Aes,
                key: "a2V5".into(),
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn room_round_trips_with_pair() {
        let db = db();
        let (room, a, b) = direct(&db);

        let found = db.find_direct_room(&DirectPair::new(b, a).unwrap()).unwrap().unwrap();
        assert_eq!(found.id, room.id);
        assert_eq!(found.direct_pair, room.direct_pair);
        assert!(!found.is_group);
        assert_eq!(db.member_count(room.id).unwrap(), 2);
    }

    #[test]
    fn duplicate_pair_is_a_conflict() {
        let db = db();
        let (room, a, b) = direct(&db);
        let twin = ChatRoom::direct(room.direct_pair.unwrap());
        assert_eq!(db.insert_room(&twin, &[a, b]), Err(StoreError::Conflict));
    }

    #[test]
    fn add_member_respects_capacity() {
        let db = db();
        let (room, a, _) = direct(&db);
        assert_eq!(db.add_member(room.id, Uuid::new_v4(), Some(2)).unwrap(), JoinOutcome::Full);
        assert_eq!(db.add_member(room.id, a, Some(2)).unwrap(), JoinOutcome::AlreadyMember);
        assert_eq!(
            db.add_member(Uuid::new_v4(), a, None).unwrap(),
            JoinOutcome::RoomMissing
        );
    }

    #[test]
    fn last_leave_cascades() {
        let db = db();
        let (room, a, b) = direct(&db);
        let message = message_in(&room, a);
        db.insert_message(&message).unwrap();
        db.ensure_status(message.id, b).unwrap();

        assert_eq!(db.remove_member(room.id, a).unwrap(), LeaveOutcome::Left { remaining: 1 });
        assert_eq!(db.remove_member(room.id, a).unwrap(), LeaveOutcome::NotMember);
        assert_eq!(db.remove_member(room.id, b).unwrap(), LeaveOutcome::Reclaimed);

        assert!(db.get_room(room.id).unwrap().is_none());
        assert!(db.get_message(message.id).unwrap().is_none());
        assert!(db.get_status(message.id, b).unwrap().is_none());
    }

    #[test]
    fn messages_list_newest_first() {
        let db = db();
        let (room, a, b) = direct(&db);
        let first = message_in(&room, a);
        let mut second = message_in(&room, b);
        second.created_at = first.created_at;
        db.insert_message(&first).unwrap();
        db.insert_message(&second).unwrap();

        let listed = db.list_messages(room.id, 10, 0).unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(listed[1].encryption, first.encryption);
        assert_eq!(db.list_messages(room.id, 10, 1).unwrap().len(), 1);
    }

    #[test]
    fn message_for_missing_room_is_missing_reference() {
        let db = db();
        let (room, a, _) = direct(&db);
        let mut orphan = message_in(&room, a);
        orphan.room_id = Uuid::new_v4();
        assert_eq!(db.insert_message(&orphan), Err(StoreError::MissingReference));
    }

    #[test]
    fn status_upsert_touches_one_flag() {
        let db = db();
        let (room, a, b) = direct(&db);
        let message = message_in(&room, a);
        db.insert_message(&message).unwrap();

        let status = db.set_status_flag(message.id, b, StatusFlag::Delivered, true).unwrap();
        assert!(status.delivered && !status.read);

        let status = db.set_status_flag(message.id, b, StatusFlag::Read, true).unwrap();
        assert!(status.delivered && status.read);

        db.ensure_status(message.id, b).unwrap();
        assert!(db.get_status(message.id, b).unwrap().unwrap().read);

        assert_eq!(
            db.set_status_flag(Uuid::new_v4(), b, StatusFlag::Read, true),
            Err(StoreError::MissingReference)
        );
    }

    #[test]
    fn attachments_batch_by_message() {
        let db = db();
        let (room, a, _) = direct(&db);
        let m1 = message_in(&room, a);
        let m2 = message_in(&room, a);
        db.insert_message(&m1).unwrap();
        db.insert_message(&m2).unwrap();

        for (message_id, name) in [(m1.id, "a.png"), (m1.id, "b.pdf"), (m2.id, "c.txt")] {
            db.insert_attachment(&Attachment {
                id: Uuid::new_v4(),
                message_id,
                key: format!("messages/{message_id}/attachment/{name}"),
                file_name: name.into(),
                mime_type: "application/octet-stream".into(),
                size: 3,
                url: format!("http://x/{name}"),
                created_at: Utc::now(),
            })
            .unwrap();
        }

        assert_eq!(db.attachments_for_messages(&[m1.id]).unwrap().len(), 2);
        assert_eq!(db.attachments_for_messages(&[m1.id, m2.id]).unwrap().len(), 3);
        assert!(db.attachments_for_messages(&[]).unwrap().is_empty());
    }
}
