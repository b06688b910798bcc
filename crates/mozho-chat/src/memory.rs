//! In-memory collaborators for tests and local runs. They enforce the same
//! constraints as the SQLite schema: unique direct pairs, unique
//! memberships, cascading room deletes and message references.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use mozho_types::models::{
    Attachment, ChatRoom, ChatRoomMember, DirectPair, Message, MessageStatus,
};

use crate::error::StoreError;
use crate::store::{
    JoinOutcome, LeaveOutcome, MessageStore, ObjectStore, RoomStore, StatusFlag, StoreResult,
    StoredObject,
};

#[derive(Default)]
struct MemoryState {
    rooms: HashMap<Uuid, ChatRoom>,
    direct_index: HashMap<DirectPair, Uuid>,
    /// room_id -> members in join order
    members: HashMap<Uuid, Vec<ChatRoomMember>>,
    /// insertion order
    messages: Vec<Message>,
    attachments: Vec<Attachment>,
    statuses: HashMap<(Uuid, Uuid), MessageStatus>,
}

impl MemoryState {
    fn has_message(&self, message_id: Uuid) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    fn cascade_delete(&mut self, room_id: Uuid) -> bool {
        let Some(room) = self.rooms.remove(&room_id) else {
            return false;
        };
        if let Some(pair) = room.direct_pair {
            self.direct_index.remove(&pair);
        }
        self.members.remove(&room_id);

        let doomed: Vec<Uuid> = self
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .map(|m| m.id)
            .collect();
        self.messages.retain(|m| m.room_id != room_id);
        self.attachments.retain(|a| !doomed.contains(&a.message_id));
        self.statuses.retain(|(message_id, _), _| !doomed.contains(message_id));
        true
    }
}

/// Room and message store backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))
    }

    /// Number of rooms currently stored.
    pub fn room_count(&self) -> usize {
        self.state.lock().map(|s| s.rooms.len()).unwrap_or_default()
    }
}

impl RoomStore for MemoryStore {
    fn insert_room(&self, room: &ChatRoom, members: &[Uuid]) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.rooms.contains_key(&room.id) {
            return Err(StoreError::Conflict);
        }
        if let Some(pair) = room.direct_pair {
            if state.direct_index.contains_key(&pair) {
                return Err(StoreError::Conflict);
            }
            state.direct_index.insert(pair, room.id);
        }

        let joined_at = Utc::now();
        let mut roster: Vec<ChatRoomMember> = Vec::with_capacity(members.len());
        for &user_id in members {
            if roster.iter().all(|m| m.user_id != user_id) {
                roster.push(ChatRoomMember {
                    room_id: room.id,
                    user_id,
                    joined_at,
                });
            }
        }
        state.members.insert(room.id, roster);
        state.rooms.insert(room.id, room.clone());
        Ok(())
    }

    fn get_room(&self, room_id: Uuid) -> StoreResult<Option<ChatRoom>> {
        Ok(self.lock()?.rooms.get(&room_id).cloned())
    }

    fn find_direct_room(&self, pair: &DirectPair) -> StoreResult<Option<ChatRoom>> {
        let state = self.lock()?;
        Ok(state
            .direct_index
            .get(pair)
            .and_then(|id| state.rooms.get(id))
            .cloned())
    }

    fn list_rooms_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ChatRoom>> {
        let state = self.lock()?;
        let mut rooms: Vec<ChatRoom> = state
            .members
            .iter()
            .filter(|(_, roster)| roster.iter().any(|m| m.user_id == user_id))
            .filter_map(|(room_id, _)| state.rooms.get(room_id).cloned())
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    fn list_members(&self, room_id: Uuid) -> StoreResult<Vec<ChatRoomMember>> {
        Ok(self
            .lock()?
            .members
            .get(&room_id)
            .cloned()
            .unwrap_or_default())
    }

    fn is_member(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .members
            .get(&room_id)
            .is_some_and(|roster| roster.iter().any(|m| m.user_id == user_id)))
    }

    fn member_count(&self, room_id: Uuid) -> StoreResult<u64> {
        Ok(self
            .lock()?
            .members
            .get(&room_id)
            .map_or(0, |roster| roster.len() as u64))
    }

    fn add_member(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        capacity: Option<u64>,
    ) -> StoreResult<JoinOutcome> {
        let mut state = self.lock()?;
        if !state.rooms.contains_key(&room_id) {
            return Ok(JoinOutcome::RoomMissing);
        }
        let roster = state.members.entry(room_id).or_default();
        if roster.iter().any(|m| m.user_id == user_id) {
            return Ok(JoinOutcome::AlreadyMember);
        }
        if capacity.is_some_and(|cap| roster.len() as u64 >= cap) {
            return Ok(JoinOutcome::Full);
        }
        roster.push(ChatRoomMember {
            room_id,
            user_id,
            joined_at: Utc::now(),
        });
        Ok(JoinOutcome::Joined)
    }

    fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<LeaveOutcome> {
        let mut state = self.lock()?;
        let Some(roster) = state.members.get_mut(&room_id) else {
            return Ok(LeaveOutcome::NotMember);
        };
        let before = roster.len();
        roster.retain(|m| m.user_id != user_id);
        if roster.len() == before {
            return Ok(LeaveOutcome::NotMember);
        }

        let remaining = roster.len() as u64;
        if remaining == 0 {
            state.cascade_delete(room_id);
            Ok(LeaveOutcome::Reclaimed)
        } else {
            Ok(LeaveOutcome::Left { remaining })
        }
    }

    fn delete_room(&self, room_id: Uuid) -> StoreResult<bool> {
        Ok(self.lock()?.cascade_delete(room_id))
    }
}

impl MessageStore for MemoryStore {
    fn insert_message(&self, message: &Message) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.rooms.contains_key(&message.room_id) {
            return Err(StoreError::MissingReference);
        }
        if state.has_message(message.id) {
            return Err(StoreError::Conflict);
        }
        state.messages.push(message.clone());
        Ok(())
    }

    fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self
            .lock()?
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned())
    }

    fn list_messages(&self, room_id: Uuid, limit: u32, offset: u32) -> StoreResult<Vec<Message>> {
        let state = self.lock()?;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        // Stable sort keeps reverse insertion order among equal timestamps.
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    fn insert_attachment(&self, attachment: &Attachment) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.has_message(attachment.message_id) {
            return Err(StoreError::MissingReference);
        }
        state.attachments.push(attachment.clone());
        Ok(())
    }

    fn attachments_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Attachment>> {
        Ok(self
            .lock()?
            .attachments
            .iter()
            .filter(|a| message_ids.contains(&a.message_id))
            .cloned()
            .collect())
    }

    fn ensure_status(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.has_message(message_id) {
            return Err(StoreError::MissingReference);
        }
        state
            .statuses
            .entry((message_id, user_id))
            .or_insert_with(|| MessageStatus {
                message_id,
                user_id,
                delivered: false,
                read: false,
                updated_at: Utc::now(),
            });
        Ok(())
    }

    fn set_status_flag(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        flag: StatusFlag,
        value: bool,
    ) -> StoreResult<MessageStatus> {
        let mut state = self.lock()?;
        if !state.has_message(message_id) {
            return Err(StoreError::MissingReference);
        }
        let now = Utc::now();
        let status = state
            .statuses
            .entry((message_id, user_id))
            .or_insert_with(|| MessageStatus {
                message_id,
                user_id,
                delivered: false,
                read: false,
                updated_at: now,
            });
        match flag {
            StatusFlag::Read => status.read = value,
            StatusFlag::Delivered => status.delivered = value,
        }
        status.updated_at = now;
        Ok(status.clone())
    }

    fn get_status(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<Option<MessageStatus>> {
        Ok(self.lock()?.statuses.get(&(message_id, user_id)).cloned())
    }
}

/// Object store that keeps uploads in a map. Can be told to reject keys or
/// to stall, to exercise the broker's failure paths.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    reject_pattern: Option<String>,
    delay: Option<Duration>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every put whose key contains `pattern`.
    pub fn rejecting(pattern: impl Into<String>) -> Self {
        Self {
            reject_pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Sleep before every put.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<(Bytes, String)> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        key: String,
        bytes: Bytes,
        content_type: String,
    ) -> impl Future<Output = StoreResult<StoredObject>> + Send {
        async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self
                .reject_pattern
                .as_deref()
                .is_some_and(|p| key.contains(p))
            {
                return Err(StoreError::Unavailable(format!("upload of {key} rejected")));
            }

            let size = bytes.len() as u64;
            self.objects
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("object map lock poisoned: {e}")))?
                .insert(key.clone(), (bytes, content_type));
            Ok(StoredObject {
                url: format!("memory://{key}"),
                key,
                size,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_room() -> (ChatRoom, Uuid, Uuid) {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        (ChatRoom::direct(DirectPair::new(a, b).unwrap()), a, b)
    }

    #[test]
    fn second_room_for_same_pair_conflicts() {
        let store = MemoryStore::new();
        let (room, a, b) = direct_room();
        store.insert_room(&room, &[a, b]).unwrap();

        let twin = ChatRoom::direct(DirectPair::new(b, a).unwrap());
        assert_eq!(store.insert_room(&twin, &[a, b]), Err(StoreError::Conflict));
    }

    #[test]
    fn reclaim_cascades_to_messages_and_statuses() {
        let store = MemoryStore::new();
        let (room, a, b) = direct_room();
        store.insert_room(&room, &[a, b]).unwrap();

        let message = Message {
            id: Uuid::new_v4(),
            room_id: room.id,
            sender_id: a,
            content: "eA==".into(),
            encryption: mozho_types::models::EncryptionMetadata {
                algorithm: mozho_types::models::Algorithm::Aes,
                key: "k".into(),
            },
            created_at: Utc::now(),
        };
        store.insert_message(&message).unwrap();
        store.ensure_status(message.id, b).unwrap();

        store.remove_member(room.id, a).unwrap();
        assert_eq!(store.remove_member(room.id, b).unwrap(), LeaveOutcome::Reclaimed);

        assert!(store.get_message(message.id).unwrap().is_none());
        assert!(store.get_status(message.id, b).unwrap().is_none());
        assert!(store.find_direct_room(&room.direct_pair.unwrap()).unwrap().is_none());
    }

    #[test]
    fn message_for_unknown_room_is_rejected() {
        let store = MemoryStore::new();
        let (room, a, _) = direct_room();
        let message = Message {
            id: Uuid::new_v4(),
            room_id: room.id,
            sender_id: a,
            content: "eA==".into(),
            encryption: mozho_types::models::EncryptionMetadata {
                algorithm: mozho_types::models::Algorithm::Aes,
                key: "k".into(),
            },
            created_at: Utc::now(),
        };
        assert_eq!(store.insert_message(&message), Err(StoreError::MissingReference));
    }

    #[tokio::test]
    async fn object_store_rejects_matching_keys() {
        let objects = MemoryObjectStore::rejecting(".exe");
        let ok = objects
            .put("a/b.png".into(), Bytes::from_static(b"png"), "image/png".into())
            .await
            .unwrap();
        assert_eq!(ok.size, 3);
        assert!(
            objects
                .put("a/b.exe".into(), Bytes::from_static(b"MZ"), "application/octet-stream".into())
                .await
                .is_err()
        );
        assert_eq!(objects.len(), 1);
    }
}
