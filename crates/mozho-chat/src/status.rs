use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use mozho_types::models::MessageStatus;

use crate::error::{ChatError, ChatResult, StoreError};
use crate::store::{MessageStore, StatusFlag};

/// Per-(message, user) read and delivery flags. Every write is an upsert;
/// rows are never deleted except together with their message.
pub struct StatusTracker<M> {
    store: Arc<M>,
}

impl<M> Clone for StatusTracker<M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

fn missing_message(e: StoreError) -> ChatError {
    match e {
        StoreError::MissingReference => ChatError::MessageNotFound,
        other => other.into(),
    }
}

impl<M: MessageStore> StatusTracker<M> {
    pub fn new(store: Arc<M>) -> Self {
        Self { store }
    }

    /// Give each recipient an unread, undelivered row. Existing rows stay as
    /// they are.
    pub fn initialize(&self, message_id: Uuid, recipients: &[Uuid]) -> ChatResult<()> {
        for &user_id in recipients {
            self.store
                .ensure_status(message_id, user_id)
                .map_err(missing_message)?;
        }
        Ok(())
    }

    pub fn mark_read(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        self.set(user_id, message_id, StatusFlag::Read, true)
    }

    pub fn mark_unread(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        self.set(user_id, message_id, StatusFlag::Read, false)
    }

    pub fn mark_delivered(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        self.set(user_id, message_id, StatusFlag::Delivered, true)
    }

    pub fn mark_undelivered(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        self.set(user_id, message_id, StatusFlag::Delivered, false)
    }

    /// Current flags; a pair with no row reads as unread and undelivered.
    pub fn status(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        if let Some(status) = self.store.get_status(message_id, user_id)? {
            return Ok(status);
        }
        let message = self.store.get_message(message_id)?;
        match message {
            Some(message) => Ok(MessageStatus {
                message_id,
                user_id,
                delivered: false,
                read: false,
                updated_at: message.created_at,
            }),
            None => Err(ChatError::MessageNotFound),
        }
    }

    fn set(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        flag: StatusFlag,
        value: bool,
    ) -> ChatResult<MessageStatus> {
        let status = self
            .store
            .set_status_flag(message_id, user_id, flag, value)
            .map_err(missing_message)?;
        debug!(
            message_id = %message_id,
            user_id = %user_id,
            ?flag,
            value,
            "Message status updated"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::RoomStore;
    use mozho_types::models::{Algorithm, ChatRoom, DirectPair, EncryptionMetadata, Message};

    fn tracker_with_message() -> (StatusTracker<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let room = ChatRoom::direct(DirectPair::new(a, b).unwrap());
        store.insert_room(&room, &[a, b]).unwrap();

        let message = Message {
            id: Uuid::new_v4(),
            room_id: room.id,
            sender_id: a,
            content: "c2VhbGVk".into(),
            encryption: EncryptionMetadata {
                algorithm: Algorithm::Aes,
                key: "a2V5".into(),
            },
            created_at: Utc::now(),
        };
        store.insert_message(&message).unwrap();
        (StatusTracker::new(store), message.id)
    }

    #[test]
    fn first_flag_write_creates_row_with_other_flag_false() {
        let (tracker, message_id) = tracker_with_message();
        let user = Uuid::new_v4();

        let status = tracker.mark_read(user, message_id).unwrap();
        assert!(status.read);
        assert!(!status.delivered);
    }

    #[test]
    fn flags_are_independent_and_idempotent() {
        let (tracker, message_id) = tracker_with_message();
        let user = Uuid::new_v4();

        tracker.mark_delivered(user, message_id).unwrap();
        tracker.mark_delivered(user, message_id).unwrap();
        tracker.mark_read(user, message_id).unwrap();
        tracker.mark_unread(user, message_id).unwrap();

        let status = tracker.status(user, message_id).unwrap();
        assert!(status.delivered);
        assert!(!status.read);

        tracker.mark_undelivered(user, message_id).unwrap();
        assert!(!tracker.status(user, message_id).unwrap().delivered);
    }

    #[test]
    fn initialize_does_not_overwrite() {
        let (tracker, message_id) = tracker_with_message();
        let user = Uuid::new_v4();

        tracker.mark_read(user, message_id).unwrap();
        tracker.initialize(message_id, &[user]).unwrap();
        assert!(tracker.status(user, message_id).unwrap().read);
    }

    #[test]
    fn missing_row_reads_as_unset() {
        let (tracker, message_id) = tracker_with_message();
        let status = tracker.status(Uuid::new_v4(), message_id).unwrap();
        assert!(!status.read && !status.delivered);
    }

    #[test]
    fn unknown_message_is_reported() {
        let (tracker, _) = tracker_with_message();
        let user = Uuid::new_v4();
        assert_eq!(tracker.mark_read(user, Uuid::new_v4()), Err(ChatError::MessageNotFound));
        assert_eq!(tracker.status(user, Uuid::new_v4()), Err(ChatError::MessageNotFound));
    }
}
