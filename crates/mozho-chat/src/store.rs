//! Capability traits for the storage collaborators.
//!
//! Room and message stores are synchronous (they front a transactional
//! relational store); the broker runs them on the blocking pool under a
//! timeout. The object store is async since uploads are I/O bound.

use std::future::Future;

use bytes::Bytes;
use uuid::Uuid;

use mozho_types::models::{
    Attachment, ChatRoom, ChatRoomMember, DirectPair, Message, MessageStatus,
};

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an atomic capacity-checked membership insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    Full,
    RoomMissing,
}

/// Result of a membership removal. `Reclaimed` means the last member left
/// and the room (with everything it owns) was deleted in the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotMember,
    Left { remaining: u64 },
    Reclaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFlag {
    Read,
    Delivered,
}

pub trait RoomStore: Send + Sync + 'static {
    /// Insert a room and its initial members atomically. Fails with
    /// [`StoreError::Conflict`] if the room's direct pair already has a room.
    fn insert_room(&self, room: &ChatRoom, members: &[Uuid]) -> StoreResult<()>;

    fn get_room(&self, room_id: Uuid) -> StoreResult<Option<ChatRoom>>;

    fn find_direct_room(&self, pair: &DirectPair) -> StoreResult<Option<ChatRoom>>;

    fn list_rooms_for_user(&self, user_id: Uuid) -> StoreResult<Vec<ChatRoom>>;

    fn list_members(&self, room_id: Uuid) -> StoreResult<Vec<ChatRoomMember>>;

    fn is_member(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    fn member_count(&self, room_id: Uuid) -> StoreResult<u64>;

    /// Check capacity and insert in one step.
    fn add_member(
        &self,
        room_id: Uuid,
        user_id: Uuid,
        capacity: Option<u64>,
    ) -> StoreResult<JoinOutcome>;

    /// Remove a member, deleting the room when nobody is left.
    fn remove_member(&self, room_id: Uuid, user_id: Uuid) -> StoreResult<LeaveOutcome>;

    /// Returns false if the room did not exist.
    fn delete_room(&self, room_id: Uuid) -> StoreResult<bool>;
}

pub trait MessageStore: Send + Sync + 'static {
    fn insert_message(&self, message: &Message) -> StoreResult<()>;

    fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>>;

    /// Newest first; ties keep reverse insertion order.
    fn list_messages(&self, room_id: Uuid, limit: u32, offset: u32) -> StoreResult<Vec<Message>>;

    fn insert_attachment(&self, attachment: &Attachment) -> StoreResult<()>;

    fn attachments_for_messages(&self, message_ids: &[Uuid]) -> StoreResult<Vec<Attachment>>;

    /// Create a status row with both flags false unless one exists.
    fn ensure_status(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    /// Upsert one flag, leaving the other untouched (false for a new row).
    /// [`StoreError::MissingReference`] if the message does not exist.
    fn set_status_flag(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        flag: StatusFlag,
        value: bool,
    ) -> StoreResult<MessageStatus>;

    fn get_status(&self, message_id: Uuid, user_id: Uuid) -> StoreResult<Option<MessageStatus>>;
}

/// Where an object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
}

pub trait ObjectStore: Send + Sync + 'static {
    fn put(
        &self,
        key: String,
        bytes: Bytes,
        content_type: String,
    ) -> impl Future<Output = StoreResult<StoredObject>> + Send;
}
