use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use mozho_types::models::{ChatRoom, ChatRoomMember, DirectPair};

use crate::error::{ChatError, ChatResult, StoreError};
use crate::store::{JoinOutcome, LeaveOutcome, RoomStore};

/// How many times a direct-room create re-reads after losing an insert race
/// before giving up with [`ChatError::DuplicateRoomRace`].
const DEDUP_ATTEMPTS: usize = 3;

/// Owns room membership and the one-direct-room-per-pair invariant.
pub struct RoomDirectory<R> {
    store: Arc<R>,
}

impl<R> Clone for RoomDirectory<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

fn direct_pair(a: Uuid, b: Uuid) -> ChatResult<DirectPair> {
    DirectPair::new(a, b).ok_or_else(|| {
        ChatError::InvalidIdentifier("a direct room needs two different users".into())
    })
}

impl<R: RoomStore> RoomDirectory<R> {
    pub fn new(store: Arc<R>) -> Self {
        Self { store }
    }

    /// Return the pair's direct room, creating it if needed. Argument order
    /// does not matter. A pair member who had left is re-admitted.
    pub fn create_direct_room(&self, a: Uuid, b: Uuid) -> ChatResult<ChatRoom> {
        let pair = direct_pair(a, b)?;

        for attempt in 1..=DEDUP_ATTEMPTS {
            if let Some(room) = self.store.find_direct_room(&pair)? {
                if self.restore_pair(&room, &pair)? {
                    return Ok(room);
                }
                // Reclaimed between the read and the re-admit.
                continue;
            }

            let room = ChatRoom::direct(pair);
            match self.store.insert_room(&room, &pair.members()) {
                Ok(()) => {
                    info!(room_id = %room.id, pair = %pair.key(), "Direct room created");
                    return Ok(room);
                }
                Err(StoreError::Conflict) => {
                    debug!(attempt, pair = %pair.key(), "Lost direct room insert race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // The last attempt may also have lost its insert; the winner is readable now.
        if let Some(room) = self.store.find_direct_room(&pair)? {
            if self.restore_pair(&room, &pair)? {
                return Ok(room);
            }
        }

        warn!(pair = %pair.key(), "Direct room create gave up after {} attempts", DEDUP_ATTEMPTS);
        Err(ChatError::DuplicateRoomRace)
    }

    /// Make sure both pair members are in the room. Returns false if the room
    /// disappeared meanwhile.
    fn restore_pair(&self, room: &ChatRoom, pair: &DirectPair) -> ChatResult<bool> {
        if self.store.member_count(room.id)? >= 2 {
            return Ok(true);
        }

        for user_id in pair.members() {
            match self.store.add_member(room.id, user_id, room.capacity())? {
                JoinOutcome::Joined => {
                    info!(room_id = %room.id, user_id = %user_id, "Re-admitted member to direct room");
                }
                JoinOutcome::AlreadyMember => {}
                // Only pair members are ever admitted, so two seats always fit them.
                JoinOutcome::Full => return Err(ChatError::RoomFull),
                JoinOutcome::RoomMissing => return Ok(false),
            }
        }
        Ok(true)
    }

    pub fn find_direct_room(&self, a: Uuid, b: Uuid) -> ChatResult<Option<ChatRoom>> {
        Ok(self.store.find_direct_room(&direct_pair(a, b)?)?)
    }

    pub fn join(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        let room = self.room(room_id)?;

        if let Some(pair) = room.direct_pair {
            if !pair.contains(user_id) {
                // A direct room never takes a third user, full or not.
                return if self.store.member_count(room_id)? >= 2 {
                    Err(ChatError::RoomFull)
                } else {
                    Err(ChatError::NotAuthorized)
                };
            }
        }

        match self.store.add_member(room_id, user_id, room.capacity())? {
            JoinOutcome::Joined => {
                info!(room_id = %room_id, user_id = %user_id, "Member joined room");
                Ok(())
            }
            JoinOutcome::AlreadyMember => Err(ChatError::AlreadyMember),
            JoinOutcome::Full => Err(ChatError::RoomFull),
            JoinOutcome::RoomMissing => Err(ChatError::RoomNotFound),
        }
    }

    /// Leave a room. Returns true when this was the last member and the room
    /// was reclaimed.
    pub fn leave(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<bool> {
        match self.store.remove_member(room_id, user_id)? {
            LeaveOutcome::NotMember => Err(ChatError::NotMember),
            LeaveOutcome::Left { remaining } => {
                info!(room_id = %room_id, user_id = %user_id, remaining, "Member left room");
                Ok(false)
            }
            LeaveOutcome::Reclaimed => {
                info!(room_id = %room_id, user_id = %user_id, "Last member left, room reclaimed");
                Ok(true)
            }
        }
    }

    pub fn delete_room(&self, room_id: Uuid) -> ChatResult<()> {
        if self.store.delete_room(room_id)? {
            info!(room_id = %room_id, "Room deleted");
            Ok(())
        } else {
            Err(ChatError::RoomNotFound)
        }
    }

    pub fn room(&self, room_id: Uuid) -> ChatResult<ChatRoom> {
        self.store.get_room(room_id)?.ok_or(ChatError::RoomNotFound)
    }

    pub fn room_details(&self, room_id: Uuid) -> ChatResult<(ChatRoom, Vec<ChatRoomMember>)> {
        let room = self.room(room_id)?;
        let members = self.store.list_members(room_id)?;
        Ok((room, members))
    }

    pub fn members(&self, room_id: Uuid) -> ChatResult<Vec<ChatRoomMember>> {
        Ok(self.store.list_members(room_id)?)
    }

    pub fn list_rooms(&self, user_id: Uuid) -> ChatResult<Vec<ChatRoom>> {
        Ok(self.store.list_rooms_for_user(user_id)?)
    }

    pub fn is_member(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<bool> {
        Ok(self.store.is_member(room_id, user_id)?)
    }

    pub fn member_count(&self, room_id: Uuid) -> ChatResult<u64> {
        Ok(self.store.member_count(room_id)?)
    }

    /// Gate for callers acting on a room: members pass, everyone else gets
    /// [`ChatError::NotAuthorized`], including for rooms that do not exist.
    pub fn authorize(&self, room_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        if self.is_member(room_id, user_id)? {
            Ok(())
        } else {
            Err(ChatError::NotAuthorized)
        }
    }
}
