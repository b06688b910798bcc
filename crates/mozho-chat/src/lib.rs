//! Secure-messaging core: direct-room directory, message broker and
//! per-recipient status tracking, written against storage traits so the
//! same logic runs on SQLite in production and in memory under test.

pub mod blocking;
pub mod broker;
pub mod error;
pub mod memory;
pub mod object_store;
pub mod rooms;
pub mod sniff;
pub mod status;
pub mod store;

use uuid::Uuid;

pub use blocking::{run_blocking, run_blocking_write};
pub use broker::{AttachmentUpload, BrokerConfig, MessageBroker, SendMessage, SendTarget};
pub use error::{ChatError, ChatResult, StoreError};
pub use memory::{MemoryObjectStore, MemoryStore};
pub use object_store::DiskObjectStore;
pub use rooms::RoomDirectory;
pub use status::StatusTracker;
pub use store::{
    JoinOutcome, LeaveOutcome, MessageStore, ObjectStore, RoomStore, StatusFlag, StoreResult,
    StoredObject,
};

/// Parse a caller-supplied identifier. `what` names the field in the error.
pub fn parse_id(what: &str, value: &str) -> ChatResult<Uuid> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::InvalidIdentifier(format!("{what} is not a valid id: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id("room_id", &id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_id_reports_invalid_identifier() {
        let err = parse_id("receiver_id", "not-a-uuid").unwrap_err();
        assert!(matches!(err, ChatError::InvalidIdentifier(ref m) if m.contains("receiver_id")));
    }
}
