use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encryption algorithm a message was sealed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "AES")]
    Aes,
    #[serde(rename = "RSA")]
    Rsa,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes => "AES",
            Self::Rsa => "RSA",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported encryption algorithm: {0:?}")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES" => Ok(Self::Aes),
            "RSA" => Ok(Self::Rsa),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Unordered pair of two distinct users, stored with the smaller id first.
///
/// `key()` is the value the stores put a uniqueness constraint on, so two
/// direct rooms can never be created for the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectPair {
    low: Uuid,
    high: Uuid,
}

impl DirectPair {
    /// Returns `None` when both ids are the same user.
    pub fn new(a: Uuid, b: Uuid) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    pub fn members(&self) -> [Uuid; 2] {
        [self.low, self.high]
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.low, self.high)
    }

    /// Parse a stored pair key back into a pair.
    pub fn from_key(key: &str) -> Option<Self> {
        let (a, b) = key.split_once(':')?;
        Self::new(a.parse().ok()?, b.parse().ok()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub name: Option<String>,
    pub is_group: bool,
    /// Set for direct rooms only.
    pub direct_pair: Option<DirectPair>,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn direct(pair: DirectPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            is_group: false,
            direct_pair: Some(pair),
            created_at: Utc::now(),
        }
    }

    /// Maximum number of members, `None` for group rooms.
    pub fn capacity(&self) -> Option<u64> {
        if self.is_group { None } else { Some(2) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoomMember {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub algorithm: Algorithm,
    /// AES: the base64 symmetric key used. RSA: the recipient public key PEM.
    pub key: String,
}

/// Messages are stored encrypted and never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    /// Base64 ciphertext.
    pub content: String,
    pub encryption: EncryptionMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    /// Object-store key.
    pub key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStatus {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub delivered: bool,
    pub read: bool,
    pub updated_at: DateTime<Utc>,
}
