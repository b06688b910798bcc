use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mozho_crypto::{
    CryptoError, decode_symmetric_key, decrypt_asymmetric, decrypt_symmetric,
    encrypt_asymmetric, encrypt_symmetric, generate_symmetric_key,
};
use mozho_types::api::MessageResponse;
use mozho_types::models::{Algorithm, Attachment, EncryptionMetadata, Message, MessageStatus};

use crate::blocking::{run_blocking, run_blocking_write, with_timeout};
use crate::error::{ChatError, ChatResult, StoreError};
use crate::rooms::RoomDirectory;
use crate::sniff;
use crate::status::StatusTracker;
use crate::store::{MessageStore, ObjectStore, RoomStore};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Upper bound for every storage and object-store call.
    pub storage_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
        }
    }
}

/// Who a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    /// Another user; the pair's direct room is found or created.
    User(Uuid),
    /// An existing room.
    Room(Uuid),
}

impl SendTarget {
    /// Build a target from raw request fields. Exactly one must be present.
    pub fn from_parts(recipient_id: Option<&str>, room_id: Option<&str>) -> ChatResult<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }
        match (present(recipient_id), present(room_id)) {
            (Some(user), None) => Ok(Self::User(crate::parse_id("recipient_id", user)?)),
            (None, Some(room)) => Ok(Self::Room(crate::parse_id("room_id", room)?)),
            (Some(_), Some(_)) => Err(ChatError::InvalidIdentifier(
                "give either recipient_id or room_id, not both".into(),
            )),
            (None, None) => Err(ChatError::InvalidIdentifier(
                "recipient_id or room_id is required".into(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct SendMessage {
    pub sender_id: Uuid,
    pub target: SendTarget,
    pub plaintext: String,
    pub algorithm: String,
    /// AES: base64 key to use instead of a fresh one. RSA: recipient public
    /// key PEM. Blank counts as absent.
    pub provided_key: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
}

/// Encrypt `plaintext` with the named algorithm. Returns the ciphertext and
/// the metadata stored next to it.
///
/// For AES the metadata carries the symmetric key itself, so anyone who can
/// read the message row can decrypt it. Protecting that column is left to
/// the storage layer.
pub fn seal(
    algorithm: &str,
    plaintext: &str,
    provided_key: Option<&str>,
) -> ChatResult<(String, EncryptionMetadata)> {
    let algorithm: Algorithm = algorithm.parse()?;
    let provided_key = provided_key.map(str::trim).filter(|k| !k.is_empty());

    match algorithm {
        Algorithm::Aes => {
            let key = match provided_key {
                Some(key) => key.to_string(),
                None => generate_symmetric_key()?,
            };
            let raw = decode_symmetric_key(&key)?;
            let content = encrypt_symmetric(plaintext.as_bytes(), &raw)?;
            Ok((content, EncryptionMetadata { algorithm, key }))
        }
        Algorithm::Rsa => {
            let public_key = provided_key.ok_or(ChatError::MissingPublicKey)?;
            let content = encrypt_asymmetric(plaintext.as_bytes(), public_key)?;
            Ok((
                content,
                EncryptionMetadata {
                    algorithm,
                    key: public_key.to_string(),
                },
            ))
        }
    }
}

/// Recover the plaintext of a stored message. AES messages open with their
/// stored key; RSA messages need the recipient's private key.
pub fn unseal(message: &Message, private_key_pem: Option<&str>) -> ChatResult<Vec<u8>> {
    match message.encryption.algorithm {
        Algorithm::Aes => {
            let raw = decode_symmetric_key(&message.encryption.key)?;
            Ok(decrypt_symmetric(&message.content, &raw)?)
        }
        Algorithm::Rsa => {
            let private_key = private_key_pem.ok_or_else(|| {
                CryptoError::InvalidPrivateKey("RSA messages need the recipient private key".into())
            })?;
            Ok(decrypt_asymmetric(&message.content, private_key)?)
        }
    }
}

/// Object key for an upload: `messages/{message_id}/attachment/{uuid}{.ext}`.
/// The extension comes from the file name, or failing that the sniffed type.
pub fn attachment_key(message_id: Uuid, file_name: &str, mime: &mime::Mime) -> String {
    let from_name = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);
    let ext = from_name.or_else(|| sniff::extension_for(mime).map(str::to_string));

    match ext {
        Some(ext) => format!("messages/{message_id}/attachment/{}.{ext}", Uuid::new_v4()),
        None => format!("messages/{message_id}/attachment/{}", Uuid::new_v4()),
    }
}

/// Sends, lists and tracks encrypted messages.
pub struct MessageBroker<R, M, O> {
    rooms: RoomDirectory<R>,
    messages: Arc<M>,
    status: StatusTracker<M>,
    objects: Arc<O>,
    config: BrokerConfig,
}

impl<R, M, O> Clone for MessageBroker<R, M, O> {
    fn clone(&self) -> Self {
        Self {
            rooms: self.rooms.clone(),
            messages: self.messages.clone(),
            status: self.status.clone(),
            objects: self.objects.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R, M, O> MessageBroker<R, M, O>
where
    R: RoomStore,
    M: MessageStore,
    O: ObjectStore,
{
    pub fn new(rooms: Arc<R>, messages: Arc<M>, objects: Arc<O>, config: BrokerConfig) -> Self {
        Self {
            rooms: RoomDirectory::new(rooms),
            status: StatusTracker::new(messages.clone()),
            messages,
            objects,
            config,
        }
    }

    pub fn rooms(&self) -> &RoomDirectory<R> {
        &self.rooms
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub async fn send(&self, req: SendMessage) -> ChatResult<MessageResponse> {
        // Seal before touching storage so a bad key leaves nothing behind.
        let (content, encryption) =
            seal(&req.algorithm, &req.plaintext, req.provided_key.as_deref())?;

        let sender_id = req.sender_id;
        let target = req.target;
        let rooms = self.rooms.clone();
        let messages = self.messages.clone();
        let status = self.status.clone();

        let message = run_blocking_write(self.config.storage_timeout, move || {
            let room = match target {
                SendTarget::User(recipient) => rooms.create_direct_room(sender_id, recipient)?,
                SendTarget::Room(room_id) => rooms.room(room_id)?,
            };

            let message = Message {
                id: Uuid::new_v4(),
                room_id: room.id,
                sender_id,
                content,
                encryption,
                created_at: Utc::now(),
            };
            messages.insert_message(&message).map_err(|e| match e {
                StoreError::MissingReference => ChatError::RoomNotFound,
                other => other.into(),
            })?;

            let recipients: Vec<Uuid> = rooms
                .members(room.id)?
                .into_iter()
                .map(|m| m.user_id)
                .filter(|id| *id != sender_id)
                .collect();
            status.initialize(message.id, &recipients)?;
            Ok(message)
        })
        .await?;

        let mut stored = Vec::with_capacity(req.attachments.len());
        for upload in req.attachments {
            if let Some(attachment) = self.store_attachment(message.id, upload).await {
                stored.push(attachment);
            }
        }

        info!(
            message_id = %message.id,
            room_id = %message.room_id,
            sender_id = %sender_id,
            algorithm = %message.encryption.algorithm,
            attachments = stored.len(),
            "Message sent"
        );
        Ok(MessageResponse::new(message, stored))
    }

    /// Upload one attachment and record it. Failures are logged and the
    /// attachment dropped; the message itself stands.
    async fn store_attachment(&self, message_id: Uuid, upload: AttachmentUpload) -> Option<Attachment> {
        if upload.bytes.is_empty() {
            warn!(message_id = %message_id, file_name = %upload.file_name, "Skipping empty attachment");
            return None;
        }

        let mime = sniff::detect(&upload.bytes);
        let key = attachment_key(message_id, &upload.file_name, &mime);
        let put = self
            .objects
            .put(key.clone(), upload.bytes, mime.essence_str().to_string());
        let object = match with_timeout(self.config.storage_timeout, put).await {
            Ok(object) => object,
            Err(e) => {
                warn!(message_id = %message_id, key = %key, "Attachment upload failed: {}", e);
                return None;
            }
        };

        let attachment = Attachment {
            id: Uuid::new_v4(),
            message_id,
            key: object.key,
            file_name: upload.file_name,
            mime_type: mime.essence_str().to_string(),
            size: object.size,
            url: object.url,
            created_at: Utc::now(),
        };

        let messages = self.messages.clone();
        let record = attachment.clone();
        let saved = run_blocking(self.config.storage_timeout, move || {
            messages.insert_attachment(&record).map_err(ChatError::from)
        })
        .await;
        match saved {
            Ok(()) => {
                debug!(message_id = %message_id, key = %attachment.key, size = attachment.size, "Attachment stored");
                Some(attachment)
            }
            Err(e) => {
                warn!(message_id = %message_id, key = %attachment.key, "Attachment record failed: {}", e);
                None
            }
        }
    }

    /// Newest first, with attachments. `limit` is clamped to 1..=100.
    pub async fn list_messages(
        &self,
        room_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> ChatResult<Vec<MessageResponse>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let messages = self.messages.clone();

        run_blocking(self.config.storage_timeout, move || {
            let page = messages.list_messages(room_id, limit, offset)?;
            let ids: Vec<Uuid> = page.iter().map(|m| m.id).collect();

            let mut by_message: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
            for attachment in messages.attachments_for_messages(&ids)? {
                by_message
                    .entry(attachment.message_id)
                    .or_default()
                    .push(attachment);
            }

            Ok(page
                .into_iter()
                .map(|m| {
                    let attachments = by_message.remove(&m.id).unwrap_or_default();
                    MessageResponse::new(m, attachments)
                })
                .collect())
        })
        .await
    }

    /// Stored message including its encryption metadata.
    pub async fn message(&self, message_id: Uuid) -> ChatResult<Message> {
        let messages = self.messages.clone();
        run_blocking(self.config.storage_timeout, move || {
            messages.get_message(message_id)?.ok_or(ChatError::MessageNotFound)
        })
        .await
    }

    pub async fn mark_read(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        let status = self.status.clone();
        run_blocking(self.config.storage_timeout, move || status.mark_read(user_id, message_id)).await
    }

    pub async fn mark_unread(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        let status = self.status.clone();
        run_blocking(self.config.storage_timeout, move || status.mark_unread(user_id, message_id)).await
    }

    pub async fn mark_delivered(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        let status = self.status.clone();
        run_blocking(self.config.storage_timeout, move || {
            status.mark_delivered(user_id, message_id)
        })
        .await
    }

    pub async fn mark_undelivered(
        &self,
        user_id: Uuid,
        message_id: Uuid,
    ) -> ChatResult<MessageStatus> {
        let status = self.status.clone();
        run_blocking(self.config.storage_timeout, move || {
            status.mark_undelivered(user_id, message_id)
        })
        .await
    }

    pub async fn status(&self, user_id: Uuid, message_id: Uuid) -> ChatResult<MessageStatus> {
        let status = self.status.clone();
        run_blocking(self.config.storage_timeout, move || status.status(user_id, message_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mozho_crypto::encode_key;

    #[test]
    fn target_needs_exactly_one_field() {
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            SendTarget::from_parts(Some(&id), None),
            Ok(SendTarget::User(_))
        ));
        assert!(matches!(
            SendTarget::from_parts(Some(&format!("  {id} ")), Some("")),
            Ok(SendTarget::User(_))
        ));
        assert!(matches!(
            SendTarget::from_parts(Some("  "), Some(&id)),
            Ok(SendTarget::Room(_))
        ));
        assert!(matches!(
            SendTarget::from_parts(Some(&id), Some(&id)),
            Err(ChatError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            SendTarget::from_parts(None, None),
            Err(ChatError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            SendTarget::from_parts(Some("bob"), None),
            Err(ChatError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn aes_without_key_generates_one() {
        let (content, meta) = seal("AES", "hello", None).unwrap();
        assert_eq!(meta.algorithm, Algorithm::Aes);
        assert_eq!(decode_symmetric_key(&meta.key).unwrap().len(), 32);

        let raw = decode_symmetric_key(&meta.key).unwrap();
        assert_eq!(decrypt_symmetric(&content, &raw).unwrap(), b"hello");
    }

    #[test]
    fn aes_uses_the_provided_key() {
        let key = encode_key(&[9u8; 32]);
        let (_, meta) = seal("AES", "hi", Some(&key)).unwrap();
        assert_eq!(meta.key, key);

        let (_, meta) = seal("AES", "hi", Some("")).unwrap();
        assert_ne!(meta.key, key);
    }

    #[test]
    fn aes_rejects_short_and_garbled_keys() {
        let short = encode_key(&[1u8; 10]);
        assert_eq!(
            seal("AES", "x", Some(&short)).unwrap_err(),
            ChatError::Crypto(CryptoError::InvalidKeyLength { expected: 32, actual: 10 })
        );
        assert_eq!(
            seal("AES", "x", Some("***")).unwrap_err(),
            ChatError::Crypto(CryptoError::InvalidKeyEncoding)
        );
    }

    #[test]
    fn rsa_requires_a_public_key() {
        assert_eq!(seal("RSA", "x", None).unwrap_err(), ChatError::MissingPublicKey);
        assert_eq!(seal("RSA", "x", Some(" ")).unwrap_err(), ChatError::MissingPublicKey);
        assert!(matches!(
            seal("RSA", "x", Some("not a pem")),
            Err(ChatError::Crypto(CryptoError::InvalidPublicKey(_)))
        ));
    }

    #[test]
    fn unknown_algorithms_are_rejected() {
        for name in ["DES", "aes", ""] {
            assert_eq!(
                seal(name, "x", None).unwrap_err(),
                ChatError::UnsupportedAlgorithm(name.to_string())
            );
        }
    }

    #[test]
    fn attachment_keys_are_namespaced_by_message() {
        let id = Uuid::new_v4();
        let key = attachment_key(id, "Photo.JPG", &mime::IMAGE_JPEG);
        assert!(key.starts_with(&format!("messages/{id}/attachment/")));
        assert!(key.ends_with(".jpg"));

        let key = attachment_key(id, "README", &mime::TEXT_PLAIN_UTF_8);
        assert!(key.ends_with(".txt"));

        let key = attachment_key(id, "blob", &mime::APPLICATION_OCTET_STREAM);
        assert!(!key.rsplit('/').next().unwrap().contains('.'));
    }
}
