use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use uuid::Uuid;

use mozho_chat::broker::unseal;
use mozho_chat::{
    AttachmentUpload, BrokerConfig, ChatError, DiskObjectStore, MessageBroker, RoomDirectory,
    SendMessage, SendTarget,
};
use mozho_db::Database;

fn open(dir: &tempfile::TempDir) -> Arc<Database> {
    Arc::new(Database::open(&dir.path().join("mozho.db")).unwrap())
}

#[test]
fn concurrent_direct_room_creates_share_one_room() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let rooms = RoomDirectory::new(db.clone());
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let rooms = rooms.clone();
            thread::spawn(move || {
                let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
                rooms.create_direct_room(x, y).unwrap().id
            })
        })
        .collect();

    let ids: HashSet<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(rooms.list_rooms(a).unwrap().len(), 1);
    assert_eq!(rooms.list_rooms(b).unwrap().len(), 1);
}

#[test]
fn rooms_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let room_id = {
        let rooms = RoomDirectory::new(open(&dir));
        rooms.create_direct_room(a, b).unwrap().id
    };

    let rooms = RoomDirectory::new(open(&dir));
    assert_eq!(rooms.find_direct_room(b, a).unwrap().unwrap().id, room_id);
    assert_eq!(rooms.join(room_id, Uuid::new_v4()), Err(ChatError::RoomFull));
}

#[tokio::test]
async fn send_with_attachment_over_sqlite_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir);
    let objects = DiskObjectStore::new(dir.path().join("objects"), "http://localhost/objects")
        .await
        .unwrap();
    let objects = Arc::new(objects);
    let broker = MessageBroker::new(db.clone(), db, objects.clone(), BrokerConfig::default());
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let sent = broker
        .send(SendMessage {
            sender_id: alice,
            target: SendTarget::User(bob),
            plaintext: "hello".into(),
            algorithm: "AES".into(),
            provided_key: None,
            attachments: vec![AttachmentUpload {
                file_name: "doc.pdf".into(),
                bytes: Bytes::from_static(b"%PDF-1.4 tiny"),
            }],
        })
        .await
        .unwrap();

    assert_eq!(sent.attachments.len(), 1);
    let attachment = &sent.attachments[0];
    assert_eq!(attachment.mime_type, "application/pdf");
    assert!(attachment.url.starts_with("http://localhost/objects/messages/"));

    let stored = broker.message(sent.id).await.unwrap();
    assert_eq!(unseal(&stored, None).unwrap(), b"hello");

    let listed = broker.list_messages(sent.chat_room_id, 20, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].attachments.len(), 1);

    broker.mark_read(bob, sent.id).await.unwrap();
    let status = broker.status(bob, sent.id).await.unwrap();
    assert!(status.read && !status.delivered);

    broker.mark_delivered(bob, sent.id).await.unwrap();
    broker.mark_unread(bob, sent.id).await.unwrap();
    let status = broker.status(bob, sent.id).await.unwrap();
    assert!(!status.read && status.delivered);
}
