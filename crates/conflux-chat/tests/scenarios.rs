// End-to-end Chat Core scenarios.

use std::sync::{Arc, Mutex};

use conflux_bus::{BusManager, NoopPublisher, OutboxStore};
use conflux_chat::{ChatError, ChatStore, NewMessage};
use conflux_core::types::{ChatType, UserId, UserRole};
use conflux_files::FilesStore;
use conflux_users::UserResolver;
use rusqlite::Connection;

fn new_store() -> (ChatStore, Arc<FilesStore>, Arc<UserResolver>) {
    let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
    {
        let c = conn.lock().unwrap();
        conflux_chat::db::init_db(&c).unwrap();
        conflux_files::db::init_db(&c).unwrap();
        conflux_bus::outbox::init_db(&c).unwrap();
        conflux_users::db::init_db(&c).unwrap();
    }
    let files = Arc::new(FilesStore::new(conn.clone(), std::env::temp_dir()));
    let outbox = Arc::new(OutboxStore::new(conn.clone(), 5));
    let bus = Arc::new(BusManager::new(Arc::new(NoopPublisher), outbox));
    let users = Arc::new(UserResolver::new(conn.clone()));
    (ChatStore::new(conn, files.clone(), bus, users.clone()), files, users)
}

#[tokio::test]
async fn offline_sync_returns_exact_seq_nums() {
    let (store, _files, _users) = new_store();
    let a = UserId::new();
    let b = UserId::new();
    let chat = store.create_chat("team", ChatType::Group, a, &[b]).unwrap();

    for i in 0..3 {
        store
            .send_message(&chat.id, a, NewMessage { content: format!("hello {i}"), ..Default::default() })
            .unwrap();
    }

    let result = store.sync_messages(&chat.id, b, 0, 100).unwrap();
    let seqs: Vec<i64> = result.messages.iter().map(|m| m.seq_num.0).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert!(!result.has_more);
}

#[tokio::test]
async fn forward_message_preserves_attachments_via_new_file_link() {
    let (store, files, _users) = new_store();
    let a = UserId::new();
    let b = UserId::new();
    let source_chat = store.create_chat("source", ChatType::Group, a, &[]).unwrap();
    let target_chat = store.create_chat("target", ChatType::Group, a, &[b]).unwrap();

    let (_file_id, link_id) = files
        .upload("report.pdf", "application/pdf", b"contents", a)
        .await
        .unwrap();

    let source_message = store
        .send_message(
            &source_chat.id,
            a,
            NewMessage { content: "see attached".to_string(), file_link_ids: vec![link_id], ..Default::default() },
        )
        .unwrap();

    let forwarded = store.forward_message(&source_message.id, &target_chat.id, a).unwrap();
    assert_eq!(forwarded.forwarded_from_message_id, Some(source_message.id));
    assert_eq!(forwarded.forwarded_from_chat_id, Some(source_chat.id));
    assert_eq!(forwarded.file_link_ids.len(), 1);
    assert_ne!(forwarded.file_link_ids[0], link_id);

    // the new link is readable by b through the target chat's read group.
    let access = files.check_access(&forwarded.file_link_ids[0], &b).unwrap();
    assert!(access >= conflux_core::types::FileAccess::Read);
}

#[tokio::test]
async fn guest_rejected_with_permission_denied() {
    let (store, _files, _users) = new_store();
    let a = UserId::new();
    let guest = UserId::new();
    let chat = store.create_chat("team", ChatType::Group, a, &[]).unwrap();

    // not a participant at all.
    let err = store
        .send_message(&chat.id, guest, NewMessage { content: "hi".to_string(), ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, ChatError::PermissionDenied(_)));
}

#[tokio::test]
async fn guest_participant_still_rejected_from_writing() {
    let (store, _files, users) = new_store();
    let a = UserId::new();
    let guest = UserId::new();
    users.upsert_user(&guest.to_string(), "guest1", "Guest One", None, UserRole::Guest).unwrap();
    let chat = store.create_chat("team", ChatType::Group, a, &[guest]).unwrap();

    let err = store
        .send_message(&chat.id, guest, NewMessage { content: "hi".to_string(), ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, ChatError::PermissionDenied(_)));
}

#[tokio::test]
async fn thread_idempotency_returns_same_row() {
    let (store, _files, _users) = new_store();
    let a = UserId::new();
    let chat = store.create_chat("team", ChatType::Group, a, &[]).unwrap();
    let msg = store
        .send_message(&chat.id, a, NewMessage { content: "root".to_string(), ..Default::default() })
        .unwrap();

    let t1 = store.create_thread(&chat.id, a, Some(msg.id), None, Some("discussion".to_string()), false).unwrap();
    let t2 = store.create_thread(&chat.id, a, Some(msg.id), None, Some("discussion".to_string()), false).unwrap();
    assert_eq!(t1.id, t2.id);
}

#[tokio::test]
async fn thread_depth_boundary_five_accepts_six_rejects() {
    let (store, _files, _users) = new_store();
    let a = UserId::new();
    let chat = store.create_chat("team", ChatType::Group, a, &[]).unwrap();

    let mut thread = store.create_thread(&chat.id, a, None, None, Some("t0".to_string()), false).unwrap();
    for depth in 1..=5 {
        thread = store
            .create_thread(&chat.id, a, None, Some(thread.id), Some(format!("t{depth}")), false)
            .unwrap();
        assert_eq!(thread.depth, depth);
    }

    let err = store
        .create_thread(&chat.id, a, None, Some(thread.id), Some("t6".to_string()), false)
        .unwrap_err();
    assert!(matches!(err, ChatError::PreconditionFailed(_)));
}
