//! Integration tests for the lexibot-store crate.
//!
//! These tests exercise the full persistence layout the bot relies on —
//! `state.json`, `data/data-<id>.json` and `history/hist-<id>.csv` under one
//! storage root — against a real filesystem (via tempfile).

use std::sync::Arc;

use serde_json::{json, Map};

use lexibot_store::{
    state_id, AnalyticsEvent, ChatStateStore, DiskAdapter, History, HistoryEvent, HistoryPatch,
    NameTemplate, ShardedStore, FIELD_IS_ACTIVE,
};

// ═══════════════════════════════════════════════════════════════════════
//  First boot
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn first_boot_creates_the_full_layout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let adapter = Arc::new(DiskAdapter::new());

    let state = ChatStateStore::open(adapter.clone(), root).await.unwrap();
    let files = ShardedStore::open(
        adapter.clone(),
        root.join("data"),
        NameTemplate::parse("data-$[id].json").unwrap(),
    )
    .await
    .unwrap();
    let history = History::open(adapter, root.join("history")).await.unwrap();

    assert!(root.join("state.json").exists());
    assert!(root.join("data").is_dir());
    assert!(root.join("history").is_dir());

    // Nothing is known about a chat nobody wrote to.
    assert!(state.get(FIELD_IS_ACTIVE, "chat1").is_none());
    assert!(files.get("files", Some("chat1")).is_none());
    assert!(history.get_all(Some("chat1")).await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════
//  A conversation's life, end to end
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn start_answer_stop_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let adapter = Arc::new(DiskAdapter::new());

    let state = ChatStateStore::open(adapter.clone(), root).await.unwrap();
    let history = History::open(adapter, root.join("history")).await.unwrap();

    let id = state_id("7", "42");

    // /start: activate the chat and remember who is talking.
    let mut active = Map::new();
    active.insert(FIELD_IS_ACTIVE.into(), json!(true));
    let mut user = Map::new();
    user.insert("user".into(), json!({"id": 7, "name": "A"}));
    assert!(state.update_items_by_meta(vec![active, user], &id).await);
    assert!(history.log_event(1, &id, AnalyticsEvent::Start, None, None).await);

    assert_eq!(state.get(FIELD_IS_ACTIVE, &id), Some(json!(true)));
    assert_eq!(state.get("user", &id), Some(json!({"id": 7, "name": "A"})));

    // A card answer gets logged with word and answer.
    let answer = HistoryEvent::new(2, &id, "ANSWER", Some("Haus".into()), Some("house".into()));
    assert!(history.add(&answer, Some(id.as_str())).await);

    // /stop: archive, the record stays around.
    assert!(state.archive(&id).await);
    assert!(history.log_event(3, &id, AnalyticsEvent::Stop, None, None).await);

    assert_eq!(state.get(FIELD_IS_ACTIVE, &id), Some(json!(false)));
    assert_eq!(state.get("user", &id), Some(json!({"id": 7, "name": "A"})));

    let events = history.get_all(Some(id.as_str())).await.unwrap();
    assert_eq!(
        events.iter().map(|e| e.event_type.as_str()).collect::<Vec<_>>(),
        vec!["START", "ANSWER", "STOP"]
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Restart durability
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn everything_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let id = state_id("7", "42");

    {
        let adapter = Arc::new(DiskAdapter::new());
        let state = ChatStateStore::open(adapter.clone(), root).await.unwrap();
        let files = ShardedStore::open(
            adapter.clone(),
            root.join("data"),
            NameTemplate::parse("data-$[id].json").unwrap(),
        )
        .await
        .unwrap();
        let history = History::open(adapter, root.join("history")).await.unwrap();

        state.update_item(FIELD_IS_ACTIVE, json!(true), &id).await;
        state.set_pending_command(&id, "/word").await;
        files
            .update_item("files", json!({"voc.csv": "file-id-1"}), Some(id.as_str()))
            .await;
        history.log_event(1, &id, AnalyticsEvent::Start, None, None).await;
    }

    let adapter = Arc::new(DiskAdapter::new());
    let state = ChatStateStore::open(adapter.clone(), root).await.unwrap();
    let files = ShardedStore::open(
        adapter.clone(),
        root.join("data"),
        NameTemplate::parse("data-$[id].json").unwrap(),
    )
    .await
    .unwrap();
    let history = History::open(adapter, root.join("history")).await.unwrap();

    // The pending command came back from disk, not process memory.
    assert_eq!(state.pending_command(&id).as_deref(), Some("/word"));
    assert_eq!(state.get(FIELD_IS_ACTIVE, &id), Some(json!(true)));
    assert_eq!(
        files.get("files", Some(id.as_str())),
        Some(json!({"voc.csv": "file-id-1"}))
    );
    let events = history.get_all(Some(id.as_str())).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "START");
}

// ═══════════════════════════════════════════════════════════════════════
//  Cross-store registration (two independent single-shard writes)
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn registering_a_chat_under_both_subjects() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(DiskAdapter::new());
    let files = ShardedStore::open(
        adapter,
        dir.path().join("data"),
        NameTemplate::parse("data-$[id].json").unwrap(),
    )
    .await
    .unwrap();

    let user_key = state_id("7", "7");
    let chat_key = state_id("7", "42");

    // The user's shard lists its chats, the chat's shard lists its users.
    let mut chats = files
        .get("chats", Some(user_key.as_str()))
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    chats.insert("42".into(), json!(true));
    assert!(files.update_item("chats", json!(chats), Some(user_key.as_str())).await);

    let mut users = files
        .get("users", Some(chat_key.as_str()))
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    users.insert("7".into(), json!(true));
    assert!(files.update_item("users", json!(users), Some(chat_key.as_str())).await);

    assert_eq!(files.get("chats", Some(user_key.as_str())), Some(json!({"42": true})));
    assert_eq!(files.get("users", Some(chat_key.as_str())), Some(json!({"7": true})));
    assert!(dir.path().join("data").join("data-7_7.json").exists());
    assert!(dir.path().join("data").join("data-42_7.json").exists());
}

// ═══════════════════════════════════════════════════════════════════════
//  Ledger corrective rewrite
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn ledger_update_marks_a_row_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(DiskAdapter::new());
    let history = History::open(adapter, dir.path().join("history"))
        .await
        .unwrap();

    for i in 1..=3 {
        let event = HistoryEvent::new(i, "chat1", "ANSWER", Some(format!("w{i}")), None);
        assert!(history.add(&event, Some("chat1")).await);
    }

    let patch = HistoryPatch {
        date_delete: Some(chrono::Utc::now()),
        ..Default::default()
    };
    assert!(history.update(2, &patch, Some("chat1")).await);

    let all = history.get_all(Some("chat1")).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].date_delete.is_none());
    assert!(all[1].date_delete.is_some());
    assert!(all[1].date_edit.is_some());
    assert!(all[2].date_delete.is_none());

    let deleted = history
        .get_by_filter(|e| e.date_delete.is_some(), Some("chat1"))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, 2);
}
