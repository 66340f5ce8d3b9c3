use std::time::Duration;

use serde_json::json;

use super::*;
use crate::models::Role;

fn store() -> MessageStore {
    MessageStore::with_refresh_ttl(Duration::from_secs(60))
}

fn complete(id: &str, content: &str) -> MessageComplete {
    MessageComplete {
        message_id: id.to_string(),
        content: content.to_string(),
        metadata: None,
        conversation_id: None,
        branch_id: None,
    }
}

fn ids(store: &MessageStore) -> Vec<&str> {
    store.messages().iter().map(|m| m.id()).collect()
}

#[test]
fn test_scenario_a_final_list() {
    let mut store = store();
    store.insert_optimistic(Message::new_optimistic("hi", vec![]));

    assert_eq!(
        store.settle(Message::new_user("m1", "hi")),
        Settlement::ReplacedTemporary(0)
    );
    store.begin_stream("m2");
    assert!(store.push_chunk(None, "Hel"));
    assert!(store.push_chunk(Some("m2"), "lo"));
    assert_eq!(store.streaming_content(), Some("Hello"));
    assert_eq!(store.len(), 1);

    assert_eq!(
        store.complete_stream(&complete("m2", "Hello")),
        Settlement::Appended(1)
    );
    assert!(!store.is_streaming());

    let messages = store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        (messages[0].id(), messages[0].role(), messages[0].content()),
        ("m1", Role::User, "hi")
    );
    assert_eq!(
        (messages[1].id(), messages[1].role(), messages[1].content()),
        ("m2", Role::Assistant, "Hello")
    );
}

#[test]
fn test_settlement_keeps_optimistic_position() {
    let mut store = store();
    store.replace_all(vec![
        Message::new_user("m0", "earlier"),
        Message::new_assistant("a0", "reply"),
    ]);
    store.insert_optimistic(Message::new_optimistic("second question", vec![]));
    store.insert_optimistic(Message::new_optimistic("third question", vec![]));

    assert_eq!(
        store.settle(Message::new_user("m3", "third question")),
        Settlement::ReplacedTemporary(3)
    );
    assert_eq!(
        store.settle(Message::new_user("m2", "second question")),
        Settlement::ReplacedTemporary(2)
    );
    assert_eq!(ids(&store), vec!["m0", "a0", "m2", "m3"]);
}

#[test]
fn test_no_double_settlement() {
    let mut store = store();
    store.insert_optimistic(Message::new_optimistic("hi", vec![]));
    store.settle(Message::new_user("m1", "hi"));
    let once = store.messages().to_vec();

    assert_eq!(
        store.settle(Message::new_user("m1", "hi")),
        Settlement::AlreadyPresent
    );
    assert_eq!(store.messages(), once.as_slice());

    store.complete_stream(&complete("m2", "Hello"));
    let once = store.messages().to_vec();
    assert_eq!(
        store.complete_stream(&complete("m2", "Hello")),
        Settlement::AlreadyPresent
    );
    assert_eq!(store.messages(), once.as_slice());
}

#[test]
fn test_settlement_without_optimistic_entry_appends() {
    let mut store = store();
    store.replace_all(vec![Message::new_user("m0", "hi")]);
    assert_eq!(
        store.settle(Message::new_user("m1", "hi")),
        Settlement::Appended(1)
    );
    assert_eq!(ids(&store), vec!["m0", "m1"]);
}

#[test]
fn test_settled_message_replaces_optimistic_wholesale() {
    let mut store = store();
    let optimistic = Message::new_optimistic("hi", vec![]);
    store.insert_optimistic(optimistic.clone());

    let confirmed = Message::new_user("m1", "hi").with_metadata(Some(json!({"tokens": 1})));
    store.settle(confirmed.clone());
    assert_eq!(store.get("m1"), Some(&confirmed));
    assert!(store.get(optimistic.id()).is_none());
}

#[test]
fn test_chunks_for_other_messages_are_dropped() {
    let mut store = store();
    assert!(!store.push_chunk(None, "orphan"));

    store.begin_stream("m2");
    assert!(!store.push_chunk(Some("m9"), "foreign"));
    assert!(store.push_chunk(Some("m2"), "ok"));
    assert_eq!(store.streaming_message_id(), Some("m2"));
    assert_eq!(store.streaming_content(), Some("ok"));
}

#[test]
fn test_discard_stream_never_commits() {
    let mut store = store();
    store.begin_stream("m2");
    store.push_chunk(None, "partial");
    assert_eq!(store.discard_stream().as_deref(), Some("partial"));
    assert!(store.is_empty());
    assert_eq!(store.streaming_content(), None);
}

#[test]
fn test_complete_stream_uses_final_text_and_metadata() {
    let mut store = store();
    store.begin_stream("m2");
    store.push_chunk(None, "Hel");
    let mut data = complete("m2", "Hello there");
    data.metadata = Some(json!({"model_id": "x"}));
    store.complete_stream(&data);

    let message = store.get("m2").expect("settled");
    assert_eq!(message.content(), "Hello there");
    assert_eq!(message.metadata(), Some(&json!({"model_id": "x"})));
}

#[test]
fn test_remove_temporary() {
    let mut store = store();
    let optimistic = Message::new_optimistic("hi", vec![]);
    store.insert_optimistic(optimistic.clone());
    store.replace_all(vec![Message::new_user("m0", "x"), optimistic.clone()]);

    assert!(store.remove_temporary("m0").is_none());
    assert_eq!(store.remove_temporary(optimistic.id()), Some(optimistic));
    assert_eq!(ids(&store), vec!["m0"]);
}

#[test]
fn test_stale_refresh_after_settlement_is_skipped_once() {
    let mut store = store();
    store.insert_optimistic(Message::new_optimistic("hi", vec![]));
    let stale_ticket = store.refresh_ticket();

    store.settle(Message::new_user("m1", "hi"));
    store.complete_stream(&complete("m2", "Hello"));

    assert_eq!(
        store.apply_refresh(stale_ticket, vec![]),
        RefreshOutcome::SkippedStale
    );
    assert_eq!(ids(&store), vec!["m1", "m2"]);

    // The guard is one-shot.
    let snapshot = vec![Message::new_user("m1", "hi")];
    assert_eq!(
        store.apply_refresh(stale_ticket, snapshot),
        RefreshOutcome::Applied
    );
    assert_eq!(ids(&store), vec!["m1"]);
}

#[test]
fn test_fresh_refresh_is_applied() {
    let mut store = store();
    store.settle(Message::new_user("m1", "hi"));
    let ticket = store.refresh_ticket();
    let snapshot = vec![
        Message::new_user("m1", "hi"),
        Message::new_assistant("m2", "Hello"),
    ];
    assert_eq!(store.apply_refresh(ticket, snapshot), RefreshOutcome::Applied);
    assert_eq!(ids(&store), vec!["m1", "m2"]);
}

#[test]
fn test_refresh_skipped_while_streaming() {
    let mut store = store();
    store.begin_stream("m2");
    let ticket = store.refresh_ticket();
    assert_eq!(
        store.apply_refresh(ticket, vec![Message::new_user("x", "y")]),
        RefreshOutcome::SkippedStreaming
    );
    assert!(store.is_empty());
}

#[test]
fn test_refresh_guard_expires() {
    let mut store = MessageStore::with_refresh_ttl(Duration::ZERO);
    let stale_ticket = store.refresh_ticket();
    store.settle(Message::new_user("m1", "hi"));
    assert_eq!(
        store.apply_refresh(stale_ticket, vec![]),
        RefreshOutcome::Applied
    );
}

#[test]
fn test_default_ttl_from_config() {
    let store = MessageStore::new();
    assert_eq!(store.guard.ttl(), Duration::from_millis(1000));
}

fn saved_conversation() -> MessageStore {
    let mut store = store();
    store.replace_all(vec![
        Message::new_user("m1", "hi"),
        Message::new_assistant("m2", "Hello"),
        Message::new_user("m3", "how are you"),
        Message::new_assistant("m4", "Fine"),
    ]);
    store
}

#[test]
fn test_require_saved() {
    let mut store = saved_conversation();
    let optimistic = Message::new_optimistic("later", vec![]);
    let temp_id = optimistic.id().to_string();
    store.insert_optimistic(optimistic);

    assert_eq!(
        store.require_saved("m3", Role::User).map(|m| m.content()),
        Ok("how are you")
    );
    assert_eq!(
        store.require_saved(&temp_id, Role::User),
        Err(ChatError::validation(
            "message is not saved yet, wait for it to be saved"
        ))
    );
    assert_eq!(
        store.require_saved("m2", Role::User),
        Err(ChatError::validation("message m2 has role assistant, expected user"))
    );
    assert!(store.require_saved("m404", Role::Assistant).is_err());
}

#[test]
fn test_apply_edit_truncates_and_appends_reply() {
    let mut store = saved_conversation();
    let ticket = store.refresh_ticket();

    assert!(store.apply_edit(
        "m1",
        Message::new_user("m1", "hi again"),
        Some(Message::new_assistant("m9", "Hello again")),
    ));
    assert_eq!(ids(&store), vec!["m1", "m9"]);
    assert_eq!(store.messages()[0].content(), "hi again");

    // A snapshot requested before the edit must not undo it.
    assert_eq!(
        store.apply_refresh(ticket, vec![]),
        RefreshOutcome::SkippedStale
    );
    assert_eq!(ids(&store), vec!["m1", "m9"]);
}

#[test]
fn test_apply_edit_without_reply() {
    let mut store = saved_conversation();
    assert!(store.apply_edit("m3", Message::new_user("m3", "and you?"), None));
    assert_eq!(ids(&store), vec!["m1", "m2", "m3"]);
    assert!(!store.apply_edit("m404", Message::new_user("m404", "x"), None));
    assert_eq!(store.len(), 3);
}

#[test]
fn test_replace_message_in_place() {
    let mut store = saved_conversation();
    assert!(store.replace_message("m2", Message::new_assistant("m2b", "Hi there")));
    assert_eq!(ids(&store), vec!["m1", "m2b", "m3", "m4"]);
    assert_eq!(store.messages()[1].content(), "Hi there");
    assert!(!store.replace_message("m2", Message::new_assistant("m2c", "again")));
}
