use serde_json::json;

use super::*;

#[test]
fn test_from_parts_dispatch_table() {
    let event = StreamEvent::from_parts(
        "conversation_created",
        json!({"conversation": {"_id": "k1", "title": "hi"}}),
    )
    .expect("parse")
    .expect("known type");
    match event {
        StreamEvent::ConversationCreated(data) => {
            assert_eq!(data.conversation.id(), "k1");
            assert_eq!(data.conversation.active_branch_id(), "main");
        }
        other => panic!("unexpected event {:?}", other),
    }

    let event = StreamEvent::from_parts(
        "message_complete",
        json!({"message_id": "m2", "content": "Hello", "metadata": {"tokens": 3}, "branch_id": "b2"}),
    )
    .expect("parse")
    .expect("known type");
    assert!(event.is_terminal());
    assert_eq!(event.kind(), "message_complete");
    if let StreamEvent::MessageComplete(data) = event {
        assert_eq!(data.branch_id.as_deref(), Some("b2"));
        assert_eq!(data.metadata, Some(json!({"tokens": 3})));
    }
}

#[test]
fn test_legacy_error_frame() {
    let event = StreamEvent::from_parts("error", json!({"message": "Conversation not found"}))
        .expect("parse")
        .expect("known type");
    assert_eq!(
        event,
        StreamEvent::MessageError(MessageError::new("Conversation not found"))
    );
    assert_eq!(event.kind(), "message_error");
}

#[test]
fn test_error_frame_with_both_texts() {
    let event = StreamEvent::from_parts(
        "error",
        json!({"error": "boom", "message": "Conversation not found", "message_id": "m2"}),
    )
    .expect("parse")
    .expect("known type");
    let StreamEvent::MessageError(data) = event else {
        panic!("unexpected event {:?}", event);
    };
    assert_eq!(data.error, "boom");
    assert_eq!(data.message_id.as_deref(), Some("m2"));

    let result = StreamEvent::from_parts("message_error", json!({"message_id": "m2"}));
    assert!(result.is_err());
}

#[test]
fn test_unknown_type_is_ignored() {
    let event = StreamEvent::from_parts("ping", json!({})).expect("parse");
    assert!(event.is_none());
}

#[test]
fn test_missing_required_field_is_error() {
    let result = StreamEvent::from_parts("message_chunk", json!({"text": "x"}));
    assert!(result.is_err());
}

#[test]
fn test_stream_request_body() {
    let request = StreamRequest::new("c1", "hi").with_conversation_id(Some("k1".to_string()));
    let value = serde_json::to_value(&request).expect("serialize");
    assert_eq!(
        value,
        json!({"conversation_id": "k1", "config_id": "c1", "message": "hi", "attachments": []})
    );
}
