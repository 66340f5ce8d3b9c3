use serde_json::json;

use super::*;

const SCENARIO: &str = concat!(
    "event: conversation_created\n",
    "data: {\"conversation\": {\"_id\": \"k1\", \"title\": \"hi\"}}\n\n",
    "event: message_saved\n",
    "data: {\"message\": {\"_id\": \"m1\", \"role\": \"user\", \"content\": \"hi\"}}\n\n",
    "event: message_start\n",
    "data: {\"message_id\": \"m2\"}\n\n",
    "event: message_chunk\n",
    "data: {\"content\": \"Hel\"}\n\n",
    "event: message_chunk\n",
    "data: {\"content\": \"lo\"}\n\n",
    "event: message_complete\n",
    "data: {\"message_id\": \"m2\", \"content\": \"Hello\"}\n\n",
);

fn decode_in_pieces(input: &str, boundaries: &[usize]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = vec![];
    let mut last = 0;
    for &pos in boundaries {
        frames.extend(decoder.feed(&input[last..pos]));
        last = pos;
    }
    frames.extend(decoder.feed(&input[last..]));
    frames.extend(decoder.flush());
    frames
}

#[test]
fn test_feed_single_chunk() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed(SCENARIO);
    assert_eq!(frames.len(), 6);
    assert_eq!(frames[0].kind, "conversation_created");
    assert_eq!(frames[0].data["conversation"]["_id"], "k1");
    assert_eq!(frames[3], Frame::new("message_chunk", json!({"content": "Hel"})));
    assert_eq!(frames[5].kind, "message_complete");
    assert!(decoder.flush().is_empty());
    assert!(!decoder.truncated());
}

#[test]
fn test_frame_boundary_idempotence() {
    let whole = decode_in_pieces(SCENARIO, &[]);
    assert_eq!(whole.len(), 6);

    // Every single split point, including ones inside "\n\n" and inside keys.
    for pos in 1..SCENARIO.len() {
        assert_eq!(
            decode_in_pieces(SCENARIO, &[pos]),
            whole,
            "split at {} changed the frames",
            pos
        );
    }

    // Byte-by-byte.
    let every: Vec<usize> = (1..SCENARIO.len()).collect();
    assert_eq!(decode_in_pieces(SCENARIO, &every), whole);

    // A few uneven multi-way splits.
    assert_eq!(decode_in_pieces(SCENARIO, &[3, 40, 41, 42, 150, 151]), whole);
}

#[test]
fn test_partial_frame_held_until_next_feed() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed("event: message_chunk\ndata: {\"content\":");
    assert!(frames.is_empty());
    assert!(decoder.has_pending());

    let frames = decoder.feed(" \"abc\"}\n\nevent: message_chunk\n");
    assert_eq!(frames, vec![Frame::new("message_chunk", json!({"content": "abc"}))]);
    assert!(decoder.has_pending());
}

#[test]
fn test_multiple_data_lines_are_joined() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed("event: message_complete\ndata: {\"message_id\": \"m2\",\ndata: \"content\": \"Hello\"}\n\n");
    assert_eq!(
        frames,
        vec![Frame::new(
            "message_complete",
            json!({"message_id": "m2", "content": "Hello"})
        )]
    );
}

#[test]
fn test_malformed_json_is_skipped() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed(concat!(
        "event: message_chunk\ndata: {\"content\": \"a\"}\n\n",
        "event: message_chunk\ndata: {not json}\n\n",
        "event: message_chunk\ndata: {\"content\": \"b\"}\n\n",
    ));
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data["content"], "a");
    assert_eq!(frames[1].data["content"], "b");
}

#[test]
fn test_comments_and_unused_fields_ignored() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed(": keep-alive\n\nid: 7\nretry: 100\nevent: title_updated\ndata: {\"conversation_id\": \"k1\", \"title\": \"T\"}\n\n");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, "title_updated");
}

#[test]
fn test_crlf_line_endings() {
    let input = "event: message_start\r\ndata: {\"message_id\": \"m2\"}\r\n\r\n";
    let whole = decode_in_pieces(input, &[]);
    assert_eq!(whole, vec![Frame::new("message_start", json!({"message_id": "m2"}))]);
    for pos in 1..input.len() {
        assert_eq!(decode_in_pieces(input, &[pos]), whole);
    }
}

#[test]
fn test_missing_event_defaults_to_message() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed("data: {\"x\": 1}\n\n");
    assert_eq!(frames, vec![Frame::new("message", json!({"x": 1}))]);
}

#[test]
fn test_flush_yields_terminated_trailing_frame() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.feed("event: title_updated\ndata: {\"conversation_id\": \"k1\", \"title\": \"T\"}\n").is_empty());
    let frames = decoder.flush();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].kind, "title_updated");
    assert!(!decoder.truncated());
}

#[test]
fn test_flush_discards_unterminated_frame() {
    let mut decoder = FrameDecoder::new();
    let frames = decoder.feed("event: message_chunk\ndata: {\"content\": \"a\"}\n\nevent: message_chunk\ndata: {\"cont");
    assert_eq!(frames.len(), 1);
    assert!(decoder.flush().is_empty());
    assert!(decoder.truncated());
    assert!(!decoder.has_pending());
}

#[test]
fn test_flush_ignores_trailing_comment() {
    let mut decoder = FrameDecoder::new();
    decoder.feed(": ping\n");
    assert!(decoder.flush().is_empty());
    assert!(!decoder.truncated());
}

#[test]
fn test_feed_bytes_split_utf8() {
    let input = "event: message_chunk\ndata: {\"content\": \"héllo ✓\"}\n\n".as_bytes();
    let whole = {
        let mut decoder = FrameDecoder::new();
        decoder.feed_bytes(input)
    };
    assert_eq!(whole[0].data["content"], "héllo ✓");

    for pos in 1..input.len() {
        let mut decoder = FrameDecoder::new();
        let mut frames = decoder.feed_bytes(&input[..pos]);
        frames.extend(decoder.feed_bytes(&input[pos..]));
        frames.extend(decoder.flush());
        assert_eq!(frames, whole, "split at byte {}", pos);
    }
}

#[test]
fn test_reset_drops_buffer_silently() {
    let mut decoder = FrameDecoder::new();
    decoder.feed("event: message_chunk\ndata: {\"con");
    decoder.reset();
    assert!(!decoder.has_pending());
    assert!(decoder.flush().is_empty());
    assert!(!decoder.truncated());
}
