//! Interoperability tests for the broker wire format.
//!
//! These tests pin the exact text the client puts on the wire and check that
//! frames captured from a Spring-style STOMP broker decode through the public
//! API, including when they arrive wrapped in SockJS envelopes.

use chat_core::{
    protocol::{decode_sockjs_frame, encode_sockjs_messages, SequenceCounter, SockJsFrame},
    encode_frame, ChatMessage, Command, Frame, FrameBuffer,
};
use chrono::{TimeZone, Utc};

#[test]
fn test_subscribe_frame_wire_text() {
    let ids = SequenceCounter::new();
    let frame = Frame::subscribe(&ids.next_id("sub"), "/topic/room/lobby", None);
    assert_eq!(
        encode_frame(&frame),
        "SUBSCRIBE\nid:sub-0\ndestination:/topic/room/lobby\n\n\0"
    );
}

#[test]
fn test_send_frame_wire_text_for_chat_message() {
    // Arrange
    let msg = ChatMessage::new(
        "alice",
        "hi",
        "lobby",
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    );
    let body = msg.to_json().unwrap();

    // Act
    let text = encode_frame(&Frame::send(
        "/app/sendMessage/lobby",
        "application/json",
        body.clone(),
    ));

    // Assert
    assert_eq!(
        text,
        format!(
            "SEND\ndestination:/app/sendMessage/lobby\ncontent-type:application/json\ncontent-length:{}\n\n{}\0",
            body.len(),
            body
        )
    );
}

#[test]
fn test_disconnect_frame_wire_text() {
    assert_eq!(
        encode_frame(&Frame::disconnect(Some("rcpt-9"))),
        "DISCONNECT\nreceipt:rcpt-9\n\n\0"
    );
}

#[test]
fn test_broker_connected_and_message_frames_decode_in_order() {
    // Arrange: the handshake ack and the first fan-out arrive in one chunk
    let wire = concat!(
        "CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0",
        "\n",
        "MESSAGE\ndestination:/topic/room/lobby\ncontent-type:application/json\n",
        "subscription:sub-0\nmessage-id:abc-1\ncontent-length:84\n\n",
        "{\"sender\":\"bob\",\"content\":\"hey\",\"roomId\":\"lobby\",\"timeStamp\":\"2024-05-01T10:00:00Z\"}\0",
    );
    let mut buf = FrameBuffer::new();
    buf.push(wire);

    // Act
    let connected = buf.next_frame().unwrap().unwrap();
    let message = buf.next_frame().unwrap().unwrap();

    // Assert
    assert_eq!(connected.command, Command::Connected);
    assert_eq!(connected.header("version"), Some("1.2"));
    assert_eq!(message.command, Command::Message);
    assert_eq!(message.header("subscription"), Some("sub-0"));
    let chat = ChatMessage::from_json(&message.body, "lobby").unwrap();
    assert_eq!(chat.sender(), "bob");
    assert_eq!(chat.content(), "hey");
    assert!(buf.next_frame().unwrap().is_none());
}

#[test]
fn test_sockjs_envelope_carries_stomp_frames_both_ways() {
    // Client → server: a CONNECT frame wrapped for SockJS
    let outbound = encode_sockjs_messages(&[encode_frame(&Frame::connect("chat.local"))]);
    assert!(outbound.starts_with("[\"CONNECT\\n"));
    assert!(outbound.ends_with("\\u0000\"]"));

    // Server → client: a RECEIPT frame inside an `a` envelope
    let inbound = decode_sockjs_frame("a[\"RECEIPT\\nreceipt-id:rcpt-1\\n\\n\\u0000\"]").unwrap();
    let SockJsFrame::Messages(texts) = inbound else {
        panic!("expected a message array");
    };
    let mut buf = FrameBuffer::new();
    buf.push(&texts[0]);
    let receipt = buf.next_frame().unwrap().unwrap();
    assert_eq!(receipt.command, Command::Receipt);
    assert_eq!(receipt.header("receipt-id"), Some("rcpt-1"));
}

#[test]
fn test_broker_error_frame_exposes_message_header() {
    let (frame, _) =
        chat_core::decode_frame("ERROR\nmessage:Session closed.\ncontent-length:0\n\n\0").unwrap();
    assert_eq!(frame.command, Command::Error);
    assert_eq!(frame.header("message"), Some("Session closed."));
}
