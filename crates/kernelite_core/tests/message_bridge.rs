use kernelite_core::bridge::{buffer_sequence_from_host, message_from_host, BufferMode};
use kernelite_core::{
    host_value_from_message, ConversionError, Header, HostValue, Message, PubMessage, ToHostValue,
};
use serde_json::json;

fn sample_message() -> Message {
    let mut message = Message::new(
        Header::new("comm_msg", "session-1", "tester").to_value(),
        json!({"msg_id": "parent-1", "msg_type": "comm_open"}),
        json!({"comm_id": "c1", "data": {"values": [1, 2.5, "three", null, true]}}),
    );
    message.metadata = json!({"trusted": true});
    message.buffers.push(vec![0u8, 1, 2]);
    message.buffers.push(Vec::new());
    message.buffers.push(vec![255u8; 4096]);
    message
}

#[test]
fn message_round_trips_through_copied_host_value() {
    let original = sample_message();
    let host = original.to_host_owned();

    let restored = message_from_host(&host).unwrap();
    assert_eq!(restored, original);
}

#[test]
fn buffer_order_and_bytes_survive_conversion() {
    let original = sample_message();
    let host = original.to_host_view();

    let buffers = host.get("buffers").and_then(HostValue::as_array).unwrap();
    assert_eq!(buffers.len(), 3);
    assert_eq!(buffers[0].as_binary(), Some(&[0u8, 1, 2][..]));
    assert_eq!(buffers[1].as_binary(), Some(&[][..]));
    assert_eq!(buffers[2].as_binary().map(<[u8]>::len), Some(4096));

    let restored = message_from_host(&host).unwrap();
    let restored_segments: Vec<&[u8]> = restored.buffers.iter().collect();
    let original_segments: Vec<&[u8]> = original.buffers.iter().collect();
    assert_eq!(restored_segments, original_segments);
}

#[test]
fn view_and_copy_modes_describe_the_same_message() {
    let original = sample_message();
    let view = host_value_from_message(&original, BufferMode::View);
    let copy = host_value_from_message(&original, BufferMode::Copy);

    assert!(view.has_borrowed_binary());
    assert!(!copy.has_borrowed_binary());
    assert_eq!(view.into_owned(), copy);
}

#[test]
fn missing_header_or_content_is_rejected() {
    let without_header = HostValue::from_json(&json!({"content": {}}));
    assert_eq!(
        message_from_host(&without_header).unwrap_err(),
        ConversionError::MissingField("header")
    );

    let without_content = HostValue::from_json(&json!({"header": {"msg_type": "x"}}));
    assert_eq!(
        message_from_host(&without_content).unwrap_err(),
        ConversionError::MissingField("content")
    );
}

#[test]
fn failed_buffer_conversion_leaves_sequence_untouched() {
    let mut buffers = kernelite_core::BufferSequence::new();
    buffers.push(vec![9u8]);

    let host = HostValue::Array(vec![
        HostValue::binary_owned(vec![1u8]),
        HostValue::String("not bytes".to_string()),
    ]);
    let err = buffer_sequence_from_host(&mut buffers, &host).unwrap_err();

    assert!(matches!(err, ConversionError::NotBinary { index: 1, .. }));
    assert_eq!(buffers.len(), 1);
}

#[test]
fn pub_message_crosses_without_topic() {
    let message = PubMessage::new(
        "kernel.s.stream",
        Header::new("stream", "s", "u").to_value(),
        json!({}),
        json!({"name": "stdout", "text": "hi\n"}),
    );
    let host = message.to_host_owned();

    assert!(host.get("topic").is_none());
    let restored = message_from_host(&host).unwrap();
    assert_eq!(restored.msg_type(), "stream");
    assert_eq!(restored.content["text"], "hi\n");
}
