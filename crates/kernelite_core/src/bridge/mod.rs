//! Message bridge between native protocol messages and host values.
//!
//! # Responsibility
//! - Convert host key/value objects into [`Message`] values by field name.
//! - Convert [`Message`] and [`PubMessage`] into host value graphs.
//! - Move buffer sequences across the boundary without touching their bytes.
//!
//! # Invariants
//! - Buffer order and byte content survive both directions.
//! - A failed conversion commits nothing: no partial message, no partially
//!   appended buffer sequence.
//! - `BufferMode::View` output borrows the source message; the borrow checker
//!   rejects any use after the message is dropped or mutated.

use crate::host::{ConversionError, HostValue};
use crate::message::{empty_object, BufferSequence, Message, MessageParts};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

pub const FIELD_HEADER: &str = "header";
pub const FIELD_PARENT_HEADER: &str = "parent_header";
pub const FIELD_METADATA: &str = "metadata";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_BUFFERS: &str = "buffers";

/// How binary segments are handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Duplicate every segment into host-owned storage.
    Copy,
    /// Hand out zero-copy views; the result borrows the message.
    View,
}

/// Appends every binary element of `buffers` to `out`, in index order.
///
/// # Errors
/// - `NotAnArray` when `buffers` is not an indexed collection.
/// - `NotBinary` when any element is not binary; `out` is left untouched.
pub fn buffer_sequence_from_host(
    out: &mut BufferSequence,
    buffers: &HostValue<'_>,
) -> Result<(), ConversionError> {
    let items = buffers.as_array().ok_or(ConversionError::NotAnArray {
        found: buffers.kind(),
    })?;

    let mut staged = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let bytes = item.as_binary().ok_or(ConversionError::NotBinary {
            index,
            found: item.kind(),
        })?;
        staged.push(bytes.to_vec());
    }

    out.extend(staged);
    Ok(())
}

/// Reads the five message fields by name from a host object.
///
/// Absent or `null` optional fields (`parent_header`, `metadata`, `buffers`)
/// map to their empty representation.
///
/// # Errors
/// - `NotAnObject` when `value` is not a key/value object.
/// - `MissingField` when `header` or `content` is absent or `null`.
/// - `InvalidField` when a structured field is not an object.
/// - Any buffer conversion error.
pub fn message_from_host(value: &HostValue<'_>) -> Result<Message, ConversionError> {
    if !matches!(value, HostValue::Object(_)) {
        return Err(ConversionError::NotAnObject {
            found: value.kind(),
        });
    }

    let header = required_object(value, FIELD_HEADER)?;
    let content = required_object(value, FIELD_CONTENT)?;
    let parent_header = optional_object(value, FIELD_PARENT_HEADER)?;
    let metadata = optional_object(value, FIELD_METADATA)?;

    let mut buffers = BufferSequence::new();
    if let Some(raw) = value.get(FIELD_BUFFERS).filter(|raw| !raw.is_null()) {
        buffer_sequence_from_host(&mut buffers, raw)?;
    }

    Ok(Message {
        header,
        parent_header,
        metadata,
        content,
        buffers,
    })
}

/// Builds the host value graph for either message shape.
///
/// With `BufferMode::View` the returned graph borrows `message`.
pub fn host_value_from_message<'m, M>(message: &'m M, mode: BufferMode) -> HostValue<'m>
where
    M: MessageParts + ?Sized,
{
    let buffers = message
        .buffers()
        .iter()
        .map(|segment| match mode {
            BufferMode::Copy => HostValue::Binary(Cow::Owned(segment.to_vec())),
            BufferMode::View => HostValue::Binary(Cow::Borrowed(segment)),
        })
        .collect();

    let mut fields = BTreeMap::new();
    fields.insert(FIELD_HEADER.to_string(), HostValue::from_json(message.header()));
    fields.insert(
        FIELD_PARENT_HEADER.to_string(),
        HostValue::from_json(message.parent_header()),
    );
    fields.insert(FIELD_METADATA.to_string(), HostValue::from_json(message.metadata()));
    fields.insert(FIELD_CONTENT.to_string(), HostValue::from_json(message.content()));
    fields.insert(FIELD_BUFFERS.to_string(), HostValue::Array(buffers));
    HostValue::Object(fields)
}

/// Host conversion shortcuts for every message shape.
pub trait ToHostValue: MessageParts {
    /// Detached host value; safe to keep after the message is gone.
    fn to_host_owned(&self) -> HostValue<'static> {
        host_value_from_message(self, BufferMode::Copy).into_owned()
    }

    /// Zero-copy host value, valid while `self` is borrowed.
    fn to_host_view(&self) -> HostValue<'_> {
        host_value_from_message(self, BufferMode::View)
    }
}

impl<T: MessageParts + ?Sized> ToHostValue for T {}

fn required_object(value: &HostValue<'_>, field: &'static str) -> Result<Value, ConversionError> {
    match value.get(field) {
        None | Some(HostValue::Null) => Err(ConversionError::MissingField(field)),
        Some(raw) => object_field(raw, field),
    }
}

fn optional_object(value: &HostValue<'_>, field: &'static str) -> Result<Value, ConversionError> {
    match value.get(field) {
        None | Some(HostValue::Null) => Ok(empty_object()),
        Some(raw) => object_field(raw, field),
    }
}

fn object_field(raw: &HostValue<'_>, field: &'static str) -> Result<Value, ConversionError> {
    if !matches!(raw, HostValue::Object(_)) {
        return Err(ConversionError::InvalidField {
            field,
            expected: "an object",
            found: raw.kind(),
        });
    }
    raw.to_json_at(field)
}

#[cfg(test)]
mod tests {
    use super::{buffer_sequence_from_host, message_from_host, ToHostValue};
    use crate::host::{ConversionError, HostValue};
    use crate::message::{BufferSequence, Header, Message, PubMessage};
    use serde_json::json;

    fn sample_message() -> Message {
        let mut message = Message::new(
            Header::new("comm_msg", "session", "user").to_value(),
            json!({}),
            json!({"comm_id": "c1", "data": {"x": 1}}),
        );
        message.buffers.push(vec![0u8, 159, 146, 150]);
        message
    }

    #[test]
    fn buffer_conversion_appends_instead_of_replacing() {
        let mut out = BufferSequence::from(vec![vec![1u8]]);
        let host = HostValue::Array(vec![
            HostValue::binary_owned(vec![2u8]),
            HostValue::binary_owned(vec![3u8, 4]),
        ]);

        buffer_sequence_from_host(&mut out, &host).expect("binary array converts");
        assert_eq!(out.len(), 3);
        assert_eq!(out.get(2), Some(&[3u8, 4][..]));
    }

    #[test]
    fn buffer_conversion_rejects_text_without_partial_append() {
        let mut out = BufferSequence::new();
        let host = HostValue::Array(vec![
            HostValue::binary_owned(vec![2u8]),
            HostValue::from("not bytes"),
        ]);

        let err = buffer_sequence_from_host(&mut out, &host).expect_err("text is not binary");
        assert_eq!(
            err,
            ConversionError::NotBinary {
                index: 1,
                found: "string"
            }
        );
        assert!(out.is_empty());
    }

    #[test]
    fn view_and_copy_produce_equal_graphs() {
        let message = sample_message();
        let view = message.to_host_view();
        let owned = message.to_host_owned();

        assert!(view.has_borrowed_binary());
        assert!(!owned.has_borrowed_binary());
        assert_eq!(view, owned);
    }

    #[test]
    fn pub_message_converts_without_topic() {
        let mut message = PubMessage::new(
            "kernel.s.stream",
            Header::new("stream", "s", "u").to_value(),
            json!({}),
            json!({"name": "stdout", "text": "hi"}),
        );
        message.buffers.push(vec![5u8]);

        let host = message.to_host_owned();
        assert!(host.get("topic").is_none());
        assert_eq!(
            host.get("content").and_then(|c| c.get("text")).and_then(HostValue::as_str),
            Some("hi")
        );
    }

    #[test]
    fn optional_fields_default_to_empty() {
        let host = HostValue::from_json(&json!({
            "header": {"msg_type": "kernel_info_request"},
            "content": {},
        }));
        let message = message_from_host(&host).expect("minimal message converts");
        assert_eq!(message.parent_header, json!({}));
        assert_eq!(message.metadata, json!({}));
        assert!(message.buffers.is_empty());
    }

    #[test]
    fn non_object_header_is_malformed() {
        let host = HostValue::from_json(&json!({
            "header": "oops",
            "content": {},
        }));
        let err = message_from_host(&host).expect_err("string header must fail");
        assert!(matches!(
            err,
            ConversionError::InvalidField {
                field: "header",
                ..
            }
        ));
    }
}
