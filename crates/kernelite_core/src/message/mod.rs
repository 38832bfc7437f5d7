//! Protocol message model.
//!
//! # Responsibility
//! - Define the five-part unit exchanged between a kernel and its clients.
//! - Keep header/metadata/content as structured values so unknown keys
//!   survive every conversion.
//!
//! # Invariants
//! - `header` and `content` are always JSON objects.
//! - `parent_header` and `metadata` default to empty objects.
//! - Buffer order is significant and preserved verbatim.

pub mod buffer;
pub mod header;

pub use buffer::BufferSequence;
pub use header::{Header, PROTOCOL_VERSION};

use serde_json::{Map, Value};

/// Point-to-point protocol message (shell, control, stdin channels).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Value,
    pub parent_header: Value,
    pub metadata: Value,
    pub content: Value,
    pub buffers: BufferSequence,
}

impl Message {
    /// Builds a message with empty metadata and no buffers.
    pub fn new(header: Value, parent_header: Value, content: Value) -> Self {
        Self {
            header,
            parent_header,
            metadata: empty_object(),
            content,
            buffers: BufferSequence::new(),
        }
    }

    /// Header `msg_type`, or an empty string when the header does not carry one.
    pub fn msg_type(&self) -> &str {
        header_str(&self.header, "msg_type")
    }

    pub fn msg_id(&self) -> &str {
        header_str(&self.header, "msg_id")
    }
}

/// Broadcast message published on the iopub channel.
///
/// Shares the five-part shape of [`Message`]; `topic` is routing metadata for
/// the transport and never crosses the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PubMessage {
    pub topic: String,
    pub header: Value,
    pub parent_header: Value,
    pub metadata: Value,
    pub content: Value,
    pub buffers: BufferSequence,
}

impl PubMessage {
    pub fn new(topic: impl Into<String>, header: Value, parent_header: Value, content: Value) -> Self {
        Self {
            topic: topic.into(),
            header,
            parent_header,
            metadata: empty_object(),
            content,
            buffers: BufferSequence::new(),
        }
    }

    pub fn msg_type(&self) -> &str {
        header_str(&self.header, "msg_type")
    }
}

/// Read access to the five parts both message shapes share.
pub trait MessageParts {
    fn header(&self) -> &Value;
    fn parent_header(&self) -> &Value;
    fn metadata(&self) -> &Value;
    fn content(&self) -> &Value;
    fn buffers(&self) -> &BufferSequence;
}

impl MessageParts for Message {
    fn header(&self) -> &Value {
        &self.header
    }

    fn parent_header(&self) -> &Value {
        &self.parent_header
    }

    fn metadata(&self) -> &Value {
        &self.metadata
    }

    fn content(&self) -> &Value {
        &self.content
    }

    fn buffers(&self) -> &BufferSequence {
        &self.buffers
    }
}

impl MessageParts for PubMessage {
    fn header(&self) -> &Value {
        &self.header
    }

    fn parent_header(&self) -> &Value {
        &self.parent_header
    }

    fn metadata(&self) -> &Value {
        &self.metadata
    }

    fn content(&self) -> &Value {
        &self.content
    }

    fn buffers(&self) -> &BufferSequence {
        &self.buffers
    }
}

/// Empty JSON object, the canonical "absent" value for optional parts.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn header_str<'a>(header: &'a Value, key: &str) -> &'a str {
    header.get(key).and_then(Value::as_str).unwrap_or("")
}
