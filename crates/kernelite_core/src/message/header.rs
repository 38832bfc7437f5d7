//! Protocol message header builder.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Messaging protocol version stamped on every header built by this crate.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Envelope metadata for one protocol message.
///
/// Messages keep their header as structured data; this type only builds the
/// headers the kernel emits itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: String,
    pub msg_type: String,
    /// RFC 3339 UTC timestamp with microsecond precision.
    pub date: String,
    pub session: String,
    pub username: String,
    pub version: String,
}

impl Header {
    /// Builds a header with a fresh message id and the current time.
    pub fn new(
        msg_type: impl Into<String>,
        session: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            msg_type: msg_type.into(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            session: session.into(),
            username: username.into(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "msg_id": self.msg_id,
            "msg_type": self.msg_type,
            "date": self.date,
            "session": self.session,
            "username": self.username,
            "version": self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, PROTOCOL_VERSION};

    #[test]
    fn new_header_has_unique_id_and_protocol_version() {
        let first = Header::new("status", "session-a", "alice");
        let second = Header::new("status", "session-a", "alice");

        assert_ne!(first.msg_id, second.msg_id);
        assert_eq!(first.version, PROTOCOL_VERSION);
        assert!(first.date.ends_with('Z'));
    }

    #[test]
    fn to_value_exposes_wire_field_names() {
        let header = Header::new("execute_reply", "session-b", "bob");
        let value = header.to_value();

        assert_eq!(value["msg_type"], "execute_reply");
        assert_eq!(value["session"], "session-b");
        assert_eq!(value["username"], "bob");
        assert_eq!(value["msg_id"], header.msg_id.as_str());
    }
}
