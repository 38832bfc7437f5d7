//! Reply and broadcast emission for one request being handled.

use crate::kernel::server::{Channel, Server};
use crate::message::{BufferSequence, Header, Message, PubMessage};
use serde_json::{json, Value};

/// Emits messages parented to the request currently being handled.
///
/// Interpreters receive one to publish streams, results and display data.
pub struct Publisher<'k> {
    server: &'k mut dyn Server,
    session: &'k str,
    username: &'k str,
    parent_header: &'k Value,
    last_result: Option<Value>,
}

impl<'k> Publisher<'k> {
    pub(crate) fn new(
        server: &'k mut dyn Server,
        session: &'k str,
        username: &'k str,
        parent_header: &'k Value,
    ) -> Self {
        Self {
            server,
            session,
            username,
            parent_header,
            last_result: None,
        }
    }

    pub fn publish(&mut self, msg_type: &str, content: Value) {
        self.publish_with_buffers(msg_type, content, BufferSequence::new());
    }

    pub fn publish_with_buffers(&mut self, msg_type: &str, content: Value, buffers: BufferSequence) {
        let header = Header::new(msg_type, self.session, self.username).to_value();
        let mut message = PubMessage::new(
            format!("kernel.{}.{}", self.session, msg_type),
            header,
            self.parent_header.clone(),
            content,
        );
        message.buffers = buffers;
        self.server.publish(message);
    }

    pub fn publish_stream(&mut self, name: &str, text: &str) {
        self.publish("stream", json!({"name": name, "text": text}));
    }

    /// Publishes `execute_result`; the `text/plain` entry is kept for history.
    pub fn publish_execution_result(&mut self, execution_count: u32, data: Value, metadata: Value) {
        self.last_result = Some(data.clone());
        self.publish(
            "execute_result",
            json!({"execution_count": execution_count, "data": data, "metadata": metadata}),
        );
    }

    pub fn publish_display_data(&mut self, data: Value, metadata: Value, transient: Value) {
        self.publish(
            "display_data",
            json!({"data": data, "metadata": metadata, "transient": transient}),
        );
    }

    pub(crate) fn publish_status(&mut self, execution_state: &str) {
        self.publish("status", json!({"execution_state": execution_state}));
    }

    pub(crate) fn publish_execute_input(&mut self, code: &str, execution_count: u32) {
        self.publish(
            "execute_input",
            json!({"code": code, "execution_count": execution_count}),
        );
    }

    pub(crate) fn publish_error(&mut self, ename: &str, evalue: &str, traceback: &[String]) {
        self.publish(
            "error",
            json!({"ename": ename, "evalue": evalue, "traceback": traceback}),
        );
    }

    /// Sends a reply on `channel`, parented to the current request.
    pub(crate) fn reply(&mut self, channel: Channel, msg_type: &str, content: Value) {
        let header = Header::new(msg_type, self.session, self.username).to_value();
        let message = Message::new(header, self.parent_header.clone(), content);
        self.server.send(channel, message);
    }

    pub(crate) fn stop_server(&mut self) {
        self.server.stop();
    }

    /// Plain-text rendering of the last published result, if any.
    pub(crate) fn take_result_text(&mut self) -> Option<String> {
        let data = self.last_result.take()?;
        match data.get("text/plain") {
            Some(Value::String(text)) => Some(text.clone()),
            _ => Some(data.to_string()),
        }
    }
}
