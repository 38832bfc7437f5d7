//! Kernel transport bound to the host runtime.
//!
//! # Responsibility
//! - Accept host messages, convert them through the bridge and queue them
//!   for the kernel.
//! - Hand outbound replies and broadcasts to the host listener.
//!
//! # Invariants
//! - Inbound messages are queued in arrival order.
//! - Outbound messages reach the listener as borrowed views that cannot
//!   escape the callback; the native message is dropped right after.
//! - A transport without a listener drops outbound traffic and counts it.

use crate::bridge::{message_from_host, ToHostValue};
use crate::host::{ConversionError, HostValue};
use crate::kernel::config::KernelConfig;
use crate::message::{Message, PubMessage};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

/// Logical channel a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Shell,
    Control,
    Stdin,
    Iopub,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Control => "control",
            Self::Stdin => "stdin",
            Self::Iopub => "iopub",
        }
    }

    /// Parses a channel name as used by the host.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "shell" => Some(Self::Shell),
            "control" => Some(Self::Control),
            "stdin" => Some(Self::Stdin),
            "iopub" => Some(Self::Iopub),
            _ => None,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host callback receiving outbound traffic.
pub type HostListener = Box<dyn FnMut(Channel, &HostValue<'_>) + Send>;

/// Builds the transport for a kernel on first use.
pub type ServerFactory = fn(&KernelConfig) -> Box<dyn Server>;

/// Transport contract consumed by the kernel.
pub trait Server: Send {
    fn start(&mut self);
    fn stop(&mut self);
    fn is_running(&self) -> bool;

    /// Installs the host callback for outbound traffic.
    fn set_host_listener(&mut self, listener: HostListener);

    /// Converts one inbound host message and queues it.
    fn notify_listener(
        &mut self,
        channel: Channel,
        message: &HostValue<'_>,
    ) -> Result<(), ConversionError>;

    /// Oldest queued inbound request.
    fn next_request(&mut self) -> Option<(Channel, Message)>;
    fn pending_requests(&self) -> usize;

    fn send(&mut self, channel: Channel, message: Message);
    fn publish(&mut self, message: PubMessage);
}

/// Transport whose peer is the host runtime itself.
#[derive(Default)]
pub struct HostServer {
    running: bool,
    inbox: VecDeque<(Channel, Message)>,
    listener: Option<HostListener>,
    dropped: u64,
}

impl HostServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbound messages discarded because no listener was installed.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    fn deliver(&mut self, channel: Channel, view: &HostValue<'_>, msg_type: &str) {
        match self.listener.as_mut() {
            Some(listener) => listener(channel, view),
            None => {
                self.dropped += 1;
                warn!(
                    "event=server_send module=kernel status=dropped channel={} msg_type={} reason=no_listener",
                    channel, msg_type
                );
            }
        }
    }
}

impl Server for HostServer {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn set_host_listener(&mut self, listener: HostListener) {
        self.listener = Some(listener);
    }

    fn notify_listener(
        &mut self,
        channel: Channel,
        message: &HostValue<'_>,
    ) -> Result<(), ConversionError> {
        let message = message_from_host(message).inspect_err(|err| {
            warn!(
                "event=server_notify module=kernel status=error channel={} error={}",
                channel, err
            );
        })?;
        debug!(
            "event=server_notify module=kernel status=ok channel={} msg_type={} buffers={}",
            channel,
            message.msg_type(),
            message.buffers.len()
        );
        self.inbox.push_back((channel, message));
        Ok(())
    }

    fn next_request(&mut self) -> Option<(Channel, Message)> {
        self.inbox.pop_front()
    }

    fn pending_requests(&self) -> usize {
        self.inbox.len()
    }

    fn send(&mut self, channel: Channel, message: Message) {
        let view = message.to_host_view();
        self.deliver(channel, &view, message.msg_type());
    }

    fn publish(&mut self, message: PubMessage) {
        let view = message.to_host_view();
        self.deliver(Channel::Iopub, &view, message.msg_type());
    }
}

/// Default factory: a transport bound to the host runtime.
pub fn make_host_server(_config: &KernelConfig) -> Box<dyn Server> {
    Box::new(HostServer::new())
}
