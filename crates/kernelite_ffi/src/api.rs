//! FFI use-case API for host-runtime calls.
//!
//! # Responsibility
//! - Expose kernel lifecycle, archive extraction and exception lookup to the
//!   host through FRB sync calls.
//! - Carry protocol messages as JSON strings plus raw byte buffers.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Failures come back as envelopes carrying a message and, where a native
//!   error exists, an exception handle resolvable via `get_exception_message`.

use kernelite_core::error_registry::{
    get_exception_message as get_exception_message_inner,
    release_exception as release_exception_inner, register_exception,
};
use kernelite_core::{
    core_version as core_version_inner, extract, init_logging as init_logging_inner,
    make_kernel, make_parameterized_kernel, ping as ping_inner, Channel, EchoInterpreter,
    HostValue, KernelHandle, KernelState,
};
use log::warn;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Idempotent for the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Readable message for an exception handle returned by a failed call.
#[flutter_rust_bridge::frb(sync)]
pub fn get_exception_message(handle: i64) -> String {
    get_exception_message_inner(handle)
}

/// Frees an exception handle; returns whether it was live.
#[flutter_rust_bridge::frb(sync)]
pub fn release_exception(handle: i64) -> bool {
    release_exception_inner(handle)
}

/// Result envelope for archive extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResponse {
    pub ok: bool,
    pub message: String,
    /// `open|header_read|header_write|body_copy|entry_finish` on failure.
    pub error_kind: Option<String>,
    pub exception_handle: Option<i64>,
    pub entries: u64,
    pub files: u64,
    pub bytes_written: u64,
}

/// Extracts a `.tar.gz` archive into `target_dir`.
///
/// # FFI contract
/// - Sync call; performs file-system work proportional to archive size.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn extract_archive(archive_path: String, target_dir: String) -> ArchiveResponse {
    match extract(archive_path.trim(), target_dir.trim()) {
        Ok(summary) => ArchiveResponse {
            ok: true,
            message: format!("Extracted {} entries.", summary.entries),
            error_kind: None,
            exception_handle: None,
            entries: summary.entries,
            files: summary.files,
            bytes_written: summary.bytes_written,
        },
        Err(err) => ArchiveResponse {
            ok: false,
            message: err.to_string(),
            error_kind: Some(err.kind().as_str().to_string()),
            exception_handle: Some(register_exception(&err)),
            entries: 0,
            files: 0,
            bytes_written: 0,
        },
    }
}

/// One protocol message as seen by the host.
///
/// Structured fields are JSON documents; `buffers` keep their order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMessage {
    /// `shell|control|stdin|iopub`.
    pub channel: String,
    pub header: String,
    pub parent_header: String,
    pub metadata: String,
    pub content: String,
    pub buffers: Vec<Vec<u8>>,
}

/// Generic action envelope for kernel calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelActionResponse {
    pub ok: bool,
    pub message: String,
    pub exception_handle: Option<i64>,
    /// Requests handled by `process_pending`; zero for other calls.
    pub processed: u32,
}

impl KernelActionResponse {
    fn success(message: impl Into<String>, processed: u32) -> Self {
        Self {
            ok: true,
            message: message.into(),
            exception_handle: None,
            processed,
        }
    }

    fn failure(action: &str, err: &(dyn Error + 'static)) -> Self {
        Self {
            ok: false,
            message: format!("{action} failed: {err}"),
            exception_handle: Some(register_exception(err)),
            processed: 0,
        }
    }

    fn rejected(action: &str, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: format!("{action} failed: {}", reason.into()),
            exception_handle: None,
            processed: 0,
        }
    }
}

/// Transport snapshot for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// `created|running|shut_down`.
    pub state: String,
    pub running: bool,
    pub pending: u32,
    pub outbound: u32,
    pub execution_count: u32,
}

/// Kernel construction envelope.
pub struct KernelCreateResponse {
    pub kernel: Option<HostKernel>,
    pub message: String,
    pub exception_handle: Option<i64>,
}

/// Kernel owned by the host, with its outbound traffic queued for polling.
///
/// Every call takes `&mut self`; the opaque wrapper serializes host access.
#[flutter_rust_bridge::frb(opaque)]
pub struct HostKernel {
    /// Only reached through `Mutex::get_mut`, so it is never locked. The
    /// wrapper makes the handle `Sync` despite the `!Sync` history store.
    kernel: Mutex<KernelHandle>,
    outbound: VecDeque<HostMessage>,
}

impl HostKernel {
    /// Creates an echo kernel with default configuration.
    #[flutter_rust_bridge::frb(sync)]
    pub fn create() -> KernelCreateResponse {
        Self::wrap(make_kernel::<EchoInterpreter>())
    }

    /// Creates an echo kernel configured with the JSON document `parameters`.
    #[flutter_rust_bridge::frb(sync)]
    pub fn create_parameterized(parameters: String) -> KernelCreateResponse {
        match serde_json::from_str::<Value>(&parameters) {
            Ok(parameters) => Self::wrap(make_parameterized_kernel::<EchoInterpreter>(parameters)),
            Err(err) => KernelCreateResponse {
                kernel: None,
                message: format!("create_parameterized failed: {err}"),
                exception_handle: Some(register_exception(&err)),
            },
        }
    }

    #[flutter_rust_bridge::frb(sync)]
    pub fn start(&mut self) -> KernelActionResponse {
        self.pump(|kernel| match kernel.start() {
            Ok(()) => KernelActionResponse::success("Kernel started.", 0),
            Err(err) => KernelActionResponse::failure("start", &err),
        })
    }

    /// Queues one inbound host message for the kernel.
    #[flutter_rust_bridge::frb(sync)]
    pub fn notify_listener(&mut self, message: HostMessage) -> KernelActionResponse {
        let Some(channel) = Channel::parse(&message.channel) else {
            return KernelActionResponse::rejected(
                "notify_listener",
                format!("unknown channel `{}`", message.channel),
            );
        };
        let value = match host_value_from_envelope(&message) {
            Ok(value) => value,
            Err(err) => return KernelActionResponse::failure("notify_listener", &err),
        };
        match self.kernel().get_server().notify_listener(channel, &value) {
            Ok(()) => KernelActionResponse::success("Message queued.", 0),
            Err(err) => KernelActionResponse::failure("notify_listener", &err),
        }
    }

    /// Handles every queued inbound message.
    #[flutter_rust_bridge::frb(sync)]
    pub fn process_pending(&mut self) -> KernelActionResponse {
        self.pump(|kernel| match kernel.process_pending() {
            Ok(processed) => {
                let processed = u32::try_from(processed).unwrap_or(u32::MAX);
                KernelActionResponse::success(format!("Processed {processed} message(s)."), processed)
            }
            Err(err) => KernelActionResponse::failure("process_pending", &err),
        })
    }

    /// Takes every outbound message queued since the last call, oldest first.
    #[flutter_rust_bridge::frb(sync)]
    pub fn drain_outbound(&mut self) -> Vec<HostMessage> {
        self.outbound.drain(..).collect()
    }

    #[flutter_rust_bridge::frb(sync)]
    pub fn server_status(&mut self) -> ServerStatus {
        let outbound = u32::try_from(self.outbound.len()).unwrap_or(u32::MAX);
        let kernel = self.kernel();
        let state = state_label(kernel.state());
        let execution_count = kernel.execution_count();
        let server = kernel.get_server();
        ServerStatus {
            state: state.to_string(),
            running: server.is_running(),
            pending: u32::try_from(server.pending_requests()).unwrap_or(u32::MAX),
            outbound,
            execution_count,
        }
    }

    fn wrap(result: kernelite_core::kernel::KernelResult<KernelHandle>) -> KernelCreateResponse {
        match result {
            Ok(kernel) => KernelCreateResponse {
                message: format!("Kernel {} created.", kernel.session_id()),
                kernel: Some(HostKernel {
                    kernel: Mutex::new(kernel),
                    outbound: VecDeque::new(),
                }),
                exception_handle: None,
            },
            Err(err) => KernelCreateResponse {
                kernel: None,
                message: format!("create failed: {err}"),
                exception_handle: Some(register_exception(&err)),
            },
        }
    }

    fn kernel(&mut self) -> &mut KernelHandle {
        self.kernel.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one kernel call and queues whatever it sent to the host.
    ///
    /// The listener lives for this call only; its channel is drained before
    /// returning, so nothing outbound is shared between calls.
    fn pump(
        &mut self,
        f: impl FnOnce(&mut KernelHandle) -> KernelActionResponse,
    ) -> KernelActionResponse {
        let (sink, received) = mpsc::channel();
        let kernel = self.kernel();
        kernel
            .get_server()
            .set_host_listener(Box::new(move |channel, value| {
                forward_outbound(&sink, channel, value);
            }));
        let response = f(kernel);
        self.outbound.extend(received.try_iter());
        response
    }
}

fn state_label(state: KernelState) -> &'static str {
    match state {
        KernelState::Created => "created",
        KernelState::Running => "running",
        KernelState::ShutDown => "shut_down",
    }
}

fn host_value_from_envelope(message: &HostMessage) -> Result<HostValue<'static>, serde_json::Error> {
    let mut fields = BTreeMap::new();
    fields.insert("header".to_string(), parse_field(&message.header)?);
    fields.insert("parent_header".to_string(), parse_field(&message.parent_header)?);
    fields.insert("metadata".to_string(), parse_field(&message.metadata)?);
    fields.insert("content".to_string(), parse_field(&message.content)?);
    fields.insert(
        "buffers".to_string(),
        HostValue::Array(
            message
                .buffers
                .iter()
                .map(|segment| HostValue::binary_owned(segment.clone()))
                .collect(),
        ),
    );
    Ok(HostValue::Object(fields))
}

/// Blank documents stand for an absent field.
fn parse_field(text: &str) -> Result<HostValue<'static>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(HostValue::Null);
    }
    let value = serde_json::from_str::<Value>(text)?;
    Ok(HostValue::from_json(&value))
}

fn forward_outbound(sink: &Sender<HostMessage>, channel: Channel, value: &HostValue<'_>) {
    let message = match envelope_from_host_value(channel, value) {
        Ok(message) => message,
        Err(err) => {
            warn!(
                "event=ffi_outbound module=ffi status=error channel={} error={}",
                channel, err
            );
            return;
        }
    };
    if sink.send(message).is_err() {
        warn!(
            "event=ffi_outbound module=ffi status=dropped channel={} reason=call_finished",
            channel
        );
    }
}

fn envelope_from_host_value(
    channel: Channel,
    value: &HostValue<'_>,
) -> Result<HostMessage, kernelite_core::ConversionError> {
    let field = |name: &str| -> Result<String, kernelite_core::ConversionError> {
        match value.get(name) {
            Some(node) => Ok(node.to_json()?.to_string()),
            None => Ok("{}".to_string()),
        }
    };
    let buffers = value
        .get("buffers")
        .and_then(HostValue::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter_map(HostValue::as_binary)
                .map(<[u8]>::to_vec)
                .collect()
        })
        .unwrap_or_default();

    Ok(HostMessage {
        channel: channel.as_str().to_string(),
        header: field("header")?,
        parent_header: field("parent_header")?,
        metadata: field("metadata")?,
        content: field("content")?,
        buffers,
    })
}
