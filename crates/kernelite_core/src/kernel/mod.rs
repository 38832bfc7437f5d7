//! Kernel lifecycle adapter.
//!
//! # Responsibility
//! - Assemble a kernel from configuration, identity, context, interpreter,
//!   history store and a lazily created host transport.
//! - Hand sole ownership of the kernel to the host through [`KernelHandle`].
//! - Route queued protocol requests to the interpreter and history store.
//!
//! # Invariants
//! - `start` succeeds at most once per kernel.
//! - Requests are only processed while the kernel is running.
//! - Every handled request is bracketed by `busy`/`idle` status broadcasts.

pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod history;
pub mod interpreter;
pub mod publisher;
pub mod server;

pub use config::{ConfigError, KernelConfig};
pub use context::{get_user_name, make_empty_context, Debugger, KernelContext};
pub use error::{KernelError, KernelResult};
pub use handle::KernelHandle;
pub use history::{make_in_memory_history_manager, HistoryEntry, HistoryError, HistoryManager};
pub use interpreter::{EchoInterpreter, ExecuteOutcome, ExecuteRequest, FromParameters, Interpreter};
pub use publisher::Publisher;
pub use server::{make_host_server, Channel, HostListener, HostServer, Server, ServerFactory};

use crate::message::{empty_object, Header, Message, PubMessage, PROTOCOL_VERSION};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle state of one kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Created,
    Running,
    ShutDown,
}

/// Running assembly of interpreter, transport and history store.
pub struct Kernel {
    config: KernelConfig,
    user_name: String,
    session_id: String,
    context: KernelContext,
    interpreter: Box<dyn Interpreter>,
    server_factory: ServerFactory,
    server: Option<Box<dyn Server>>,
    history: Box<dyn HistoryManager>,
    debugger: Option<Box<dyn Debugger>>,
    state: KernelState,
    execution_count: u32,
}

impl Kernel {
    pub fn new(
        config: KernelConfig,
        user_name: String,
        context: KernelContext,
        interpreter: Box<dyn Interpreter>,
        server_factory: ServerFactory,
        history: Box<dyn HistoryManager>,
        debugger: Option<Box<dyn Debugger>>,
    ) -> Self {
        Self {
            config,
            user_name,
            session_id: Uuid::new_v4().to_string(),
            context,
            interpreter,
            server_factory,
            server: None,
            history,
            debugger,
            state: KernelState::Created,
            execution_count: 0,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn context(&self) -> &KernelContext {
        &self.context
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// Non-owning access to the transport, created on first use.
    ///
    /// The returned borrow cannot outlive the kernel.
    pub fn get_server(&mut self) -> &mut dyn Server {
        let factory = self.server_factory;
        let config = &self.config;
        &mut **self.server.get_or_insert_with(|| factory(config))
    }

    /// Starts the transport and announces the kernel to the host.
    ///
    /// # Errors
    /// - `AlreadyStarted` on a second call.
    /// - `ShutDown` after a `shutdown_request` was handled.
    pub fn start(&mut self) -> KernelResult<()> {
        match self.state {
            KernelState::Running => return Err(KernelError::AlreadyStarted),
            KernelState::ShutDown => return Err(KernelError::ShutDown),
            KernelState::Created => {}
        }

        self.interpreter.configure();
        let header = Header::new("status", &self.session_id, &self.user_name).to_value();
        let starting = PubMessage::new(
            format!("kernel.{}.status", self.session_id),
            header,
            empty_object(),
            json!({"execution_state": "starting"}),
        );

        let server = self.get_server();
        server.start();
        server.publish(starting);
        self.state = KernelState::Running;

        info!(
            "event=kernel_start module=kernel status=ok session={} transport={} user={}",
            self.session_id, self.config.transport, self.user_name
        );
        Ok(())
    }

    /// Handles every queued inbound request in arrival order.
    ///
    /// Returns the number of requests handled. Stops early once a
    /// `shutdown_request` has been handled.
    pub fn process_pending(&mut self) -> KernelResult<usize> {
        let mut processed = 0;
        loop {
            match self.state {
                KernelState::Created => return Err(KernelError::NotStarted),
                KernelState::ShutDown if processed == 0 => return Err(KernelError::ShutDown),
                KernelState::ShutDown => break,
                KernelState::Running => {}
            }

            let Some((channel, request)) = self.get_server().next_request() else {
                break;
            };
            self.dispatch(channel, request)?;
            processed += 1;
        }
        Ok(processed)
    }

    fn dispatch(&mut self, channel: Channel, request: Message) -> KernelResult<()> {
        let started_at = Instant::now();
        let msg_type = request.msg_type().to_string();
        debug!(
            "event=kernel_dispatch module=kernel status=start channel={} msg_type={}",
            channel, msg_type
        );

        let Some(server) = self.server.as_deref_mut() else {
            return Err(KernelError::NotStarted);
        };
        let mut publisher =
            Publisher::new(server, &self.session_id, &self.user_name, &request.header);
        publisher.publish_status("busy");

        let content = &request.content;
        let mut shutdown = false;
        let result = match msg_type.as_str() {
            "kernel_info_request" => {
                let info = kernel_info_content(self.interpreter.kernel_info());
                publisher.reply(channel, "kernel_info_reply", info);
                Ok(())
            }
            "execute_request" => handle_execute(
                &mut *self.interpreter,
                &mut *self.history,
                &mut self.execution_count,
                &mut publisher,
                channel,
                content,
            ),
            "complete_request" => {
                let reply = self
                    .interpreter
                    .complete(str_field(content, "code"), i64_field(content, "cursor_pos"));
                publisher.reply(channel, "complete_reply", reply);
                Ok(())
            }
            "inspect_request" => {
                let reply = self.interpreter.inspect(
                    str_field(content, "code"),
                    i64_field(content, "cursor_pos"),
                    i64_field(content, "detail_level"),
                );
                publisher.reply(channel, "inspect_reply", reply);
                Ok(())
            }
            "is_complete_request" => {
                let reply = self.interpreter.is_complete(str_field(content, "code"));
                publisher.reply(channel, "is_complete_reply", reply);
                Ok(())
            }
            "history_request" => self
                .history
                .process_request(content)
                .map(|reply| publisher.reply(channel, "history_reply", reply))
                .map_err(KernelError::from),
            "comm_info_request" => {
                publisher.reply(channel, "comm_info_reply", json!({"status": "ok", "comms": {}}));
                Ok(())
            }
            "shutdown_request" => {
                let restart = bool_field(content, "restart", false);
                self.interpreter.shutdown(restart);
                publisher.reply(
                    channel,
                    "shutdown_reply",
                    json!({"status": "ok", "restart": restart}),
                );
                publisher.stop_server();
                shutdown = true;
                Ok(())
            }
            "debug_request" => {
                match self.debugger.as_mut() {
                    Some(debugger) => {
                        let reply = debugger.process_request(content);
                        publisher.reply(channel, "debug_reply", reply);
                    }
                    None => warn!(
                        "event=kernel_dispatch module=kernel status=ignored channel={} msg_type=debug_request reason=no_debugger",
                        channel
                    ),
                }
                Ok(())
            }
            other => {
                warn!(
                    "event=kernel_dispatch module=kernel status=ignored channel={} msg_type={} reason=unsupported",
                    channel, other
                );
                Ok(())
            }
        };
        publisher.publish_status("idle");

        if shutdown {
            self.state = KernelState::ShutDown;
            info!(
                "event=kernel_shutdown module=kernel status=ok session={}",
                self.session_id
            );
        }

        match &result {
            Ok(()) => debug!(
                "event=kernel_dispatch module=kernel status=ok channel={} msg_type={} duration_ms={}",
                channel,
                msg_type,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=kernel_dispatch module=kernel status=error channel={} msg_type={} duration_ms={} error={}",
                channel,
                msg_type,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

/// Builds a kernel around a default-constructed interpreter.
pub fn make_kernel<I>() -> KernelResult<KernelHandle>
where
    I: Interpreter + Default + 'static,
{
    assemble(Box::new(I::default()), "default")
}

/// Builds a kernel whose interpreter receives `parameters` verbatim.
pub fn make_parameterized_kernel<I>(parameters: Value) -> KernelResult<KernelHandle>
where
    I: Interpreter + FromParameters + 'static,
{
    assemble(Box::new(I::from_parameters(parameters)), "parameterized")
}

fn assemble(interpreter: Box<dyn Interpreter>, mode: &str) -> KernelResult<KernelHandle> {
    let history = make_in_memory_history_manager()?;
    let kernel = Kernel::new(
        KernelConfig::default(),
        get_user_name(),
        make_empty_context(),
        interpreter,
        make_host_server,
        history,
        None,
    );
    info!(
        "event=kernel_create module=kernel status=ok mode={} session={}",
        mode,
        kernel.session_id()
    );
    Ok(KernelHandle::new(kernel))
}

fn handle_execute(
    interpreter: &mut dyn Interpreter,
    history: &mut dyn HistoryManager,
    execution_count: &mut u32,
    publisher: &mut Publisher<'_>,
    channel: Channel,
    content: &Value,
) -> KernelResult<()> {
    let code = str_field(content, "code");
    let silent = bool_field(content, "silent", false);
    let store_history = !silent && bool_field(content, "store_history", true);
    let no_expressions = empty_object();
    let user_expressions = content.get("user_expressions").unwrap_or(&no_expressions);

    if !silent {
        *execution_count += 1;
        publisher.publish_execute_input(code, *execution_count);
    }
    let count = *execution_count;
    if store_history {
        history.store_input(count, code)?;
    }

    let request = ExecuteRequest {
        execution_count: count,
        code,
        silent,
        store_history,
        user_expressions,
        allow_stdin: bool_field(content, "allow_stdin", false),
    };
    let reply = match interpreter.execute(request, publisher) {
        ExecuteOutcome::Ok { user_expressions } => {
            if let Some(text) = publisher.take_result_text().filter(|_| store_history) {
                history.store_output(count, &text)?;
            }
            json!({
                "status": "ok",
                "execution_count": count,
                "user_expressions": user_expressions,
                "payload": [],
            })
        }
        ExecuteOutcome::Error {
            ename,
            evalue,
            traceback,
        } => {
            if !silent {
                publisher.publish_error(&ename, &evalue, &traceback);
            }
            json!({
                "status": "error",
                "execution_count": count,
                "ename": ename,
                "evalue": evalue,
                "traceback": traceback,
            })
        }
    };
    publisher.reply(channel, "execute_reply", reply);
    Ok(())
}

fn kernel_info_content(interpreter_info: Value) -> Value {
    let mut content = match interpreter_info {
        Value::Object(fields) => fields,
        _ => serde_json::Map::new(),
    };
    content.insert("status".to_string(), json!("ok"));
    content.insert("protocol_version".to_string(), json!(PROTOCOL_VERSION));
    Value::Object(content)
}

fn str_field<'a>(content: &'a Value, key: &str) -> &'a str {
    content.get(key).and_then(Value::as_str).unwrap_or("")
}

fn i64_field(content: &Value, key: &str) -> i64 {
    content.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn bool_field(content: &Value, key: &str, default: bool) -> bool {
    content.get(key).and_then(Value::as_bool).unwrap_or(default)
}
