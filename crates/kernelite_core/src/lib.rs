//! Embeddable protocol kernel core.
//!
//! Hosts a language interpreter behind the notebook messaging protocol for a
//! host runtime without sockets: messages cross as host values, the kernel
//! is driven by explicit calls, and packages arrive as `.tar.gz` archives.

pub mod archive;
pub mod bridge;
pub mod error_registry;
pub mod export;
pub mod host;
pub mod kernel;
pub mod logging;
pub mod message;

pub use archive::{extract, ExtractError, ExtractErrorKind, ExtractSummary};
pub use bridge::{
    buffer_sequence_from_host, host_value_from_message, message_from_host, BufferMode,
    ToHostValue,
};
pub use error_registry::{
    get_exception_message, register_exception, release_exception, ExceptionHandle,
};
pub use export::{ExportError, ExportRegistry, KernelClassBuilder};
pub use host::{ConversionError, HostValue};
pub use kernel::{
    make_kernel, make_parameterized_kernel, Channel, EchoInterpreter, Interpreter, Kernel,
    KernelConfig, KernelError, KernelHandle, KernelState, Server,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use message::{BufferSequence, Header, Message, MessageParts, PubMessage};

/// Liveness probe for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Registry with the core functions and the echo kernel class exported.
pub fn default_exports() -> Result<ExportRegistry, ExportError> {
    let mut registry = ExportRegistry::new();
    registry.export_core()?;
    registry.export_parameterizable_kernel::<EchoInterpreter, _>("EchoKernel", |_| Ok(()))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::{core_version, default_exports, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn default_exports_cover_core_and_echo_kernel() {
        let registry = default_exports().expect("default exports");
        assert_eq!(registry.function_names(), vec!["get_exception_message"]);
        assert_eq!(registry.class_names(), vec!["EchoKernel"]);
    }
}
