//! Host binding table for kernel classes and free functions.
//!
//! # Responsibility
//! - Declare which kernel classes, constructors, methods and free functions
//!   the host runtime can reach, under host-visible names.
//! - Route host invocations by name to the registered entry points.
//!
//! # Invariants
//! - Every exported name is a valid host identifier.
//! - Names are unique per table (classes, functions, methods of one class).
//! - Every kernel class exposes a zero-argument constructor plus the
//!   `start`, `get_server` and `process_pending` methods.

use crate::error_registry::get_exception_message;
use crate::host::{ConversionError, HostValue};
use crate::kernel::{
    make_kernel, make_parameterized_kernel, FromParameters, Interpreter, Kernel, KernelError,
    KernelHandle, KernelResult,
};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static HOST_IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid host identifier regex")
});

/// Zero-argument kernel constructor.
pub type DefaultConstructor = fn() -> KernelResult<KernelHandle>;
/// Kernel constructor taking one structured configuration value.
pub type ParameterizedConstructor = fn(Value) -> KernelResult<KernelHandle>;
/// Instance method reachable from the host.
pub type KernelMethod =
    fn(&mut Kernel, &[HostValue<'_>]) -> Result<HostValue<'static>, ExportError>;
/// Free function reachable from the host.
pub type HostFunction = fn(&[HostValue<'_>]) -> Result<HostValue<'static>, ExportError>;

/// Registration and invocation failures.
#[derive(Debug)]
pub enum ExportError {
    InvalidName(String),
    DuplicateClass(String),
    DuplicateFunction(String),
    DuplicateMethod { class: String, method: String },
    UnknownClass(String),
    UnknownMethod { class: String, method: String },
    UnknownFunction(String),
    NoMatchingConstructor { class: String, arity: usize },
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    InvalidArgument { name: String, message: String },
    Kernel(KernelError),
    Conversion(ConversionError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "export name is not a valid identifier: {name}"),
            Self::DuplicateClass(name) => write!(f, "class already exported: {name}"),
            Self::DuplicateFunction(name) => write!(f, "function already exported: {name}"),
            Self::DuplicateMethod { class, method } => {
                write!(f, "method already exported: {class}.{method}")
            }
            Self::UnknownClass(name) => write!(f, "unknown class: {name}"),
            Self::UnknownMethod { class, method } => write!(f, "unknown method: {class}.{method}"),
            Self::UnknownFunction(name) => write!(f, "unknown function: {name}"),
            Self::NoMatchingConstructor { class, arity } => {
                write!(f, "no constructor of {class} takes {arity} argument(s)")
            }
            Self::ArityMismatch {
                name,
                expected,
                found,
            } => write!(f, "{name} expects {expected} argument(s), got {found}"),
            Self::InvalidArgument { name, message } => {
                write!(f, "invalid argument for {name}: {message}")
            }
            Self::Kernel(err) => write!(f, "{err}"),
            Self::Conversion(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kernel(err) => Some(err),
            Self::Conversion(err) => Some(err),
            _ => None,
        }
    }
}

impl From<KernelError> for ExportError {
    fn from(value: KernelError) -> Self {
        Self::Kernel(value)
    }
}

impl From<ConversionError> for ExportError {
    fn from(value: ConversionError) -> Self {
        Self::Conversion(value)
    }
}

/// One exported kernel class.
pub struct KernelClassExport {
    name: String,
    default_constructor: DefaultConstructor,
    parameterized_constructor: Option<ParameterizedConstructor>,
    methods: BTreeMap<String, KernelMethod>,
}

impl KernelClassExport {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_parameterizable(&self) -> bool {
        self.parameterized_constructor.is_some()
    }

    /// Sorted method names.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}

/// Hook handed to `export_kernel_with` callers for extra methods.
pub struct KernelClassBuilder {
    class: KernelClassExport,
}

impl KernelClassBuilder {
    fn new(name: &str, default_constructor: DefaultConstructor) -> Self {
        let mut methods: BTreeMap<String, KernelMethod> = BTreeMap::new();
        methods.insert("start".to_string(), start_method);
        methods.insert("get_server".to_string(), get_server_method);
        methods.insert("process_pending".to_string(), process_pending_method);
        Self {
            class: KernelClassExport {
                name: name.to_string(),
                default_constructor,
                parameterized_constructor: None,
                methods,
            },
        }
    }

    fn parameterized(mut self, constructor: ParameterizedConstructor) -> Self {
        self.class.parameterized_constructor = Some(constructor);
        self
    }

    /// Adds an instance method.
    pub fn method(&mut self, name: &str, method: KernelMethod) -> Result<&mut Self, ExportError> {
        validate_name(name)?;
        if self.class.methods.contains_key(name) {
            return Err(ExportError::DuplicateMethod {
                class: self.class.name.clone(),
                method: name.to_string(),
            });
        }
        self.class.methods.insert(name.to_string(), method);
        Ok(self)
    }
}

/// Declarative table of everything exported to the host.
#[derive(Default)]
pub struct ExportRegistry {
    classes: BTreeMap<String, KernelClassExport>,
    functions: BTreeMap<String, HostFunction>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the core free functions (`get_exception_message`).
    pub fn export_core(&mut self) -> Result<(), ExportError> {
        self.export_function("get_exception_message", exception_message_function)
    }

    pub fn export_function(&mut self, name: &str, function: HostFunction) -> Result<(), ExportError> {
        validate_name(name)?;
        if self.functions.contains_key(name) {
            return Err(ExportError::DuplicateFunction(name.to_string()));
        }
        self.functions.insert(name.to_string(), function);
        info!("event=export_register module=export status=ok kind=function name={name}");
        Ok(())
    }

    /// Exports a kernel class built around a default-constructed `I`.
    pub fn export_kernel<I>(&mut self, name: &str) -> Result<(), ExportError>
    where
        I: Interpreter + Default + 'static,
    {
        self.export_kernel_with::<I, _>(name, |_| Ok(()))
    }

    /// Like `export_kernel`, letting `extra` add methods to the class.
    pub fn export_kernel_with<I, F>(&mut self, name: &str, extra: F) -> Result<(), ExportError>
    where
        I: Interpreter + Default + 'static,
        F: FnOnce(&mut KernelClassBuilder) -> Result<(), ExportError>,
    {
        let builder = KernelClassBuilder::new(name, make_kernel::<I>);
        self.register_class(builder, extra)
    }

    /// Exports a kernel class that also accepts one configuration value.
    pub fn export_parameterizable_kernel<I, F>(
        &mut self,
        name: &str,
        extra: F,
    ) -> Result<(), ExportError>
    where
        I: Interpreter + Default + FromParameters + 'static,
        F: FnOnce(&mut KernelClassBuilder) -> Result<(), ExportError>,
    {
        let builder = KernelClassBuilder::new(name, make_kernel::<I>)
            .parameterized(make_parameterized_kernel::<I>);
        self.register_class(builder, extra)
    }

    fn register_class<F>(&mut self, mut builder: KernelClassBuilder, extra: F) -> Result<(), ExportError>
    where
        F: FnOnce(&mut KernelClassBuilder) -> Result<(), ExportError>,
    {
        let name = builder.class.name.clone();
        validate_name(&name)?;
        if self.classes.contains_key(&name) {
            return Err(ExportError::DuplicateClass(name));
        }
        extra(&mut builder)?;

        info!(
            "event=export_register module=export status=ok kind=class name={} parameterizable={} methods={}",
            name,
            builder.class.is_parameterizable(),
            builder.class.methods.len()
        );
        self.classes.insert(name, builder.class);
        Ok(())
    }

    pub fn class(&self, name: &str) -> Option<&KernelClassExport> {
        self.classes.get(name)
    }

    /// Sorted class names.
    pub fn class_names(&self) -> Vec<&str> {
        self.classes.keys().map(String::as_str).collect()
    }

    /// Sorted free function names.
    pub fn function_names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    /// Constructs `class`, picking the constructor by argument count.
    pub fn construct(&self, class: &str, args: &[HostValue<'_>]) -> Result<KernelHandle, ExportError> {
        let export = self.require_class(class)?;
        match (args, export.parameterized_constructor) {
            ([], _) => Ok((export.default_constructor)()?),
            ([parameters], Some(constructor)) => Ok(constructor(parameters.to_json()?)?),
            _ => Err(ExportError::NoMatchingConstructor {
                class: class.to_string(),
                arity: args.len(),
            }),
        }
    }

    pub fn call_method(
        &self,
        class: &str,
        kernel: &mut Kernel,
        method: &str,
        args: &[HostValue<'_>],
    ) -> Result<HostValue<'static>, ExportError> {
        let export = self.require_class(class)?;
        let entry = export
            .methods
            .get(method)
            .ok_or_else(|| ExportError::UnknownMethod {
                class: class.to_string(),
                method: method.to_string(),
            })?;
        entry(kernel, args)
    }

    pub fn call_function(
        &self,
        name: &str,
        args: &[HostValue<'_>],
    ) -> Result<HostValue<'static>, ExportError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ExportError::UnknownFunction(name.to_string()))?;
        function(args)
    }

    fn require_class(&self, name: &str) -> Result<&KernelClassExport, ExportError> {
        self.classes
            .get(name)
            .ok_or_else(|| ExportError::UnknownClass(name.to_string()))
    }
}

fn validate_name(name: &str) -> Result<(), ExportError> {
    if HOST_IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(ExportError::InvalidName(name.to_string()))
    }
}

fn expect_arity(name: &str, args: &[HostValue<'_>], expected: usize) -> Result<(), ExportError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExportError::ArityMismatch {
            name: name.to_string(),
            expected,
            found: args.len(),
        })
    }
}

fn start_method(kernel: &mut Kernel, args: &[HostValue<'_>]) -> Result<HostValue<'static>, ExportError> {
    expect_arity("start", args, 0)?;
    kernel.start()?;
    Ok(HostValue::Null)
}

/// Describes the transport; the transport itself never leaves native code.
fn get_server_method(
    kernel: &mut Kernel,
    args: &[HostValue<'_>],
) -> Result<HostValue<'static>, ExportError> {
    expect_arity("get_server", args, 0)?;
    let transport = kernel.config().transport.clone();
    let server = kernel.get_server();
    let mut descriptor = BTreeMap::new();
    descriptor.insert("transport".to_string(), HostValue::String(transport));
    descriptor.insert("running".to_string(), HostValue::Bool(server.is_running()));
    descriptor.insert(
        "pending".to_string(),
        HostValue::from(server.pending_requests() as u64),
    );
    Ok(HostValue::Object(descriptor))
}

fn process_pending_method(
    kernel: &mut Kernel,
    args: &[HostValue<'_>],
) -> Result<HostValue<'static>, ExportError> {
    expect_arity("process_pending", args, 0)?;
    let processed = kernel.process_pending()?;
    Ok(HostValue::from(processed as u64))
}

fn exception_message_function(args: &[HostValue<'_>]) -> Result<HostValue<'static>, ExportError> {
    expect_arity("get_exception_message", args, 1)?;
    let handle = args[0]
        .as_i64()
        .ok_or_else(|| ExportError::InvalidArgument {
            name: "get_exception_message".to_string(),
            message: format!("expected integer handle, found {}", args[0].kind()),
        })?;
    Ok(HostValue::String(get_exception_message(handle)))
}

#[cfg(test)]
mod tests {
    use super::{ExportError, ExportRegistry};
    use crate::host::HostValue;
    use crate::kernel::EchoInterpreter;

    #[test]
    fn rejects_invalid_and_duplicate_names() {
        let mut registry = ExportRegistry::new();
        let err = registry
            .export_kernel::<EchoInterpreter>("9lives")
            .expect_err("leading digit");
        assert!(matches!(err, ExportError::InvalidName(name) if name == "9lives"));

        registry
            .export_kernel::<EchoInterpreter>("EchoKernel")
            .expect("first export");
        let err = registry
            .export_kernel::<EchoInterpreter>("EchoKernel")
            .expect_err("duplicate");
        assert!(matches!(err, ExportError::DuplicateClass(_)));
    }

    #[test]
    fn every_class_has_builtin_methods() {
        let mut registry = ExportRegistry::new();
        registry
            .export_kernel::<EchoInterpreter>("EchoKernel")
            .expect("export");
        let class = registry.class("EchoKernel").expect("class");
        assert_eq!(class.method_names(), vec!["get_server", "process_pending", "start"]);
        assert!(!class.is_parameterizable());
    }

    #[test]
    fn extra_hook_cannot_shadow_builtin_method() {
        let mut registry = ExportRegistry::new();
        let err = registry
            .export_kernel_with::<EchoInterpreter, _>("EchoKernel", |class| {
                class.method("start", |_, _| Ok(HostValue::Null))?;
                Ok(())
            })
            .expect_err("shadowed start");
        assert!(matches!(err, ExportError::DuplicateMethod { .. }));
        assert!(registry.class("EchoKernel").is_none());
    }

    #[test]
    fn core_function_reports_unknown_handle() {
        let mut registry = ExportRegistry::new();
        registry.export_core().expect("core");
        let message = registry
            .call_function("get_exception_message", &[HostValue::from(987_654_i64)])
            .expect("call");
        assert_eq!(message, HostValue::String("unknown exception handle 987654".into()));
    }
}
