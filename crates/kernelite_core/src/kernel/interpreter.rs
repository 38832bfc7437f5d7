//! Interpreter contract and the echo interpreter.
//!
//! The language semantics live behind [`Interpreter`]; the kernel only
//! routes requests to it and turns outcomes into protocol replies.

use crate::kernel::publisher::Publisher;
use serde_json::{json, Value};

/// One `execute_request`, already unpacked from its content.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteRequest<'a> {
    pub execution_count: u32,
    pub code: &'a str,
    pub silent: bool,
    pub store_history: bool,
    pub user_expressions: &'a Value,
    pub allow_stdin: bool,
}

/// Result of running one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    Ok {
        user_expressions: Value,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// Language interpreter driven by the kernel.
pub trait Interpreter: Send {
    /// Called once when the kernel starts.
    fn configure(&mut self) {}

    /// `kernel_info_reply` fields owned by the interpreter
    /// (`implementation`, `language_info`, `banner`, ...).
    fn kernel_info(&self) -> Value;

    fn execute(&mut self, request: ExecuteRequest<'_>, publisher: &mut Publisher<'_>)
        -> ExecuteOutcome;

    fn complete(&mut self, _code: &str, cursor_pos: i64) -> Value {
        json!({
            "status": "ok",
            "matches": [],
            "cursor_start": cursor_pos,
            "cursor_end": cursor_pos,
            "metadata": {},
        })
    }

    fn inspect(&mut self, _code: &str, _cursor_pos: i64, _detail_level: i64) -> Value {
        json!({"status": "ok", "found": false, "data": {}, "metadata": {}})
    }

    fn is_complete(&mut self, _code: &str) -> Value {
        json!({"status": "complete"})
    }

    fn shutdown(&mut self, _restart: bool) {}
}

/// Interpreters constructible from a host-supplied configuration value.
pub trait FromParameters: Sized {
    fn from_parameters(parameters: Value) -> Self;
}

/// Mock interpreter that echoes each cell back as its result.
///
/// Cells starting with `raise ` fail with `EchoError`; cells starting with
/// `print ` write the rest to stdout instead of producing a result.
#[derive(Debug, Clone, Default)]
pub struct EchoInterpreter {
    parameters: Value,
    configured: bool,
}

impl EchoInterpreter {
    /// Configuration value received at construction (`null` for default).
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

impl FromParameters for EchoInterpreter {
    fn from_parameters(parameters: Value) -> Self {
        Self {
            parameters,
            configured: false,
        }
    }
}

impl Interpreter for EchoInterpreter {
    fn configure(&mut self) {
        self.configured = true;
    }

    fn kernel_info(&self) -> Value {
        json!({
            "implementation": "echo",
            "implementation_version": env!("CARGO_PKG_VERSION"),
            "language_info": {
                "name": "echo",
                "version": "1.0",
                "mimetype": "text/plain",
                "file_extension": ".txt",
            },
            "banner": "kernelite echo kernel",
            "parameters": self.parameters,
        })
    }

    fn execute(
        &mut self,
        request: ExecuteRequest<'_>,
        publisher: &mut Publisher<'_>,
    ) -> ExecuteOutcome {
        if let Some(message) = request.code.strip_prefix("raise ") {
            return ExecuteOutcome::Error {
                ename: "EchoError".to_string(),
                evalue: message.to_string(),
                traceback: vec![format!("EchoError: {message}")],
            };
        }

        if !request.silent {
            if let Some(text) = request.code.strip_prefix("print ") {
                publisher.publish_stream("stdout", &format!("{text}\n"));
            } else {
                publisher.publish_execution_result(
                    request.execution_count,
                    json!({"text/plain": request.code}),
                    json!({}),
                );
            }
        }

        ExecuteOutcome::Ok {
            user_expressions: json!({}),
        }
    }

    fn is_complete(&mut self, code: &str) -> Value {
        if code.trim_end().ends_with('\\') {
            json!({"status": "incomplete", "indent": ""})
        } else {
            json!({"status": "complete"})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EchoInterpreter, FromParameters, Interpreter};
    use serde_json::json;

    #[test]
    fn from_parameters_keeps_exact_value() {
        let parameters = json!({"preload": ["a", "b"], "flags": {"x": true}});
        let interpreter = EchoInterpreter::from_parameters(parameters.clone());
        assert_eq!(interpreter.parameters(), &parameters);
        assert_eq!(interpreter.kernel_info()["parameters"], parameters);
    }

    #[test]
    fn configure_marks_interpreter_ready() {
        let mut interpreter = EchoInterpreter::default();
        assert!(!interpreter.is_configured());
        interpreter.configure();
        assert!(interpreter.is_configured());
    }

    #[test]
    fn trailing_backslash_is_incomplete() {
        let mut interpreter = EchoInterpreter::default();
        assert_eq!(interpreter.is_complete("a \\")["status"], "incomplete");
        assert_eq!(interpreter.is_complete("a")["status"], "complete");
    }
}
