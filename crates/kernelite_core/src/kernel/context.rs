//! Execution context, user identity and debugger hook collaborators.

use serde_json::Value;

/// Fallback identity when the environment does not name a user.
pub const UNSPECIFIED_USER: &str = "unspecified user";

/// Execution context handed to a kernel at construction.
///
/// The host transport needs no shared socket context, so the only context
/// this crate builds is empty.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct KernelContext {
    _private: (),
}

impl KernelContext {
    pub fn is_empty(&self) -> bool {
        true
    }
}

pub fn make_empty_context() -> KernelContext {
    KernelContext::default()
}

/// Identity stamped on every header the kernel emits.
pub fn get_user_name() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| UNSPECIFIED_USER.to_string())
}

/// Optional debugger hook receiving `debug_request` content on the control
/// channel.
pub trait Debugger: Send {
    fn process_request(&mut self, content: &Value) -> Value;
}

#[cfg(test)]
mod tests {
    use super::{get_user_name, make_empty_context};

    #[test]
    fn user_name_is_never_empty() {
        assert!(!get_user_name().is_empty());
    }

    #[test]
    fn empty_context_is_empty() {
        assert!(make_empty_context().is_empty());
    }
}
