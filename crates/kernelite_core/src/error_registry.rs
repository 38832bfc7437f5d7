//! Exception handle registry for host-side error introspection.
//!
//! The host runtime cannot read native failure payloads, so failures that
//! cross the boundary are parked here and the host receives an integer token.
//!
//! # Invariants
//! - Tokens are positive, monotonic and never reused within a thread.
//! - A released token resolves to the "unknown handle" message, never to a
//!   different failure.
//! - Storage is thread-local; the host drives a single logical thread.

use log::debug;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;

/// Opaque integer token naming one registered failure.
pub type ExceptionHandle = i64;

thread_local! {
    static REGISTRY: RefCell<ExceptionRegistry> = RefCell::new(ExceptionRegistry::new());
}

/// Token-to-failure table.
#[derive(Debug)]
pub struct ExceptionRegistry {
    next_handle: ExceptionHandle,
    live: BTreeMap<ExceptionHandle, String>,
}

impl Default for ExceptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionRegistry {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            live: BTreeMap::new(),
        }
    }

    /// Stores the rendered failure (including its `source()` chain).
    pub fn register(&mut self, error: &(dyn Error + 'static)) -> ExceptionHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle, render_error_chain(error));
        handle
    }

    pub fn message(&self, handle: ExceptionHandle) -> Option<&str> {
        self.live.get(&handle).map(String::as_str)
    }

    /// Invalidates `handle`; returns whether it was live.
    pub fn release(&mut self, handle: ExceptionHandle) -> bool {
        self.live.remove(&handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Registers `error` in the current thread's registry.
pub fn register_exception(error: &(dyn Error + 'static)) -> ExceptionHandle {
    let handle = REGISTRY.with(|registry| registry.borrow_mut().register(error));
    debug!("event=exception_register module=error_registry status=ok handle={handle}");
    handle
}

/// Returns the readable message for `handle`.
///
/// Unknown or released handles yield `unknown exception handle <n>`.
pub fn get_exception_message(handle: ExceptionHandle) -> String {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .message(handle)
            .map(str::to_string)
            .unwrap_or_else(|| format!("unknown exception handle {handle}"))
    })
}

/// Releases `handle` in the current thread's registry.
pub fn release_exception(handle: ExceptionHandle) -> bool {
    REGISTRY.with(|registry| registry.borrow_mut().release(handle))
}

fn render_error_chain(error: &(dyn Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !rendered.contains(text.as_str()) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = inner.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::{get_exception_message, register_exception, release_exception, ExceptionRegistry};
    use std::io;

    #[test]
    fn registered_message_is_readable_until_release() {
        let err = io::Error::new(io::ErrorKind::NotFound, "archive missing");
        let handle = register_exception(&err);

        assert_eq!(get_exception_message(handle), "archive missing");
        assert!(release_exception(handle));
        assert_eq!(
            get_exception_message(handle),
            format!("unknown exception handle {handle}")
        );
        assert!(!release_exception(handle));
    }

    #[test]
    fn handles_are_never_reused() {
        let mut registry = ExceptionRegistry::new();
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        let first = registry.register(&err);
        registry.release(first);
        let second = registry.register(&err);

        assert_ne!(first, second);
        assert!(registry.message(first).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_handle_returns_placeholder() {
        assert_eq!(get_exception_message(-4), "unknown exception handle -4");
    }
}
