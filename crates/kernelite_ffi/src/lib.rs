//! Host-runtime bindings for `kernelite_core`.

pub mod api;
