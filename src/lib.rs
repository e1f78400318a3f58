//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-runtime`, `core-stream`). Host applications can
//! depend on `flac-stream-workspace` and enable the documented features
//! without needing to wire each crate individually.

pub use core_runtime as runtime;
pub use core_stream as stream;
