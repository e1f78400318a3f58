//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the stream crates:
//! - Logging and tracing setup, with forwarding to a host log sink
//! - Event bus for stream lifecycle notifications
//!
//! ## Overview
//!
//! Nothing in here knows about FLAC or PCM. It establishes the logging
//! conventions and the event broadcasting used throughout the workspace.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
