//! # FLAC Streaming Module
//!
//! Turns a FLAC byte source into a seekable stream of little-endian PCM bytes
//! and serves it to pull-based media pipelines.
//!
//! ## Overview
//!
//! This module handles:
//! - Frame decoding behind a uniform facade (Symphonia-backed, feature-gated)
//! - Arbitrary-length reads over variable-size decoded frames
//! - Demand-pull sample delivery with pooled buffers and loop/stop policies
//!
//! ## Layers
//!
//! ```text
//! ByteSource ─> DecoderFacade ─> PcmByteStream ─> SampleBridge ─> pipeline
//!                                                     │
//!                                                 BufferPool
//! ```

pub mod bridge;
pub mod config;
pub mod decoder;
pub mod deferral;
pub mod error;
pub mod pool;
pub mod stream;
pub mod traits;

pub use bridge::{BridgeHandle, PcmSample, SampleBridge, SourceDescriptor, StartingResponse};
pub use config::{BridgeConfig, BridgeState, BridgeStats, EndOfStreamPolicy, SeekConversion};
pub use decoder::DecoderFacade;
pub use error::{Result, StreamError};
pub use stream::PcmByteStream;
pub use traits::{ByteSource, FrameDecoder, StreamInfo};

#[cfg(feature = "decoder-flac")]
pub use decoder::SymphoniaFlacDecoder;
