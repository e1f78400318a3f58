//! # Decoder Module
//!
//! Everything between a FLAC byte source and a sequence of PCM frames.
//!
//! ## Overview
//!
//! - [`DecoderFacade`] owns one [`FrameDecoder`](crate::traits::FrameDecoder),
//!   caches its stream metadata and hands out one decoded frame at a time.
//! - [`SamplePacker`] turns integer samples into little-endian PCM bytes.
//! - [`SymphoniaFlacDecoder`] is the production decoder, built on Symphonia's
//!   pure-Rust FLAC reader (`decoder-flac` feature, on by default).
//!
//! ## Architecture
//!
//! ```text
//! ByteSource → SymphoniaFlacDecoder → SamplePacker → DecoderFacade → Bytes
//! ```
//!
//! ## Threading Model
//!
//! Decoders are `Send` and driven from a single task. Nothing here blocks on
//! anything but the byte source.

mod facade;
mod pack;

#[cfg(feature = "decoder-flac")]
mod symphonia;

pub use facade::DecoderFacade;
pub use pack::SamplePacker;

#[cfg(feature = "decoder-flac")]
pub use self::symphonia::SymphoniaFlacDecoder;
