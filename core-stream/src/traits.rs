//! # Core Stream Traits
//!
//! This module defines the boundary between this crate and the opaque frame
//! decoder, plus the value types that flow across it.
//!
//! ## Architecture
//!
//! The decoder is modelled the way callback-driven FLAC decoders work:
//!
//! - **[`FrameDecoder`]**: binds a [`ByteSource`], then advances on request
//!   (`process_until_end_of_metadata`, `process_single`, `seek_absolute`).
//! - **[`DecoderSink`]**: receives the "metadata found" and "frame decoded"
//!   callbacks fired while the decoder advances.
//!
//! The sink is passed per call instead of being registered up front, so no
//! callback registration can outlive the call that needed it.
//!
//! ```text
//! DecoderFacade ──process_single(&mut sink)──▶ FrameDecoder
//!       ▲                                          │
//!       └──────── sink.on_frame(header, pcm) ◀─────┘
//! ```
//!
//! ## Threading Model
//!
//! Decoders are `Send` so a session can be moved onto the task that serves
//! sample requests. They are never shared: every call takes `&mut self`.

use crate::config::SeekConversion;
use crate::error::{Result, StreamError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};
use std::time::Duration;

/// Offset of the data chunk inside the synthetic WAVE header.
pub const WAVE_DATA_CHUNK_OFFSET: u64 = 36;

/// Size of the synthetic WAVE header used for length accounting only.
///
/// The header is never emitted; writing one is the sink's job.
pub const WAVE_HEADER_SIZE: u64 = WAVE_DATA_CHUNK_OFFSET + 8;

// ============================================================================
// Source
// ============================================================================

/// Randomly seekable byte source positioned at the start of a FLAC stream.
pub trait ByteSource: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ByteSource for T {}

// ============================================================================
// Decoder Callback Types
// ============================================================================

/// A metadata block reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMetadata {
    /// The mandatory STREAMINFO block.
    StreamInfo(StreamInfoBlock),
    /// Any other block type (padding, seek table, tags...). Carries the raw
    /// block type number.
    Other(u8),
}

/// Raw contents of a STREAMINFO block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfoBlock {
    /// Minimum block size in samples
    pub min_block_size: u16,
    /// Maximum block size in samples
    pub max_block_size: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Total samples per channel, 0 if unknown
    pub total_samples: u64,
}

/// Header of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Number of samples per channel in this frame
    pub block_size: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Index of the first sample of this frame within the stream
    pub first_sample: u64,
}

impl FrameHeader {
    /// Number of PCM bytes this frame packs into.
    pub fn byte_len(&self) -> usize {
        self.block_size as usize * ((self.channels as usize * self.bits_per_sample as usize) >> 3)
    }
}

/// Answer of a [`DecoderSink`] to a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Keep decoding.
    Continue,
    /// Stop decoding; the decoder moves to [`DecoderState::Aborted`].
    Abort,
}

/// Result of binding a source to a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Source bound, ready to read metadata.
    Ok,
    /// The source is not a stream this decoder understands.
    UnsupportedContainer,
    /// The decoder was not set up with usable callbacks.
    InvalidCallbacks,
    /// Buffers for the stream could not be allocated.
    MemoryAllocationError,
    /// The source could not be read.
    ErrorOpeningFile,
    /// `init` was already called on this decoder.
    AlreadyInitialized,
}

impl InitStatus {
    /// Returns `true` if the source was bound.
    pub fn is_ok(&self) -> bool {
        matches!(self, InitStatus::Ok)
    }
}

/// Decoder state machine, as reported by [`FrameDecoder::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No source bound.
    Uninitialized,
    /// Looking for the stream marker and first metadata block.
    SearchForMetadata,
    /// Reading metadata blocks.
    ReadMetadata,
    /// Looking for the next frame sync code.
    SearchForFrameSync,
    /// Decoding a frame.
    ReadFrame,
    /// The source is exhausted.
    EndOfStream,
    /// The last seek failed; a flush or new seek is required.
    SeekError,
    /// Decoding was aborted by the sink or by an unrecoverable error.
    Aborted,
}

/// Callbacks fired by a [`FrameDecoder`] while it advances.
pub trait DecoderSink {
    /// A metadata block was read.
    fn on_metadata(&mut self, metadata: &StreamMetadata);

    /// A frame was decoded. `pcm` holds the frame's samples packed as
    /// interleaved little-endian PCM at the stream's bit depth.
    fn on_frame(&mut self, header: &FrameHeader, pcm: Bytes) -> WriteStatus;
}

// ============================================================================
// Core Traits
// ============================================================================

/// Opaque frame-oriented decoder.
///
/// Boolean returns mirror the "did it work" contract of callback decoders:
/// details are not exposed beyond [`FrameDecoder::state`].
///
/// ## Implementation Notes
///
/// - `init` must not read metadata; metadata is read lazily on the first
///   `process_until_end_of_metadata` call.
/// - `process_single` decodes at most one frame and fires `on_frame` for it.
///   Returning `false` (or returning `true` without a frame while in
///   [`DecoderState::EndOfStream`]) means no more data.
/// - `finish` releases the source and must be safe to call repeatedly.
pub trait FrameDecoder: Send {
    /// Returns `true` if the decoder object can be used.
    fn is_valid(&self) -> bool;

    /// Bind an input source.
    fn init(&mut self, source: Box<dyn ByteSource>) -> InitStatus;

    /// Read and report every metadata block up to the first audio frame.
    fn process_until_end_of_metadata(&mut self, sink: &mut dyn DecoderSink) -> bool;

    /// Decode exactly one frame.
    fn process_single(&mut self, sink: &mut dyn DecoderSink) -> bool;

    /// Seek so that the next decoded frame starts at `sample`.
    fn seek_absolute(&mut self, sample: u64) -> bool;

    /// Current decoder state.
    fn state(&self) -> DecoderState;

    /// Release the bound source.
    fn finish(&mut self) -> bool;

    /// Byte offset of the bound source, `None` if no source is bound.
    fn position(&self) -> Option<u64>;
}

// ============================================================================
// Stream Description
// ============================================================================

/// PCM layout of the produced byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmEncoding {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

/// Stream metadata with the derived values the byte stream needs.
///
/// Computed once from the STREAMINFO block and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Total samples per channel
    pub total_samples: u64,
    /// Stream duration in seconds, 0 when the sample rate is unknown
    pub duration: f64,
    /// Average PCM byte rate (`sample_rate × block_align`)
    pub bytes_per_second: u32,
    /// PCM byte length including the synthetic WAVE header
    pub stream_length: u64,
}

impl StreamInfo {
    /// Derive stream info from a STREAMINFO block.
    pub fn from_block(block: &StreamInfoBlock) -> Self {
        let block_align = block.channels as u32 * (block.bits_per_sample as u32 / 8);
        let bytes_per_second = block.sample_rate.saturating_mul(block_align);

        let bytes_per_inter_channel_sample =
            (block.channels as u64 * block.bits_per_sample as u64) >> 3;
        let stream_length = block.total_samples * bytes_per_inter_channel_sample + WAVE_HEADER_SIZE;

        let duration = if block.sample_rate == 0 {
            0.0
        } else {
            block.total_samples as f64 / block.sample_rate as f64
        };

        Self {
            sample_rate: block.sample_rate,
            channels: block.channels,
            bits_per_sample: block.bits_per_sample,
            total_samples: block.total_samples,
            duration,
            bytes_per_second,
            stream_length,
        }
    }

    /// Bytes per inter-channel sample frame.
    pub fn block_align(&self) -> u32 {
        self.channels as u32 * (self.bits_per_sample as u32 / 8)
    }

    /// PCM byte length without the synthetic header.
    pub fn data_length(&self) -> u64 {
        self.stream_length - WAVE_HEADER_SIZE
    }

    /// PCM layout of the produced stream.
    pub fn encoding(&self) -> PcmEncoding {
        PcmEncoding {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }

    /// Stream duration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidState`] when the sample rate is zero.
    pub fn try_duration(&self) -> Result<Duration> {
        if self.sample_rate == 0 {
            return Err(StreamError::InvalidState(
                "Stream has no sample rate, duration is undefined".to_string(),
            ));
        }
        Ok(Duration::from_secs_f64(self.duration))
    }

    /// Seconds of audio held by `size` PCM bytes. Returns 0 when the byte
    /// rate is zero.
    pub fn duration_for_size(&self, size: u64) -> f64 {
        if self.bytes_per_second == 0 {
            return 0.0;
        }
        size as f64 / self.bytes_per_second as f64
    }

    /// PCM bytes covering `duration` seconds (truncated).
    pub fn size_for_duration(&self, duration: f64) -> u64 {
        (duration * self.bytes_per_second as f64) as u64
    }

    /// Translate a byte position into the decoder's sample offset.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidState`] when the selected divisor is zero.
    pub fn sample_offset(&self, position: u64, conversion: SeekConversion) -> Result<u64> {
        let divisor = match conversion {
            SeekConversion::BitsPerSample => self.bits_per_sample as u64,
            SeekConversion::BlockAlign => self.block_align() as u64,
        };

        if divisor == 0 {
            return Err(StreamError::InvalidState(
                "Cannot seek current stream.".to_string(),
            ));
        }

        Ok(position / divisor)
    }
}

// ============================================================================
// Decoded Audio Data
// ============================================================================

/// Read-only view into a decoded frame buffer.
///
/// The adapter keeps the unread tail of the last frame as a segment between
/// reads. Segments are only ever re-sliced, never written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferSegment {
    buffer: Bytes,
    offset: usize,
    count: usize,
}

impl BufferSegment {
    /// Segment covering a whole buffer.
    pub fn new(buffer: Bytes) -> Self {
        let count = buffer.len();
        Self {
            buffer,
            offset: 0,
            count,
        }
    }

    /// Segment covering `count` bytes starting at `offset`.
    ///
    /// The range is clamped to the buffer bounds.
    pub fn with_range(buffer: Bytes, offset: usize, count: usize) -> Self {
        let offset = offset.min(buffer.len());
        let count = count.min(buffer.len() - offset);
        Self {
            buffer,
            offset,
            count,
        }
    }

    /// The "no carried-over data" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Offset of the first unread byte.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of unread bytes.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` if no bytes remain.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The unread bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.count]
    }

    /// Mark `n` bytes as consumed.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.count);
        self.offset += n;
        self.count -= n;
    }
}

// ============================================================================
// Tests
// ============================================================================
