//! # Symphonia FLAC Frame Decoder
//!
//! [`FrameDecoder`] implementation on top of Symphonia's FLAC reader and
//! codec.

use crate::decoder::pack::SamplePacker;
use crate::traits::{
    ByteSource, DecoderSink, DecoderState, FrameDecoder, FrameHeader, InitStatus,
    StreamInfoBlock, StreamMetadata, WriteStatus,
};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia_bundle_flac::{FlacDecoder, FlacReader};
use tracing::{debug, error, info, instrument, warn};

/// FLAC stream marker.
const STREAM_MARKER: &[u8; 4] = b"fLaC";

/// Consecutive undecodable packets tolerated before the decoder aborts.
const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Byte source that publishes its read position.
///
/// Symphonia owns the source once the reader is built, so the position is
/// shared through an atomic the decoder keeps a handle to.
struct TrackedSource {
    inner: Box<dyn ByteSource>,
    position: Arc<AtomicU64>,
    len: Option<u64>,
}

impl TrackedSource {
    fn new(mut inner: Box<dyn ByteSource>) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0)).ok();
        inner.seek(SeekFrom::Start(0))?;

        Ok(Self {
            inner,
            position: Arc::new(AtomicU64::new(0)),
            len,
        })
    }
}

impl Read for TrackedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl Seek for TrackedSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let (SeekFrom::Start(offset), Some(len)) = (pos, self.len) {
            if offset > len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Seek offset {} beyond source length {}", offset, len),
                ));
            }
        }

        let position = self.inner.seek(pos)?;
        self.position.store(position, Ordering::Relaxed);
        Ok(position)
    }
}

impl MediaSource for TrackedSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// FLAC frame decoder backed by Symphonia.
///
/// ## State Management
///
/// - `init` checks the stream marker and keeps the source until metadata is
///   requested.
/// - The first `process_until_end_of_metadata` (or `process_single`) hands the
///   source to a [`FlacReader`], which reads every metadata block.
/// - Sample-accurate seeks may land before the target; the surplus leading
///   samples are dropped from the next decoded frame.
pub struct SymphoniaFlacDecoder {
    /// Source waiting for metadata processing
    pending_source: Option<TrackedSource>,

    /// Shared read position of the bound source
    position: Option<Arc<AtomicU64>>,

    /// Demuxer, owns the source once built
    reader: Option<FlacReader>,

    /// Codec
    codec: Option<FlacDecoder>,

    /// Track being decoded
    track_id: u32,

    /// STREAMINFO of the bound stream
    stream_info: Option<StreamInfoBlock>,

    /// Samples per channel still owed to the last seek
    pending_skip: u64,

    state: DecoderState,
}

impl SymphoniaFlacDecoder {
    /// Create an unbound decoder.
    pub fn new() -> Self {
        Self {
            pending_source: None,
            position: None,
            reader: None,
            codec: None,
            track_id: 0,
            stream_info: None,
            pending_skip: 0,
            state: DecoderState::Uninitialized,
        }
    }

    fn is_bound(&self) -> bool {
        self.pending_source.is_some() || self.reader.is_some()
    }

    fn stream_info_from_params(params: &CodecParameters) -> Option<StreamInfoBlock> {
        let sample_rate = params.sample_rate?;
        let channels = params.channels?.count() as u16;
        let bits_per_sample = params.bits_per_sample? as u16;

        // The raw STREAMINFO block is carried as codec extra data.
        let (min_block_size, max_block_size) = match params.extra_data.as_deref() {
            Some(raw) if raw.len() >= 4 => (
                u16::from_be_bytes([raw[0], raw[1]]),
                u16::from_be_bytes([raw[2], raw[3]]),
            ),
            _ => {
                let max = params.max_frames_per_packet.unwrap_or(0) as u16;
                (max, max)
            }
        };

        Some(StreamInfoBlock {
            min_block_size,
            max_block_size,
            sample_rate,
            channels,
            bits_per_sample,
            total_samples: params.n_frames.unwrap_or(0),
        })
    }

    /// Re-open the demuxer at the start of the bound source.
    fn rebuild_reader(&mut self) -> Result<(), SymphoniaError> {
        let Some(reader) = self.reader.take() else {
            return Err(SymphoniaError::SeekError(SeekErrorKind::Unseekable));
        };

        let mut stream = Box::new(reader).into_inner();
        stream.seek(SeekFrom::Start(0))?;

        let reader = FlacReader::try_new(stream, &FormatOptions::default())?;
        if let Some(track) = reader.default_track() {
            self.track_id = track.id;
        }

        self.reader = Some(reader);
        self.pending_skip = 0;
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
        Ok(())
    }

    /// Decode the next packet into full-scale interleaved samples.
    ///
    /// Returns `Ok(None)` at end of stream.
    fn decode_next_packet(&mut self) -> Result<Option<(u64, usize, Vec<i32>)>, SymphoniaError> {
        let (Some(reader), Some(codec)) = (self.reader.as_mut(), self.codec.as_mut()) else {
            return Ok(None);
        };

        let mut consecutive_errors = 0;

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match codec.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let frames = decoded.frames();
                    let mut buffer = SampleBuffer::<i32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);

                    return Ok(Some((packet.ts(), frames, buffer.samples().to_vec())));
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping undecodable frame (attempt {}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, reason
                    );

                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(SymphoniaError::DecodeError(reason));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for SymphoniaFlacDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for SymphoniaFlacDecoder {
    fn is_valid(&self) -> bool {
        true
    }

    #[instrument(skip_all)]
    fn init(&mut self, mut source: Box<dyn ByteSource>) -> InitStatus {
        if self.is_bound() {
            return InitStatus::AlreadyInitialized;
        }

        let mut marker = [0u8; 4];
        if let Err(e) = source
            .seek(SeekFrom::Start(0))
            .and_then(|_| source.read_exact(&mut marker))
        {
            warn!("Failed to read stream marker: {}", e);
            return InitStatus::ErrorOpeningFile;
        }

        if &marker != STREAM_MARKER {
            warn!("Source is not a native FLAC stream");
            return InitStatus::UnsupportedContainer;
        }

        let tracked = match TrackedSource::new(source) {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!("Failed to rewind source: {}", e);
                return InitStatus::ErrorOpeningFile;
            }
        };

        self.position = Some(Arc::clone(&tracked.position));
        self.pending_source = Some(tracked);
        self.state = DecoderState::SearchForMetadata;

        debug!("Source bound");
        InitStatus::Ok
    }

    #[instrument(skip_all)]
    fn process_until_end_of_metadata(&mut self, sink: &mut dyn DecoderSink) -> bool {
        if self.reader.is_some() {
            return true;
        }

        let Some(source) = self.pending_source.take() else {
            return false;
        };

        self.state = DecoderState::ReadMetadata;

        let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());
        let reader = match FlacReader::try_new(stream, &FormatOptions::default()) {
            Ok(reader) => reader,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("Stream ended before metadata was complete");
                self.state = DecoderState::EndOfStream;
                return false;
            }
            Err(e) => {
                error!("Failed to read metadata: {}", e);
                self.state = DecoderState::Aborted;
                return false;
            }
        };

        let Some(track) = reader.default_track() else {
            error!("Stream has no audio track");
            self.state = DecoderState::Aborted;
            return false;
        };

        let track_id = track.id;
        let params = track.codec_params.clone();

        let Some(block) = Self::stream_info_from_params(&params) else {
            error!("STREAMINFO is incomplete");
            self.state = DecoderState::Aborted;
            return false;
        };

        let codec = match FlacDecoder::try_new(&params, &DecoderOptions::default()) {
            Ok(codec) => codec,
            Err(e) => {
                error!("Failed to create FLAC codec: {}", e);
                self.state = DecoderState::Aborted;
                return false;
            }
        };

        info!(
            "FLAC stream: {}Hz, {} channels, {} bits, {} samples",
            block.sample_rate, block.channels, block.bits_per_sample, block.total_samples
        );

        self.reader = Some(reader);
        self.codec = Some(codec);
        self.track_id = track_id;
        self.stream_info = Some(block);
        self.state = DecoderState::SearchForFrameSync;

        sink.on_metadata(&StreamMetadata::StreamInfo(block));
        true
    }

    fn process_single(&mut self, sink: &mut dyn DecoderSink) -> bool {
        if self.reader.is_none() && !self.process_until_end_of_metadata(sink) {
            return false;
        }

        match self.state {
            DecoderState::EndOfStream => return true,
            DecoderState::Aborted | DecoderState::Uninitialized => return false,
            _ => {}
        }

        let Some(block) = self.stream_info else {
            return false;
        };
        let channels = block.channels.max(1) as usize;

        loop {
            self.state = DecoderState::ReadFrame;

            let (ts, frames, mut samples) = match self.decode_next_packet() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => {
                    debug!("Reached end of stream");
                    self.state = DecoderState::EndOfStream;
                    return true;
                }
                Err(e) => {
                    error!("Frame decoding failed: {}", e);
                    self.state = DecoderState::Aborted;
                    return false;
                }
            };

            let skip = self.pending_skip.min(frames as u64) as usize;
            self.pending_skip -= skip as u64;
            if skip == frames {
                continue;
            }

            samples.drain(..skip * channels);
            SamplePacker::from_full_scale(&mut samples, block.bits_per_sample);

            let pcm = match SamplePacker::pack(&samples, block.bits_per_sample) {
                Ok(pcm) => pcm,
                Err(e) => {
                    error!("Failed to pack samples: {}", e);
                    self.state = DecoderState::Aborted;
                    return false;
                }
            };

            let header = FrameHeader {
                block_size: (frames - skip) as u32,
                sample_rate: block.sample_rate,
                channels: block.channels,
                bits_per_sample: block.bits_per_sample,
                first_sample: ts + skip as u64,
            };

            self.state = DecoderState::SearchForFrameSync;

            return match sink.on_frame(&header, pcm) {
                WriteStatus::Continue => true,
                WriteStatus::Abort => {
                    debug!("Sink aborted decoding");
                    self.state = DecoderState::Aborted;
                    false
                }
            };
        }
    }

    #[instrument(skip(self))]
    fn seek_absolute(&mut self, sample: u64) -> bool {
        if self.reader.is_none() {
            return false;
        }

        let first_block = match self.stream_info {
            Some(block) => {
                if block.total_samples > 0 && sample >= block.total_samples {
                    warn!("Seek target {} beyond {} samples", sample, block.total_samples);
                    return false;
                }
                block.max_block_size.max(1) as u64
            }
            None => 1,
        };

        // The reader's own seek keeps stale parser state when it lands on the
        // first frame, or once the stream has run out.
        let exhausted = self.state == DecoderState::EndOfStream;
        if exhausted || sample < first_block {
            if let Err(e) = self.rebuild_reader() {
                error!("Failed to rewind stream: {}", e);
                self.state = DecoderState::Aborted;
                return false;
            }

            if sample < first_block {
                self.pending_skip = sample;
                self.state = DecoderState::SearchForFrameSync;
                debug!("Rewound to the first frame, skipping {} samples", sample);
                return true;
            }
        }

        let Some(reader) = self.reader.as_mut() else {
            return false;
        };

        let seek_to = SeekTo::TimeStamp {
            ts: sample,
            track_id: self.track_id,
        };

        match reader.seek(SeekMode::Accurate, seek_to) {
            Ok(seeked) => {
                self.pending_skip = seeked.required_ts.saturating_sub(seeked.actual_ts);
                if let Some(codec) = self.codec.as_mut() {
                    codec.reset();
                }
                self.state = DecoderState::SearchForFrameSync;

                debug!(
                    "Seeked to sample {} (landed at {})",
                    seeked.required_ts, seeked.actual_ts
                );
                true
            }
            Err(e) => {
                warn!("Seek to sample {} failed: {}", sample, e);
                self.state = DecoderState::SeekError;
                false
            }
        }
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    fn finish(&mut self) -> bool {
        if self.is_bound() {
            debug!("Releasing source");
        }

        self.pending_source = None;
        self.reader = None;
        self.codec = None;
        self.position = None;
        self.stream_info = None;
        self.pending_skip = 0;
        self.state = DecoderState::Uninitialized;
        true
    }

    fn position(&self) -> Option<u64> {
        self.position
            .as_ref()
            .map(|position| position.load(Ordering::Relaxed))
    }
}
