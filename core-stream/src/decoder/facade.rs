//! # Decoder Facade
//!
//! Owns one frame decoder and turns its callback protocol into plain calls:
//! "give me the stream info", "give me the next frame", "seek here".

use crate::config::SeekConversion;
use crate::decoder::SamplePacker;
use crate::error::{Result, StreamError};
use crate::traits::{
    ByteSource, DecoderSink, DecoderState, FrameDecoder, FrameHeader, StreamInfo,
    StreamMetadata, WriteStatus,
};
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

/// Collects what the decoder reports during one call.
#[derive(Default)]
struct CallbackSink {
    stream_info: Option<StreamInfo>,
    current_sample: Option<Bytes>,
}

impl DecoderSink for CallbackSink {
    fn on_metadata(&mut self, metadata: &StreamMetadata) {
        if let StreamMetadata::StreamInfo(block) = metadata {
            self.stream_info = Some(StreamInfo::from_block(block));
        }
    }

    fn on_frame(&mut self, _header: &FrameHeader, pcm: Bytes) -> WriteStatus {
        self.current_sample = Some(pcm);
        WriteStatus::Continue
    }
}

/// Metadata cache and cursor over a [`FrameDecoder`].
///
/// One facade serves one stream: it is initialized once, and once finished or
/// disposed it cannot be bound again.
pub struct DecoderFacade {
    decoder: Box<dyn FrameDecoder>,
    seek_conversion: SeekConversion,
    stream_info: Option<StreamInfo>,
    bound: bool,
    torn_down: bool,
}

impl DecoderFacade {
    /// Wrap a decoder. The facade takes ownership of it.
    pub fn new(decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            decoder,
            seek_conversion: SeekConversion::default(),
            stream_info: None,
            bound: false,
            torn_down: false,
        }
    }

    /// Select how byte positions map onto sample offsets when seeking.
    pub fn with_seek_conversion(mut self, conversion: SeekConversion) -> Self {
        self.seek_conversion = conversion;
        self
    }

    /// Active seek conversion.
    pub fn seek_conversion(&self) -> SeekConversion {
        self.seek_conversion
    }

    /// Bind the decoder to an input source.
    ///
    /// # Errors
    ///
    /// - [`StreamError::InvalidState`] if the decoder is not usable (invalid,
    ///   already bound, or torn down).
    /// - [`StreamError::InitializationFailed`] if the decoder rejects the
    ///   source. The decoder is then finished and this facade cannot be
    ///   initialized again.
    #[instrument(skip_all)]
    pub fn initialize(&mut self, source: Box<dyn ByteSource>) -> Result<()> {
        if self.torn_down || !self.decoder.is_valid() {
            return Err(StreamError::InvalidState("Decoder is not valid.".to_string()));
        }

        if self.bound {
            return Err(StreamError::InvalidState(
                "Decoder is already bound to a source.".to_string(),
            ));
        }

        let status = self.decoder.init(source);
        if !status.is_ok() {
            warn!("Decoder rejected source: {:?}", status);
            self.decoder.finish();
            self.torn_down = true;
            return Err(StreamError::InitializationFailed(format!(
                "Failed to initialize decoder: {:?}",
                status
            )));
        }

        self.bound = true;
        info!("Decoder initialized");
        Ok(())
    }

    /// Stream metadata, read from the decoder on first access.
    ///
    /// # Errors
    ///
    /// - [`StreamError::EndOfStream`] if the stream has no metadata.
    /// - [`StreamError::InvalidFormat`] if samples of this bit depth cannot
    ///   be packed into PCM bytes.
    pub fn get_stream_info(&mut self) -> Result<StreamInfo> {
        self.ensure_metadata_read()
    }

    /// Metadata, if it has been read already.
    pub fn cached_stream_info(&self) -> Option<StreamInfo> {
        self.stream_info
    }

    /// Decode exactly one frame.
    ///
    /// Returns `None` when decoding cannot continue. End of stream and decode
    /// errors are not told apart here.
    pub fn get_sample(&mut self) -> Option<Bytes> {
        if !self.bound {
            return None;
        }

        let mut sink = CallbackSink::default();
        let ok = self.decoder.process_single(&mut sink);

        if self.stream_info.is_none() {
            self.stream_info = sink.stream_info;
        }

        if !ok {
            debug!("Decoder stopped in state {:?}", self.decoder.state());
            return None;
        }

        sink.current_sample
    }

    /// Move the decoder to `position` (byte units).
    ///
    /// # Errors
    ///
    /// - [`StreamError::EndOfStream`] if metadata is unavailable.
    /// - [`StreamError::InvalidState`] if the stream cannot be seeked (zero
    ///   divisor for the active [`SeekConversion`]).
    /// - [`StreamError::OutOfRange`] if the decoder rejects the target.
    #[instrument(skip(self))]
    pub fn seek(&mut self, position: u64) -> Result<()> {
        if self.position() == position {
            debug!("Already at position {}", position);
            return Ok(());
        }

        let info = self.ensure_metadata_read()?;
        let sample = info.sample_offset(position, self.seek_conversion)?;

        if !self.decoder.seek_absolute(sample) {
            return Err(StreamError::OutOfRange("Position overflow.".to_string()));
        }

        debug!("Seeked to sample {}", sample);
        Ok(())
    }

    /// Release the bound source. Safe to call repeatedly.
    pub fn finish(&mut self) {
        if self.bound {
            self.decoder.finish();
            self.bound = false;
            debug!("Decoder finished");
        }
    }

    /// Byte offset of the bound source, 0 if none is bound.
    pub fn position(&self) -> u64 {
        if !self.bound {
            return 0;
        }
        self.decoder.position().unwrap_or(0)
    }

    /// Finish and tear down. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.torn_down && !self.bound {
            return;
        }
        self.finish();
        self.torn_down = true;
        debug!("Decoder disposed");
    }

    /// Returns `true` once the facade has been disposed or failed to bind.
    pub fn is_disposed(&self) -> bool {
        self.torn_down
    }

    fn ensure_metadata_read(&mut self) -> Result<StreamInfo> {
        if let Some(info) = self.stream_info {
            return Self::check_packable(info);
        }

        if self.torn_down {
            return Err(StreamError::InvalidState("Decoder is disposed.".to_string()));
        }

        let mut sink = CallbackSink::default();
        let ok = self.decoder.process_until_end_of_metadata(&mut sink);

        if !ok || self.decoder.state() == DecoderState::EndOfStream {
            return Err(StreamError::EndOfStream(
                "No metadata found, or unexpected call.".to_string(),
            ));
        }

        let info = sink.stream_info.ok_or_else(|| {
            StreamError::EndOfStream("Stream carries no STREAMINFO block.".to_string())
        })?;

        debug!(
            "Stream info: {}Hz, {} channels, {} bits, {} bytes/s",
            info.sample_rate, info.channels, info.bits_per_sample, info.bytes_per_second
        );

        self.stream_info = Some(info);
        Self::check_packable(info)
    }

    /// Frames of a stream whose depth cannot be packed would never arrive.
    /// A zero depth passes; the conversions report it as `InvalidState`.
    fn check_packable(info: StreamInfo) -> Result<StreamInfo> {
        if info.bits_per_sample != 0 {
            SamplePacker::bytes_per_sample(info.bits_per_sample)?;
        }
        Ok(info)
    }
}
