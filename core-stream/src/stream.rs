//! # PCM Byte Stream
//!
//! Sequential, seekable byte view over a frame decoder.
//!
//! Frames come out of the decoder in whatever size the encoder chose. Readers
//! ask for arbitrary byte counts. The gap is bridged with a carry-over
//! segment: the unread tail of the last frame, kept between reads.
//!
//! ```text
//! frames:   [ 4096 B ][ 4096 B ][ 4096 B ][ 1200 B ]
//! reads:    [ 2048 ][ 2048 ][ 2048 ][ 2048 ][ 2048 ][ 2048 ][1200]
//! ```

use crate::decoder::DecoderFacade;
use crate::error::{Result, StreamError};
use crate::traits::{BufferSegment, ByteSource, StreamInfo};
use bytes::{Bytes, BytesMut};
use std::io;
use tracing::{debug, instrument};

/// Position of the lazily-restartable frame sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCursor {
    /// Not primed. The next advance reads stream info and yields the empty
    /// sentinel segment.
    NotStarted,
    /// Yielding frames.
    Active,
    /// The facade ran out of frames. Stays exhausted until a seek restarts it.
    Exhausted,
}

/// Arbitrary-length reads over decoded PCM frames.
pub struct PcmByteStream {
    facade: DecoderFacade,
    cursor: FrameCursor,
    carry_over: BufferSegment,
    header_read: bool,
    stream_info: Option<StreamInfo>,
    disposed: bool,
}

impl PcmByteStream {
    /// Wrap an initialized facade.
    pub fn new(facade: DecoderFacade) -> Self {
        Self {
            facade,
            cursor: FrameCursor::NotStarted,
            carry_over: BufferSegment::empty(),
            header_read: false,
            stream_info: None,
            disposed: false,
        }
    }

    /// Bind `source` to the facade and wrap it.
    ///
    /// # Errors
    ///
    /// Propagates [`DecoderFacade::initialize`] failures.
    pub fn open(mut facade: DecoderFacade, source: Box<dyn ByteSource>) -> Result<Self> {
        facade.initialize(source)?;
        Ok(Self::new(facade))
    }

    /// Byte offset of the underlying source.
    pub fn position(&self) -> u64 {
        self.facade.position()
    }

    /// Current frame sequence state.
    pub fn cursor(&self) -> FrameCursor {
        self.cursor
    }

    /// Stream metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::EndOfStream`] if the stream has no metadata.
    pub fn get_stream_info(&mut self) -> Result<StreamInfo> {
        self.check_not_disposed()?;
        self.ensure_header_read()?;
        self.stream_info
            .ok_or_else(|| StreamError::EndOfStream("The stream doesn't contain any data.".to_string()))
    }

    /// Seconds of audio held by `size` bytes, 0 if the byte rate is zero.
    pub fn get_duration_for_size(&mut self, size: u64) -> Result<f64> {
        Ok(self.get_stream_info()?.duration_for_size(size))
    }

    /// Bytes covering `duration` seconds.
    pub fn get_size_for_duration(&mut self, duration: f64) -> Result<u64> {
        Ok(self.get_stream_info()?.size_for_duration(duration))
    }

    /// Read up to `count` bytes into a new buffer.
    ///
    /// A zero-length result means the stream is exhausted.
    pub fn read(&mut self, count: usize) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(count);
        self.read_into(&mut buffer, count)?;
        Ok(buffer.freeze())
    }

    /// Replace the contents of `buffer` with up to `count` bytes.
    ///
    /// Returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// - [`StreamError::OutOfRange`] if `count` exceeds the buffer capacity.
    /// - [`StreamError::EndOfStream`] if the stream has no metadata.
    /// - [`StreamError::InvalidState`] after [`PcmByteStream::dispose`].
    pub fn read_into(&mut self, buffer: &mut BytesMut, count: usize) -> Result<usize> {
        self.check_not_disposed()?;

        if count > buffer.capacity() {
            return Err(StreamError::OutOfRange(format!(
                "Read of {} bytes exceeds buffer capacity {}",
                count,
                buffer.capacity()
            )));
        }

        buffer.clear();
        self.ensure_header_read()?;

        if self.carry_over.count() >= count {
            buffer.extend_from_slice(&self.carry_over.as_slice()[..count]);
            self.carry_over.advance(count);
            return Ok(count);
        }

        let mut read = self.carry_over.count();
        buffer.extend_from_slice(self.carry_over.as_slice());
        self.carry_over = BufferSegment::empty();

        while let Some(mut segment) = self.advance()? {
            let rest = count - read;
            if segment.count() >= rest {
                buffer.extend_from_slice(&segment.as_slice()[..rest]);
                read += rest;
                segment.advance(rest);
                self.carry_over = segment;
                break;
            }

            buffer.extend_from_slice(segment.as_slice());
            read += segment.count();
        }

        Ok(read)
    }

    /// Move to `position` (byte units of the decoder).
    ///
    /// An exhausted frame sequence is restarted first. Carried-over bytes
    /// from before the seek are dropped.
    #[instrument(skip(self))]
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.check_not_disposed()?;

        if self.cursor == FrameCursor::Exhausted {
            debug!("Restarting exhausted frame sequence");
            self.cursor = FrameCursor::NotStarted;
        }

        self.advance()?;
        self.carry_over = BufferSegment::empty();
        self.facade.seek(position)
    }

    /// Release the decoder's source. Safe to call repeatedly.
    pub fn finish(&mut self) {
        self.facade.finish();
        self.carry_over = BufferSegment::empty();
        self.cursor = FrameCursor::Exhausted;
    }

    /// Finish and tear down. Later calls fail with
    /// [`StreamError::InvalidState`]. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.finish();
        self.facade.dispose();
        self.disposed = true;
        debug!("Byte stream disposed");
    }

    /// Returns `true` after [`PcmByteStream::dispose`].
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn check_not_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(StreamError::InvalidState("Stream is disposed.".to_string()));
        }
        Ok(())
    }

    fn ensure_header_read(&mut self) -> Result<()> {
        if self.header_read {
            return Ok(());
        }

        match self.advance()? {
            Some(segment) => {
                self.carry_over = segment;
                self.header_read = true;
                Ok(())
            }
            None => Err(StreamError::EndOfStream(
                "The stream doesn't contain any data.".to_string(),
            )),
        }
    }

    /// Step the frame sequence once.
    fn advance(&mut self) -> Result<Option<BufferSegment>> {
        match self.cursor {
            FrameCursor::NotStarted => {
                self.stream_info = Some(self.facade.get_stream_info()?);
                self.cursor = FrameCursor::Active;
                Ok(Some(BufferSegment::empty()))
            }
            FrameCursor::Active => match self.facade.get_sample() {
                Some(frame) => Ok(Some(BufferSegment::new(frame))),
                None => {
                    debug!("Frame sequence exhausted");
                    self.cursor = FrameCursor::Exhausted;
                    Ok(None)
                }
            },
            FrameCursor::Exhausted => Ok(None),
        }
    }
}

impl io::Read for PcmByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut scratch = BytesMut::with_capacity(buf.len());
        let n = self.read_into(&mut scratch, buf.len())?;
        buf[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }
}
