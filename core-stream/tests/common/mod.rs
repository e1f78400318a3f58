//! Shared fixtures for core-stream integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use core_stream::traits::{
    ByteSource, DecoderSink, DecoderState, FrameDecoder, FrameHeader, InitStatus,
    StreamInfoBlock, StreamMetadata,
};
use core_stream::{DecoderFacade, PcmByteStream};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Bytes the scripted "metadata" occupies in the source.
pub const METADATA_LEN: u64 = 42;

/// What a [`ScriptedDecoder`] was asked to do.
#[derive(Debug, Default)]
pub struct DecoderLog {
    pub metadata_scans: usize,
    pub frames_decoded: usize,
    pub seeks: Vec<u64>,
    pub finishes: usize,
}

pub type SharedLog = Arc<Mutex<DecoderLog>>;

/// Decoder replaying a fixed list of PCM frames.
///
/// Byte position is `METADATA_LEN` plus the size of every frame handed out
/// since the last seek.
pub struct ScriptedDecoder {
    block: Option<StreamInfoBlock>,
    frames: Vec<Bytes>,
    next: usize,
    position: Option<u64>,
    state: DecoderState,
    init_status: InitStatus,
    fail_at: Option<usize>,
    log: SharedLog,
}

impl ScriptedDecoder {
    pub fn new(block: StreamInfoBlock) -> Self {
        Self {
            block: Some(block),
            frames: Vec::new(),
            next: 0,
            position: None,
            state: DecoderState::Uninitialized,
            init_status: InitStatus::Ok,
            fail_at: None,
            log: SharedLog::default(),
        }
    }

    /// Split `pcm` into frames of `frame_len` bytes (the last one shorter).
    pub fn with_pcm(mut self, pcm: &[u8], frame_len: usize) -> Self {
        self.frames = pcm
            .chunks(frame_len)
            .map(Bytes::copy_from_slice)
            .collect();
        self
    }

    pub fn with_frames(mut self, frames: Vec<Bytes>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_init_status(mut self, status: InitStatus) -> Self {
        self.init_status = status;
        self
    }

    /// Report a decode failure instead of frame `index`.
    pub fn with_failure_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn without_stream_info(mut self) -> Self {
        self.block = None;
        self
    }

    pub fn log(&self) -> SharedLog {
        Arc::clone(&self.log)
    }

    fn block_align(&self) -> u64 {
        self.block
            .map(|b| (b.channels as u64 * b.bits_per_sample as u64) >> 3)
            .unwrap_or(0)
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn is_valid(&self) -> bool {
        true
    }

    fn init(&mut self, _source: Box<dyn ByteSource>) -> InitStatus {
        if self.position.is_some() {
            return InitStatus::AlreadyInitialized;
        }
        if self.init_status.is_ok() {
            self.position = Some(0);
            self.state = DecoderState::SearchForMetadata;
        }
        self.init_status
    }

    fn process_until_end_of_metadata(&mut self, sink: &mut dyn DecoderSink) -> bool {
        self.log.lock().unwrap().metadata_scans += 1;
        if self.position.is_none() {
            return false;
        }
        if let Some(block) = self.block {
            sink.on_metadata(&StreamMetadata::StreamInfo(block));
        }
        sink.on_metadata(&StreamMetadata::Other(4));
        self.position = Some(METADATA_LEN);
        self.state = DecoderState::SearchForFrameSync;
        true
    }

    fn process_single(&mut self, sink: &mut dyn DecoderSink) -> bool {
        let Some(position) = self.position else {
            return false;
        };
        if self.state == DecoderState::Aborted {
            return false;
        }
        if self.fail_at == Some(self.next) {
            self.state = DecoderState::Aborted;
            return false;
        }
        let Some(frame) = self.frames.get(self.next).cloned() else {
            self.state = DecoderState::EndOfStream;
            return true;
        };

        let block = self.block.unwrap_or_default();
        let align = self.block_align().max(1);
        let first_sample = (position - METADATA_LEN) / align;
        let header = FrameHeader {
            block_size: (frame.len() as u64 / align) as u32,
            sample_rate: block.sample_rate,
            channels: block.channels,
            bits_per_sample: block.bits_per_sample,
            first_sample,
        };

        self.next += 1;
        self.position = Some(position + frame.len() as u64);
        self.log.lock().unwrap().frames_decoded += 1;
        sink.on_frame(&header, frame);
        true
    }

    /// Lands on the start of the frame holding `sample`.
    fn seek_absolute(&mut self, sample: u64) -> bool {
        self.log.lock().unwrap().seeks.push(sample);

        let target = sample * self.block_align();
        let mut start = 0u64;
        for (index, frame) in self.frames.iter().enumerate() {
            let end = start + frame.len() as u64;
            if target < end {
                self.next = index;
                self.position = Some(METADATA_LEN + start);
                self.state = DecoderState::SearchForFrameSync;
                return true;
            }
            start = end;
        }

        self.state = DecoderState::SeekError;
        false
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    fn finish(&mut self) -> bool {
        self.log.lock().unwrap().finishes += 1;
        self.position = None;
        self.state = DecoderState::Uninitialized;
        true
    }

    fn position(&self) -> Option<u64> {
        self.position
    }
}

pub fn stream_info_block(
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    total_samples: u64,
) -> StreamInfoBlock {
    StreamInfoBlock {
        min_block_size: 4096,
        max_block_size: 4096,
        sample_rate,
        channels,
        bits_per_sample,
        total_samples,
    }
}

/// Deterministic PCM content: byte `i` is `i % 251`.
pub fn pcm_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Open a byte stream over `decoder`.
pub fn open_stream(decoder: ScriptedDecoder) -> PcmByteStream {
    let facade = DecoderFacade::new(Box::new(decoder));
    PcmByteStream::open(facade, Box::new(Cursor::new(Vec::<u8>::new())))
        .expect("scripted decoder binds")
}

// ============================================================================
// Hand-assembled FLAC
// ============================================================================

fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
    }
    crc
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
        }
    }
    crc
}

/// Builds a native FLAC stream: 44.1 kHz, 16-bit stereo, fixed 32-sample
/// blocks, verbatim subframes, real CRCs.
pub struct FlacBuilder {
    samples: Vec<(i16, i16)>,
    declared_bits: u64,
    reserved_blocks: Vec<usize>,
}

impl FlacBuilder {
    pub const BLOCK: usize = 32;

    /// `samples` holds `(left, right)` pairs.
    pub fn new(samples: &[(i16, i16)]) -> Self {
        Self {
            samples: samples.to_vec(),
            declared_bits: 16,
            reserved_blocks: Vec::new(),
        }
    }

    /// Bit depth announced in STREAMINFO. Frames stay 16-bit.
    pub fn with_declared_bits(mut self, bits: u64) -> Self {
        self.declared_bits = bits;
        self
    }

    /// Give the left channel of these blocks a reserved subframe type. The
    /// frames still carry valid CRCs, so only the codec rejects them.
    pub fn with_reserved_subframe_in(mut self, blocks: impl IntoIterator<Item = usize>) -> Self {
        self.reserved_blocks.extend(blocks);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        const SAMPLE_RATE: u64 = 44_100;
        let block_len = Self::BLOCK as u16;

        let mut out = Vec::new();
        out.extend_from_slice(b"fLaC");

        // Last-block flag + STREAMINFO, 34 bytes
        out.extend_from_slice(&[0x80, 0x00, 0x00, 0x22]);
        out.extend_from_slice(&block_len.to_be_bytes());
        out.extend_from_slice(&block_len.to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        let packed = (SAMPLE_RATE << 44)
            | (1u64 << 41)
            | ((self.declared_bits - 1) << 36)
            | self.samples.len() as u64;
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);

        for (number, block) in self.samples.chunks(Self::BLOCK).enumerate() {
            let mut frame = vec![0xFF, 0xF8, 0x69, 0x18, number as u8, (block.len() - 1) as u8];
            frame.push(crc8(&frame));

            for channel in 0..2 {
                let reserved = channel == 0 && self.reserved_blocks.contains(&number);
                frame.push(if reserved { 0x04 } else { 0x02 });
                for &(left, right) in block {
                    let value = if channel == 0 { left } else { right };
                    frame.extend_from_slice(&value.to_be_bytes());
                }
            }

            let crc = crc16(&frame);
            frame.extend_from_slice(&crc.to_be_bytes());
            out.extend_from_slice(&frame);
        }

        out
    }
}

pub fn build_flac(samples: &[(i16, i16)]) -> Vec<u8> {
    FlacBuilder::new(samples).build()
}

/// Interleaved little-endian PCM for `samples`.
pub fn expected_pcm(samples: &[(i16, i16)]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&(left, right)| {
            let mut pair = left.to_le_bytes().to_vec();
            pair.extend_from_slice(&right.to_le_bytes());
            pair
        })
        .collect()
}

/// A ramp in both channels.
pub fn ramp(len: usize) -> Vec<(i16, i16)> {
    (0..len as i32)
        .map(|i| ((i * 400 - 16_000) as i16, (12_000 - i * 300) as i16))
        .collect()
}
