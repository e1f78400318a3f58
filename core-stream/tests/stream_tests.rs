//! Byte-stream adapter behaviour over a scripted decoder.

mod common;

use common::{open_stream, pcm_pattern, stream_info_block, ScriptedDecoder, METADATA_LEN};
use core_stream::config::SeekConversion;
use core_stream::stream::FrameCursor;
use core_stream::traits::{InitStatus, WAVE_HEADER_SIZE};
use core_stream::{DecoderFacade, PcmByteStream, StreamError};
use std::io::{Cursor, Read};

fn drain(stream: &mut PcmByteStream, count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let chunk = stream.read(count).unwrap();
        assert!(chunk.len() <= count);
        if chunk.is_empty() {
            return out;
        }
        out.extend_from_slice(&chunk);
    }
}

#[test]
fn test_reads_concatenate_to_decoded_bytes() {
    let pcm = pcm_pattern(10_000);

    for frame_len in [1, 7, 512, 4096, 20_000] {
        for count in [1, 3, 100, 4096, 9_999, 50_000] {
            let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 2500))
                .with_pcm(&pcm, frame_len);
            let mut stream = open_stream(decoder);

            assert_eq!(
                drain(&mut stream, count),
                pcm,
                "frame_len {} count {}",
                frame_len,
                count
            );
        }
    }
}

#[test]
fn test_cd_quality_second() {
    let total_samples = 44_100u64;
    let pcm = pcm_pattern(total_samples as usize * 4);
    let decoder = ScriptedDecoder::new(stream_info_block(44_100, 2, 16, total_samples))
        .with_pcm(&pcm, 4096 * 4);
    let mut stream = open_stream(decoder);

    let info = stream.get_stream_info().unwrap();
    assert_eq!(info.bytes_per_second, 176_400);
    assert_eq!(info.stream_length, total_samples * 4 + WAVE_HEADER_SIZE);
    assert_eq!(stream.get_size_for_duration(0.5).unwrap(), 88_200);
    assert!((stream.get_duration_for_size(88_200).unwrap() - 0.5).abs() < 1e-9);

    let first = stream.read(200_000).unwrap();
    assert!(first.len() <= 176_400);

    let total = first.len() as u64 + drain(&mut stream, 200_000).len() as u64;
    assert_eq!(total, info.stream_length - WAVE_HEADER_SIZE);
}

#[test]
fn test_carry_over_spans_reads() {
    let pcm = pcm_pattern(64);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 1, 8, 64)).with_pcm(&pcm, 32);
    let log = decoder.log();
    let mut stream = open_stream(decoder);

    assert_eq!(&stream.read(10).unwrap()[..], &pcm[..10]);
    assert_eq!(log.lock().unwrap().frames_decoded, 1);

    // Served from the carried-over tail, no new frame
    assert_eq!(&stream.read(22).unwrap()[..], &pcm[10..32]);
    assert_eq!(log.lock().unwrap().frames_decoded, 1);

    assert_eq!(&stream.read(40).unwrap()[..], &pcm[32..]);
    assert!(stream.read(40).unwrap().is_empty());
    assert_eq!(stream.cursor(), FrameCursor::Exhausted);
}

#[test]
fn test_read_into_rejects_oversized_count() {
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 4)).with_pcm(&[0; 16], 16);
    let mut stream = open_stream(decoder);

    let mut buffer = bytes::BytesMut::with_capacity(8);
    let err = stream.read_into(&mut buffer, 1024).unwrap_err();
    assert!(matches!(err, StreamError::OutOfRange(_)));
}

#[test]
fn test_missing_metadata_is_end_of_stream() {
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 4)).without_stream_info();
    let mut stream = open_stream(decoder);

    assert!(matches!(stream.read(16), Err(StreamError::EndOfStream(_))));
    assert!(matches!(stream.get_stream_info(), Err(StreamError::EndOfStream(_))));
}

#[test]
fn test_unpackable_bit_depth_is_invalid_format() {
    let decoder = ScriptedDecoder::new(stream_info_block(44_100, 2, 12, 16)).with_pcm(&[0; 48], 48);
    let mut stream = open_stream(decoder);

    assert!(matches!(stream.read(16), Err(StreamError::InvalidFormat(_))));
    assert!(matches!(stream.get_stream_info(), Err(StreamError::InvalidFormat(_))));
}

#[test]
fn test_rejected_source_fails_open() {
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 4))
        .with_init_status(InitStatus::UnsupportedContainer);
    let log = decoder.log();

    let result = PcmByteStream::open(
        DecoderFacade::new(Box::new(decoder)),
        Box::new(Cursor::new(vec![0u8; 8])),
    );

    assert!(matches!(result, Err(StreamError::InitializationFailed(_))));
    assert_eq!(log.lock().unwrap().finishes, 1);
}

#[test]
fn test_seek_to_current_position_issues_no_decoder_seek() {
    let pcm = pcm_pattern(256);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 64)).with_pcm(&pcm, 64);
    let log = decoder.log();
    let mut stream = open_stream(decoder);

    drain(&mut stream, 100);
    let end = stream.position();
    assert_eq!(end, METADATA_LEN + 256);

    stream.seek(end).unwrap();
    assert!(log.lock().unwrap().seeks.is_empty());
    assert!(stream.read(100).unwrap().is_empty());
}

#[test]
fn test_seek_with_zero_bit_depth_is_invalid_state() {
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 0, 64)).with_pcm(&[1; 64], 16);
    let log = decoder.log();
    let mut stream = open_stream(decoder);

    let err = stream.seek(METADATA_LEN + 32).unwrap_err();
    assert!(matches!(err, StreamError::InvalidState(_)));
    assert!(log.lock().unwrap().seeks.is_empty());
}

#[test]
fn test_seek_after_exhaustion_restarts_from_first_byte() {
    let pcm = pcm_pattern(300);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 1, 16, 150)).with_pcm(&pcm, 64);
    let log = decoder.log();
    let mut stream = open_stream(decoder);

    assert_eq!(drain(&mut stream, 50), pcm);
    assert_eq!(stream.cursor(), FrameCursor::Exhausted);

    stream.seek(0).unwrap();
    assert_eq!(log.lock().unwrap().seeks, vec![0]);
    assert_eq!(stream.cursor(), FrameCursor::Active);
    assert_eq!(drain(&mut stream, 50), pcm);
}

#[test]
fn test_seek_drops_carried_over_bytes() {
    let pcm = pcm_pattern(256);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 64)).with_pcm(&pcm, 64);
    let mut stream = open_stream(decoder);

    // Leaves 54 bytes of the first frame carried over
    stream.read(10).unwrap();

    // Byte 128 / 16 bits = sample 8, which lies in the first frame
    stream.seek(128).unwrap();
    assert_eq!(&stream.read(64).unwrap()[..], &pcm[..64]);
}

#[test]
fn test_block_align_seek_conversion() {
    let pcm = pcm_pattern(256);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 64)).with_pcm(&pcm, 64);
    let log = decoder.log();
    let facade =
        DecoderFacade::new(Box::new(decoder)).with_seek_conversion(SeekConversion::BlockAlign);
    let mut stream = PcmByteStream::open(facade, Box::new(Cursor::new(Vec::<u8>::new()))).unwrap();

    stream.read(1).unwrap();
    stream.seek(128).unwrap();

    assert_eq!(log.lock().unwrap().seeks, vec![32]);
    assert_eq!(&stream.read(64).unwrap()[..], &pcm[128..192]);
}

#[test]
fn test_seek_beyond_stream_is_out_of_range() {
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 16)).with_pcm(&[0; 64], 64);
    let mut stream = open_stream(decoder);

    let err = stream.seek(1_000_000).unwrap_err();
    assert!(matches!(err, StreamError::OutOfRange(_)));
}

#[test]
fn test_decode_failure_ends_stream_early() {
    let pcm = pcm_pattern(256);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 64))
        .with_pcm(&pcm, 64)
        .with_failure_at(2);
    let mut stream = open_stream(decoder);

    assert_eq!(drain(&mut stream, 100), &pcm[..128]);
}

#[test]
fn test_io_read_view() {
    let pcm = pcm_pattern(1000);
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 250)).with_pcm(&pcm, 333);
    let mut stream = open_stream(decoder);

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, pcm);
}

#[test]
fn test_dispose_is_idempotent_and_final() {
    let decoder = ScriptedDecoder::new(stream_info_block(8000, 2, 16, 16)).with_pcm(&[0; 64], 64);
    let log = decoder.log();
    let mut stream = open_stream(decoder);

    stream.read(8).unwrap();
    stream.dispose();
    stream.dispose();

    assert!(stream.is_disposed());
    assert_eq!(log.lock().unwrap().finishes, 1);
    assert!(matches!(stream.read(8), Err(StreamError::InvalidState(_))));
    assert!(matches!(stream.seek(0), Err(StreamError::InvalidState(_))));
}
