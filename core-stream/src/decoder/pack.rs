//! # PCM Sample Packer
//!
//! Packs decoded integer samples into interleaved little-endian PCM bytes.

use crate::error::{Result, StreamError};
use bytes::{BufMut, Bytes, BytesMut};

/// Packs interleaved integer samples at a fixed bit depth.
///
/// Samples are expected right-justified, i.e. a 16-bit sample lives in the
/// range `[-32768, 32767]`. The byte layout is the usual WAVE one:
/// - 8-bit: unsigned, offset by `0x80`
/// - 16/24/32-bit: signed, little-endian
///
/// Every other bit depth is rejected.
pub struct SamplePacker;

impl SamplePacker {
    /// Bytes one sample occupies at `bits_per_sample`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidFormat`] for unsupported bit depths.
    pub fn bytes_per_sample(bits_per_sample: u16) -> Result<usize> {
        match bits_per_sample {
            8 => Ok(1),
            16 => Ok(2),
            24 => Ok(3),
            32 => Ok(4),
            other => Err(StreamError::InvalidFormat(format!(
                "Unsupported bits per sample: {}",
                other
            ))),
        }
    }

    /// Pack interleaved samples into a new buffer.
    pub fn pack(samples: &[i32], bits_per_sample: u16) -> Result<Bytes> {
        let width = Self::bytes_per_sample(bits_per_sample)?;
        let mut out = BytesMut::with_capacity(samples.len() * width);
        Self::pack_into(samples, bits_per_sample, &mut out)?;
        Ok(out.freeze())
    }

    /// Append packed samples to `out`.
    pub fn pack_into(samples: &[i32], bits_per_sample: u16, out: &mut BytesMut) -> Result<()> {
        let width = Self::bytes_per_sample(bits_per_sample)?;
        out.reserve(samples.len() * width);

        match bits_per_sample {
            8 => {
                for &s in samples {
                    out.put_u8((s + 0x80) as u8);
                }
            }
            16 => {
                for &s in samples {
                    out.put_i16_le(s as i16);
                }
            }
            24 => {
                for &s in samples {
                    out.put_slice(&s.to_le_bytes()[..3]);
                }
            }
            _ => {
                for &s in samples {
                    out.put_i32_le(s);
                }
            }
        }

        Ok(())
    }

    /// Undo full-scale scaling in place.
    ///
    /// Decoders that widen every sample to the full `i32` range shift them
    /// left by `32 - bits_per_sample`; this shifts them back.
    pub fn from_full_scale(samples: &mut [i32], bits_per_sample: u16) {
        if bits_per_sample == 0 || bits_per_sample >= 32 {
            return;
        }
        let shift = 32 - bits_per_sample as u32;
        for s in samples.iter_mut() {
            *s >>= shift;
        }
    }
}
