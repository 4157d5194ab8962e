//! Sample encoding for SEG-Y trace data
//!
//! Samples are held in memory as `f32` and written big-endian in one of two
//! 4-byte encodings: IEEE 754 binary32 (format code 5) or IBM System/360
//! hexadecimal floating point (format code 1).

use crate::error::{Result, SegyError};
use crate::types::DataFormatCode;
use bytes::{Buf, BufMut, BytesMut};

/// Largest IBM magnitude: exponent 127, fraction 0xFFFFFF (about 7.2e75)
pub const IBM_MAX_MAGNITUDE: u32 = 0x7FFF_FFFF;

const IBM_SIGN_BIT: u32 = 0x8000_0000;
const IBM_EXPONENT_BIAS: i32 = 64;

/// Convert an IEEE binary32 value to an IBM hexadecimal float word.
///
/// Returns the word and whether the input had to be clamped (NaN, infinity or
/// an exponent outside IBM range). Zero of either sign encodes as `0`.
pub fn f32_to_ibm(value: f32) -> (u32, bool) {
    let bits = value.to_bits();
    let sign = bits & IBM_SIGN_BIT;

    if !value.is_finite() {
        return (sign | IBM_MAX_MAGNITUDE, true);
    }
    if bits & 0x7FFF_FFFF == 0 {
        return (0, false);
    }

    let biased = ((bits >> 23) & 0xFF) as i32;
    let mut mantissa = bits & 0x007F_FFFF;
    let mut exp2 = if biased == 0 {
        // denormal: value = mantissa * 2^-149
        -149
    } else {
        mantissa |= 0x0080_0000;
        biased - 150
    };

    // value = mantissa * 2^exp2 with the leading one at bit 23
    while mantissa & 0x0080_0000 == 0 {
        mantissa <<= 1;
        exp2 -= 1;
    }

    // IBM value = fraction * 2^(4 * (E - 64) - 24); pick the smallest E whose
    // required right shift of the mantissa is non-negative (0..=3 bits).
    let target = exp2 + 4 * IBM_EXPONENT_BIAS + 24;
    let exponent = target.div_euclid(4) + i32::from(target.rem_euclid(4) != 0);
    let shift = (4 * exponent - target) as u32;

    let fraction = if shift == 0 {
        mantissa
    } else {
        (mantissa + (1 << (shift - 1))) >> shift
    };

    if exponent > 127 {
        return (sign | IBM_MAX_MAGNITUDE, true);
    }
    if exponent < 0 {
        return (0, true);
    }

    (sign | ((exponent as u32) << 24) | fraction, false)
}

/// Convert an IBM hexadecimal float word back to `f32`.
///
/// Values beyond the binary32 range saturate to `±f32::MAX`.
pub fn ibm_to_f32(word: u32) -> f32 {
    let negative = word & IBM_SIGN_BIT != 0;
    let fraction = word & 0x00FF_FFFF;
    if fraction == 0 {
        return 0.0;
    }

    let exponent = ((word >> 24) & 0x7F) as i32 - IBM_EXPONENT_BIAS;
    let magnitude = f64::from(fraction) / 16_777_216.0 * 16f64.powi(exponent);
    let magnitude = magnitude.min(f64::from(f32::MAX)) as f32;

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Trait for converting trace samples to and from their on-disk encoding
pub trait SampleCodec: Send + Sync {
    /// Append the encoded samples to `out`, returning how many were clamped
    fn encode_into(&self, samples: &[f32], out: &mut BytesMut) -> usize;

    /// Decode a block of encoded samples
    fn decode(&self, data: &[u8]) -> Result<Vec<f32>>;

    /// Get the format code this codec implements
    fn format(&self) -> DataFormatCode;

    /// Encode a block into a fresh buffer
    fn encode(&self, samples: &[f32]) -> BytesMut {
        let mut out = BytesMut::with_capacity(samples.len() * self.format().sample_size());
        self.encode_into(samples, &mut out);
        out
    }
}

fn check_alignment(data: &[u8]) -> Result<()> {
    if data.len() % 4 != 0 {
        return Err(SegyError::InvalidHeader(format!(
            "sample block of {} bytes is not a multiple of 4",
            data.len()
        )));
    }
    Ok(())
}

/// IEEE 754 binary32, big-endian
#[derive(Debug, Default)]
pub struct IeeeCodec;

impl SampleCodec for IeeeCodec {
    fn encode_into(&self, samples: &[f32], out: &mut BytesMut) -> usize {
        out.reserve(samples.len() * 4);
        for &sample in samples {
            out.put_f32(sample);
        }
        0
    }

    fn decode(&self, mut data: &[u8]) -> Result<Vec<f32>> {
        check_alignment(data)?;
        let mut samples = Vec::with_capacity(data.len() / 4);
        while data.has_remaining() {
            samples.push(data.get_f32());
        }
        Ok(samples)
    }

    fn format(&self) -> DataFormatCode {
        DataFormatCode::IeeeFloat
    }
}

/// IBM System/360 hexadecimal float, big-endian
#[derive(Debug, Default)]
pub struct IbmCodec;

impl SampleCodec for IbmCodec {
    fn encode_into(&self, samples: &[f32], out: &mut BytesMut) -> usize {
        out.reserve(samples.len() * 4);
        let mut clamped = 0;
        for &sample in samples {
            let (word, was_clamped) = f32_to_ibm(sample);
            clamped += usize::from(was_clamped);
            out.put_u32(word);
        }
        clamped
    }

    fn decode(&self, mut data: &[u8]) -> Result<Vec<f32>> {
        check_alignment(data)?;
        let mut samples = Vec::with_capacity(data.len() / 4);
        while data.has_remaining() {
            samples.push(ibm_to_f32(data.get_u32()));
        }
        Ok(samples)
    }

    fn format(&self) -> DataFormatCode {
        DataFormatCode::IbmFloat
    }
}

/// Get a codec for a given format code
pub fn get_codec(format: DataFormatCode) -> Box<dyn SampleCodec> {
    match format {
        DataFormatCode::IbmFloat => Box::new(IbmCodec),
        DataFormatCode::IeeeFloat => Box::new(IeeeCodec),
    }
}
