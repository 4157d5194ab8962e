//! Core data types for SEG-Y creation

use crate::error::SegyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample encodings selectable through the binary header format code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
#[repr(u16)]
pub enum DataFormatCode {
    /// 4-byte IBM System/360 hexadecimal floating point
    IbmFloat = 1,
    /// 4-byte IEEE 754 binary32
    #[default]
    IeeeFloat = 5,
}

impl DataFormatCode {
    /// Integer codes reserved by SEG-Y but not produced by this crate
    pub const RESERVED_INTEGER_CODES: [u16; 3] = [2, 3, 8];

    /// Raw code as written to the binary header
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Size in bytes of one encoded sample
    pub fn sample_size(&self) -> usize {
        4
    }

    /// Short human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            DataFormatCode::IbmFloat => "4-byte IBM float",
            DataFormatCode::IeeeFloat => "4-byte IEEE float",
        }
    }
}

impl TryFrom<u16> for DataFormatCode {
    type Error = SegyError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(DataFormatCode::IbmFloat),
            5 => Ok(DataFormatCode::IeeeFloat),
            other => Err(SegyError::UnsupportedFormat(other)),
        }
    }
}

impl From<DataFormatCode> for u16 {
    fn from(code: DataFormatCode) -> Self {
        code.code()
    }
}

impl fmt::Display for DataFormatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

/// Extent of a regular post-stack volume.
///
/// `size_z` counts inlines, `size_y` crosslines and `size_x` samples per trace.
/// Samples are laid out row-major in (z, y, x) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeShape {
    pub size_z: usize,
    pub size_y: usize,
    pub size_x: usize,
}

impl VolumeShape {
    pub fn new(size_z: usize, size_y: usize, size_x: usize) -> Self {
        Self {
            size_z,
            size_y,
            size_x,
        }
    }

    /// Number of traces (one per inline/crossline pair)
    pub fn trace_count(&self) -> usize {
        self.size_z * self.size_y
    }

    /// Total number of samples in the volume
    pub fn sample_count(&self) -> usize {
        self.trace_count() * self.size_x
    }

    /// Samples in one inline (all crosslines of a single z)
    pub fn inline_len(&self) -> usize {
        self.size_y * self.size_x
    }

    /// Shape as an `ndarray`-style dimension tuple
    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.size_z, self.size_y, self.size_x)
    }
}

impl From<(usize, usize, usize)> for VolumeShape {
    fn from((size_z, size_y, size_x): (usize, usize, usize)) -> Self {
        Self::new(size_z, size_y, size_x)
    }
}

impl fmt::Display for VolumeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.size_z, self.size_y, self.size_x)
    }
}

/// Byte order of a raw sample file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Decode one 4-byte word into a sample
    pub fn read_f32(&self, word: [u8; 4]) -> f32 {
        match self {
            ByteOrder::Little => f32::from_le_bytes(word),
            ByteOrder::Big => f32::from_be_bytes(word),
        }
    }
}

/// Character set of the 3200-byte textual header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Ebcdic,
    Ascii,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_code_conversion() {
        assert_eq!(DataFormatCode::try_from(1).unwrap(), DataFormatCode::IbmFloat);
        assert_eq!(DataFormatCode::try_from(5).unwrap(), DataFormatCode::IeeeFloat);
        assert_eq!(u16::from(DataFormatCode::IbmFloat), 1);

        for code in DataFormatCode::RESERVED_INTEGER_CODES {
            assert!(matches!(
                DataFormatCode::try_from(code),
                Err(SegyError::UnsupportedFormat(c)) if c == code
            ));
        }
        assert!(DataFormatCode::try_from(42).is_err());
    }

    #[test]
    fn test_format_code_default_is_ieee() {
        assert_eq!(DataFormatCode::default(), DataFormatCode::IeeeFloat);
    }

    #[test]
    fn test_format_code_serde() {
        let json = serde_json::to_string(&DataFormatCode::IbmFloat).unwrap();
        assert_eq!(json, "1");
        let parsed: DataFormatCode = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, DataFormatCode::IeeeFloat);
        assert!(serde_json::from_str::<DataFormatCode>("3").is_err());
    }

    #[test]
    fn test_volume_shape_counts() {
        let shape = VolumeShape::new(2, 3, 4);
        assert_eq!(shape.trace_count(), 6);
        assert_eq!(shape.sample_count(), 24);
        assert_eq!(shape.inline_len(), 12);
        assert_eq!(shape.to_string(), "(2, 3, 4)");
        assert_eq!(VolumeShape::from((2, 3, 4)), shape);
    }

    #[test]
    fn test_byte_order_read() {
        let value = 1.5f32;
        assert_eq!(ByteOrder::Little.read_f32(value.to_le_bytes()), value);
        assert_eq!(ByteOrder::Big.read_f32(value.to_be_bytes()), value);
    }
}
