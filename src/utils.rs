//! Utility functions

use crate::header::{BINARY_HEADER_SIZE, TEXT_HEADER_SIZE, TRACE_HEADER_SIZE};
use crate::types::{DataFormatCode, VolumeShape};

/// EBCDIC code for a blank
pub const EBCDIC_SPACE: u8 = 0x40;

/// Translate one ASCII byte to EBCDIC (code page 037).
///
/// Characters without an EBCDIC counterpart become a blank.
pub fn ascii_to_ebcdic(c: u8) -> u8 {
    match c {
        b'a'..=b'i' => 0x81 + (c - b'a'),
        b'j'..=b'r' => 0x91 + (c - b'j'),
        b's'..=b'z' => 0xA2 + (c - b's'),
        b'A'..=b'I' => 0xC1 + (c - b'A'),
        b'J'..=b'R' => 0xD1 + (c - b'J'),
        b'S'..=b'Z' => 0xE2 + (c - b'S'),
        b'0'..=b'9' => 0xF0 + (c - b'0'),
        b' ' => EBCDIC_SPACE,
        b'.' => 0x4B,
        b'<' => 0x4C,
        b'(' => 0x4D,
        b'+' => 0x4E,
        b'|' => 0x4F,
        b'&' => 0x50,
        b'!' => 0x5A,
        b'$' => 0x5B,
        b'*' => 0x5C,
        b')' => 0x5D,
        b';' => 0x5E,
        b'-' => 0x60,
        b'/' => 0x61,
        b',' => 0x6B,
        b'%' => 0x6C,
        b'_' => 0x6D,
        b'>' => 0x6E,
        b'?' => 0x6F,
        b'`' => 0x79,
        b':' => 0x7A,
        b'#' => 0x7B,
        b'@' => 0x7C,
        b'\'' => 0x7D,
        b'=' => 0x7E,
        b'"' => 0x7F,
        b'~' => 0xA1,
        b'{' => 0xC0,
        b'}' => 0xD0,
        b'\\' => 0xE0,
        _ => EBCDIC_SPACE,
    }
}

/// Translate one EBCDIC byte back to ASCII; unknown codes become a blank
pub fn ebcdic_to_ascii(c: u8) -> u8 {
    match c {
        0x81..=0x89 => b'a' + (c - 0x81),
        0x91..=0x99 => b'j' + (c - 0x91),
        0xA2..=0xA9 => b's' + (c - 0xA2),
        0xC1..=0xC9 => b'A' + (c - 0xC1),
        0xD1..=0xD9 => b'J' + (c - 0xD1),
        0xE2..=0xE9 => b'S' + (c - 0xE2),
        0xF0..=0xF9 => b'0' + (c - 0xF0),
        0x4B => b'.',
        0x4C => b'<',
        0x4D => b'(',
        0x4E => b'+',
        0x4F | 0x6A => b'|',
        0x50 => b'&',
        0x5A => b'!',
        0x5B => b'$',
        0x5C => b'*',
        0x5D => b')',
        0x5E => b';',
        0x60 => b'-',
        0x61 => b'/',
        0x6B => b',',
        0x6C => b'%',
        0x6D => b'_',
        0x6E => b'>',
        0x6F => b'?',
        0x79 => b'`',
        0x7A => b':',
        0x7B => b'#',
        0x7C => b'@',
        0x7D => b'\'',
        0x7E => b'=',
        0x7F => b'"',
        0xA1 => b'~',
        0xC0 => b'{',
        0xD0 => b'}',
        0xE0 => b'\\',
        _ => b' ',
    }
}

/// Guess whether a textual header is EBCDIC by comparing alphanumeric counts
pub fn looks_like_ebcdic(text: &[u8]) -> bool {
    let ascii = text.iter().filter(|c| c.is_ascii_alphanumeric()).count();
    let ebcdic = text
        .iter()
        .filter(|&&c| ebcdic_to_ascii(c).is_ascii_alphanumeric())
        .count();
    ebcdic >= ascii
}

/// Exact size of a SEG-Y file holding `shape` in `format`
pub fn segy_file_size(shape: &VolumeShape, format: DataFormatCode) -> u64 {
    let trace_bytes = (TRACE_HEADER_SIZE + shape.size_x * format.sample_size()) as u64;
    (TEXT_HEADER_SIZE + BINARY_HEADER_SIZE) as u64 + shape.trace_count() as u64 * trace_bytes
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
