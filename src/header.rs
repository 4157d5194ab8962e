//! SEG-Y header synthesis
//!
//! A file starts with a 3200-byte textual header and a 400-byte binary header,
//! followed by one 240-byte trace header in front of every trace. Field
//! positions below are the 1-based byte positions of the SEG-Y standard,
//! relative to the start of their own header block. All numeric fields are
//! big-endian.

use crate::config::CreationConfig;
use crate::error::{Result, SegyError};
use crate::geometry::TraceGeometry;
use crate::types::{DataFormatCode, TextEncoding};
use crate::utils::{ascii_to_ebcdic, ebcdic_to_ascii, looks_like_ebcdic};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

pub const TEXT_HEADER_SIZE: usize = 3200;
pub const BINARY_HEADER_SIZE: usize = 400;
pub const TRACE_HEADER_SIZE: usize = 240;

/// Card images in the textual header
pub const TEXT_HEADER_LINES: usize = 40;
/// Columns per card image
pub const TEXT_LINE_WIDTH: usize = 80;

/// Coordinate scalar written to every trace header: divide by 100
pub const COORDINATE_SCALAR: i16 = -100;
/// Multiplier applied to coordinates before storing them as integers
pub const COORDINATE_SCALE: f64 = 100.0;

/// SEG-Y revision 1.0
pub const SEGY_REVISION: u16 = 0x0100;

/// Binary file header field positions
pub mod binary_fields {
    pub const TRACES_PER_ENSEMBLE: usize = 13;
    pub const SAMPLE_INTERVAL: usize = 17;
    pub const ORIGINAL_SAMPLE_INTERVAL: usize = 19;
    pub const SAMPLES_PER_TRACE: usize = 21;
    pub const ORIGINAL_SAMPLES_PER_TRACE: usize = 23;
    pub const DATA_FORMAT: usize = 25;
    pub const ENSEMBLE_FOLD: usize = 27;
    pub const TRACE_SORTING: usize = 29;
    pub const MEASUREMENT_SYSTEM: usize = 55;
    pub const REVISION: usize = 301;
    pub const FIXED_LENGTH_TRACE: usize = 303;
    pub const EXTENDED_TEXT_HEADERS: usize = 305;
}

/// Trace header field positions
pub mod trace_fields {
    pub const SEQUENCE_IN_LINE: usize = 1;
    pub const SEQUENCE_IN_FILE: usize = 5;
    pub const FIELD_RECORD: usize = 9;
    pub const ENSEMBLE_NUMBER: usize = 21;
    pub const TRACE_ID: usize = 29;
    pub const COORDINATE_SCALAR: usize = 71;
    pub const SOURCE_X: usize = 73;
    pub const SOURCE_Y: usize = 77;
    pub const GROUP_X: usize = 81;
    pub const GROUP_Y: usize = 85;
    pub const COORDINATE_UNITS: usize = 89;
    pub const DELAY_RECORDING_TIME: usize = 109;
    pub const SAMPLE_COUNT: usize = 115;
    pub const SAMPLE_INTERVAL: usize = 117;
    pub const ENSEMBLE_X: usize = 181;
    pub const ENSEMBLE_Y: usize = 185;
    pub const INLINE: usize = 189;
    pub const CROSSLINE: usize = 193;
}

/// Trace sorting code 4: horizontally stacked
const SORTING_STACKED: u16 = 4;
/// Measurement system 1: metres
const MEASUREMENT_METRES: u16 = 1;
/// Trace identification code 1: seismic data
const TRACE_ID_SEISMIC: u16 = 1;
/// Coordinate units 1: length
const COORDINATE_UNITS_LENGTH: u16 = 1;

fn put_u16_at(buf: &mut [u8], position: usize, value: u16) {
    buf[position - 1..position + 1].copy_from_slice(&value.to_be_bytes());
}

fn put_i16_at(buf: &mut [u8], position: usize, value: i16) {
    buf[position - 1..position + 1].copy_from_slice(&value.to_be_bytes());
}

fn put_i32_at(buf: &mut [u8], position: usize, value: i32) {
    buf[position - 1..position + 3].copy_from_slice(&value.to_be_bytes());
}

fn u16_at(buf: &[u8], position: usize) -> u16 {
    u16::from_be_bytes([buf[position - 1], buf[position]])
}

fn i16_at(buf: &[u8], position: usize) -> i16 {
    i16::from_be_bytes([buf[position - 1], buf[position]])
}

fn i32_at(buf: &[u8], position: usize) -> i32 {
    i32::from_be_bytes([
        buf[position - 1],
        buf[position],
        buf[position + 1],
        buf[position + 2],
    ])
}

fn check_len(data: &[u8], expected: usize, what: &str) -> Result<()> {
    if data.len() < expected {
        return Err(SegyError::InvalidHeader(format!(
            "{} needs {} bytes, got {}",
            what,
            expected,
            data.len()
        )));
    }
    Ok(())
}

/// Trace header byte ranges a relocated line number must not overwrite
const PROTECTED_TRACE_FIELDS: [(usize, usize, &str); 5] = [
    (trace_fields::SEQUENCE_IN_LINE, trace_fields::SEQUENCE_IN_FILE + 3, "trace sequence numbers"),
    (trace_fields::COORDINATE_SCALAR, trace_fields::COORDINATE_SCALAR + 1, "coordinate scalar"),
    (trace_fields::DELAY_RECORDING_TIME, trace_fields::DELAY_RECORDING_TIME + 1, "delay recording time"),
    (trace_fields::SAMPLE_COUNT, trace_fields::SAMPLE_INTERVAL + 1, "sample count/interval fields"),
    (trace_fields::ENSEMBLE_X, trace_fields::ENSEMBLE_Y + 3, "CDP X/Y coordinates"),
];

/// Where the inline and crossline numbers live in each trace header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLayout {
    pub inline_location: usize,
    pub crossline_location: usize,
}

impl HeaderLayout {
    /// Highest position a 4-byte field may start at
    pub const MAX_LOCATION: usize = TRACE_HEADER_SIZE - 3;

    pub fn new(inline_location: usize, crossline_location: usize) -> Result<Self> {
        let layout = Self {
            inline_location,
            crossline_location,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Check both locations hold a 4-byte field inside the trace header and
    /// do not overlap each other
    pub fn check_bounds(&self) -> Result<()> {
        for (name, location) in [
            ("inline", self.inline_location),
            ("crossline", self.crossline_location),
        ] {
            if !(1..=Self::MAX_LOCATION).contains(&location) {
                return Err(SegyError::Configuration(format!(
                    "{} header location {} must be within 1..={}",
                    name,
                    location,
                    Self::MAX_LOCATION
                )));
            }
        }
        if self.inline_location.abs_diff(self.crossline_location) < 4 {
            return Err(SegyError::Configuration(format!(
                "inline location {} and crossline location {} overlap",
                self.inline_location, self.crossline_location
            )));
        }
        Ok(())
    }

    /// [`check_bounds`](Self::check_bounds), plus neither line number may
    /// overwrite a synthesized field that is read back
    pub fn validate(&self) -> Result<()> {
        self.check_bounds()?;
        for (name, location) in [
            ("inline", self.inline_location),
            ("crossline", self.crossline_location),
        ] {
            let field = (location..location + 4).find_map(|byte| {
                PROTECTED_TRACE_FIELDS
                    .iter()
                    .find(|(first, last, _)| (*first..=*last).contains(&byte))
            });
            if let Some((first, last, what)) = field {
                return Err(SegyError::Configuration(format!(
                    "{} header location {} overlaps the {} ({}-{})",
                    name, location, what, first, last
                )));
            }
        }
        Ok(())
    }
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self {
            inline_location: trace_fields::INLINE,
            crossline_location: trace_fields::CROSSLINE,
        }
    }
}

/// The 3200-byte textual header as forty 80-column card images
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextHeader {
    lines: Vec<String>,
}

impl TextHeader {
    /// Build the card images describing a volume
    pub fn for_volume(config: &CreationConfig) -> Self {
        let shape = config.shape();
        let layout = config.header_layout();
        let last_inline = config.min_inline() + shape.size_z as i32 - 1;
        let last_crossline = config.min_crossline() + shape.size_y as i32 - 1;
        let format = config.data_format();

        let mut body = vec![
            "SEG-Y FILE CREATED FROM A REGULAR 3D POST-STACK VOLUME".to_string(),
            String::new(),
            format!(
                "INLINES: {}  CROSSLINES: {}  SAMPLES PER TRACE: {}",
                shape.size_z, shape.size_y, shape.size_x
            ),
            format!(
                "SAMPLE INTERVAL: {} US  START TIME: {} MS",
                config.sample_interval(),
                config.start_time()
            ),
            format!(
                "DATA SAMPLE FORMAT: {} ({})",
                format.code(),
                format.name().to_uppercase()
            ),
            String::new(),
            format!(
                "INLINE RANGE: {} - {}  TRACE HEADER BYTE {}",
                config.min_inline(),
                last_inline,
                layout.inline_location
            ),
            format!(
                "CROSSLINE RANGE: {} - {}  TRACE HEADER BYTE {}",
                config.min_crossline(),
                last_crossline,
                layout.crossline_location
            ),
            "TRACE ORDER: INLINE-MAJOR, CROSSLINE-MINOR".to_string(),
            String::new(),
            format!(
                "LINE INTERVAL X: {}  Y: {}  (METRES)",
                config.x_interval(),
                config.y_interval()
            ),
            format!(
                "CDP X/Y: TRACE HEADER BYTES {}/{}  COORDINATE SCALAR {}",
                trace_fields::ENSEMBLE_X,
                trace_fields::ENSEMBLE_Y,
                COORDINATE_SCALAR
            ),
            "COORDINATE ORIGIN: 0, 0  NO GRID ROTATION".to_string(),
        ];
        body.resize(TEXT_HEADER_LINES - 2, String::new());
        body.push("SEG-Y REV1".to_string());
        body.push("END TEXTUAL HEADER".to_string());

        let lines = body
            .into_iter()
            .enumerate()
            .map(|(i, text)| card_image(i + 1, &text))
            .collect();
        Self { lines }
    }

    /// Parse a textual header, detecting EBCDIC automatically
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, TEXT_HEADER_SIZE, "textual header")?;
        let raw = &data[..TEXT_HEADER_SIZE];
        let ascii: Vec<u8> = if looks_like_ebcdic(raw) {
            raw.iter().map(|&c| ebcdic_to_ascii(c)).collect()
        } else {
            raw.to_vec()
        };

        let lines = ascii
            .chunks(TEXT_LINE_WIDTH)
            .map(|card| String::from_utf8_lossy(card).into_owned())
            .collect();
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Serialize to exactly 3200 bytes in the requested character set
    pub fn to_bytes(&self, encoding: TextEncoding) -> Bytes {
        let mut buf = BytesMut::with_capacity(TEXT_HEADER_SIZE);
        for line in &self.lines {
            for &c in line.as_bytes() {
                buf.put_u8(match encoding {
                    TextEncoding::Ascii => c,
                    TextEncoding::Ebcdic => ascii_to_ebcdic(c),
                });
            }
        }
        buf.freeze()
    }
}

/// Format one `C nn` card padded or cut to 80 columns
fn card_image(number: usize, text: &str) -> String {
    let mut card = format!("C{:>2} {}", number, text);
    card.retain(|c| c.is_ascii());
    card.truncate(TEXT_LINE_WIDTH);
    format!("{:<width$}", card, width = TEXT_LINE_WIDTH)
}

/// Global parameters stored in the 400-byte binary file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryHeader {
    pub traces_per_ensemble: u16,
    pub sample_interval: u16,
    pub samples_per_trace: u16,
    pub data_format: DataFormatCode,
    pub trace_sorting: u16,
    pub measurement_system: u16,
    pub revision: u16,
    pub fixed_length_traces: bool,
}

impl BinaryHeader {
    pub fn from_config(config: &CreationConfig) -> Self {
        let shape = config.shape();
        Self {
            // 0 = unknown when the crossline count does not fit the field
            traces_per_ensemble: u16::try_from(shape.size_y).unwrap_or(0),
            sample_interval: config.sample_interval(),
            samples_per_trace: config.samples_per_trace(),
            data_format: config.data_format(),
            trace_sorting: SORTING_STACKED,
            measurement_system: MEASUREMENT_METRES,
            revision: SEGY_REVISION,
            fixed_length_traces: true,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        use binary_fields::*;

        let mut buf = [0u8; BINARY_HEADER_SIZE];
        put_u16_at(&mut buf, TRACES_PER_ENSEMBLE, self.traces_per_ensemble);
        put_u16_at(&mut buf, SAMPLE_INTERVAL, self.sample_interval);
        put_u16_at(&mut buf, ORIGINAL_SAMPLE_INTERVAL, self.sample_interval);
        put_u16_at(&mut buf, SAMPLES_PER_TRACE, self.samples_per_trace);
        put_u16_at(&mut buf, ORIGINAL_SAMPLES_PER_TRACE, self.samples_per_trace);
        put_u16_at(&mut buf, DATA_FORMAT, self.data_format.code());
        put_u16_at(&mut buf, ENSEMBLE_FOLD, 1);
        put_u16_at(&mut buf, TRACE_SORTING, self.trace_sorting);
        put_u16_at(&mut buf, MEASUREMENT_SYSTEM, self.measurement_system);
        put_u16_at(&mut buf, REVISION, self.revision);
        put_u16_at(&mut buf, FIXED_LENGTH_TRACE, u16::from(self.fixed_length_traces));
        put_u16_at(&mut buf, EXTENDED_TEXT_HEADERS, 0);
        Bytes::copy_from_slice(&buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        use binary_fields::*;

        check_len(data, BINARY_HEADER_SIZE, "binary header")?;
        Ok(Self {
            traces_per_ensemble: u16_at(data, TRACES_PER_ENSEMBLE),
            sample_interval: u16_at(data, SAMPLE_INTERVAL),
            samples_per_trace: u16_at(data, SAMPLES_PER_TRACE),
            data_format: DataFormatCode::try_from(u16_at(data, DATA_FORMAT))?,
            trace_sorting: u16_at(data, TRACE_SORTING),
            measurement_system: u16_at(data, MEASUREMENT_SYSTEM),
            revision: u16_at(data, REVISION),
            fixed_length_traces: u16_at(data, FIXED_LENGTH_TRACE) == 1,
        })
    }
}

/// Per-trace header values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHeader {
    pub sequence_in_line: i32,
    pub sequence_in_file: i32,
    pub inline: i32,
    pub crossline: i32,
    pub coordinate_scalar: i16,
    /// Scaled X coordinate
    pub x: i32,
    /// Scaled Y coordinate
    pub y: i32,
    pub start_time: i16,
    pub sample_count: u16,
    pub sample_interval: u16,
}

impl TraceHeader {
    pub fn for_trace(geometry: &TraceGeometry, config: &CreationConfig) -> Self {
        let (x, y) = geometry.scaled_coordinates();
        Self {
            sequence_in_line: geometry.sequence_in_line(),
            sequence_in_file: geometry.sequence_number(),
            inline: geometry.inline,
            crossline: geometry.crossline,
            coordinate_scalar: COORDINATE_SCALAR,
            x,
            y,
            start_time: config.start_time(),
            sample_count: config.samples_per_trace(),
            sample_interval: config.sample_interval(),
        }
    }

    /// Serialize to 240 bytes; the line numbers go to the positions in `layout`
    pub fn to_bytes(&self, layout: &HeaderLayout) -> [u8; TRACE_HEADER_SIZE] {
        use trace_fields::*;

        let mut buf = [0u8; TRACE_HEADER_SIZE];
        put_i32_at(&mut buf, SEQUENCE_IN_LINE, self.sequence_in_line);
        put_i32_at(&mut buf, SEQUENCE_IN_FILE, self.sequence_in_file);
        put_i32_at(&mut buf, FIELD_RECORD, self.inline);
        put_i32_at(&mut buf, ENSEMBLE_NUMBER, self.crossline);
        put_u16_at(&mut buf, TRACE_ID, TRACE_ID_SEISMIC);
        put_i16_at(&mut buf, trace_fields::COORDINATE_SCALAR, self.coordinate_scalar);
        for (x_pos, y_pos) in [
            (SOURCE_X, SOURCE_Y),
            (GROUP_X, GROUP_Y),
            (ENSEMBLE_X, ENSEMBLE_Y),
        ] {
            put_i32_at(&mut buf, x_pos, self.x);
            put_i32_at(&mut buf, y_pos, self.y);
        }
        put_u16_at(&mut buf, COORDINATE_UNITS, COORDINATE_UNITS_LENGTH);
        put_i16_at(&mut buf, DELAY_RECORDING_TIME, self.start_time);
        put_u16_at(&mut buf, SAMPLE_COUNT, self.sample_count);
        put_u16_at(&mut buf, SAMPLE_INTERVAL, self.sample_interval);
        // written last so a relocated line number wins over the defaults above
        put_i32_at(&mut buf, layout.inline_location, self.inline);
        put_i32_at(&mut buf, layout.crossline_location, self.crossline);
        buf
    }

    pub fn from_bytes(data: &[u8], layout: &HeaderLayout) -> Result<Self> {
        use trace_fields::*;

        check_len(data, TRACE_HEADER_SIZE, "trace header")?;
        Ok(Self {
            sequence_in_line: i32_at(data, SEQUENCE_IN_LINE),
            sequence_in_file: i32_at(data, SEQUENCE_IN_FILE),
            inline: i32_at(data, layout.inline_location),
            crossline: i32_at(data, layout.crossline_location),
            coordinate_scalar: i16_at(data, trace_fields::COORDINATE_SCALAR),
            x: i32_at(data, ENSEMBLE_X),
            y: i32_at(data, ENSEMBLE_Y),
            start_time: i16_at(data, DELAY_RECORDING_TIME),
            sample_count: u16_at(data, SAMPLE_COUNT),
            sample_interval: u16_at(data, SAMPLE_INTERVAL),
        })
    }

    /// Unscaled (X, Y) after applying the coordinate scalar
    pub fn coordinates(&self) -> (f64, f64) {
        let factor = match self.coordinate_scalar {
            0 => 1.0,
            s if s < 0 => 1.0 / f64::from(-s),
            s => f64::from(s),
        };
        (f64::from(self.x) * factor, f64::from(self.y) * factor)
    }
}

/// Build the textual header for `config`
pub fn build_text_header(config: &CreationConfig) -> Bytes {
    TextHeader::for_volume(config).to_bytes(config.text_encoding())
}

/// Build the binary file header for `config`
pub fn build_binary_header(config: &CreationConfig) -> Bytes {
    BinaryHeader::from_config(config).to_bytes()
}

/// Build the header of one trace
pub fn build_trace_header(
    geometry: &TraceGeometry,
    config: &CreationConfig,
) -> [u8; TRACE_HEADER_SIZE] {
    TraceHeader::for_trace(geometry, config).to_bytes(&config.header_layout())
}
