//! Creation parameters
//!
//! [`CreationConfigBuilder`] carries raw caller values with defaults and can be
//! deserialized from JSON; [`CreationConfigBuilder::build`] validates them once
//! into an immutable [`CreationConfig`].

use crate::error::{Result, SegyError};
use crate::header::{HeaderLayout, COORDINATE_SCALE};
use crate::types::{ByteOrder, DataFormatCode, TextEncoding, VolumeShape};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_FORMAT_CODE: u16 = 5;
pub const DEFAULT_SAMPLE_INTERVAL: i32 = 2000;
pub const DEFAULT_START_TIME: i32 = 0;
pub const DEFAULT_LINE_INTERVAL: f64 = 25.0;
pub const DEFAULT_MIN_LINE: i32 = 1;
pub const DEFAULT_ENCODE_CONCURRENCY: usize = 4;

/// Unvalidated creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationConfigBuilder {
    /// Number of inlines
    pub size_z: usize,
    /// Number of crosslines
    pub size_y: usize,
    /// Samples per trace
    pub size_x: usize,
    /// Data sample format code (1 = IBM float, 5 = IEEE float)
    pub format: u16,
    /// Sample interval in microseconds
    pub dt: i32,
    /// Delay recording time of every trace, in milliseconds
    pub start_time: i32,
    pub x_interval: f64,
    pub y_interval: f64,
    pub min_iline: i32,
    pub min_xline: i32,
    pub inline_location: usize,
    pub crossline_location: usize,
    pub text_encoding: TextEncoding,
    /// Byte order of raw input files
    pub input_byte_order: ByteOrder,
    /// Inline blocks encoded ahead of the writer
    pub encode_concurrency: usize,
}

impl Default for CreationConfigBuilder {
    fn default() -> Self {
        let layout = HeaderLayout::default();
        Self {
            size_z: 0,
            size_y: 0,
            size_x: 0,
            format: DEFAULT_FORMAT_CODE,
            dt: DEFAULT_SAMPLE_INTERVAL,
            start_time: DEFAULT_START_TIME,
            x_interval: DEFAULT_LINE_INTERVAL,
            y_interval: DEFAULT_LINE_INTERVAL,
            min_iline: DEFAULT_MIN_LINE,
            min_xline: DEFAULT_MIN_LINE,
            inline_location: layout.inline_location,
            crossline_location: layout.crossline_location,
            text_encoding: TextEncoding::default(),
            input_byte_order: ByteOrder::default(),
            encode_concurrency: DEFAULT_ENCODE_CONCURRENCY,
        }
    }
}

impl CreationConfigBuilder {
    /// Start from the defaults for a volume of (inlines, crosslines, samples)
    pub fn new(size_z: usize, size_y: usize, size_x: usize) -> Self {
        Self {
            size_z,
            size_y,
            size_x,
            ..Self::default()
        }
    }

    /// Parse a builder from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a builder from a JSON file
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&text)
    }

    pub fn format_code(mut self, format: u16) -> Self {
        self.format = format;
        self
    }

    pub fn data_format(mut self, format: DataFormatCode) -> Self {
        self.format = format.code();
        self
    }

    pub fn sample_interval(mut self, dt: i32) -> Self {
        self.dt = dt;
        self
    }

    pub fn start_time(mut self, start_time: i32) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn x_interval(mut self, x_interval: f64) -> Self {
        self.x_interval = x_interval;
        self
    }

    pub fn y_interval(mut self, y_interval: f64) -> Self {
        self.y_interval = y_interval;
        self
    }

    pub fn min_inline(mut self, min_iline: i32) -> Self {
        self.min_iline = min_iline;
        self
    }

    pub fn min_crossline(mut self, min_xline: i32) -> Self {
        self.min_xline = min_xline;
        self
    }

    /// Trace header byte positions of the inline and crossline numbers
    pub fn header_locations(mut self, inline_location: usize, crossline_location: usize) -> Self {
        self.inline_location = inline_location;
        self.crossline_location = crossline_location;
        self
    }

    pub fn text_encoding(mut self, encoding: TextEncoding) -> Self {
        self.text_encoding = encoding;
        self
    }

    pub fn input_byte_order(mut self, order: ByteOrder) -> Self {
        self.input_byte_order = order;
        self
    }

    pub fn encode_concurrency(mut self, concurrency: usize) -> Self {
        self.encode_concurrency = concurrency;
        self
    }

    /// Validate every field and freeze the configuration
    pub fn build(self) -> Result<CreationConfig> {
        let shape = VolumeShape::new(self.size_z, self.size_y, self.size_x);
        if shape.size_z == 0 || shape.size_y == 0 || shape.size_x == 0 {
            return Err(SegyError::InvalidDimensions(format!(
                "all dimensions must be positive, got {}",
                shape
            )));
        }
        let samples_per_trace = u16::try_from(shape.size_x).map_err(|_| {
            SegyError::InvalidDimensions(format!(
                "{} samples per trace exceeds the 2-byte header field ({})",
                shape.size_x,
                u16::MAX
            ))
        })?;
        let trace_count = shape
            .size_z
            .checked_mul(shape.size_y)
            .filter(|&n| n <= i32::MAX as usize)
            .ok_or_else(|| {
                SegyError::InvalidDimensions(format!(
                    "{} x {} traces cannot be numbered in a 4-byte header field",
                    shape.size_z, shape.size_y
                ))
            })?;
        if trace_count.checked_mul(shape.size_x).is_none() {
            return Err(SegyError::InvalidDimensions(format!(
                "volume {} is too large to address",
                shape
            )));
        }

        let data_format = DataFormatCode::try_from(self.format)?;

        let sample_interval = u16::try_from(self.dt)
            .ok()
            .filter(|&dt| dt > 0)
            .ok_or_else(|| {
                SegyError::Configuration(format!(
                    "sample interval {} must be within 1..={} microseconds",
                    self.dt,
                    u16::MAX
                ))
            })?;
        let start_time = i16::try_from(self.start_time).map_err(|_| {
            SegyError::Configuration(format!(
                "start time {} does not fit the 2-byte delay recording time field",
                self.start_time
            ))
        })?;

        check_line_range("inline", self.min_iline, shape.size_z)?;
        check_line_range("crossline", self.min_xline, shape.size_y)?;
        check_interval("X", self.x_interval, shape.size_z)?;
        check_interval("Y", self.y_interval, shape.size_y)?;

        let header_layout = HeaderLayout::new(self.inline_location, self.crossline_location)?;

        if self.encode_concurrency == 0 {
            return Err(SegyError::Configuration(
                "encode concurrency must be at least 1".to_string(),
            ));
        }

        Ok(CreationConfig {
            shape,
            data_format,
            sample_interval,
            samples_per_trace,
            start_time,
            x_interval: self.x_interval,
            y_interval: self.y_interval,
            min_inline: self.min_iline,
            min_crossline: self.min_xline,
            header_layout,
            text_encoding: self.text_encoding,
            input_byte_order: self.input_byte_order,
            encode_concurrency: self.encode_concurrency,
        })
    }
}

fn check_line_range(name: &str, min_line: i32, count: usize) -> Result<()> {
    let last = i64::from(min_line) + count as i64 - 1;
    if last > i64::from(i32::MAX) {
        return Err(SegyError::Configuration(format!(
            "{} numbers starting at {} overflow after {} lines",
            name, min_line, count
        )));
    }
    Ok(())
}

fn check_interval(name: &str, interval: f64, count: usize) -> Result<()> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(SegyError::Configuration(format!(
            "{} interval must be a positive finite number, got {}",
            name, interval
        )));
    }
    let furthest = (count - 1) as f64 * interval * COORDINATE_SCALE;
    if furthest.round() > f64::from(i32::MAX) {
        return Err(SegyError::Configuration(format!(
            "{} coordinates reach {} which does not fit the scaled 4-byte field",
            name,
            (count - 1) as f64 * interval
        )));
    }
    Ok(())
}

/// Validated, immutable creation parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreationConfig {
    shape: VolumeShape,
    data_format: DataFormatCode,
    sample_interval: u16,
    samples_per_trace: u16,
    start_time: i16,
    x_interval: f64,
    y_interval: f64,
    min_inline: i32,
    min_crossline: i32,
    header_layout: HeaderLayout,
    text_encoding: TextEncoding,
    input_byte_order: ByteOrder,
    encode_concurrency: usize,
}

impl CreationConfig {
    /// Shorthand for `CreationConfigBuilder::new(..)`
    pub fn builder(size_z: usize, size_y: usize, size_x: usize) -> CreationConfigBuilder {
        CreationConfigBuilder::new(size_z, size_y, size_x)
    }

    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    pub fn data_format(&self) -> DataFormatCode {
        self.data_format
    }

    pub fn sample_interval(&self) -> u16 {
        self.sample_interval
    }

    pub fn samples_per_trace(&self) -> u16 {
        self.samples_per_trace
    }

    pub fn start_time(&self) -> i16 {
        self.start_time
    }

    pub fn x_interval(&self) -> f64 {
        self.x_interval
    }

    pub fn y_interval(&self) -> f64 {
        self.y_interval
    }

    pub fn min_inline(&self) -> i32 {
        self.min_inline
    }

    pub fn min_crossline(&self) -> i32 {
        self.min_crossline
    }

    pub fn header_layout(&self) -> HeaderLayout {
        self.header_layout
    }

    pub fn text_encoding(&self) -> TextEncoding {
        self.text_encoding
    }

    pub fn input_byte_order(&self) -> ByteOrder {
        self.input_byte_order
    }

    pub fn encode_concurrency(&self) -> usize {
        self.encode_concurrency
    }

    /// Encoded size of one trace including its header
    pub fn trace_size_bytes(&self) -> usize {
        crate::header::TRACE_HEADER_SIZE + self.shape.size_x * self.data_format.sample_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CreationConfig::builder(2, 2, 10).build().unwrap();
        assert_eq!(config.data_format(), DataFormatCode::IeeeFloat);
        assert_eq!(config.sample_interval(), 2000);
        assert_eq!(config.start_time(), 0);
        assert_eq!(config.x_interval(), 25.0);
        assert_eq!(config.y_interval(), 25.0);
        assert_eq!(config.min_inline(), 1);
        assert_eq!(config.min_crossline(), 1);
        assert_eq!(config.header_layout(), HeaderLayout::default());
        assert_eq!(config.text_encoding(), TextEncoding::Ebcdic);
        assert_eq!(config.trace_size_bytes(), 280);
    }

    #[test]
    fn test_builder_overrides() {
        let config = CreationConfig::builder(5, 6, 7)
            .data_format(DataFormatCode::IbmFloat)
            .sample_interval(4000)
            .start_time(-20)
            .x_interval(12.5)
            .y_interval(6.25)
            .min_inline(300)
            .min_crossline(700)
            .build()
            .unwrap();
        assert_eq!(config.data_format(), DataFormatCode::IbmFloat);
        assert_eq!(config.sample_interval(), 4000);
        assert_eq!(config.start_time(), -20);
        assert_eq!(config.min_inline(), 300);
        assert_eq!(config.min_crossline(), 700);
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(matches!(
            CreationConfig::builder(0, 2, 2).build(),
            Err(SegyError::InvalidDimensions(_))
        ));
        assert!(CreationConfig::builder(1, 1, 70_000).build().is_err());
    }

    #[test]
    fn test_rejects_unsupported_format() {
        for code in [0u16, 2, 3, 4, 8, 6] {
            let err = CreationConfig::builder(1, 1, 1)
                .format_code(code)
                .build()
                .unwrap_err();
            assert!(matches!(err, SegyError::UnsupportedFormat(c) if c == code));
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        let base = || CreationConfig::builder(2, 2, 2);
        assert!(base().sample_interval(0).build().is_err());
        assert!(base().sample_interval(70_000).build().is_err());
        assert!(base().start_time(40_000).build().is_err());
        assert!(base().x_interval(0.0).build().is_err());
        assert!(base().y_interval(f64::NAN).build().is_err());
        assert!(base().x_interval(1.0e9).build().is_err());
        assert!(base().min_inline(i32::MAX).build().is_err());
        assert!(base().header_locations(189, 190).build().is_err());
        assert!(base().header_locations(5, 193).build().is_err());
        assert!(base().header_locations(69, 193).build().is_err());
        assert!(base().encode_concurrency(0).build().is_err());
    }

    #[test]
    fn test_from_json() {
        let builder = CreationConfigBuilder::from_json_str(
            r#"{ "size_z": 3, "size_y": 4, "size_x": 5, "format": 1, "text_encoding": "ascii" }"#,
        )
        .unwrap();
        let config = builder.build().unwrap();
        assert_eq!(config.shape(), VolumeShape::new(3, 4, 5));
        assert_eq!(config.data_format(), DataFormatCode::IbmFloat);
        assert_eq!(config.sample_interval(), 2000);
        assert_eq!(config.text_encoding(), TextEncoding::Ascii);

        assert!(CreationConfigBuilder::from_json_str("{ \"size_z\": \"x\" }").is_err());
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        tokio::fs::write(&path, r#"{ "size_z": 2, "size_y": 2, "size_x": 4, "dt": 1000 }"#)
            .await
            .unwrap();
        let config = CreationConfigBuilder::from_json_file(&path)
            .await
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.sample_interval(), 1000);

        let missing = CreationConfigBuilder::from_json_file(dir.path().join("absent.json")).await;
        assert!(matches!(missing, Err(SegyError::Io(_))));
    }
}
