//! Volume writer - the single forward pass that turns a volume into a SEG-Y file
//!
//! The writer moves through `Configuring -> HeaderPhase -> TracePhase -> Closed`.
//! Inline blocks (trace header + samples for every crossline of one inline)
//! are encoded on blocking worker tasks, several at a time, but are appended to
//! the output strictly in inline-major, crossline-minor order.

use crate::codec::{get_codec, SampleCodec};
use crate::config::CreationConfig;
use crate::error::{Result, SegyError};
use crate::geometry::GeometryMapper;
use crate::header::{build_binary_header, build_text_header, TraceHeader};
use crate::io::{FileTarget, MemoryTarget, OutputTarget};
use crate::source::{SampleSource, VolumeInput};
use crate::types::{DataFormatCode, VolumeShape};
use crate::utils::{format_bytes, segy_file_size};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Phase of a single creation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriterState {
    /// Validating configuration and input
    Configuring,
    /// Emitting the textual and binary file headers
    HeaderPhase,
    /// Last trace emitted was (z, y)
    TracePhase { z: usize, y: usize },
    /// Output flushed and committed
    Closed,
}

/// Enforces the forward-only ordering of a pass
#[derive(Debug)]
struct StateTracker {
    shape: VolumeShape,
    state: WriterState,
    traces_written: usize,
}

impl StateTracker {
    fn new(shape: VolumeShape) -> Self {
        Self {
            shape,
            state: WriterState::Configuring,
            traces_written: 0,
        }
    }

    fn transition(&mut self, next: WriterState) {
        tracing::debug!("Writer state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn enter_headers(&mut self) -> Result<()> {
        if self.state != WriterState::Configuring {
            return Err(SegyError::InvalidState(format!(
                "file headers can only be written once, writer is in {:?}",
                self.state
            )));
        }
        self.transition(WriterState::HeaderPhase);
        Ok(())
    }

    /// Record that every trace of inline `z` is about to be written
    fn emit_inline(&mut self, z: usize) -> Result<()> {
        let expected_z = self.traces_written / self.shape.size_y;
        let ordered = match self.state {
            WriterState::HeaderPhase | WriterState::TracePhase { .. } => z == expected_z,
            _ => false,
        };
        if !ordered || z >= self.shape.size_z {
            return Err(SegyError::InvalidState(format!(
                "inline {} cannot follow {:?} (next expected inline {})",
                z, self.state, expected_z
            )));
        }
        self.traces_written += self.shape.size_y;
        self.state = WriterState::TracePhase {
            z,
            y: self.shape.size_y - 1,
        };
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.traces_written != self.shape.trace_count() {
            return Err(SegyError::InvalidState(format!(
                "closing after {} of {} traces",
                self.traces_written,
                self.shape.trace_count()
            )));
        }
        self.transition(WriterState::Closed);
        Ok(())
    }
}

/// One inline's worth of encoded traces
struct EncodedInline {
    z: usize,
    bytes: Bytes,
    clamped: usize,
}

/// Everything a worker needs to encode an inline
struct EncodeContext {
    config: CreationConfig,
    mapper: GeometryMapper,
    source: Arc<dyn SampleSource>,
    codec: Box<dyn SampleCodec>,
}

impl EncodeContext {
    fn encode_inline(&self, z: usize) -> Result<EncodedInline> {
        let shape = self.config.shape();
        let layout = self.config.header_layout();

        let mut samples = vec![0.0f32; shape.inline_len()];
        self.source.read_inline(z, &mut samples)?;

        let mut out = BytesMut::with_capacity(shape.size_y * self.config.trace_size_bytes());
        let mut clamped = 0;
        for (geometry, trace) in self
            .mapper
            .inline_traces(z)
            .zip(samples.chunks_exact(shape.size_x))
        {
            out.put_slice(&TraceHeader::for_trace(&geometry, &self.config).to_bytes(&layout));
            clamped += self.codec.encode_into(trace, &mut out);
        }

        Ok(EncodedInline {
            z,
            bytes: out.freeze(),
            clamped,
        })
    }
}

/// Outcome of a successful creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationSummary {
    pub location: String,
    pub shape: VolumeShape,
    pub data_format: DataFormatCode,
    pub traces_written: usize,
    pub bytes_written: u64,
    /// Samples the codec had to clamp (NaN, infinities)
    pub clamped_samples: usize,
    pub finished_at: DateTime<Utc>,
}

impl CreationSummary {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} traces of {} samples, format {}, {}{}",
            self.location,
            self.traces_written,
            self.shape.size_x,
            self.data_format,
            format_bytes(self.bytes_written),
            if self.clamped_samples > 0 {
                format!(", {} samples clamped", self.clamped_samples)
            } else {
                String::new()
            }
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Stateless writer bound to one validated configuration
#[derive(Debug, Clone)]
pub struct SegyWriter {
    config: CreationConfig,
    mapper: GeometryMapper,
}

impl SegyWriter {
    pub fn new(config: CreationConfig) -> Self {
        let mapper = GeometryMapper::from_config(&config);
        Self { config, mapper }
    }

    pub fn config(&self) -> &CreationConfig {
        &self.config
    }

    pub fn geometry(&self) -> &GeometryMapper {
        &self.mapper
    }

    /// Encode `source` into `target`.
    ///
    /// The target is opened only after the source has been checked against the
    /// configuration, and is aborted if any later step fails. Must run inside a
    /// Tokio runtime.
    pub async fn write<T: OutputTarget>(
        &self,
        source: Arc<dyn SampleSource>,
        target: &T,
    ) -> Result<CreationSummary> {
        let shape = self.config.shape();
        let mut tracker = StateTracker::new(shape);

        let actual = source.shape();
        if actual != shape {
            return Err(SegyError::ShapeMismatch {
                expected: shape,
                actual,
            });
        }

        let expected_size = segy_file_size(&shape, self.config.data_format());
        tracing::info!(
            "Creating SEG-Y {}: shape {}, format {}, dt {} us, {}",
            target.location(),
            shape,
            self.config.data_format(),
            self.config.sample_interval(),
            format_bytes(expected_size)
        );

        let mut sink = target.open().await?;
        let written = match self.write_stream(&mut sink, source, &mut tracker).await {
            Ok(totals) => tracker.close().map(|_| totals),
            Err(e) => Err(e),
        };
        let (bytes_written, clamped_samples) = finish_output(
            target,
            sink,
            written,
            expected_size,
            self.config.data_format(),
        )
        .await?;

        let summary = CreationSummary {
            location: target.location(),
            shape,
            data_format: self.config.data_format(),
            traces_written: tracker.traces_written,
            bytes_written,
            clamped_samples,
            finished_at: Utc::now(),
        };
        tracing::info!("Created {}", summary.summary());
        Ok(summary)
    }

    /// Header phase followed by the trace phase; returns (bytes, clamped samples)
    async fn write_stream<W>(
        &self,
        sink: &mut W,
        source: Arc<dyn SampleSource>,
        tracker: &mut StateTracker,
    ) -> Result<(u64, usize)>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let shape = self.config.shape();

        tracker.enter_headers()?;
        let text = build_text_header(&self.config);
        let binary = build_binary_header(&self.config);
        sink.write_all(&text).await?;
        sink.write_all(&binary).await?;
        let mut bytes_written = (text.len() + binary.len()) as u64;

        let context = Arc::new(EncodeContext {
            config: self.config.clone(),
            mapper: self.mapper,
            source,
            codec: get_codec(self.config.data_format()),
        });

        let mut blocks = stream::iter(0..shape.size_z)
            .map(|z| {
                let context = Arc::clone(&context);
                tokio::task::spawn_blocking(move || context.encode_inline(z))
            })
            .buffered(self.config.encode_concurrency());

        let mut clamped = 0;
        while let Some(joined) = blocks.next().await {
            let block = joined??;
            tracker.emit_inline(block.z)?;
            sink.write_all(&block.bytes).await?;
            bytes_written += block.bytes.len() as u64;
            clamped += block.clamped;
            tracing::debug!("Wrote inline {} of {}", block.z + 1, shape.size_z);
        }

        sink.flush().await?;
        Ok((bytes_written, clamped))
    }
}

/// Commit `sink` if the pass succeeded with exactly `expected_size` bytes,
/// otherwise abort it. Returns (bytes, clamped samples).
pub(crate) async fn finish_output<T: OutputTarget>(
    target: &T,
    sink: T::Writer,
    written: Result<(u64, usize)>,
    expected_size: u64,
    format: DataFormatCode,
) -> Result<(u64, usize)> {
    let outcome = match written {
        Ok((bytes, _)) if bytes != expected_size => Err(SegyError::InvalidState(format!(
            "wrote {} bytes, expected {}",
            bytes, expected_size
        ))),
        other => other,
    };

    let (bytes_written, clamped_samples) = match outcome {
        Ok(totals) => totals,
        Err(e) => {
            tracing::warn!(
                "Creation of {} failed, discarding partial output: {}",
                target.location(),
                e
            );
            target.abort(sink).await;
            return Err(e);
        }
    };

    target.commit(sink).await?;

    if clamped_samples > 0 {
        tracing::warn!(
            "{} samples were outside the {} range and were clamped",
            clamped_samples,
            format
        );
    }
    Ok((bytes_written, clamped_samples))
}

/// Create a SEG-Y file at `segy_out` from a binary file or an in-memory array.
///
/// The input is resolved and its shape checked before the output path is
/// touched; on failure no file claiming to be complete is left behind.
pub async fn create(
    segy_out: impl AsRef<Path>,
    input: impl Into<VolumeInput>,
    config: CreationConfig,
) -> Result<CreationSummary> {
    let source = input.into().into_source(&config)?;
    let target = FileTarget::new(segy_out);
    SegyWriter::new(config).write(source, &target).await
}

/// Encode a volume entirely in memory
pub async fn create_in_memory(
    input: impl Into<VolumeInput>,
    config: CreationConfig,
) -> Result<(Bytes, CreationSummary)> {
    let source = input.into().into_source(&config)?;
    let target = MemoryTarget::new();
    let summary = SegyWriter::new(config).write(source, &target).await?;
    let bytes = target.contents().ok_or_else(|| {
        SegyError::InvalidState("memory target was not committed".to_string())
    })?;
    Ok((bytes, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IeeeCodec;
    use crate::header::{
        BinaryHeader, HeaderLayout, BINARY_HEADER_SIZE, TEXT_HEADER_SIZE, TRACE_HEADER_SIZE,
    };
    use crate::source::ArraySource;
    use ndarray::Array3;

    fn ramp_volume(shape: VolumeShape) -> Array3<f32> {
        Array3::from_shape_fn(shape.as_tuple(), |(z, y, x)| {
            (z * 10_000 + y * 100 + x) as f32
        })
    }

    /// Source whose reads fail from a given inline on
    struct FailingSource {
        shape: VolumeShape,
        fail_from: usize,
    }

    impl SampleSource for FailingSource {
        fn shape(&self) -> VolumeShape {
            self.shape
        }

        fn read_trace(&self, z: usize, _y: usize, out: &mut [f32]) -> Result<()> {
            if z >= self.fail_from {
                return Err(SegyError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "input truncated",
                )));
            }
            out.fill(1.0);
            Ok(())
        }
    }

    #[test]
    fn test_tracker_order() {
        let mut tracker = StateTracker::new(VolumeShape::new(2, 3, 4));
        assert!(tracker.emit_inline(0).is_err());
        tracker.enter_headers().unwrap();
        assert!(tracker.enter_headers().is_err());
        assert!(tracker.emit_inline(1).is_err());
        tracker.emit_inline(0).unwrap();
        assert_eq!(tracker.state, WriterState::TracePhase { z: 0, y: 2 });
        assert!(tracker.close().is_err());
        assert!(tracker.emit_inline(0).is_err());
        tracker.emit_inline(1).unwrap();
        tracker.close().unwrap();
        assert_eq!(tracker.state, WriterState::Closed);
        assert!(tracker.emit_inline(2).is_err());
    }

    #[tokio::test]
    async fn test_in_memory_layout() {
        let shape = VolumeShape::new(3, 2, 5);
        let config = CreationConfig::builder(3, 2, 5)
            .encode_concurrency(2)
            .build()
            .unwrap();
        let volume = ramp_volume(shape);
        let (bytes, summary) = create_in_memory(volume.clone(), config).await.unwrap();

        assert_eq!(bytes.len() as u64, segy_file_size(&shape, DataFormatCode::IeeeFloat));
        assert_eq!(summary.bytes_written, bytes.len() as u64);
        assert_eq!(summary.traces_written, 6);
        assert_eq!(summary.clamped_samples, 0);

        let binary = BinaryHeader::from_bytes(&bytes[TEXT_HEADER_SIZE..]).unwrap();
        assert_eq!(binary.samples_per_trace, 5);

        let trace_size = TRACE_HEADER_SIZE + 5 * 4;
        let layout = HeaderLayout::default();
        for k in 0..6 {
            let start = TEXT_HEADER_SIZE + BINARY_HEADER_SIZE + k * trace_size;
            let header =
                TraceHeader::from_bytes(&bytes[start..start + TRACE_HEADER_SIZE], &layout).unwrap();
            assert_eq!(header.sequence_in_file, k as i32 + 1);
            assert_eq!(header.inline, 1 + (k / 2) as i32);
            assert_eq!(header.crossline, 1 + (k % 2) as i32);

            let samples = IeeeCodec
                .decode(&bytes[start + TRACE_HEADER_SIZE..start + trace_size])
                .unwrap();
            let (z, y) = (k / 2, k % 2);
            let expected: Vec<f32> = (0..5).map(|x| volume[[z, y, x]]).collect();
            assert_eq!(samples, expected);
        }
    }

    #[tokio::test]
    async fn test_source_shape_checked_before_open() {
        let config = CreationConfig::builder(2, 2, 2).build().unwrap();
        let source = Arc::new(ArraySource::new(Array3::zeros((2, 2, 3))));
        let target = MemoryTarget::new();
        let err = SegyWriter::new(config)
            .write(source, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, SegyError::ShapeMismatch { .. }));
        assert!(target.contents().is_none());
    }

    #[tokio::test]
    async fn test_failed_read_aborts_output() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.segy");
        let config = CreationConfig::builder(4, 2, 3)
            .encode_concurrency(1)
            .build()
            .unwrap();
        let source = Arc::new(FailingSource {
            shape: VolumeShape::new(4, 2, 3),
            fail_from: 2,
        });

        let err = SegyWriter::new(config)
            .write(source, &FileTarget::new(&path))
            .await
            .unwrap_err();
        assert!(matches!(err, SegyError::Io(_)));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_clamped_samples_reported() {
        let config = CreationConfig::builder(1, 1, 4)
            .data_format(DataFormatCode::IbmFloat)
            .build()
            .unwrap();
        let mut volume = Array3::zeros((1, 1, 4));
        volume[[0, 0, 1]] = f32::NAN;
        volume[[0, 0, 3]] = f32::NEG_INFINITY;
        let (_, summary) = create_in_memory(volume, config).await.unwrap();
        assert_eq!(summary.clamped_samples, 2);
        assert!(summary.summary().contains("2 samples clamped"));
    }

    #[tokio::test]
    async fn test_summary_json() {
        let config = CreationConfig::builder(1, 2, 2).build().unwrap();
        let (_, summary) = create_in_memory(Array3::zeros((1, 2, 2)), config)
            .await
            .unwrap();
        let json = summary.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["traces_written"], 2);
        assert_eq!(parsed["data_format"], 5);
        assert_eq!(parsed["location"], "memory");
    }
}
