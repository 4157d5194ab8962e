//! Creation from a template SEG-Y file
//!
//! The new file reuses the template's textual and binary headers and every
//! trace header byte for byte; only the samples come from the input volume.
//! Each template trace takes its samples from the volume position given by
//! the inline/crossline numbers in its own header, so templates with missing
//! traces are reproduced as they are.

use crate::codec::{get_codec, SampleCodec};
use crate::config::DEFAULT_ENCODE_CONCURRENCY;
use crate::error::{Result, SegyError};
use crate::header::{
    BinaryHeader, HeaderLayout, TraceHeader, BINARY_HEADER_SIZE, TEXT_HEADER_SIZE,
    TRACE_HEADER_SIZE,
};
use crate::io::{FileTarget, OutputTarget};
use crate::source::{SampleSource, VolumeInput};
use crate::types::{ByteOrder, DataFormatCode, VolumeShape};
use crate::utils::format_bytes;
use crate::writer::{finish_output, CreationSummary};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Textual plus binary file header
pub const FILE_HEADER_SIZE: usize = TEXT_HEADER_SIZE + BINARY_HEADER_SIZE;

/// Template traces encoded per worker task
const TEMPLATE_BLOCK_TRACES: usize = 256;

/// Volume trace a template trace takes its samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    z: usize,
    y: usize,
}

/// A scanned template SEG-Y file
#[derive(Debug, Clone)]
pub struct SegyTemplate {
    path: PathBuf,
    layout: HeaderLayout,
    file_header: Bytes,
    binary: BinaryHeader,
    inline_range: (i32, i32),
    crossline_range: (i32, i32),
    shape: VolumeShape,
    placements: Arc<Vec<Placement>>,
    input_byte_order: ByteOrder,
    encode_concurrency: usize,
}

impl SegyTemplate {
    /// Read the file header of `path` and locate every trace by the line
    /// numbers stored at the positions in `layout`
    pub async fn open(path: impl AsRef<Path>, layout: HeaderLayout) -> Result<Self> {
        layout.check_bounds()?;
        let path = path.as_ref().to_path_buf();
        let file_len = fs::metadata(&path).await?.len();
        if file_len < FILE_HEADER_SIZE as u64 {
            return Err(SegyError::InvalidHeader(format!(
                "template {} holds {} bytes, shorter than the {}-byte file header",
                path.display(),
                file_len,
                FILE_HEADER_SIZE
            )));
        }

        let mut reader = BufReader::new(fs::File::open(&path).await?);
        let mut file_header = vec![0u8; FILE_HEADER_SIZE];
        reader.read_exact(&mut file_header).await?;

        let binary = BinaryHeader::from_bytes(&file_header[TEXT_HEADER_SIZE..])?;
        let size_x = usize::from(binary.samples_per_trace);
        if size_x == 0 {
            return Err(SegyError::InvalidHeader(format!(
                "template {} declares 0 samples per trace",
                path.display()
            )));
        }

        let trace_size = TRACE_HEADER_SIZE + size_x * binary.data_format.sample_size();
        let data_len = file_len - FILE_HEADER_SIZE as u64;
        if data_len == 0 || data_len % trace_size as u64 != 0 {
            return Err(SegyError::InvalidHeader(format!(
                "template {} has {} bytes of traces, not a whole number of {}-byte traces",
                path.display(),
                data_len,
                trace_size
            )));
        }
        let trace_count = (data_len / trace_size as u64) as usize;

        let mut lines = Vec::with_capacity(trace_count);
        let mut trace = vec![0u8; trace_size];
        for index in 0..trace_count {
            reader.read_exact(&mut trace).await?;
            let header = TraceHeader::from_bytes(&trace[..TRACE_HEADER_SIZE], &layout)?;
            if header.sample_count != 0 && header.sample_count != binary.samples_per_trace {
                return Err(SegyError::InvalidHeader(format!(
                    "template trace {} holds {} samples, the binary header declares {}",
                    index + 1,
                    header.sample_count,
                    binary.samples_per_trace
                )));
            }
            lines.push((header.inline, header.crossline));
        }

        let inline_range = line_range(lines.iter().map(|&(inline, _)| inline));
        let crossline_range = line_range(lines.iter().map(|&(_, crossline)| crossline));
        let span = |(first, last): (i32, i32)| (i64::from(last) - i64::from(first) + 1) as usize;
        let shape = VolumeShape::new(span(inline_range), span(crossline_range), size_x);

        let placements = lines
            .into_iter()
            .map(|(inline, crossline)| Placement {
                z: (i64::from(inline) - i64::from(inline_range.0)) as usize,
                y: (i64::from(crossline) - i64::from(crossline_range.0)) as usize,
            })
            .collect();

        tracing::debug!(
            "Scanned template {}: {} traces, inlines {}-{}, crosslines {}-{}, format {}",
            path.display(),
            trace_count,
            inline_range.0,
            inline_range.1,
            crossline_range.0,
            crossline_range.1,
            binary.data_format
        );

        Ok(Self {
            path,
            layout,
            file_header: Bytes::from(file_header),
            binary,
            inline_range,
            crossline_range,
            shape,
            placements: Arc::new(placements),
            input_byte_order: ByteOrder::default(),
            encode_concurrency: DEFAULT_ENCODE_CONCURRENCY,
        })
    }

    /// Byte order used when the input volume is a raw binary file
    pub fn with_input_byte_order(mut self, order: ByteOrder) -> Self {
        self.input_byte_order = order;
        self
    }

    /// Number of trace blocks encoded concurrently (at least 1)
    pub fn with_encode_concurrency(mut self, concurrency: usize) -> Self {
        self.encode_concurrency = concurrency.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    pub fn binary_header(&self) -> &BinaryHeader {
        &self.binary
    }

    pub fn data_format(&self) -> DataFormatCode {
        self.binary.data_format
    }

    /// Volume shape the input must have: (inline span, crossline span, samples)
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// First and last inline number found in the template
    pub fn inline_range(&self) -> (i32, i32) {
        self.inline_range
    }

    /// First and last crossline number found in the template
    pub fn crossline_range(&self) -> (i32, i32) {
        self.crossline_range
    }

    pub fn trace_count(&self) -> usize {
        self.placements.len()
    }

    fn trace_size(&self) -> usize {
        TRACE_HEADER_SIZE + self.shape.size_x * self.binary.data_format.sample_size()
    }

    /// Size of the output file, identical to the template's
    pub fn output_size(&self) -> u64 {
        FILE_HEADER_SIZE as u64 + self.trace_count() as u64 * self.trace_size() as u64
    }

    /// Resolve `input` against the template's shape
    pub fn open_input(&self, input: impl Into<VolumeInput>) -> Result<Arc<dyn SampleSource>> {
        input.into().open(self.shape, self.input_byte_order)
    }

    /// Encode `source` into `target` with the template's headers.
    ///
    /// The target is opened only after the source shape has been checked and
    /// is aborted if any later step fails. Must run inside a Tokio runtime.
    pub async fn write<T: OutputTarget>(
        &self,
        source: Arc<dyn SampleSource>,
        target: &T,
    ) -> Result<CreationSummary> {
        let actual = source.shape();
        if actual != self.shape {
            return Err(SegyError::ShapeMismatch {
                expected: self.shape,
                actual,
            });
        }

        let expected_size = self.output_size();
        tracing::info!(
            "Creating SEG-Y {} from template {}: {} traces, format {}, {}",
            target.location(),
            self.path.display(),
            self.trace_count(),
            self.data_format(),
            format_bytes(expected_size)
        );

        let mut sink = target.open().await?;
        let written = self.write_stream(&mut sink, source).await;
        let (bytes_written, clamped_samples) =
            finish_output(target, sink, written, expected_size, self.data_format()).await?;

        let summary = CreationSummary {
            location: target.location(),
            shape: self.shape,
            data_format: self.data_format(),
            traces_written: self.trace_count(),
            bytes_written,
            clamped_samples,
            finished_at: Utc::now(),
        };
        tracing::info!("Created {}", summary.summary());
        Ok(summary)
    }

    async fn write_stream<W>(&self, sink: &mut W, source: Arc<dyn SampleSource>) -> Result<(u64, usize)>
    where
        W: AsyncWrite + Unpin + Send,
    {
        sink.write_all(&self.file_header).await?;
        let mut bytes_written = self.file_header.len() as u64;

        let context = Arc::new(TemplateContext {
            template: Mutex::new(std::fs::File::open(&self.path)?),
            placements: Arc::clone(&self.placements),
            trace_size: self.trace_size(),
            size_x: self.shape.size_x,
            source,
            codec: get_codec(self.data_format()),
        });

        let trace_count = self.trace_count();
        let mut blocks = stream::iter((0..trace_count).step_by(TEMPLATE_BLOCK_TRACES))
            .map(|first| {
                let context = Arc::clone(&context);
                tokio::task::spawn_blocking(move || context.encode_block(first))
            })
            .buffered(self.encode_concurrency);

        let mut next_trace = 0;
        let mut clamped = 0;
        while let Some(joined) = blocks.next().await {
            let block = joined??;
            if block.first != next_trace {
                return Err(SegyError::InvalidState(format!(
                    "template trace block starting at {} cannot follow trace {}",
                    block.first, next_trace
                )));
            }
            next_trace += block.traces;
            sink.write_all(&block.bytes).await?;
            bytes_written += block.bytes.len() as u64;
            clamped += block.clamped;
            tracing::debug!("Wrote template traces {} of {}", next_trace, trace_count);
        }

        if next_trace != trace_count {
            return Err(SegyError::InvalidState(format!(
                "wrote {} of {} template traces",
                next_trace, trace_count
            )));
        }

        sink.flush().await?;
        Ok((bytes_written, clamped))
    }
}

fn line_range(lines: impl Iterator<Item = i32>) -> (i32, i32) {
    lines.fold((i32::MAX, i32::MIN), |(low, high), line| {
        (low.min(line), high.max(line))
    })
}

/// Consecutive template traces, encoded
struct EncodedBlock {
    first: usize,
    traces: usize,
    bytes: Bytes,
    clamped: usize,
}

struct TemplateContext {
    template: Mutex<std::fs::File>,
    placements: Arc<Vec<Placement>>,
    trace_size: usize,
    size_x: usize,
    source: Arc<dyn SampleSource>,
    codec: Box<dyn SampleCodec>,
}

impl TemplateContext {
    fn encode_block(&self, first: usize) -> Result<EncodedBlock> {
        let last = (first + TEMPLATE_BLOCK_TRACES).min(self.placements.len());
        let mut out = BytesMut::with_capacity((last - first) * self.trace_size);
        let mut header = [0u8; TRACE_HEADER_SIZE];
        let mut samples = vec![0.0f32; self.size_x];
        let mut clamped = 0;

        for (index, placement) in (first..last).zip(&self.placements[first..last]) {
            let offset = FILE_HEADER_SIZE as u64 + index as u64 * self.trace_size as u64;
            {
                let mut file = self.template.lock();
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut header)?;
            }
            self.source.read_trace(placement.z, placement.y, &mut samples)?;
            out.put_slice(&header);
            clamped += self.codec.encode_into(&samples, &mut out);
        }

        Ok(EncodedBlock {
            first,
            traces: last - first,
            bytes: out.freeze(),
            clamped,
        })
    }
}

/// Create `segy_out` from `input`, copying every header of the SEG-Y file at
/// `template`. Inline and crossline numbers are read at the positions in
/// `layout` (default 189/193); the input must cover the template's inline and
/// crossline ranges and its sample count.
pub async fn create_from_template(
    segy_out: impl AsRef<Path>,
    template: impl AsRef<Path>,
    input: impl Into<VolumeInput>,
    layout: HeaderLayout,
) -> Result<CreationSummary> {
    let template = SegyTemplate::open(template, layout).await?;
    let source = template.open_input(input)?;
    template.write(source, &FileTarget::new(segy_out)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IbmCodec;
    use crate::config::CreationConfig;
    use crate::io::MemoryTarget;
    use crate::writer::create;
    use ndarray::Array3;
    use tempfile::TempDir;

    async fn write_template(dir: &TempDir, config: CreationConfig) -> PathBuf {
        let path = dir.path().join("template.segy");
        let shape = config.shape();
        create(&path, Array3::<f32>::zeros(shape.as_tuple()), config)
            .await
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_open_scans_geometry() {
        let dir = TempDir::new().unwrap();
        let config = CreationConfig::builder(3, 4, 6)
            .format_code(1)
            .min_inline(100)
            .min_crossline(20)
            .build()
            .unwrap();
        let path = write_template(&dir, config).await;

        let template = SegyTemplate::open(&path, HeaderLayout::default()).await.unwrap();
        assert_eq!(template.shape(), VolumeShape::new(3, 4, 6));
        assert_eq!(template.inline_range(), (100, 102));
        assert_eq!(template.crossline_range(), (20, 23));
        assert_eq!(template.trace_count(), 12);
        assert_eq!(template.data_format(), DataFormatCode::IbmFloat);
        assert_eq!(template.output_size(), std::fs::metadata(&path).unwrap().len());
    }

    #[tokio::test]
    async fn test_rejects_truncated_template() {
        let dir = TempDir::new().unwrap();
        let config = CreationConfig::builder(2, 2, 4).build().unwrap();
        let path = write_template(&dir, config).await;
        let bytes = std::fs::read(&path).unwrap();

        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        let err = SegyTemplate::open(&path, HeaderLayout::default()).await.unwrap_err();
        assert!(matches!(err, SegyError::InvalidHeader(_)));

        std::fs::write(&path, &bytes[..100]).unwrap();
        let err = SegyTemplate::open(&path, HeaderLayout::default()).await.unwrap_err();
        assert!(matches!(err, SegyError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn test_missing_traces_are_placed_by_line_number() {
        let dir = TempDir::new().unwrap();
        let config = CreationConfig::builder(2, 3, 2).build().unwrap();
        let path = write_template(&dir, config).await;

        // drop the middle trace of the first inline: lines (1,1) (1,3) (2,1) (2,2) (2,3)
        let bytes = std::fs::read(&path).unwrap();
        let trace_size = TRACE_HEADER_SIZE + 8;
        let mut sparse = bytes[..FILE_HEADER_SIZE + trace_size].to_vec();
        sparse.extend_from_slice(&bytes[FILE_HEADER_SIZE + 2 * trace_size..]);
        std::fs::write(&path, &sparse).unwrap();

        let template = SegyTemplate::open(&path, HeaderLayout::default())
            .await
            .unwrap()
            .with_encode_concurrency(2);
        assert_eq!(template.shape(), VolumeShape::new(2, 3, 2));
        assert_eq!(template.trace_count(), 5);

        let volume = Array3::from_shape_fn((2, 3, 2), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        let source = template.open_input(volume).unwrap();
        let target = MemoryTarget::new();
        let summary = template.write(source, &target).await.unwrap();
        assert_eq!(summary.traces_written, 5);

        let out = target.contents().unwrap();
        assert_eq!(out.len() as u64, template.output_size());
        assert_eq!(&out[..FILE_HEADER_SIZE], &sparse[..FILE_HEADER_SIZE]);
        let written: Vec<&[u8]> = out[FILE_HEADER_SIZE..].chunks_exact(trace_size).collect();
        let originals: Vec<&[u8]> = sparse[FILE_HEADER_SIZE..].chunks_exact(trace_size).collect();
        assert_eq!(written.len(), 5);
        let mut firsts = Vec::new();
        for (trace, original) in written.iter().zip(&originals) {
            assert_eq!(&trace[..TRACE_HEADER_SIZE], &original[..TRACE_HEADER_SIZE]);
            firsts.push(f32::from_be_bytes([trace[240], trace[241], trace[242], trace[243]]));
        }
        assert_eq!(firsts, vec![0.0, 20.0, 100.0, 110.0, 120.0]);
    }

    #[tokio::test]
    async fn test_encodes_with_template_format() {
        let dir = TempDir::new().unwrap();
        let config = CreationConfig::builder(1, 2, 3).format_code(1).build().unwrap();
        let path = write_template(&dir, config).await;

        let template = SegyTemplate::open(&path, HeaderLayout::default()).await.unwrap();
        let volume = Array3::from_elem((1, 2, 3), -118.625f32);
        let source = template.open_input(volume).unwrap();
        let target = MemoryTarget::new();
        template.write(source, &target).await.unwrap();

        let out = target.contents().unwrap();
        let samples = &out[FILE_HEADER_SIZE + TRACE_HEADER_SIZE..][..12];
        assert_eq!(IbmCodec.decode(samples).unwrap(), vec![-118.625; 3]);
    }

    #[tokio::test]
    async fn test_shape_mismatch_before_output() {
        let dir = TempDir::new().unwrap();
        let config = CreationConfig::builder(2, 2, 4).build().unwrap();
        let path = write_template(&dir, config).await;
        let out = dir.path().join("out.segy");

        let err = create_from_template(
            &out,
            &path,
            Array3::<f32>::zeros((2, 2, 5)),
            HeaderLayout::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SegyError::ShapeMismatch { .. }));
        assert!(!out.exists());
    }
}
