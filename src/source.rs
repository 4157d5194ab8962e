//! Sample sources - the uniform read side the writer pulls traces from
//!
//! Callers hand over either a path to a flat binary file or an in-memory
//! array; [`VolumeInput::into_source`] resolves that choice once, checking the
//! shape against the configuration before any output exists.

use crate::config::CreationConfig;
use crate::error::{Result, SegyError};
use crate::types::{ByteOrder, VolumeShape};
use ndarray::{s, Array3, ArrayView3};
use num_traits::AsPrimitive;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only access to the samples of a volume
pub trait SampleSource: Send + Sync {
    /// Shape of the volume
    fn shape(&self) -> VolumeShape;

    /// Copy the `size_x` samples of trace (z, y) into `out`
    fn read_trace(&self, z: usize, y: usize, out: &mut [f32]) -> Result<()>;

    /// Copy all traces of inline `z` into `out` (crossline-major)
    fn read_inline(&self, z: usize, out: &mut [f32]) -> Result<()> {
        let size_x = self.shape().size_x;
        for (y, trace) in out.chunks_exact_mut(size_x).enumerate() {
            self.read_trace(z, y, trace)?;
        }
        Ok(())
    }
}

fn check_trace_request(shape: &VolumeShape, z: usize, y: usize, len: usize) -> Result<()> {
    if z >= shape.size_z || y >= shape.size_y {
        return Err(SegyError::InvalidDimensions(format!(
            "trace ({}, {}) is outside volume {}",
            z, y, shape
        )));
    }
    if len != shape.size_x {
        return Err(SegyError::InvalidDimensions(format!(
            "trace buffer holds {} samples, expected {}",
            len, shape.size_x
        )));
    }
    Ok(())
}

/// Volume held in memory as a (z, y, x) array
#[derive(Debug, Clone)]
pub struct ArraySource {
    data: Array3<f32>,
}

impl ArraySource {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }
}

impl SampleSource for ArraySource {
    fn shape(&self) -> VolumeShape {
        self.data.dim().into()
    }

    fn read_trace(&self, z: usize, y: usize, out: &mut [f32]) -> Result<()> {
        check_trace_request(&self.shape(), z, y, out.len())?;
        let lane = self.data.slice(s![z, y, ..]);
        for (dst, &src) in out.iter_mut().zip(lane.iter()) {
            *dst = src;
        }
        Ok(())
    }
}

/// Flat binary file of `size_z * size_y * size_x` 4-byte floats in (z, y, x) order
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    shape: VolumeShape,
    byte_order: ByteOrder,
    file: Mutex<File>,
}

impl FileSource {
    /// Open `path` and check its length matches `shape`
    pub fn open(path: impl AsRef<Path>, shape: VolumeShape, byte_order: ByteOrder) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let actual = file.metadata()?.len();
        let expected = shape.sample_count() as u64 * 4;
        if actual != expected {
            return Err(SegyError::InvalidDimensions(format!(
                "binary file {} holds {} bytes but shape {} needs {} bytes",
                path.display(),
                actual,
                shape,
                expected
            )));
        }

        Ok(Self {
            path,
            shape,
            byte_order,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_samples(&self, first_sample: usize, out: &mut [f32]) -> Result<()> {
        let mut raw = vec![0u8; out.len() * 4];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(first_sample as u64 * 4))?;
            file.read_exact(&mut raw)?;
        }
        for (dst, word) in out.iter_mut().zip(raw.chunks_exact(4)) {
            *dst = self.byte_order.read_f32([word[0], word[1], word[2], word[3]]);
        }
        Ok(())
    }
}

impl SampleSource for FileSource {
    fn shape(&self) -> VolumeShape {
        self.shape
    }

    fn read_trace(&self, z: usize, y: usize, out: &mut [f32]) -> Result<()> {
        check_trace_request(&self.shape, z, y, out.len())?;
        let first = (z * self.shape.size_y + y) * self.shape.size_x;
        self.read_samples(first, out)
    }

    fn read_inline(&self, z: usize, out: &mut [f32]) -> Result<()> {
        if z >= self.shape.size_z || out.len() != self.shape.inline_len() {
            return Err(SegyError::InvalidDimensions(format!(
                "inline {} with a buffer of {} samples does not fit volume {}",
                z,
                out.len(),
                self.shape
            )));
        }
        self.read_samples(z * self.shape.inline_len(), out)
    }
}

/// Where the volume comes from
#[derive(Debug, Clone)]
pub enum VolumeInput {
    /// Flat binary file, read in the configured byte order
    File(PathBuf),
    /// In-memory array shaped (size_z, size_y, size_x)
    Array(Array3<f32>),
}

impl VolumeInput {
    /// Convert any numeric array into an `f32` array input.
    ///
    /// Each element goes through `as f32`: `f64` inputs round to nearest and
    /// magnitudes beyond `f32::MAX` become infinities, which the sample codec
    /// then handles.
    pub fn from_array<T>(view: ArrayView3<'_, T>) -> Self
    where
        T: AsPrimitive<f32>,
    {
        VolumeInput::Array(view.mapv(|v| v.as_()))
    }

    /// Resolve into a sample source, validating it against `config`
    pub fn into_source(self, config: &CreationConfig) -> Result<Arc<dyn SampleSource>> {
        self.open(config.shape(), config.input_byte_order())
    }

    /// Resolve into a sample source of the given shape; raw files are read in
    /// `byte_order`
    pub fn open(self, expected: VolumeShape, byte_order: ByteOrder) -> Result<Arc<dyn SampleSource>> {
        match self {
            VolumeInput::File(path) => Ok(Arc::new(FileSource::open(path, expected, byte_order)?)),
            VolumeInput::Array(data) => {
                let actual = VolumeShape::from(data.dim());
                if actual != expected {
                    return Err(SegyError::ShapeMismatch { expected, actual });
                }
                Ok(Arc::new(ArraySource::new(data)))
            }
        }
    }
}

impl From<PathBuf> for VolumeInput {
    fn from(path: PathBuf) -> Self {
        VolumeInput::File(path)
    }
}

impl From<&Path> for VolumeInput {
    fn from(path: &Path) -> Self {
        VolumeInput::File(path.to_path_buf())
    }
}

impl From<Array3<f32>> for VolumeInput {
    fn from(data: Array3<f32>) -> Self {
        VolumeInput::Array(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ramp(shape: VolumeShape) -> Vec<f32> {
        (0..shape.sample_count()).map(|i| i as f32).collect()
    }

    #[test]
    fn test_array_source_traces() {
        let shape = VolumeShape::new(2, 3, 4);
        let data = Array3::from_shape_vec(shape.as_tuple(), ramp(shape)).unwrap();
        let source = ArraySource::new(data);
        assert_eq!(source.shape(), shape);

        let mut trace = vec![0.0; 4];
        source.read_trace(1, 2, &mut trace).unwrap();
        assert_eq!(trace, vec![20.0, 21.0, 22.0, 23.0]);

        let mut inline = vec![0.0; 12];
        source.read_inline(1, &mut inline).unwrap();
        assert_eq!(inline, ramp(shape)[12..].to_vec());

        assert!(source.read_trace(2, 0, &mut trace).is_err());
        assert!(source.read_trace(0, 0, &mut [0.0f32; 3]).is_err());
    }

    #[test]
    fn test_array_input_from_f64() {
        let shape = VolumeShape::new(1, 2, 2);
        let data = Array3::from_shape_fn(shape.as_tuple(), |(_, y, x)| (y * 2 + x) as f64 + 0.5);
        let source = VolumeInput::from_array(data.view())
            .open(shape, ByteOrder::default())
            .unwrap();
        let mut trace = vec![0.0; 2];
        source.read_trace(0, 1, &mut trace).unwrap();
        assert_eq!(trace, vec![2.5, 3.5]);

        let huge = Array3::from_elem((1, 1, 1), 1.0e300f64);
        let source = VolumeInput::from_array(huge.view())
            .open(VolumeShape::new(1, 1, 1), ByteOrder::default())
            .unwrap();
        let mut one = [0.0f32];
        source.read_trace(0, 0, &mut one).unwrap();
        assert!(one[0].is_infinite());
    }

    #[test]
    fn test_file_source_byte_orders() {
        let shape = VolumeShape::new(2, 2, 3);
        let samples = ramp(shape);
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            for v in &samples {
                let bytes = match order {
                    ByteOrder::Little => v.to_le_bytes(),
                    ByteOrder::Big => v.to_be_bytes(),
                };
                file.write_all(&bytes).unwrap();
            }
            file.flush().unwrap();

            let source = FileSource::open(file.path(), shape, order).unwrap();
            let mut trace = vec![0.0; 3];
            source.read_trace(1, 0, &mut trace).unwrap();
            assert_eq!(trace, vec![6.0, 7.0, 8.0]);

            let mut inline = vec![0.0; 6];
            source.read_inline(1, &mut inline).unwrap();
            assert_eq!(inline, samples[6..].to_vec());
        }
    }

    #[test]
    fn test_file_source_rejects_size_mismatch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 40]).unwrap();
        file.flush().unwrap();
        let err = FileSource::open(file.path(), VolumeShape::new(2, 3, 4), ByteOrder::Little)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("40 bytes"));
    }

    #[test]
    fn test_volume_input_shape_mismatch() {
        let config = CreationConfig::builder(2, 3, 4).build().unwrap();
        let input = VolumeInput::from(Array3::<f32>::zeros((2, 3, 5)));
        let err = input.into_source(&config).err().unwrap();
        assert!(matches!(
            err,
            SegyError::ShapeMismatch { expected, actual }
                if expected == VolumeShape::new(2, 3, 4) && actual == VolumeShape::new(2, 3, 5)
        ));
        assert!(err.to_string().contains("(2, 3, 5)"));
    }
}
