//! SEG-Y - create SEG-Y files from regular 3D seismic volumes
//!
//! A pure Rust engine that encodes a post-stack volume, supplied as a flat
//! binary file or an in-memory array, into a SEG-Y file with synthesized
//! textual, binary and trace headers.
//!
//! # Features
//!
//! - IBM System/360 (format 1) and IEEE (format 5) 4-byte float samples
//! - Inline/crossline numbers and scaled coordinates in every trace header
//! - Configurable inline/crossline header byte locations
//! - Parallel per-inline encoding with strictly ordered output
//! - Atomic file creation (staged temp file, renamed on success)
//! - Creation from a template SEG-Y file, reusing all of its headers
//!
//! # File layout
//!
//! `[3200-byte text header][400-byte binary header]` followed by
//! `size_z * size_y` traces of `[240-byte trace header][size_x * 4 bytes]`,
//! inline-major, crossline-minor. Headers and samples are big-endian.
//!
//! # Example
//!
//! ```rust,no_run
//! use segy::{create, CreationConfig};
//! use ndarray::Array3;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let volume = Array3::<f32>::zeros((100, 200, 500));
//! let config = CreationConfig::builder(100, 200, 500)
//!     .format_code(1)
//!     .sample_interval(4000)
//!     .min_inline(1000)
//!     .build()?;
//!
//! let summary = create("survey.segy", volume, config).await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod geometry;
pub mod header;
pub mod io;
pub mod source;
pub mod template;
pub mod types;
pub mod utils;
pub mod writer;

// Re-exports
pub use codec::{get_codec, SampleCodec};
pub use config::{CreationConfig, CreationConfigBuilder};
pub use error::{Result, SegyError};
pub use geometry::{GeometryMapper, TraceGeometry};
pub use header::{BinaryHeader, HeaderLayout, TextHeader, TraceHeader};
pub use io::{FileTarget, MemoryTarget, OutputTarget};
pub use source::{ArraySource, FileSource, SampleSource, VolumeInput};
pub use template::{create_from_template, SegyTemplate};
pub use types::{ByteOrder, DataFormatCode, TextEncoding, VolumeShape};
pub use writer::{create, create_in_memory, CreationSummary, SegyWriter, WriterState};

/// Version of this crate
pub const SEGY_CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!SEGY_CRATE_VERSION.is_empty());
    }
}
