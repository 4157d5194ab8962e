//! Trace geometry - maps (inline index, crossline index) pairs to trace
//! positions, line numbers and survey coordinates

use crate::config::CreationConfig;
use crate::header::COORDINATE_SCALE;
use crate::types::VolumeShape;
use serde::{Deserialize, Serialize};

/// Everything the headers need to know about one trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceGeometry {
    /// 0-based position in file order
    pub trace_index: usize,
    /// Inline index within the volume
    pub z: usize,
    /// Crossline index within the volume
    pub y: usize,
    /// Inline number written to the trace header
    pub inline: i32,
    /// Crossline number written to the trace header
    pub crossline: i32,
    /// Survey X coordinate (unscaled)
    pub x_coordinate: f64,
    /// Survey Y coordinate (unscaled)
    pub y_coordinate: f64,
}

impl TraceGeometry {
    /// 1-based sequence number within the file
    pub fn sequence_number(&self) -> i32 {
        (self.trace_index + 1) as i32
    }

    /// 1-based sequence number within the inline
    pub fn sequence_in_line(&self) -> i32 {
        (self.y + 1) as i32
    }

    /// Coordinates as stored in the trace header, multiplied by the
    /// coordinate scale and rounded
    pub fn scaled_coordinates(&self) -> (i32, i32) {
        (
            scale_coordinate(self.x_coordinate),
            scale_coordinate(self.y_coordinate),
        )
    }
}

fn scale_coordinate(value: f64) -> i32 {
    (value * COORDINATE_SCALE).round() as i32
}

/// Fixed inline-major, crossline-minor trace addressing.
///
/// Line numbers are offsets from the minimum inline/crossline; coordinates
/// are the line index times the line interval from an origin at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryMapper {
    shape: VolumeShape,
    min_inline: i32,
    min_crossline: i32,
    x_interval: f64,
    y_interval: f64,
}

impl GeometryMapper {
    pub fn new(
        shape: VolumeShape,
        min_inline: i32,
        min_crossline: i32,
        x_interval: f64,
        y_interval: f64,
    ) -> Self {
        Self {
            shape,
            min_inline,
            min_crossline,
            x_interval,
            y_interval,
        }
    }

    pub fn from_config(config: &CreationConfig) -> Self {
        Self::new(
            config.shape(),
            config.min_inline(),
            config.min_crossline(),
            config.x_interval(),
            config.y_interval(),
        )
    }

    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// Linear 0-based trace index of (z, y)
    pub fn trace_index(&self, z: usize, y: usize) -> usize {
        z * self.shape.size_y + y
    }

    /// Inverse of [`trace_index`](Self::trace_index)
    pub fn position(&self, trace_index: usize) -> (usize, usize) {
        (trace_index / self.shape.size_y, trace_index % self.shape.size_y)
    }

    pub fn inline(&self, z: usize) -> i32 {
        self.min_inline + z as i32
    }

    pub fn crossline(&self, y: usize) -> i32 {
        self.min_crossline + y as i32
    }

    /// Unscaled survey (X, Y) of (z, y)
    pub fn coordinate(&self, z: usize, y: usize) -> (f64, f64) {
        (z as f64 * self.x_interval, y as f64 * self.y_interval)
    }

    /// Full geometry of the trace at (z, y)
    pub fn trace(&self, z: usize, y: usize) -> TraceGeometry {
        let (x_coordinate, y_coordinate) = self.coordinate(z, y);
        TraceGeometry {
            trace_index: self.trace_index(z, y),
            z,
            y,
            inline: self.inline(z),
            crossline: self.crossline(y),
            x_coordinate,
            y_coordinate,
        }
    }

    /// Geometry of every trace of one inline, in crossline order
    pub fn inline_traces(&self, z: usize) -> impl Iterator<Item = TraceGeometry> + '_ {
        (0..self.shape.size_y).map(move |y| self.trace(z, y))
    }

    /// Geometry of every trace in file order
    pub fn traces(&self) -> impl Iterator<Item = TraceGeometry> + '_ {
        (0..self.shape.trace_count()).map(move |index| {
            let (z, y) = self.position(index);
            self.trace(z, y)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_mapper() -> GeometryMapper {
        GeometryMapper::new(VolumeShape::new(4, 3, 10), 100, 500, 12.5, 25.0)
    }

    #[test]
    fn test_trace_index_is_inline_major() {
        let mapper = create_test_mapper();
        assert_eq!(mapper.trace_index(0, 0), 0);
        assert_eq!(mapper.trace_index(0, 2), 2);
        assert_eq!(mapper.trace_index(1, 0), 3);
        assert_eq!(mapper.trace_index(3, 2), 11);
        assert_eq!(mapper.position(7), (2, 1));
    }

    #[test]
    fn test_line_numbers() {
        let mapper = create_test_mapper();
        assert_eq!(mapper.inline(0), 100);
        assert_eq!(mapper.inline(3), 103);
        assert_eq!(mapper.crossline(0), 500);
        assert_eq!(mapper.crossline(2), 502);
    }

    #[test]
    fn test_coordinates() {
        let mapper = create_test_mapper();
        assert_eq!(mapper.coordinate(0, 0), (0.0, 0.0));
        assert_eq!(mapper.coordinate(2, 1), (25.0, 25.0));

        let trace = mapper.trace(3, 2);
        assert_eq!(trace.scaled_coordinates(), (3750, 5000));
        assert_eq!(trace.sequence_number(), 12);
        assert_eq!(trace.sequence_in_line(), 3);
    }

    #[test]
    fn test_traces_follow_file_order() {
        let mapper = create_test_mapper();
        let traces: Vec<_> = mapper.traces().collect();
        assert_eq!(traces.len(), 12);
        for (k, trace) in traces.iter().enumerate() {
            assert_eq!(trace.trace_index, k);
            assert_eq!(trace.inline, 100 + (k / 3) as i32);
            assert_eq!(trace.crossline, 500 + (k % 3) as i32);
        }

        let second_inline: Vec<_> = mapper.inline_traces(1).collect();
        assert_eq!(second_inline, traces[3..6].to_vec());
    }
}
