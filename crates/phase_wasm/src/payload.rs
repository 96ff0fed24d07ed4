//! Serializable shapes handed to the JavaScript scene layer.

use nalgebra::DMatrix;
use phase_core::frames::AnimationFrame;
use phase_core::grid::{Grid, VectorField};
use phase_core::trajectory::Trajectory;
use serde::Serialize;

/// A sampled field, every array flattened row-major (`rows * cols` values).
#[derive(Debug, Clone, Serialize)]
pub struct FieldPayload {
    pub rows: usize,
    pub cols: usize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub magnitude: Vec<f64>,
    pub max_magnitude: Option<f64>,
}

impl FieldPayload {
    pub fn new(grid: &Grid, field: &VectorField, normalize: bool) -> Self {
        let (rows, cols) = field.shape();
        let magnitude = field.magnitude();
        let shown = if normalize {
            field.normalized()
        } else {
            field.clone()
        };
        Self {
            rows,
            cols,
            x: grid.x_coords(),
            y: grid.y_coords(),
            u: row_major(&shown.u),
            v: row_major(&shown.v),
            magnitude: row_major(&magnitude),
            max_magnitude: field.max_finite_magnitude(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryPayload {
    pub dimension: usize,
    pub times: Vec<f64>,
    /// Row-major, `times.len() * dimension` values.
    pub states: Vec<f64>,
    pub frames: Vec<AnimationFrame>,
}

impl TrajectoryPayload {
    /// `frame_stride == 0` omits frames.
    pub fn new(trajectory: &Trajectory, frame_stride: usize) -> Self {
        let frames = if frame_stride == 0 {
            Vec::new()
        } else {
            trajectory.frames(frame_stride).collect()
        };
        Self {
            dimension: trajectory.dimension(),
            times: trajectory.times().to_vec(),
            states: trajectory.states().to_vec(),
            frames,
        }
    }
}

pub(crate) fn row_major(matrix: &DMatrix<f64>) -> Vec<f64> {
    matrix.transpose().as_slice().to_vec()
}
