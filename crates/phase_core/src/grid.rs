use crate::error::{EvalError, ParameterError};
use crate::numeric::FieldValue;
use crate::system::SystemDefinition;
use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Rectangular sampling domain. Arrays built from it have shape
/// `(y_resolution, x_resolution)`: row `i` is `y_i`, column `j` is `x_j`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    x_resolution: usize,
    y_resolution: usize,
}

impl Grid {
    pub fn new(
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        x_resolution: usize,
        y_resolution: usize,
    ) -> Result<Self, ParameterError> {
        validate_axis('x', x_min, x_max, x_resolution)?;
        validate_axis('y', y_min, y_max, y_resolution)?;
        Ok(Self {
            x_min,
            x_max,
            y_min,
            y_max,
            x_resolution,
            y_resolution,
        })
    }

    /// `(rows, cols)` of every array sampled on this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.y_resolution, self.x_resolution)
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x_min, self.x_max)
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.y_min, self.y_max)
    }

    pub fn x_coords(&self) -> Vec<f64> {
        linspace(self.x_min, self.x_max, self.x_resolution)
    }

    pub fn y_coords(&self) -> Vec<f64> {
        linspace(self.y_min, self.y_max, self.y_resolution)
    }

    /// Coordinate arrays `(X, Y)`.
    pub fn meshgrid(&self) -> (DMatrix<f64>, DMatrix<f64>) {
        let xs = self.x_coords();
        let ys = self.y_coords();
        let (rows, cols) = self.shape();
        (
            DMatrix::from_fn(rows, cols, |_, j| xs[j]),
            DMatrix::from_fn(rows, cols, |i, _| ys[i]),
        )
    }
}

fn validate_axis(axis: char, min: f64, max: f64, resolution: usize) -> Result<(), ParameterError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(ParameterError::NonFiniteBounds { axis, min, max });
    }
    if min > max {
        return Err(ParameterError::InvertedRange { axis, min, max });
    }
    if resolution == 0 {
        return Err(ParameterError::ZeroResolution { axis });
    }
    Ok(())
}

/// `n` evenly spaced values from `start` to `end` inclusive; a single sample is `start`.
/// `end < start` gives a decreasing sequence.
pub(crate) fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            values[n - 1] = end;
            values
        }
    }
}

/// Field components `(U, V)` sampled on a [`Grid`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    pub u: DMatrix<f64>,
    pub v: DMatrix<f64>,
}

impl VectorField {
    pub fn shape(&self) -> (usize, usize) {
        self.u.shape()
    }

    /// Speed `sqrt(U^2 + V^2)` per cell.
    pub fn magnitude(&self) -> DMatrix<f64> {
        self.u.zip_map(&self.v, f64::hypot)
    }

    /// Largest finite speed, used to scale colors. `None` if every cell is singular.
    pub fn max_finite_magnitude(&self) -> Option<f64> {
        self.magnitude()
            .iter()
            .copied()
            .filter(|m| m.is_finite())
            .fold(None, |acc, m| Some(acc.map_or(m, |a: f64| a.max(m))))
    }

    /// Unit direction per cell. Fixed points give `(0, 0)`; singular cells give NaN.
    pub fn normalized(&self) -> VectorField {
        let magnitude = self.magnitude();
        let unit = |component: &DMatrix<f64>| {
            component.zip_map(&magnitude, |c, m| {
                if !m.is_finite() {
                    f64::NAN
                } else if m == 0.0 {
                    0.0
                } else {
                    c / m
                }
            })
        };
        VectorField {
            u: unit(&self.u),
            v: unit(&self.v),
        }
    }
}

/// Evaluates both components over the whole grid at once.
///
/// Singular cells come back as NaN/inf; only structural evaluation
/// failures are returned as errors.
pub fn sample(system: &SystemDefinition, grid: &Grid) -> Result<VectorField, EvalError> {
    let (rows, cols) = grid.shape();
    debug!("sampling vector field on a {rows}x{cols} grid");
    let (xs, ys) = grid.meshgrid();
    let slots = [
        FieldValue::Array(xs),
        FieldValue::Array(ys),
        FieldValue::Scalar(0.0),
    ];
    let u = system
        .x_expression()
        .evaluate_slots(&slots)?
        .into_array(rows, cols)?;
    let v = system
        .y_expression()
        .evaluate_slots(&slots)?
        .into_array(rows, cols)?;
    Ok(VectorField { u, v })
}
