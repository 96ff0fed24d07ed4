//! Nullclines of a sampled field via marching squares.
//!
//! The x-nullcline is where `U = 0` (horizontal motion stops), the
//! y-nullcline is where `V = 0`. Cells touching a NaN/inf sample are skipped,
//! so singular regions leave gaps just like the arrow plot does.

use crate::grid::{Grid, VectorField};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Disjoint line segments: `points` holds `(x, y)` pairs, `segments` index pairs into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segments {
    pub points: Vec<f64>,
    pub segments: Vec<u32>,
}

impl Segments {
    pub fn len(&self) -> usize {
        self.segments.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `None` when `index` is past the last point.
    pub fn vertex(&self, index: u32) -> Option<(f64, f64)> {
        let i = index as usize * 2;
        Some((*self.points.get(i)?, *self.points.get(i + 1)?))
    }

    fn push(&mut self, a: (f64, f64), b: (f64, f64)) {
        let base = (self.points.len() / 2) as u32;
        self.points.extend([a.0, a.1, b.0, b.1]);
        self.segments.extend([base, base + 1]);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nullclines {
    pub x_nullcline: Segments,
    pub y_nullcline: Segments,
}

pub fn nullclines(field: &VectorField, grid: &Grid) -> Nullclines {
    let xs = grid.x_coords();
    let ys = grid.y_coords();
    Nullclines {
        x_nullcline: zero_contour(&field.u, &xs, &ys),
        y_nullcline: zero_contour(&field.v, &xs, &ys),
    }
}

/// Zero level set of `values`, where `values[(i, j)]` sits at `(xs[j], ys[i])`.
pub fn zero_contour(values: &DMatrix<f64>, xs: &[f64], ys: &[f64]) -> Segments {
    let mut out = Segments::default();
    let (rows, cols) = values.shape();
    for iy in 0..rows.saturating_sub(1) {
        let (y0, y1) = (ys[iy], ys[iy + 1]);
        for ix in 0..cols.saturating_sub(1) {
            let (x0, x1) = (xs[ix], xs[ix + 1]);
            let corners = [
                values[(iy, ix)],
                values[(iy, ix + 1)],
                values[(iy + 1, ix + 1)],
                values[(iy + 1, ix)],
            ];
            if corners.iter().any(|v| !v.is_finite()) {
                continue;
            }

            let mut case_index = 0u8;
            for (bit, value) in corners.iter().enumerate() {
                if *value >= 0.0 {
                    case_index |= 1 << bit;
                }
            }
            let cell = Cell {
                x0,
                x1,
                y0,
                y1,
                v: corners,
            };
            for &(edge_a, edge_b) in marching_squares_edge_pairs(case_index) {
                out.push(cell.edge_point(edge_a), cell.edge_point(edge_b));
            }
        }
    }
    out
}

fn marching_squares_edge_pairs(case_index: u8) -> &'static [(u8, u8)] {
    match case_index {
        1 | 14 => &[(3, 0)],
        2 | 13 => &[(0, 1)],
        3 | 12 => &[(3, 1)],
        4 | 11 => &[(1, 2)],
        5 => &[(3, 2), (0, 1)],
        6 | 9 => &[(0, 2)],
        7 | 8 => &[(3, 2)],
        10 => &[(0, 3), (1, 2)],
        _ => &[],
    }
}

/// Corners are counter-clockwise from `(x0, y0)`; edge `k` joins corner `k` and `k + 1`.
struct Cell {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    v: [f64; 4],
}

impl Cell {
    fn edge_point(&self, edge: u8) -> (f64, f64) {
        let Cell { x0, x1, y0, y1, v } = *self;
        match edge {
            0 => (x0 + (x1 - x0) * interpolate_factor(v[0], v[1]), y0),
            1 => (x1, y0 + (y1 - y0) * interpolate_factor(v[1], v[2])),
            2 => (x1 + (x0 - x1) * interpolate_factor(v[2], v[3]), y1),
            _ => (x0, y1 + (y0 - y1) * interpolate_factor(v[3], v[0])),
        }
    }
}

fn interpolate_factor(v0: f64, v1: f64) -> f64 {
    let denominator = v0 - v1;
    if denominator.abs() <= 1e-12 {
        0.5
    } else {
        (v0 / denominator).clamp(0.0, 1.0)
    }
}
