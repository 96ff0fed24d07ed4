//! Core WASM system wrapper for user-defined planar systems.

use crate::payload::{FieldPayload, TrajectoryPayload};
use anyhow::{Context, Result};
use js_sys::Float64Array;
use phase_core::grid::{sample, Grid};
use phase_core::nullcline::{nullclines, Nullclines};
use phase_core::solvers::IntegratorSettings;
use phase_core::system::SystemDefinition;
use phase_core::traits::DynamicalSystem;
use phase_core::trajectory::{integrate, integrate_both_ways, InitialCondition, TimeSpan};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSystem {
    pub(crate) system: SystemDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BothWaysPayload {
    pub forward: TrajectoryPayload,
    pub backward: TrajectoryPayload,
}

pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize result: {err}")))
}

pub(crate) fn js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

impl WasmSystem {
    pub(crate) fn build(expr_x: &str, expr_y: &str) -> Result<Self> {
        let system = SystemDefinition::new(expr_x, expr_y)?;
        Ok(Self { system })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn field_payload(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        x_resolution: usize,
        y_resolution: usize,
        normalize: bool,
    ) -> Result<FieldPayload> {
        let grid = Grid::new(x_min, x_max, y_min, y_max, x_resolution, y_resolution)?;
        let field = sample(&self.system, &grid).context("Vector field sampling failed")?;
        Ok(FieldPayload::new(&grid, &field, normalize))
    }

    pub(crate) fn nullcline_geometry(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        resolution: usize,
    ) -> Result<Nullclines> {
        let grid = Grid::new(x_min, x_max, y_min, y_max, resolution, resolution)?;
        let field = sample(&self.system, &grid).context("Vector field sampling failed")?;
        Ok(nullclines(&field, &grid))
    }

    pub(crate) fn trajectory_payload(
        &self,
        x0: f64,
        y0: f64,
        duration: f64,
        samples: usize,
        frame_stride: usize,
    ) -> Result<TrajectoryPayload> {
        let span = TimeSpan::new(0.0, duration, samples)?;
        let trajectory = integrate(
            &self.system,
            &InitialCondition::planar(x0, y0),
            &span,
            &IntegratorSettings::default(),
        )
        .context("Trajectory integration failed")?;
        Ok(TrajectoryPayload::new(&trajectory, frame_stride))
    }

    pub(crate) fn both_ways_payload(
        &self,
        x0: f64,
        y0: f64,
        duration: f64,
        samples: usize,
        frame_stride: usize,
    ) -> Result<BothWaysPayload> {
        let (forward, backward) = integrate_both_ways(
            &self.system,
            &InitialCondition::planar(x0, y0),
            duration,
            samples,
            &IntegratorSettings::default(),
        )
        .context("Trajectory integration failed")?;
        Ok(BothWaysPayload {
            forward: TrajectoryPayload::new(&forward, frame_stride),
            backward: TrajectoryPayload::new(&backward, frame_stride),
        })
    }

    pub(crate) fn velocity(&self, x: f64, y: f64) -> Result<[f64; 2]> {
        let mut out = [0.0; 2];
        self.system
            .apply(0.0, &[x, y], &mut out)
            .with_context(|| format!("Cannot evaluate the field at ({x}, {y})"))?;
        Ok(out)
    }
}

#[wasm_bindgen]
impl WasmSystem {
    #[wasm_bindgen(constructor)]
    pub fn new(expr_x: &str, expr_y: &str) -> Result<WasmSystem, JsValue> {
        console_error_panic_hook::set_once();
        Self::build(expr_x, expr_y).map_err(js_error)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sample_vector_field(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        x_resolution: usize,
        y_resolution: usize,
        normalize: bool,
    ) -> Result<JsValue, JsValue> {
        let payload = self
            .field_payload(x_min, x_max, y_min, y_max, x_resolution, y_resolution, normalize)
            .map_err(js_error)?;
        to_js(&payload)
    }

    pub fn compute_nullclines(
        &self,
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        resolution: usize,
    ) -> Result<JsValue, JsValue> {
        let geometry = self
            .nullcline_geometry(x_min, x_max, y_min, y_max, resolution)
            .map_err(js_error)?;
        to_js(&geometry)
    }

    /// Negative `duration` integrates backward in time.
    pub fn integrate(
        &self,
        x0: f64,
        y0: f64,
        duration: f64,
        samples: usize,
        frame_stride: usize,
    ) -> Result<JsValue, JsValue> {
        let payload = self
            .trajectory_payload(x0, y0, duration, samples, frame_stride)
            .map_err(js_error)?;
        to_js(&payload)
    }

    pub fn integrate_both_ways(
        &self,
        x0: f64,
        y0: f64,
        duration: f64,
        samples: usize,
        frame_stride: usize,
    ) -> Result<JsValue, JsValue> {
        let payload = self
            .both_ways_payload(x0, y0, duration, samples, frame_stride)
            .map_err(js_error)?;
        to_js(&payload)
    }

    /// `(dx/dt, dy/dt)` at a single point, for hover readouts.
    pub fn velocity_at(&self, x: f64, y: f64) -> Result<Float64Array, JsValue> {
        let velocity = self.velocity(x, y).map_err(js_error)?;
        Ok(Float64Array::from(velocity.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_unknown_function() {
        let err = WasmSystem::build("sinn(x)", "y")
            .err()
            .expect("sinn should be rejected");
        let message = format!("{err:#}");
        assert!(message.contains("sinn"), "unexpected message: {message}");
        assert!(message.contains("use 'sin(x)'"), "missing hint: {message}");
    }

    #[test]
    fn field_payload_is_row_major() {
        let system = WasmSystem::build("x", "y").expect("system");
        let payload = system
            .field_payload(0.0, 2.0, 0.0, 1.0, 3, 2, false)
            .expect("field");
        assert_eq!((payload.rows, payload.cols), (2, 3));
        assert_eq!(payload.u, vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        assert_eq!(payload.v, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(payload.x, vec![0.0, 1.0, 2.0]);
        assert_eq!(payload.y, vec![0.0, 1.0]);
        let max = payload.max_magnitude.expect("finite cells");
        assert!((max - 5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn field_payload_rejects_inverted_range() {
        let system = WasmSystem::build("x", "y").expect("system");
        assert!(system
            .field_payload(1.0, -1.0, 0.0, 1.0, 3, 3, false)
            .is_err());
    }

    #[test]
    fn trajectory_payload_carries_frames() {
        let system = WasmSystem::build("y", "-x").expect("system");
        let payload = system
            .trajectory_payload(1.0, 0.0, 1.0, 11, 5)
            .expect("trajectory");
        assert_eq!(payload.dimension, 2);
        assert_eq!(payload.states.len(), 22);
        let indices: Vec<usize> = payload.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 5, 10]);
    }

    #[test]
    fn integration_error_keeps_context() {
        let system = WasmSystem::build("1/x", "0").expect("system");
        let err = system
            .trajectory_payload(0.0, 0.0, 1.0, 10, 0)
            .err()
            .expect("singular start");
        let message = format!("{err:#}");
        assert!(message.starts_with("Trajectory integration failed"), "{message}");
        assert!(message.contains("division by zero"), "{message}");
    }

    #[test]
    fn both_ways_share_the_starting_point() {
        let system = WasmSystem::build("-y", "x").expect("system");
        let payload = system
            .both_ways_payload(0.5, 0.5, 2.0, 20, 0)
            .expect("trajectories");
        assert_eq!(&payload.forward.states[..2], &[0.5, 0.5]);
        assert_eq!(&payload.backward.states[..2], &[0.5, 0.5]);
        assert_eq!(payload.backward.times[19], -2.0);
    }

    #[test]
    fn velocity_uses_strict_evaluation() {
        let system = WasmSystem::build("sqrt(x)", "y").expect("system");
        assert_eq!(system.velocity(4.0, 1.0).expect("defined"), [2.0, 1.0]);
        assert!(system.velocity(-1.0, 1.0).is_err());
    }
}
