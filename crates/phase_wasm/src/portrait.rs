//! One-shot portrait computation driven by a JSON-style request object.

use crate::payload::{FieldPayload, TrajectoryPayload};
use crate::system::{js_error, to_js};
use anyhow::{Context, Result};
use log::debug;
use phase_core::grid::{sample, Grid};
use phase_core::nullcline::{nullclines, Nullclines};
use phase_core::solvers::IntegratorSettings;
use phase_core::system::SystemDefinition;
use phase_core::trajectory::{integrate, integrate_both_ways, InitialCondition, TimeSpan};
use phase_core::Error;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortraitRequest {
    pub expr_x: String,
    pub expr_y: String,
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub x_resolution: usize,
    pub y_resolution: usize,
    pub normalize: bool,
    pub nullclines: bool,
    pub initial_conditions: Vec<[f64; 2]>,
    pub duration: f64,
    pub samples: usize,
    /// Also integrate over `[0, -duration]` from each initial condition.
    pub both_directions: bool,
    pub frame_stride: usize,
    pub settings: IntegratorSettings,
}

impl Default for PortraitRequest {
    fn default() -> Self {
        Self {
            expr_x: "y".to_string(),
            expr_y: "-x".to_string(),
            x_range: [-3.0, 3.0],
            y_range: [-3.0, 3.0],
            x_resolution: 20,
            y_resolution: 20,
            normalize: true,
            nullclines: false,
            initial_conditions: Vec::new(),
            duration: 10.0,
            samples: 500,
            both_directions: false,
            frame_stride: 0,
            settings: IntegratorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryOutcome {
    pub initial: [f64; 2],
    pub forward: Option<TrajectoryPayload>,
    pub backward: Option<TrajectoryPayload>,
    /// Set when integration failed; the field is still valid.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortraitResponse {
    pub field: FieldPayload,
    pub nullclines: Option<Nullclines>,
    pub trajectories: Vec<TrajectoryOutcome>,
}

/// Compile and grid errors fail the whole request. Trajectory errors are
/// reported per initial condition.
pub fn portrait(request: &PortraitRequest) -> Result<PortraitResponse> {
    let system = SystemDefinition::new(&request.expr_x, &request.expr_y)?;
    let [x_min, x_max] = request.x_range;
    let [y_min, y_max] = request.y_range;
    let grid = Grid::new(
        x_min,
        x_max,
        y_min,
        y_max,
        request.x_resolution,
        request.y_resolution,
    )?;
    let field = sample(&system, &grid).context("Vector field sampling failed")?;

    let trajectories = request
        .initial_conditions
        .iter()
        .map(|&initial| trajectory_outcome(&system, request, initial))
        .collect();

    Ok(PortraitResponse {
        field: FieldPayload::new(&grid, &field, request.normalize),
        nullclines: request.nullclines.then(|| nullclines(&field, &grid)),
        trajectories,
    })
}

fn trajectory_outcome(
    system: &SystemDefinition,
    request: &PortraitRequest,
    initial: [f64; 2],
) -> TrajectoryOutcome {
    let ic = InitialCondition::planar(initial[0], initial[1]);
    let stride = request.frame_stride;
    let result: Result<(TrajectoryPayload, Option<TrajectoryPayload>), Error> =
        if request.both_directions {
            integrate_both_ways(system, &ic, request.duration, request.samples, &request.settings)
                .map(|(forward, backward)| {
                    (
                        TrajectoryPayload::new(&forward, stride),
                        Some(TrajectoryPayload::new(&backward, stride)),
                    )
                })
        } else {
            TimeSpan::new(0.0, request.duration, request.samples)
                .map_err(Error::from)
                .and_then(|span| {
                    integrate(system, &ic, &span, &request.settings).map_err(Error::from)
                })
                .map(|forward| (TrajectoryPayload::new(&forward, stride), None))
        };

    match result {
        Ok((forward, backward)) => TrajectoryOutcome {
            initial,
            forward: Some(forward),
            backward,
            error: None,
        },
        Err(err) => {
            debug!("trajectory from {initial:?} failed: {err}");
            TrajectoryOutcome {
                initial,
                forward: None,
                backward: None,
                error: Some(err.to_string()),
            }
        }
    }
}

#[wasm_bindgen]
pub fn compute_portrait(request: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let request: PortraitRequest = serde_wasm_bindgen::from_value(request)
        .map_err(|err| JsValue::from_str(&format!("Invalid portrait request: {err}")))?;
    let response = portrait(&request).map_err(js_error)?;
    to_js(&response)
}
