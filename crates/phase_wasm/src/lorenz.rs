use crate::payload::TrajectoryPayload;
use crate::system::{js_error, to_js};
use anyhow::{Context, Result};
use phase_core::solvers::IntegratorSettings;
use phase_core::system::Lorenz;
use phase_core::trajectory::{integrate_lorenz as integrate_core, InitialCondition, TimeSpan};
use wasm_bindgen::prelude::*;

#[allow(clippy::too_many_arguments)]
pub(crate) fn lorenz_payload(
    sigma: f64,
    rho: f64,
    beta: f64,
    initial: [f64; 3],
    dt: f64,
    steps: usize,
    frame_stride: usize,
) -> Result<TrajectoryPayload> {
    let span = TimeSpan::from_step(0.0, dt, steps)?;
    let [x0, y0, z0] = initial;
    let trajectory = integrate_core(
        &Lorenz::new(sigma, rho, beta),
        &InitialCondition::spatial(x0, y0, z0),
        &span,
        &IntegratorSettings::default(),
    )
    .with_context(|| {
        format!("Lorenz integration failed (sigma={sigma}, rho={rho}, beta={beta})")
    })?;
    Ok(TrajectoryPayload::new(&trajectory, frame_stride))
}

/// Samples the Lorenz attractor at `t_k = k * dt` for `k < steps`.
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn integrate_lorenz(
    sigma: f64,
    rho: f64,
    beta: f64,
    x0: f64,
    y0: f64,
    z0: f64,
    dt: f64,
    steps: usize,
    frame_stride: usize,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let payload = lorenz_payload(sigma, rho, beta, [x0, y0, z0], dt, steps, frame_stride)
        .map_err(js_error)?;
    to_js(&payload)
}
