use crate::error::{EvalError, IntegrationError};
use crate::traits::{DynamicalSystem, Scalar, Steppable};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), EvalError> {
        let half = T::from_constant(0.5);
        let sixth = T::from_constant(1.0 / 6.0);
        let two = T::from_constant(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3)?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
        Ok(())
    }
}

/// Butcher tableau of Tsitouras' 5(4) pair, converted once per solver.
struct Tsit5Tableau<T> {
    c: [T; 6],
    a: [[T; 6]; 6],
    /// 5th order weights; also row 7 of `a` (first same as last).
    b: [T; 6],
    /// Difference between the 5th and embedded 4th order weights, 7 stages.
    btilde: [T; 7],
}

impl<T: Scalar> Tsit5Tableau<T> {
    fn new() -> Self {
        let f = T::from_constant;
        let z = T::zero();
        Self {
            c: [
                z,
                f(0.161),
                f(0.327),
                f(0.9),
                f(0.9800255409045097),
                f(1.0),
            ],
            a: [
                [z, z, z, z, z, z],
                [f(0.161), z, z, z, z, z],
                [f(-0.008480655492356989), f(0.335480655492357), z, z, z, z],
                [
                    f(2.898),
                    f(-6.359447987781783),
                    f(4.361447987781783),
                    z,
                    z,
                    z,
                ],
                [
                    f(5.325864858437957),
                    f(-11.748883564062828),
                    f(7.495539342889693),
                    f(-0.09249506636030195),
                    z,
                    z,
                ],
                [
                    f(5.86145544294642),
                    f(-12.92096931784711),
                    f(8.159367898576159),
                    f(-0.071584973281401),
                    f(-0.02826857949054663),
                    z,
                ],
            ],
            b: [
                f(0.09646076681806523),
                f(0.01),
                f(0.4798896504144996),
                f(1.379008574103742),
                f(-3.290069515436099),
                f(2.324710524099774),
            ],
            btilde: [
                f(-0.00178001105222577714),
                f(-0.0008164344596567469),
                f(0.007880878010261995),
                f(-0.1447110071732629),
                f(0.5823571654525552),
                f(-0.45808210592918697),
                f(0.015151515151515152),
            ],
        }
    }
}

/// Tsitouras 5/4 Solver
///
/// Used as a fixed-step [`Steppable`] or, through [`Tsit5::try_step`], as the
/// adaptive integrator behind [`solve_at_times`].
pub struct Tsit5<T: Scalar> {
    tableau: Tsit5Tableau<T>,
    k: [Vec<T>; 7],
    tmp: Vec<T>,
    y_new: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            tableau: Tsit5Tableau::new(),
            k: std::array::from_fn(|_| vec![z; dim]),
            tmp: vec![z; dim],
            y_new: vec![z; dim],
        }
    }

    /// Fills stages k1..k6 and the 5th order candidate `y_new`.
    fn stages(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t0: T,
        state: &[T],
        dt: T,
    ) -> Result<(), EvalError> {
        let tab = &self.tableau;
        system.apply(t0, state, &mut self.k[0])?;
        for stage in 1..6 {
            for i in 0..state.len() {
                let mut acc = T::zero();
                for j in 0..stage {
                    acc = acc + tab.a[stage][j] * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * acc;
            }
            system.apply(t0 + tab.c[stage] * dt, &self.tmp, &mut self.k[stage])?;
        }
        for i in 0..state.len() {
            let mut acc = T::zero();
            for j in 0..6 {
                acc = acc + tab.b[j] * self.k[j][i];
            }
            self.y_new[i] = state[i] + dt * acc;
        }
        Ok(())
    }

    /// Attempts a step without committing it and returns the scaled RMS error
    /// estimate. A value `<= 1` means the step meets the tolerances; commit it
    /// with [`Tsit5::accept`].
    pub fn try_step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t0: T,
        state: &[T],
        dt: T,
        rtol: T,
        atol: T,
    ) -> Result<T, EvalError> {
        self.stages(system, t0, state, dt)?;
        system.apply(t0 + dt, &self.y_new, &mut self.k[6])?;

        let tab = &self.tableau;
        let mut sum = T::zero();
        for i in 0..state.len() {
            let mut err = T::zero();
            for j in 0..7 {
                err = err + tab.btilde[j] * self.k[j][i];
            }
            err = dt * err;
            let scale = atol + rtol * state[i].abs().max(self.y_new[i].abs());
            let ratio = err / scale;
            sum = sum + ratio * ratio;
        }
        let n = T::from_constant(state.len().max(1) as f64);
        Ok((sum / n).sqrt())
    }

    /// Commits the candidate computed by the last [`Tsit5::try_step`].
    pub fn accept(&self, state: &mut [T]) {
        state.copy_from_slice(&self.y_new);
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), EvalError> {
        self.stages(system, *t, state, dt)?;
        self.accept(state);
        *t = *t + dt;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Tsit5 with embedded error control; steps land exactly on every requested time.
    Tsit5Adaptive,
    /// Fixed-step Tsit5 with `substeps` steps per output interval.
    Tsit5 { substeps: usize },
    /// Fixed-step RK4 with `substeps` steps per output interval.
    Rk4 { substeps: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    pub method: IntegrationMethod,
    pub rtol: f64,
    pub atol: f64,
    /// First trial step; `0` picks one from the initial slope.
    pub initial_step: f64,
    pub max_step: Option<f64>,
    /// Accepted plus rejected adaptive steps allowed per call.
    pub max_steps: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            method: IntegrationMethod::Tsit5Adaptive,
            rtol: 1e-6,
            atol: 1e-9,
            initial_step: 0.0,
            max_step: None,
            max_steps: 100_000,
        }
    }
}

impl IntegratorSettings {
    fn validate(&self) -> Result<(), IntegrationError> {
        let invalid = |msg: &str| Err(IntegrationError::InvalidSettings(msg.to_string()));
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return invalid("rtol must be positive");
        }
        if !(self.atol.is_finite() && self.atol > 0.0) {
            return invalid("atol must be positive");
        }
        if !(self.initial_step.is_finite() && self.initial_step >= 0.0) {
            return invalid("initial_step must be non-negative");
        }
        if let Some(max_step) = self.max_step {
            if max_step.is_nan() || max_step <= 0.0 {
                return invalid("max_step must be positive");
            }
        }
        if self.max_steps == 0 {
            return invalid("max_steps must be at least 1");
        }
        match self.method {
            IntegrationMethod::Rk4 { substeps: 0 } | IntegrationMethod::Tsit5 { substeps: 0 } => {
                invalid("substeps must be at least 1")
            }
            _ => Ok(()),
        }
    }
}

/// Integrates `system` from `initial_state` at `times[0]` and returns one state
/// per requested time, flattened row-major (`times.len() * dim` values).
///
/// `times` must be monotone (increasing or decreasing). The first row is the
/// initial state exactly. Any failure aborts the whole call.
pub fn solve_at_times<S: DynamicalSystem<f64>>(
    system: &S,
    initial_state: &[f64],
    times: &[f64],
    settings: &IntegratorSettings,
) -> Result<Vec<f64>, IntegrationError> {
    settings.validate()?;
    let dim = system.dimension();
    if initial_state.len() != dim {
        return Err(IntegrationError::DimensionMismatch {
            expected: dim,
            actual: initial_state.len(),
        });
    }
    if initial_state.iter().any(|v| !v.is_finite()) {
        return Err(IntegrationError::NonFiniteInitialCondition(
            initial_state.to_vec(),
        ));
    }

    let mut out = Vec::with_capacity(times.len() * dim);
    let Some(&t0) = times.first() else {
        return Ok(out);
    };

    // Probe the field at the start so a singular initial point fails even
    // when only one sample was requested.
    let mut slope = vec![0.0; dim];
    system
        .apply(t0, initial_state, &mut slope)
        .map_err(|source| IntegrationError::Evaluation { time: t0, source })?;
    out.extend_from_slice(initial_state);

    match settings.method {
        IntegrationMethod::Tsit5Adaptive => {
            solve_adaptive(system, initial_state, &slope, times, settings, &mut out)?
        }
        IntegrationMethod::Tsit5 { substeps } => solve_fixed(
            &mut Tsit5::new(dim),
            system,
            initial_state,
            times,
            substeps,
            &mut out,
        )?,
        IntegrationMethod::Rk4 { substeps } => solve_fixed(
            &mut RK4::new(dim),
            system,
            initial_state,
            times,
            substeps,
            &mut out,
        )?,
    }
    Ok(out)
}

fn solve_fixed<S: DynamicalSystem<f64>>(
    stepper: &mut impl Steppable<f64>,
    system: &S,
    initial_state: &[f64],
    times: &[f64],
    substeps: usize,
    out: &mut Vec<f64>,
) -> Result<(), IntegrationError> {
    let mut state = initial_state.to_vec();
    let mut t = times[0];
    for &target in &times[1..] {
        let dt = (target - t) / substeps as f64;
        for _ in 0..substeps {
            stepper
                .step(system, &mut t, &mut state, dt)
                .map_err(|source| IntegrationError::Evaluation { time: t, source })?;
            if state.iter().any(|v| !v.is_finite()) {
                return Err(IntegrationError::NonFiniteState { time: t });
            }
        }
        t = target;
        out.extend_from_slice(&state);
    }
    debug!(
        "fixed-step integration finished: {} steps",
        (times.len() - 1) * substeps
    );
    Ok(())
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

fn solve_adaptive<S: DynamicalSystem<f64>>(
    system: &S,
    initial_state: &[f64],
    initial_slope: &[f64],
    times: &[f64],
    settings: &IntegratorSettings,
    out: &mut Vec<f64>,
) -> Result<(), IntegrationError> {
    let dim = initial_state.len();
    let mut solver = Tsit5::new(dim);
    let mut state = initial_state.to_vec();
    let mut t = times[0];
    let max_step = settings.max_step.unwrap_or(f64::INFINITY);
    let mut h_abs = if settings.initial_step > 0.0 {
        settings.initial_step
    } else {
        initial_step_guess(initial_state, initial_slope, settings)
    }
    .min(max_step);
    let mut accepted = 0usize;
    let mut rejected = 0usize;
    // Evaluation failure of the most recent trial step, if it was rejected for one.
    let mut failure: Option<EvalError> = None;

    for &target in &times[1..] {
        while t != target {
            let remaining = target - t;
            let direction = remaining.signum();
            let min_step = 16.0 * f64::EPSILON * t.abs().max(1.0);
            if h_abs < min_step {
                return Err(match failure {
                    Some(source) => IntegrationError::Evaluation { time: t, source },
                    None => IntegrationError::StepSizeUnderflow { time: t },
                });
            }
            if accepted + rejected >= settings.max_steps {
                return Err(IntegrationError::StepLimit {
                    max_steps: settings.max_steps,
                    time: target,
                });
            }

            let finishes = h_abs >= remaining.abs();
            let dt = if finishes { remaining } else { direction * h_abs };
            // Trial stages may leave the domain even when the solution does not,
            // so a failed evaluation only shrinks the step.
            let trial = solver.try_step(system, t, &state, dt, settings.rtol, settings.atol);
            let err = match trial {
                Ok(err) => {
                    failure = None;
                    err
                }
                Err(source) => {
                    rejected += 1;
                    h_abs = dt.abs() * MIN_FACTOR;
                    trace!("trial step at t = {t} failed ({source}), retrying with {h_abs:.3e}");
                    failure = Some(source);
                    continue;
                }
            };

            if err <= 1.0 {
                accepted += 1;
                solver.accept(&mut state);
                t = if finishes { target } else { t + dt };
                if state.iter().any(|v| !v.is_finite()) {
                    return Err(IntegrationError::NonFiniteState { time: t });
                }
                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };
                let proposed = dt.abs() * factor;
                // a shortened final step should not shrink the next interval's step
                h_abs = if finishes { proposed.max(h_abs) } else { proposed }.min(max_step);
            } else {
                rejected += 1;
                // NaN errors (overflowing trial steps) shrink as hard as allowed.
                let factor = (SAFETY * err.powf(-0.2)).max(MIN_FACTOR);
                let factor = if factor.is_nan() { MIN_FACTOR } else { factor };
                h_abs = dt.abs() * factor.min(1.0);
                trace!("rejected step at t = {t}: error {err:.3e}, retrying with {h_abs:.3e}");
            }
        }
        out.extend_from_slice(&state);
    }
    debug!("adaptive integration finished: {accepted} accepted, {rejected} rejected steps");
    Ok(())
}

/// Step whose explicit Euler increment is about 1% of the state's scale.
fn initial_step_guess(state: &[f64], slope: &[f64], settings: &IntegratorSettings) -> f64 {
    let rms = |values: &[f64]| {
        let sum: f64 = values
            .iter()
            .zip(state)
            .map(|(v, y)| {
                let scaled = v / (settings.atol + settings.rtol * y.abs());
                scaled * scaled
            })
            .sum();
        (sum / values.len().max(1) as f64).sqrt()
    };
    let d0 = rms(state);
    let d1 = rms(slope);
    if d0 < 1e-5 || d1 < 1e-5 {
        1e-6
    } else {
        0.01 * d0 / d1
    }
}
