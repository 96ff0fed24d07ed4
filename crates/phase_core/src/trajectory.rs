use crate::error::{Error, IntegrationError, ParameterError};
use crate::grid::linspace;
use crate::solvers::{solve_at_times, IntegratorSettings};
use crate::system::{Lorenz, SystemDefinition};
use crate::traits::DynamicalSystem;
use log::debug;
use serde::{Deserialize, Serialize};

/// Starting point in state space (2 values for planar systems, 3 for Lorenz).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCondition(Vec<f64>);

impl InitialCondition {
    pub fn planar(x: f64, y: f64) -> Self {
        Self(vec![x, y])
    }

    pub fn spatial(x: f64, y: f64, z: f64) -> Self {
        Self(vec![x, y, z])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<f64>> for InitialCondition {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Uniformly spaced sample times from `t_start` to `t_end`, both included.
/// `t_end < t_start` runs backward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    t_start: f64,
    t_end: f64,
    sample_count: usize,
}

impl TimeSpan {
    pub fn new(t_start: f64, t_end: f64, sample_count: usize) -> Result<Self, ParameterError> {
        if !t_start.is_finite() || !t_end.is_finite() {
            return Err(ParameterError::NonFiniteTime {
                start: t_start,
                end: t_end,
            });
        }
        if sample_count == 0 {
            return Err(ParameterError::ZeroSamples);
        }
        Ok(Self {
            t_start,
            t_end,
            sample_count,
        })
    }

    /// `steps` samples at `t_start + k * dt`.
    pub fn from_step(t_start: f64, dt: f64, steps: usize) -> Result<Self, ParameterError> {
        if !dt.is_finite() || dt == 0.0 {
            return Err(ParameterError::InvalidStep(dt));
        }
        let t_end = t_start + dt * steps.saturating_sub(1) as f64;
        Self::new(t_start, t_end, steps)
    }

    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.t_end
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn is_backward(&self) -> bool {
        self.t_end < self.t_start
    }

    pub fn times(&self) -> Vec<f64> {
        linspace(self.t_start, self.t_end, self.sample_count)
    }
}

/// Ordered `(time, state)` samples of one solution curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    dimension: usize,
    times: Vec<f64>,
    /// Row-major, `times.len() * dimension` values.
    states: Vec<f64>,
}

impl Trajectory {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[f64] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.dimension)?;
        self.states.get(start..start + self.dimension)
    }

    pub fn final_state(&self) -> Option<&[f64]> {
        self.len().checked_sub(1).and_then(|last| self.state(last))
    }

    /// Coordinate `axis` over time.
    pub fn component(&self, axis: usize) -> Vec<f64> {
        if axis >= self.dimension {
            return Vec::new();
        }
        self.states
            .iter()
            .skip(axis)
            .step_by(self.dimension)
            .copied()
            .collect()
    }
}

/// Integrates any flow over the span. Fails atomically.
pub fn integrate_system<S: DynamicalSystem<f64>>(
    system: &S,
    ic: &InitialCondition,
    span: &TimeSpan,
    settings: &IntegratorSettings,
) -> Result<Trajectory, IntegrationError> {
    let times = span.times();
    debug!(
        "integrating {}-d system over [{}, {}] with {} samples",
        system.dimension(),
        span.t_start(),
        span.t_end(),
        times.len()
    );
    let states = solve_at_times(system, ic.as_slice(), &times, settings)?;
    Ok(Trajectory {
        dimension: system.dimension(),
        times,
        states,
    })
}

/// Integrates a user-defined planar system.
pub fn integrate(
    system: &SystemDefinition,
    ic: &InitialCondition,
    span: &TimeSpan,
    settings: &IntegratorSettings,
) -> Result<Trajectory, IntegrationError> {
    integrate_system(system, ic, span, settings)
}

pub fn integrate_lorenz(
    params: &Lorenz,
    ic: &InitialCondition,
    span: &TimeSpan,
    settings: &IntegratorSettings,
) -> Result<Trajectory, IntegrationError> {
    integrate_system(params, ic, span, settings)
}

/// Forward trajectory over `[0, duration]` and backward over `[0, -duration]`.
pub fn integrate_both_ways(
    system: &SystemDefinition,
    ic: &InitialCondition,
    duration: f64,
    samples: usize,
    settings: &IntegratorSettings,
) -> Result<(Trajectory, Trajectory), Error> {
    let forward = TimeSpan::new(0.0, duration, samples)?;
    let backward = TimeSpan::new(0.0, -duration, samples)?;
    Ok((
        integrate(system, ic, &forward, settings)?,
        integrate(system, ic, &backward, settings)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn oscillator() -> SystemDefinition {
        SystemDefinition::new("y", "-x").expect("oscillator should compile")
    }

    #[test]
    fn harmonic_oscillator_orbit_closes_after_one_period() {
        let system = oscillator();
        for (x0, y0) in [(1.0, 0.0), (0.3, -2.0), (-1.5, 0.5)] {
            let ic = InitialCondition::planar(x0, y0);
            let span = TimeSpan::new(0.0, 2.0 * PI, 200).expect("span");
            let trajectory = integrate(&system, &ic, &span, &IntegratorSettings::default())
                .expect("oscillator integrates");
            assert_eq!(trajectory.len(), 200);
            let last = trajectory.final_state().expect("non-empty");
            assert!((last[0] - x0).abs() < 1e-4, "x: {} vs {x0}", last[0]);
            assert!((last[1] - y0).abs() < 1e-4, "y: {} vs {y0}", last[1]);
        }
    }

    #[test]
    fn forward_and_backward_start_at_initial_condition() {
        let system = SystemDefinition::new("x - y", "x + y*sin(x)").expect("system");
        let ic = InitialCondition::planar(0.25, -0.75);
        let (forward, backward) =
            integrate_both_ways(&system, &ic, 1.5, 50, &IntegratorSettings::default())
                .expect("both directions integrate");
        assert_eq!(forward.state(0), Some(&[0.25, -0.75][..]));
        assert_eq!(backward.state(0), Some(&[0.25, -0.75][..]));
        assert_eq!(forward.times()[49], 1.5);
        assert_eq!(backward.times()[49], -1.5);
        assert_ne!(forward.final_state(), backward.final_state());
    }

    #[test]
    fn backward_integration_retraces_forward_path() {
        let system = oscillator();
        let settings = IntegratorSettings::default();
        let forward = integrate(
            &system,
            &InitialCondition::planar(1.0, 0.0),
            &TimeSpan::new(0.0, 1.0, 11).expect("span"),
            &settings,
        )
        .expect("forward");
        let end = forward.final_state().expect("non-empty").to_vec();
        let back = integrate(
            &system,
            &InitialCondition::from(end),
            &TimeSpan::new(0.0, -1.0, 11).expect("span"),
            &settings,
        )
        .expect("backward");
        let home = back.final_state().expect("non-empty");
        assert!((home[0] - 1.0).abs() < 1e-5 && home[1].abs() < 1e-5, "{home:?}");
    }

    #[test]
    fn singular_start_fails_without_partial_result() {
        let system = SystemDefinition::new("1/x", "0").expect("system");
        let span = TimeSpan::new(0.0, 1.0, 10).expect("span");
        let err = integrate(
            &system,
            &InitialCondition::planar(0.0, 0.0),
            &span,
            &IntegratorSettings::default(),
        )
        .expect_err("x = 0 is singular");
        match err {
            IntegrationError::Evaluation { time, ref source } => {
                assert_eq!(time, 0.0);
                assert!(matches!(source, crate::error::EvalError::DivisionByZero { .. }));
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn scalar_domain_error_mid_path_is_fatal() {
        // x grows linearly and sqrt(1 - x) leaves its domain at x = 1.
        let system = SystemDefinition::new("1", "sqrt(1 - x)").expect("system");
        let span = TimeSpan::new(0.0, 3.0, 30).expect("span");
        let err = integrate(
            &system,
            &InitialCondition::planar(0.0, 0.0),
            &span,
            &IntegratorSettings::default(),
        )
        .expect_err("domain error must surface");
        assert!(matches!(err, IntegrationError::Evaluation { .. }), "{err}");
    }

    #[test]
    fn finite_time_blow_up_fails_without_partial_result() {
        // x = 1 / (1 - t) has a pole at t = 1.
        let system = SystemDefinition::new("x^2", "0").expect("system");
        let span = TimeSpan::new(0.0, 2.0, 20).expect("span");
        let err = integrate(
            &system,
            &InitialCondition::planar(1.0, 0.0),
            &span,
            &IntegratorSettings::default(),
        )
        .expect_err("the solution leaves every bound before t = 2");
        match err {
            IntegrationError::StepSizeUnderflow { time } => {
                assert!((0.99..1.01).contains(&time), "stalled at t = {time}");
            }
            // an oversized trial step may overflow x^2 right before the stall
            IntegrationError::Evaluation {
                time,
                source: crate::error::EvalError::NonFinite { .. },
            } => {
                assert!((0.99..1.01).contains(&time), "stalled at t = {time}");
            }
            other => panic!("expected step size underflow, got {other:?}"),
        }
    }

    #[test]
    fn solution_near_domain_edge_survives_rejected_trial_steps() {
        // x = e^-t > 0 for all t, while coarse trial stages dip below zero.
        let system = SystemDefinition::new("-x", "sqrt(x)").expect("system");
        let span = TimeSpan::new(0.0, 100.0, 50).expect("span");
        let trajectory = integrate(
            &system,
            &InitialCondition::planar(1.0, 0.0),
            &span,
            &IntegratorSettings::default(),
        )
        .expect("the solution exists everywhere");
        assert_eq!(trajectory.len(), 50);
        assert!(trajectory.component(0).iter().all(|&x| x >= 0.0));
        let last = trajectory.final_state().expect("non-empty");
        assert!((last[1] - 2.0).abs() < 1e-4, "y(100) = {}", last[1]);
    }

    #[test]
    fn lorenz_stays_in_envelope_for_classic_parameters() {
        let span = TimeSpan::from_step(0.0, 0.01, 100).expect("span");
        let trajectory = integrate_lorenz(
            &Lorenz::classic(),
            &InitialCondition::spatial(1.0, 1.0, 1.0),
            &span,
            &IntegratorSettings::default(),
        )
        .expect("lorenz integrates");
        assert_eq!(trajectory.len(), 100);
        assert_eq!(trajectory.dimension(), 3);
        assert!((trajectory.times()[99] - 0.99).abs() < 1e-12);
        assert!(trajectory.states().iter().all(|v| v.abs() < 50.0));
        assert_ne!(trajectory.state(0), trajectory.final_state());
    }

    #[test]
    fn lorenz_rejects_planar_initial_condition() {
        let span = TimeSpan::new(0.0, 1.0, 10).expect("span");
        let err = integrate_lorenz(
            &Lorenz::classic(),
            &InitialCondition::planar(1.0, 1.0),
            &span,
            &IntegratorSettings::default(),
        )
        .expect_err("dimension mismatch");
        assert_eq!(
            err,
            IntegrationError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn time_span_layout() {
        let span = TimeSpan::new(0.0, -2.0, 5).expect("span");
        assert!(span.is_backward());
        assert_eq!(span.times(), vec![0.0, -0.5, -1.0, -1.5, -2.0]);
        assert_eq!(TimeSpan::new(3.0, 9.0, 1).expect("span").times(), vec![3.0]);
        assert_eq!(TimeSpan::new(0.0, 1.0, 0), Err(ParameterError::ZeroSamples));
        assert!(TimeSpan::from_step(0.0, 0.0, 10).is_err());
    }

    #[test]
    fn component_extracts_one_axis() {
        let trajectory = Trajectory {
            dimension: 3,
            times: vec![0.0, 1.0],
            states: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        assert_eq!(trajectory.component(1), vec![2.0, 5.0]);
        assert_eq!(trajectory.state(1), Some(&[4.0, 5.0, 6.0][..]));
        assert!(trajectory.state(2).is_none());
        assert!(trajectory.component(3).is_empty());
    }
}
