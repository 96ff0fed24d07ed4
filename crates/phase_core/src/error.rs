//! Error taxonomy for the core.
//!
//! - [`CompileError`]: the formula itself is bad. Fatal, shown to the user verbatim.
//! - [`EvalError`]: a single evaluation failed. In array mode only structural
//!   problems (shape mismatch, unbound variable) surface here; domain problems
//!   become NaN/inf cells instead.
//! - [`IntegrationError`]: a trajectory could not be produced. No partial result.
//! - [`ParameterError`]: a grid or time span was constructed with unusable values.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid expression '{expression}': {message} (hint: {hint})")]
pub struct CompileError {
    /// The full source text that failed to compile.
    pub expression: String,
    /// The offending fragment (identifier, character or token).
    pub fragment: String,
    /// Byte offset of `fragment` within `expression`.
    pub offset: usize,
    pub message: String,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("division by zero ({numerator} / 0)")]
    DivisionByZero { numerator: f64 },
    #[error("{function}({argument}) is outside the domain of {function}")]
    Domain {
        function: &'static str,
        argument: f64,
    },
    #[error("{operation} produced a non-finite value")]
    NonFinite { operation: &'static str },
    #[error("array shapes do not match: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("no value bound for variable '{0}'")]
    UnboundVariable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error("derivative evaluation failed at t = {time}: {source}")]
    Evaluation {
        time: f64,
        #[source]
        source: EvalError,
    },
    #[error("state became non-finite at t = {time}")]
    NonFiniteState { time: f64 },
    #[error("initial condition has dimension {actual}, system expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("initial condition must be finite, got {0:?}")]
    NonFiniteInitialCondition(Vec<f64>),
    #[error("exceeded {max_steps} solver steps before reaching t = {time}")]
    StepLimit { max_steps: usize, time: f64 },
    #[error("step size underflow at t = {time}; the system is too stiff or singular here")]
    StepSizeUnderflow { time: f64 },
    #[error("invalid integrator settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("{axis} bounds must be finite, got [{min}, {max}]")]
    NonFiniteBounds { axis: char, min: f64, max: f64 },
    #[error("{axis} range is inverted: min {min} > max {max}")]
    InvertedRange { axis: char, min: f64, max: f64 },
    #[error("{axis} resolution must be at least 1")]
    ZeroResolution { axis: char },
    #[error("time span needs at least one sample")]
    ZeroSamples,
    #[error("time span endpoints must be finite, got [{start}, {end}]")]
    NonFiniteTime { start: f64, end: f64 },
    #[error("time step must be finite and non-zero, got {0}")]
    InvalidStep(f64),
}

/// Umbrella error for callers that want a single type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
}
