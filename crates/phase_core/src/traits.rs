use crate::error::EvalError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in our dynamical systems.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Converts an `f64` literal, falling back to NaN for types that cannot represent it.
    fn from_constant(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a continuous-time dynamical system (a flow).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// t: current time
    /// x: current state
    /// out: buffer to write dx/dt into
    ///
    /// Fails when the right-hand side cannot be evaluated at `x`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]) -> Result<(), EvalError>;
}

/// A trait for solvers that can step a system with a fixed step size.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt (negative dt steps backward in time).
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    ///
    /// On error, `t` and `state` are left untouched.
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), EvalError>;
}
