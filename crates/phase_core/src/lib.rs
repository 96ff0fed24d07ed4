pub mod error;
pub mod expression;
pub mod frames;
pub mod grid;
pub mod nullcline;
pub mod numeric;
pub mod solvers;
pub mod system;
pub mod trajectory;
/// The `phase_core` crate provides the numerical engine behind the phase portrait viewer.
/// Every entry point takes its parameters explicitly and returns fresh values; nothing is
/// cached between calls.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (flows),
///   `Steppable` (Solvers).
/// - **Expression**: A closed-grammar parser and AST interpreter for user formulas, generic over
///   scalar (strict) and grid (IEEE, broadcasting) arithmetic.
/// - **Grid**: Vector field sampling and speed/direction diagnostics.
/// - **Solvers**: RK4, Tsit5 and adaptive Tsit5 behind `solve_at_times`.
/// - **Trajectory**: Planar and Lorenz trajectories, forward and backward in time.
/// - **Frames**: Restartable animation frame streams over a trajectory.
pub mod traits;

pub use error::{CompileError, Error, EvalError, IntegrationError, ParameterError};
pub use grid::{sample, Grid, VectorField};
pub use system::{Lorenz, SystemDefinition};
pub use trajectory::{integrate, integrate_lorenz, InitialCondition, TimeSpan, Trajectory};
