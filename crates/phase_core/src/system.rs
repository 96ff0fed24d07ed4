use crate::error::{CompileError, EvalError};
use crate::expression::{compile, AllowList, Expression};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// A planar system dx/dt = f(x, y), dy/dt = g(x, y) given as two formulas.
///
/// Both formulas are compiled once against [`AllowList::planar`], so `x`, `y`
/// and `t` are the only variables they may reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemDefinition {
    expr_x: Expression,
    expr_y: Expression,
}

impl SystemDefinition {
    pub fn new(expr_x: &str, expr_y: &str) -> Result<Self, CompileError> {
        let allowed = AllowList::planar();
        Ok(Self {
            expr_x: compile(expr_x, &allowed)?,
            expr_y: compile(expr_y, &allowed)?,
        })
    }

    pub fn x_expression(&self) -> &Expression {
        &self.expr_x
    }

    pub fn y_expression(&self) -> &Expression {
        &self.expr_y
    }
}

impl DynamicalSystem<f64> for SystemDefinition {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, t: f64, x: &[f64], out: &mut [f64]) -> Result<(), EvalError> {
        let slots = [x[0], x[1], t];
        out[0] = self.expr_x.evaluate_slots(&slots)?;
        out[1] = self.expr_y.evaluate_slots(&slots)?;
        Ok(())
    }
}

/// The Lorenz system. All three parameters are required.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lorenz {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl Lorenz {
    pub fn new(sigma: f64, rho: f64, beta: f64) -> Self {
        Self { sigma, rho, beta }
    }

    /// sigma = 10, rho = 28, beta = 8/3.
    pub fn classic() -> Self {
        Self::new(10.0, 28.0, 8.0 / 3.0)
    }
}

impl<T: Scalar> DynamicalSystem<T> for Lorenz {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) -> Result<(), EvalError> {
        let sigma = T::from_constant(self.sigma);
        let rho = T::from_constant(self.rho);
        let beta = T::from_constant(self.beta);
        let (x, y, z) = (x[0], x[1], x[2]);
        out[0] = sigma * (y - x);
        out[1] = x * (rho - z) - y;
        out[2] = x * y - beta * z;
        Ok(())
    }
}
