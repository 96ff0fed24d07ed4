//! Arithmetic capabilities the expression interpreter is generic over.
//!
//! Two implementations exist:
//! - `f64`: strict scalar mode used while integrating. Division by zero, domain
//!   violations and overflow are errors.
//! - [`FieldValue`]: array mode used while sampling a grid. IEEE semantics, so
//!   singular cells become NaN/inf and evaluation carries on.

use crate::error::EvalError;
use nalgebra::DMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply_ieee(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            BinaryOp::Add => "addition",
            BinaryOp::Sub => "subtraction",
            BinaryOp::Mul => "multiplication",
            BinaryOp::Div => "division",
            BinaryOp::Pow => "exponentiation",
        }
    }
}

/// The closed set of callable functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Sqrt,
    Log,
}

impl Function {
    pub const ALL: [Function; 6] = [
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Exp,
        Function::Sqrt,
        Function::Log,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Exp => "exp",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
        }
    }

    /// Natural log for `Log`.
    fn apply_ieee(self, a: f64) -> f64 {
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Exp => a.exp(),
            Function::Sqrt => a.sqrt(),
            Function::Log => a.ln(),
        }
    }
}

/// Arithmetic capability required by [`crate::expression::Expression`].
pub trait Numeric: Clone + Sized {
    fn constant(value: f64) -> Self;
    fn negate(self) -> Self;
    fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Result<Self, EvalError>;
    fn call(function: Function, arg: Self) -> Result<Self, EvalError>;
}

impl Numeric for f64 {
    fn constant(value: f64) -> Self {
        value
    }

    fn negate(self) -> Self {
        -self
    }

    fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Result<Self, EvalError> {
        if op == BinaryOp::Div && rhs == 0.0 {
            return Err(EvalError::DivisionByZero { numerator: lhs });
        }
        let value = op.apply_ieee(lhs, rhs);
        if value.is_nan() && op == BinaryOp::Pow && lhs.is_finite() && rhs.is_finite() {
            // negative base with a fractional exponent
            return Err(EvalError::Domain {
                function: "pow",
                argument: lhs,
            });
        }
        if !value.is_finite() {
            return Err(EvalError::NonFinite {
                operation: op.describe(),
            });
        }
        Ok(value)
    }

    fn call(function: Function, arg: Self) -> Result<Self, EvalError> {
        let out_of_domain = match function {
            Function::Sqrt => arg < 0.0,
            Function::Log => arg <= 0.0,
            _ => false,
        };
        if out_of_domain {
            return Err(EvalError::Domain {
                function: function.name(),
                argument: arg,
            });
        }
        let value = function.apply_ieee(arg);
        if !value.is_finite() {
            return Err(EvalError::NonFinite {
                operation: function.name(),
            });
        }
        Ok(value)
    }
}

/// A value in array mode: either a single number or an array broadcast against it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(f64),
    Array(DMatrix<f64>),
}

impl FieldValue {
    pub fn shape(&self) -> Option<(usize, usize)> {
        match self {
            FieldValue::Scalar(_) => None,
            FieldValue::Array(a) => Some(a.shape()),
        }
    }

    /// Returns an array of exactly `rows x cols`, repeating a scalar if needed.
    pub fn into_array(self, rows: usize, cols: usize) -> Result<DMatrix<f64>, EvalError> {
        match self {
            FieldValue::Scalar(v) => Ok(DMatrix::from_element(rows, cols, v)),
            FieldValue::Array(a) if a.shape() == (rows, cols) => Ok(a),
            FieldValue::Array(a) => Err(EvalError::ShapeMismatch {
                left: a.shape(),
                right: (rows, cols),
            }),
        }
    }

    fn zip_with(lhs: Self, rhs: Self, f: impl Fn(f64, f64) -> f64) -> Result<Self, EvalError> {
        match (lhs, rhs) {
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => Ok(FieldValue::Scalar(f(a, b))),
            (FieldValue::Array(a), FieldValue::Scalar(b)) => {
                Ok(FieldValue::Array(a.map(|v| f(v, b))))
            }
            (FieldValue::Scalar(a), FieldValue::Array(b)) => {
                Ok(FieldValue::Array(b.map(|v| f(a, v))))
            }
            (FieldValue::Array(a), FieldValue::Array(b)) => {
                if a.shape() != b.shape() {
                    return Err(EvalError::ShapeMismatch {
                        left: a.shape(),
                        right: b.shape(),
                    });
                }
                Ok(FieldValue::Array(a.zip_map(&b, f)))
            }
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<DMatrix<f64>> for FieldValue {
    fn from(value: DMatrix<f64>) -> Self {
        FieldValue::Array(value)
    }
}

impl Numeric for FieldValue {
    fn constant(value: f64) -> Self {
        FieldValue::Scalar(value)
    }

    fn negate(self) -> Self {
        match self {
            FieldValue::Scalar(v) => FieldValue::Scalar(-v),
            FieldValue::Array(a) => FieldValue::Array(-a),
        }
    }

    fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Result<Self, EvalError> {
        FieldValue::zip_with(lhs, rhs, |a, b| op.apply_ieee(a, b))
    }

    fn call(function: Function, arg: Self) -> Result<Self, EvalError> {
        Ok(match arg {
            FieldValue::Scalar(v) => FieldValue::Scalar(function.apply_ieee(v)),
            FieldValue::Array(a) => FieldValue::Array(a.map(|v| function.apply_ieee(v))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_division_by_zero_is_an_error() {
        let err = f64::binary(BinaryOp::Div, 1.0, 0.0).expect_err("1/0 should fail");
        assert_eq!(err, EvalError::DivisionByZero { numerator: 1.0 });
    }

    #[test]
    fn scalar_domain_errors_name_the_function() {
        let err = f64::call(Function::Sqrt, -1.0).expect_err("sqrt(-1) should fail");
        assert!(matches!(err, EvalError::Domain { function: "sqrt", .. }));
        let err = f64::call(Function::Log, 0.0).expect_err("log(0) should fail");
        assert!(matches!(err, EvalError::Domain { function: "log", .. }));
        let err = f64::binary(BinaryOp::Pow, -8.0, 1.0 / 3.0).expect_err("fractional power");
        assert!(matches!(err, EvalError::Domain { function: "pow", .. }));
    }

    #[test]
    fn scalar_overflow_is_reported() {
        let err = f64::call(Function::Exp, 1000.0).expect_err("exp overflow");
        assert_eq!(err, EvalError::NonFinite { operation: "exp" });
    }

    #[test]
    fn array_mode_keeps_ieee_values() {
        let a = FieldValue::Array(DMatrix::from_row_slice(1, 3, &[-1.0, 0.0, 4.0]));
        let sqrt = FieldValue::call(Function::Sqrt, a.clone()).expect("sqrt");
        let log = FieldValue::call(Function::Log, a.clone()).expect("log");
        let inv = FieldValue::binary(BinaryOp::Div, FieldValue::Scalar(1.0), a).expect("div");
        let (sqrt, log, inv) = (
            sqrt.into_array(1, 3).expect("shape"),
            log.into_array(1, 3).expect("shape"),
            inv.into_array(1, 3).expect("shape"),
        );
        assert!(sqrt[(0, 0)].is_nan());
        assert_eq!(sqrt[(0, 2)], 2.0);
        assert_eq!(log[(0, 1)], f64::NEG_INFINITY);
        assert_eq!(inv[(0, 1)], f64::INFINITY);
    }

    #[test]
    fn array_shapes_must_agree() {
        let a = FieldValue::Array(DMatrix::zeros(2, 3));
        let b = FieldValue::Array(DMatrix::zeros(3, 2));
        let err = FieldValue::binary(BinaryOp::Add, a, b).expect_err("shape mismatch");
        assert!(matches!(err, EvalError::ShapeMismatch { .. }));
    }

    #[test]
    fn scalar_broadcasts_to_requested_shape() {
        let filled = FieldValue::Scalar(5.0).into_array(4, 2).expect("broadcast");
        assert_eq!(filled.shape(), (4, 2));
        assert!(filled.iter().all(|&v| v == 5.0));
    }
}
