//! Error taxonomy shared by every solver family.
//!
//! Precondition failures (bad input, no sign change, duplicate samples) are returned as
//! `Err(NumericError)` before any work starts. Failures that happen while iterating are
//! attached to the partial trace instead, see [`crate::roots::Termination`].

use thiserror::Error;

/// Failure to turn expression text into bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected ')' at position {position}")]
    UnbalancedParenthesis { position: usize },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("expression is nested more than {limit} levels deep")]
    TooDeep { limit: usize },
}

/// Failure while evaluating a compiled expression at a point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("{function}({argument}) is outside the domain of {function}")]
    Domain {
        function: &'static str,
        argument: f64,
    },
    #[error("{base}^{exponent} is not a real number")]
    InvalidPower { base: f64, exponent: f64 },
    #[error("f({x}) evaluated to the non-finite value {value}")]
    NonFinite { x: f64, value: f64 },
    #[error("expected {expected} variable values, got {found}")]
    Arity { expected: usize, found: usize },
    #[error("malformed bytecode: stack underflow")]
    StackUnderflow,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("invalid value for '{field}': {reason}")]
    InvalidInput { field: &'static str, reason: String },
    #[error("f({a}) = {fa} and f({b}) = {fb} do not change sign; [{a}, {b}] is not a bracket")]
    InvalidBracket { a: f64, b: f64, fa: f64, fb: f64 },
    #[error("derivative vanished at x = {x}")]
    ZeroDerivative { x: f64 },
    #[error("update denominator vanished at x = {x}")]
    ZeroDenominator { x: f64 },
    #[error("zero pivot at stage {stage} (row {row})")]
    ZeroPivot { stage: usize, row: usize },
    #[error("matrix is singular: no non-zero pivot available for column {column}")]
    SingularMatrix { column: usize },
    #[error("matrix is not positive definite: diagonal term {value} at index {index}")]
    NotPositiveDefinite { index: usize, value: f64 },
    #[error("diagonal entry {index} is zero or too small to invert; the iteration matrix is undefined")]
    SingularDiagonal { index: usize },
    #[error("duplicate sample x = {value} at positions {first} and {second}")]
    DuplicateSample {
        value: f64,
        first: usize,
        second: usize,
    },
    #[error("dimension mismatch for '{field}': expected {expected}, got {found}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("iterate became non-finite at step {step}")]
    NonFiniteIterate { step: usize },
}

pub type NumericResult<T> = Result<T, NumericError>;

/// Rejects non-finite inputs and names the offending field.
pub(crate) fn require_finite(field: &'static str, value: f64) -> NumericResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NumericError::InvalidInput {
            field,
            reason: format!("{value} is not a finite number"),
        })
    }
}

/// Tolerances must be strictly positive; zero is valid everywhere else.
pub(crate) fn require_positive(field: &'static str, value: f64) -> NumericResult<f64> {
    require_finite(field, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(NumericError::InvalidInput {
            field,
            reason: format!("must be positive, got {value}"),
        })
    }
}
