use crate::error::EvalError;

/// A real function of one real variable, as consumed by the root-finding methods.
///
/// Solvers only see this trait, so the expression engine behind it can be replaced
/// without touching solver code.
pub trait RealFunction {
    /// Evaluates the function at `x`.
    /// Domain violations are errors; non-finite results are returned as-is.
    fn evaluate(&self, x: f64) -> Result<f64, EvalError>;

    /// Evaluates at `x` and rejects `NaN`/`±inf` with [`EvalError::NonFinite`].
    fn evaluate_finite(&self, x: f64) -> Result<f64, EvalError> {
        let value = self.evaluate(x)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFinite { x, value })
        }
    }
}

impl<F> RealFunction for F
where
    F: Fn(f64) -> f64,
{
    fn evaluate(&self, x: f64) -> Result<f64, EvalError> {
        Ok(self(x))
    }
}
