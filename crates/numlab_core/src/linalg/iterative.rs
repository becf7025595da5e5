//! Stationary iterative solvers `x_{k+1} = T x_k + C` built from the splitting
//! `A = D + L + U`.
//!
//! The spectral radius of `T` is computed and reported up front but never blocks the
//! iteration: a solve predicted to diverge still runs to `max_iterations` so the caller
//! can watch it happen.

use super::matrix::{
    forward_substitution, require_len, require_square, serialize_column, serialize_rows,
    serialize_vector, spectral_radius, Norm,
};
use crate::error::{require_positive, NumericError, NumericResult};
use crate::roots::{ErrorKind, Termination};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterativeMethod {
    Jacobi,
    GaussSeidel,
}

impl IterativeMethod {
    pub fn name(self) -> &'static str {
        match self {
            IterativeMethod::Jacobi => "Jacobi",
            IterativeMethod::GaussSeidel => "Gauss-Seidel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterativeSettings {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub norm: Norm,
    /// Relative errors divide by the norm of the new iterate.
    pub error_kind: ErrorKind,
}

impl Default for IterativeSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_iterations: 100,
            norm: Norm::Infinity,
            error_kind: ErrorKind::Absolute,
        }
    }
}

impl IterativeSettings {
    pub fn validate(&self) -> NumericResult<()> {
        require_positive("tolerance", self.tolerance)?;
        if self.max_iterations == 0 {
            return Err(NumericError::InvalidInput {
                field: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationStep {
    pub step: usize,
    #[serde(serialize_with = "serialize_vector")]
    pub x: DVector<f64>,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterativeSolveResult {
    pub method: IterativeMethod,
    #[serde(serialize_with = "serialize_rows")]
    pub transition_matrix: DMatrix<f64>,
    /// The constant term `C`, written as a one-column matrix.
    #[serde(serialize_with = "serialize_column")]
    pub coefficient_matrix: DVector<f64>,
    pub spectral_radius: f64,
    pub eigenvalues: Vec<Complex<f64>>,
    pub converges: bool,
    pub iterations: Vec<IterationStep>,
    /// Last iterate computed, or `x0` when none was.
    #[serde(serialize_with = "serialize_vector")]
    pub solution: DVector<f64>,
    /// `Converged`, `MaxIterations` or `Failed`; never `ExactRoot`.
    pub termination: Termination,
    pub norm: Norm,
}

/// `T` and `C` for the chosen splitting.
pub fn iteration_matrices(
    method: IterativeMethod,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
) -> NumericResult<(DMatrix<f64>, DVector<f64>)> {
    let n = require_square("A", a)?;
    require_len("b", b, n)?;
    // A subnormal diagonal is as useless as a zero one: its reciprocal overflows.
    if let Some(index) = (0..n).find(|&i| !(1.0 / a[(i, i)]).is_finite()) {
        return Err(NumericError::SingularDiagonal { index });
    }

    let diagonal = DMatrix::from_diagonal(&a.diagonal());
    let strict_lower = a.lower_triangle() - &diagonal;
    let strict_upper = a.upper_triangle() - &diagonal;

    let (t, c) = match method {
        IterativeMethod::Jacobi => {
            let inverse = DMatrix::from_diagonal(&a.diagonal().map(|d| 1.0 / d));
            let t = -(&inverse * (strict_lower + strict_upper));
            let c = &inverse * b;
            (t, c)
        }
        IterativeMethod::GaussSeidel => {
            let lower = diagonal + strict_lower;
            let mut t = DMatrix::zeros(n, n);
            for j in 0..n {
                let column = forward_substitution(&lower, &strict_upper.column(j).into_owned())?;
                t.set_column(j, &(-column));
            }
            let c = forward_substitution(&lower, b)?;
            (t, c)
        }
    };
    if t.iter().chain(c.iter()).any(|value| !value.is_finite()) {
        return Err(NumericError::InvalidInput {
            field: "A",
            reason: format!(
                "the {} iteration matrix overflows; the diagonal is too small relative to the rest of the row",
                method.name()
            ),
        });
    }
    Ok((t, c))
}

pub fn solve_iterative(
    method: IterativeMethod,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    x0: &DVector<f64>,
    settings: &IterativeSettings,
) -> NumericResult<IterativeSolveResult> {
    settings.validate()?;
    let (t, c) = iteration_matrices(method, a, b)?;
    require_len("x0", x0, t.nrows())?;

    let (radius, eigenvalues) = spectral_radius(&t)?;
    let converges = radius < 1.0;
    if !converges {
        warn!(
            "{}: spectral radius {radius} >= 1, the iteration is expected to diverge",
            method.name()
        );
    }

    let (iterations, solution, termination) = iterate(&t, &c, x0, settings);
    match &termination {
        Termination::Failed { error } => warn!("{} stopped: {error}", method.name()),
        other => info!(
            "{} finished after {} iterations: {other:?}",
            method.name(),
            iterations.len()
        ),
    }

    Ok(IterativeSolveResult {
        method,
        transition_matrix: t,
        coefficient_matrix: c,
        spectral_radius: radius,
        eigenvalues,
        converges,
        iterations,
        solution,
        termination,
        norm: settings.norm,
    })
}

fn iterate(
    t: &DMatrix<f64>,
    c: &DVector<f64>,
    x0: &DVector<f64>,
    settings: &IterativeSettings,
) -> (Vec<IterationStep>, DVector<f64>, Termination) {
    let mut steps = Vec::new();
    let mut x = x0.clone();
    for step in 1..=settings.max_iterations {
        let next = t * &x + c;
        if next.iter().any(|v| !v.is_finite()) {
            let error = NumericError::NonFiniteIterate { step };
            return (steps, x, Termination::Failed { error });
        }
        let delta = settings.norm.of(&(&next - &x));
        let error = match settings.error_kind {
            ErrorKind::Relative => match settings.norm.of(&next) {
                scale if scale != 0.0 => delta / scale,
                _ => delta,
            },
            ErrorKind::Absolute => delta,
        };
        debug!("step {step}: x = {:?}, error = {error:e}", next.as_slice());
        steps.push(IterationStep {
            step,
            x: next.clone(),
            error,
        });
        x = next;
        if error < settings.tolerance {
            return (steps, x, Termination::Converged);
        }
    }
    (steps, x, Termination::MaxIterations)
}
