//! Matrix and vector primitives shared by the linear solvers.
//!
//! Input arrives as row-major nested vectors and leaves the same way; in between
//! everything is an `nalgebra` dense matrix.

use crate::error::{require_finite, NumericError, NumericResult};
use log::warn;
use nalgebra::linalg::{Schur, SymmetricEigen};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize, Serializer};

/// Builds a matrix from rows, rejecting ragged or non-finite input.
pub fn from_rows(field: &'static str, rows: &[Vec<f64>]) -> NumericResult<DMatrix<f64>> {
    let first = rows.first().ok_or_else(|| NumericError::InvalidInput {
        field,
        reason: "must have at least one row".to_string(),
    })?;
    let ncols = first.len();
    if ncols == 0 {
        return Err(NumericError::InvalidInput {
            field,
            reason: "rows must not be empty".to_string(),
        });
    }
    for row in rows {
        if row.len() != ncols {
            return Err(NumericError::DimensionMismatch {
                field,
                expected: ncols,
                found: row.len(),
            });
        }
        for &value in row {
            require_finite(field, value)?;
        }
    }
    Ok(DMatrix::from_fn(rows.len(), ncols, |i, j| rows[i][j]))
}

pub fn vector_from(field: &'static str, values: &[f64]) -> NumericResult<DVector<f64>> {
    for &value in values {
        require_finite(field, value)?;
    }
    Ok(DVector::from_column_slice(values))
}

pub fn to_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

/// Returns the order of a square matrix.
pub fn require_square(field: &'static str, matrix: &DMatrix<f64>) -> NumericResult<usize> {
    if matrix.nrows() == 0 {
        return Err(NumericError::InvalidInput {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if !matrix.is_square() {
        return Err(NumericError::InvalidInput {
            field,
            reason: format!("must be square, got {}x{}", matrix.nrows(), matrix.ncols()),
        });
    }
    Ok(matrix.nrows())
}

pub fn require_len(field: &'static str, vector: &DVector<f64>, expected: usize) -> NumericResult<()> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(NumericError::DimensionMismatch {
            field,
            expected,
            found: vector.len(),
        })
    }
}

/// Solves `L y = b` for lower-triangular `L`.
pub fn forward_substitution(lower: &DMatrix<f64>, b: &DVector<f64>) -> NumericResult<DVector<f64>> {
    let n = b.len();
    let mut y = DVector::zeros(n);
    for i in 0..n {
        let diagonal = lower[(i, i)];
        if diagonal == 0.0 {
            return Err(NumericError::SingularMatrix { column: i });
        }
        let sum: f64 = (0..i).map(|j| lower[(i, j)] * y[j]).sum();
        y[i] = (b[i] - sum) / diagonal;
    }
    Ok(y)
}

/// Solves `U x = y` for upper-triangular `U`.
pub fn back_substitution(upper: &DMatrix<f64>, y: &DVector<f64>) -> NumericResult<DVector<f64>> {
    let n = y.len();
    let mut x = DVector::zeros(n);
    for i in (0..n).rev() {
        let diagonal = upper[(i, i)];
        if diagonal == 0.0 {
            return Err(NumericError::SingularMatrix { column: i });
        }
        let sum: f64 = (i + 1..n).map(|j| upper[(i, j)] * x[j]).sum();
        x[i] = (y[i] - sum) / diagonal;
    }
    Ok(x)
}

/// Sweep cap handed to nalgebra's eigenvalue solvers. Zero means unbounded there, and the
/// Francis double-shift step never deflates some zero-diagonal iteration matrices.
const EIGEN_MAX_ITERATIONS: usize = 1000;

/// Repeated squarings used by [`gelfand_radius`]: the estimate reads `||T^k||^(1/k)` at
/// `k = 2^30`.
const POWER_SQUARINGS: i32 = 30;

/// Largest eigenvalue modulus of a square matrix, together with the eigenvalues.
///
/// Symmetric matrices go through the symmetric QR algorithm and everything else through
/// a Schur decomposition, both with a bounded number of sweeps. When neither settles the
/// radius is estimated from matrix powers and the eigenvalue list comes back empty.
pub fn spectral_radius(matrix: &DMatrix<f64>) -> NumericResult<(f64, Vec<Complex<f64>>)> {
    if let Some(value) = matrix.iter().find(|value| !value.is_finite()) {
        return Err(NumericError::InvalidInput {
            field: "matrix",
            reason: format!("contains the non-finite entry {value}"),
        });
    }
    if let Some(eigenvalues) = eigenvalues(matrix) {
        let radius = eigenvalues
            .iter()
            .map(|lambda| lambda.norm())
            .fold(0.0, f64::max);
        return Ok((radius, eigenvalues));
    }

    let radius = gelfand_radius(matrix);
    warn!(
        "eigenvalues of a {n}x{n} matrix did not converge in {EIGEN_MAX_ITERATIONS} sweeps; \
         spectral radius estimated from matrix powers as {radius}",
        n = matrix.nrows()
    );
    if radius.is_finite() {
        Ok((radius, Vec::new()))
    } else {
        Err(NumericError::InvalidInput {
            field: "matrix",
            reason: "spectral radius is not a finite number".to_string(),
        })
    }
}

fn eigenvalues(matrix: &DMatrix<f64>) -> Option<Vec<Complex<f64>>> {
    let finite = |values: Vec<Complex<f64>>| {
        values
            .iter()
            .all(|lambda| lambda.is_finite())
            .then_some(values)
    };

    if *matrix == matrix.transpose() {
        let symmetric = SymmetricEigen::try_new(matrix.clone(), f64::EPSILON, EIGEN_MAX_ITERATIONS)
            .and_then(|eigen| {
                finite(
                    eigen
                        .eigenvalues
                        .iter()
                        .map(|&re| Complex::new(re, 0.0))
                        .collect(),
                )
            });
        if symmetric.is_some() {
            return symmetric;
        }
    }

    // A Householder similarity leaves the spectrum alone but gives the Hessenberg form a
    // non-zero diagonal, which breaks the cycles seen on zero-diagonal tridiagonals.
    let n = matrix.nrows();
    let direction = DVector::from_fn(n, |i, _| (i + 1) as f64).normalize();
    let reflector = DMatrix::identity(n, n) - 2.0 * &direction * direction.transpose();
    let reflected = &reflector * matrix * &reflector;

    [matrix.clone(), reflected].into_iter().find_map(|candidate| {
        Schur::try_new(candidate, f64::EPSILON, EIGEN_MAX_ITERATIONS)
            .and_then(|schur| finite(schur.complex_eigenvalues().iter().copied().collect()))
    })
}

/// Gelfand's formula `rho(T) = lim ||T^k||^(1/k)`, evaluated by repeated squaring with the
/// scale kept in log space.
fn gelfand_radius(matrix: &DMatrix<f64>) -> f64 {
    let mut power = matrix.clone();
    let mut log_scale = 0.0;
    for _ in 0..POWER_SQUARINGS {
        let norm = power.norm();
        if norm == 0.0 {
            return 0.0;
        }
        power /= norm;
        log_scale = 2.0 * (log_scale + norm.ln());
        power = &power * &power;
    }
    let norm = power.norm();
    if norm == 0.0 {
        return 0.0;
    }
    ((log_scale + norm.ln()) / 2f64.powi(POWER_SQUARINGS)).exp()
}

/// Vector norm used to measure the distance between successive iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    One,
    Two,
    #[default]
    Infinity,
}

impl Norm {
    pub fn of(self, vector: &DVector<f64>) -> f64 {
        match self {
            Norm::One => vector.iter().map(|v| v.abs()).sum(),
            Norm::Two => vector.norm(),
            Norm::Infinity => vector.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())),
        }
    }
}

pub(crate) fn serialize_rows<S: Serializer>(
    matrix: &DMatrix<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(to_rows(matrix))
}

pub(crate) fn serialize_vector<S: Serializer>(
    vector: &DVector<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(vector.iter())
}

pub(crate) fn serialize_optional_vector<S: Serializer>(
    vector: &Option<DVector<f64>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match vector {
        Some(vector) => serializer.serialize_some(vector.as_slice()),
        None => serializer.serialize_none(),
    }
}

/// Writes a vector as an `n x 1` matrix.
pub(crate) fn serialize_column<S: Serializer>(
    vector: &DVector<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(vector.iter().map(|value| [*value]))
}
