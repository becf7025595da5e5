//! Polynomial interpolation through the Vandermonde system `V c = y`.

use super::direct::{solve_direct, DirectMethod};
use super::matrix::{serialize_rows, vector_from};
use crate::error::{NumericError, NumericResult};
use log::info;
use nalgebra::DMatrix;
use serde::{Serialize, Serializer};
use std::fmt;

/// Coefficients below this magnitude are left out of the rendered polynomial, and
/// coefficients this close to an integer are printed as that integer.
const NEGLIGIBLE: f64 = 1e-10;

/// Polynomial with coefficients in ascending order: `c[0] + c[1] x + c[2] x^2 + ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    pub coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    pub fn degree(&self) -> usize {
        self.coefficients
            .iter()
            .rposition(|c| c.abs() >= NEGLIGIBLE)
            .unwrap_or(0)
    }
}

fn tidy(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < NEGLIGIBLE {
        rounded
    } else {
        value
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (power, &raw) in self.coefficients.iter().enumerate().rev() {
            if raw.abs() < NEGLIGIBLE {
                continue;
            }
            let c = tidy(raw);
            let magnitude = c.abs();
            if first {
                if c < 0.0 {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {} ", if c < 0.0 { '-' } else { '+' })?;
            }
            match power {
                0 => write!(f, "{magnitude}")?,
                _ => {
                    if magnitude != 1.0 {
                        write!(f, "{magnitude}")?;
                    }
                    write!(f, "x")?;
                    if power > 1 {
                        write!(f, "^{power}")?;
                    }
                }
            }
            first = false;
        }
        if first {
            write!(f, "0")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VandermondeResult {
    #[serde(serialize_with = "serialize_rows")]
    pub matrix: DMatrix<f64>,
    pub coefficients: Vec<f64>,
    #[serde(serialize_with = "serialize_text")]
    pub polynomial: Polynomial,
}

fn serialize_text<S: Serializer>(polynomial: &Polynomial, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(polynomial)
}

/// Rows `[1, x_i, x_i^2, ..., x_i^{n-1}]`.
pub fn vandermonde_matrix(xs: &[f64]) -> DMatrix<f64> {
    let n = xs.len();
    DMatrix::from_fn(n, n, |i, j| xs[i].powi(j as i32))
}

/// Fits the unique polynomial of degree below `n` through `n` samples.
pub fn interpolate(xs: &[f64], ys: &[f64]) -> NumericResult<VandermondeResult> {
    if xs.is_empty() {
        return Err(NumericError::InvalidInput {
            field: "x",
            reason: "at least one sample is required".to_string(),
        });
    }
    if ys.len() != xs.len() {
        return Err(NumericError::DimensionMismatch {
            field: "y",
            expected: xs.len(),
            found: ys.len(),
        });
    }
    vector_from("x", xs)?;
    let y = vector_from("y", ys)?;
    for (second, &value) in xs.iter().enumerate() {
        if let Some(first) = xs[..second].iter().position(|&other| other == value) {
            return Err(NumericError::DuplicateSample {
                value,
                first,
                second,
            });
        }
    }

    let matrix = vandermonde_matrix(xs);
    let coefficients = solve_direct(DirectMethod::LuPartialPivot, &matrix, &y)?.into_solution()?;
    let polynomial = Polynomial::new(coefficients.iter().copied().collect());
    info!("interpolated {} samples: p(x) = {polynomial}", xs.len());

    Ok(VandermondeResult {
        matrix,
        coefficients: polynomial.coefficients.clone(),
        polynomial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn collinear_samples_give_a_line() {
        let result = interpolate(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap();
        assert_relative_eq!(result.coefficients[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(result.coefficients[1], 1.0, epsilon = 1e-9);
        assert!(result.coefficients[2].abs() < 1e-9);
        assert_eq!(result.polynomial.to_string(), "x + 3");
        assert_eq!(result.polynomial.degree(), 1);
        for (x, y) in [(1.0, 4.0), (2.0, 5.0), (3.0, 6.0)] {
            assert_relative_eq!(result.polynomial.evaluate(x), y, epsilon = 1e-9);
        }
        assert_eq!(result.matrix.row(2).iter().copied().collect::<Vec<_>>(), vec![1.0, 3.0, 9.0]);
    }

    #[test]
    fn quadratic_through_three_points() {
        let result = interpolate(&[-1.0, 0.0, 2.0], &[6.0, 1.0, 3.0]).unwrap();
        // p(x) = 2x^2 - 3x + 1
        assert_eq!(result.polynomial.to_string(), "2x^2 - 3x + 1");
    }

    #[test]
    fn duplicate_x_is_rejected() {
        assert_eq!(
            interpolate(&[1.0, 2.0, 1.0], &[0.0, 1.0, 2.0]),
            Err(NumericError::DuplicateSample {
                value: 1.0,
                first: 0,
                second: 2
            })
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(matches!(
            interpolate(&[1.0, 2.0], &[1.0]),
            Err(NumericError::DimensionMismatch { field: "y", .. })
        ));
        assert!(interpolate(&[], &[]).is_err());
    }

    #[test]
    fn rendering_handles_signs_and_fractions() {
        assert_eq!(Polynomial::new(vec![0.0, -1.0]).to_string(), "-x");
        assert_eq!(Polynomial::new(vec![-0.5, 0.0, 1.0]).to_string(), "x^2 - 0.5");
        assert_eq!(Polynomial::new(vec![0.0, 0.0]).to_string(), "0");
        assert_eq!(Polynomial::new(vec![1e-14, 2.0]).to_string(), "2x");
    }

    #[test]
    fn result_serializes_polynomial_as_text() {
        let result = interpolate(&[0.0, 1.0], &[1.0, 3.0]).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["polynomial"], "2x + 1");
        assert_eq!(json["matrix"], serde_json::json!([[1.0, 0.0], [1.0, 1.0]]));
    }
}
