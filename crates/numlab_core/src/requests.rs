//! Request and response shapes consumed by front ends.
//!
//! Every request field is optional at the serde level so that a missing field surfaces as
//! [`NumericError::MissingField`] naming it, instead of a generic decoding error. All
//! validation happens before any computation starts.

use crate::error::{NumericError, NumericResult};
use crate::expression::{tabulate, Expression, SamplePoint};
use crate::linalg::{
    from_rows, interpolate, require_len, require_square, solve_direct, solve_iterative,
    vector_from, DecompositionResult, DirectMethod, IterativeMethod, IterativeSettings,
    IterativeSolveResult, Norm, VandermondeResult,
};
use crate::roots::{
    ConvergenceCriterion, ErrorKind, RootMethod, RootProblem, RootSettings, RootSolution,
    DEFAULT_REFINEMENT,
};
use crate::traits::RealFunction;
use serde::{Deserialize, Serialize};

/// One response per request family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum SolveResult {
    Root(RootSolution),
    Direct(DecompositionResult),
    Iterative(IterativeSolveResult),
    Interpolation(VandermondeResult),
    Table { points: Vec<SamplePoint> },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Root(RootRequest),
    LinearSystem(LinearSystemRequest),
    Vandermonde(VandermondeRequest),
    Evaluate(EvaluateRequest),
}

impl Request {
    pub fn solve(&self) -> NumericResult<SolveResult> {
        match self {
            Request::Root(request) => request.solve(),
            Request::LinearSystem(request) => request.solve(),
            Request::Vandermonde(request) => request.solve(),
            Request::Evaluate(request) => request.solve(),
        }
    }
}

fn required<T: Clone>(field: &'static str, value: &Option<T>) -> NumericResult<T> {
    value.clone().ok_or(NumericError::MissingField { field })
}

fn expression(field: &'static str, text: &Option<String>) -> NumericResult<Expression> {
    let text = required(field, text)?;
    Expression::parse(&text).map_err(|err| NumericError::InvalidInput {
        field,
        reason: err.to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootRequest {
    pub method: Option<RootMethod>,
    #[serde(alias = "eqn", alias = "f")]
    pub expression: Option<String>,
    pub derivative: Option<String>,
    pub second_derivative: Option<String>,
    /// `g` in `x = g(x)` for fixed-point iteration.
    pub iteration_function: Option<String>,
    #[serde(alias = "xo")]
    pub x0: Option<f64>,
    pub x1: Option<f64>,
    pub xi: Option<f64>,
    pub xf: Option<f64>,
    #[serde(alias = "intervalo")]
    pub step: Option<f64>,
    pub refinement: Option<f64>,
    #[serde(alias = "tol")]
    pub tolerance: Option<f64>,
    pub error_kind: Option<ErrorKind>,
    #[serde(alias = "niter", alias = "max_iter")]
    pub max_iterations: Option<usize>,
}

impl RootRequest {
    /// Tolerance and iteration cap must be given; the error kind defaults to absolute.
    pub fn settings(&self) -> NumericResult<RootSettings> {
        let criterion = ConvergenceCriterion {
            kind: self.error_kind.unwrap_or_default(),
            tolerance: required("tolerance", &self.tolerance)?,
        };
        let max_iterations = required("max_iterations", &self.max_iterations)?;
        let settings = RootSettings::new(criterion, max_iterations);
        settings.validate()?;
        Ok(settings)
    }

    pub fn problem(&self) -> NumericResult<RootProblem> {
        let f = expression("expression", &self.expression)?;
        let problem = match required("method", &self.method)? {
            RootMethod::IncrementalSearch => RootProblem::IncrementalSearch {
                f,
                x0: required("x0", &self.x0)?,
                step: required("step", &self.step)?,
                refinement: self.refinement.unwrap_or(DEFAULT_REFINEMENT),
            },
            RootMethod::Bisection => RootProblem::Bisection {
                f,
                a: required("xi", &self.xi)?,
                b: required("xf", &self.xf)?,
            },
            RootMethod::FalsePosition => RootProblem::FalsePosition {
                f,
                a: required("xi", &self.xi)?,
                b: required("xf", &self.xf)?,
            },
            RootMethod::FixedPoint => RootProblem::FixedPoint {
                f,
                g: expression("iteration_function", &self.iteration_function)?,
                x0: required("x0", &self.x0)?,
            },
            RootMethod::NewtonRaphson => RootProblem::NewtonRaphson {
                f,
                df: expression("derivative", &self.derivative)?,
                x0: required("x0", &self.x0)?,
            },
            RootMethod::Secant => RootProblem::Secant {
                f,
                x0: required("x0", &self.x0)?,
                x1: required("x1", &self.x1)?,
            },
            RootMethod::MultipleRoots => RootProblem::MultipleRoots {
                f,
                df: expression("derivative", &self.derivative)?,
                d2f: expression("second_derivative", &self.second_derivative)?,
                x0: required("x0", &self.x0)?,
            },
        };
        Ok(problem)
    }

    pub fn solve(&self) -> NumericResult<SolveResult> {
        let problem = self.problem()?;
        let settings = self.settings()?;
        problem.solve(&settings).map(SolveResult::Root)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinearMethod {
    Direct(DirectMethod),
    Iterative(IterativeMethod),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearSystemRequest {
    pub method: Option<LinearMethod>,
    #[serde(rename = "A", alias = "matrix_a")]
    pub a: Option<Vec<Vec<f64>>>,
    #[serde(alias = "vector_b")]
    pub b: Option<Vec<f64>>,
    pub x0: Option<Vec<f64>>,
    #[serde(alias = "tol")]
    pub tolerance: Option<f64>,
    #[serde(alias = "niter")]
    pub max_iterations: Option<usize>,
    pub norm: Option<Norm>,
    pub error_kind: Option<ErrorKind>,
}

impl LinearSystemRequest {
    pub fn solve(&self) -> NumericResult<SolveResult> {
        let method = required("method", &self.method)?;
        let a = from_rows("A", &required("A", &self.a)?)?;
        let n = require_square("A", &a)?;
        let b = vector_from("b", &required("b", &self.b)?)?;
        require_len("b", &b, n)?;

        match method {
            LinearMethod::Direct(method) => solve_direct(method, &a, &b).map(SolveResult::Direct),
            LinearMethod::Iterative(method) => {
                let x0 = vector_from("x0", &required("x0", &self.x0)?)?;
                require_len("x0", &x0, n)?;
                let defaults = IterativeSettings::default();
                let settings = IterativeSettings {
                    tolerance: required("tolerance", &self.tolerance)?,
                    max_iterations: required("max_iterations", &self.max_iterations)?,
                    norm: self.norm.unwrap_or(defaults.norm),
                    error_kind: self.error_kind.unwrap_or(defaults.error_kind),
                };
                solve_iterative(method, &a, &b, &x0, &settings).map(SolveResult::Iterative)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VandermondeRequest {
    pub x: Option<Vec<f64>>,
    pub y: Option<Vec<f64>>,
}

impl VandermondeRequest {
    pub fn solve(&self) -> NumericResult<SolveResult> {
        let x = required("x", &self.x)?;
        let y = required("y", &self.y)?;
        interpolate(&x, &y).map(SolveResult::Interpolation)
    }
}

/// Samples an expression over `[start, end]` for plotting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluateRequest {
    #[serde(alias = "f")]
    pub expression: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub samples: Option<usize>,
}

impl EvaluateRequest {
    pub const DEFAULT_SAMPLES: usize = 101;
    pub const MAX_SAMPLES: usize = 100_000;

    pub fn solve(&self) -> NumericResult<SolveResult> {
        let f = expression("expression", &self.expression)?;
        self.table(&f).map(|points| SolveResult::Table { points })
    }

    /// Checks the sampling window and tabulates an already parsed `f` over it.
    /// `expression` is not consulted.
    pub fn table(&self, f: &impl RealFunction) -> NumericResult<Vec<SamplePoint>> {
        let start = required("start", &self.start)?;
        let end = required("end", &self.end)?;
        for (field, value) in [("start", start), ("end", end)] {
            if !value.is_finite() {
                return Err(NumericError::InvalidInput {
                    field,
                    reason: format!("{value} is not a finite number"),
                });
            }
        }
        if end < start {
            return Err(NumericError::InvalidInput {
                field: "end",
                reason: format!("must not be less than start ({start})"),
            });
        }
        let samples = self.samples.unwrap_or(Self::DEFAULT_SAMPLES);
        if !(1..=Self::MAX_SAMPLES).contains(&samples) {
            return Err(NumericError::InvalidInput {
                field: "samples",
                reason: format!("must be between 1 and {}, got {samples}", Self::MAX_SAMPLES),
            });
        }
        Ok(tabulate(f, start, end, samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Request {
        serde_json::from_value(value).expect("request should decode")
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: NumericResult<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn newton_request_round_trips_through_json() {
        let request = decode(json!({
            "kind": "root",
            "method": "newton_raphson",
            "expression": "x^2 - 2",
            "derivative": "2x",
            "x0": 1.0,
            "tolerance": 1e-7,
            "max_iterations": 50
        }));
        let result = request.solve().unwrap();
        let SolveResult::Root(solution) = &result else {
            panic!("expected a root result, got {result:?}");
        };
        assert!(solution.converged());
        assert!((solution.root.unwrap() - 2f64.sqrt()).abs() < 1e-8);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["family"], "root");
        assert_eq!(json["iterations"][0]["kind"], "newton");
        assert_eq!(json["iterations"][0]["index"], 1);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let request = decode(json!({
            "kind": "root",
            "method": "newton_raphson",
            "eqn": "x^2 - 4",
            "derivative": "2x",
            "xo": 0.5,
            "tol": 1e-6,
            "niter": 30
        }));
        assert!(matches!(request.solve(), Ok(SolveResult::Root(s)) if s.converged()));
    }

    #[test]
    fn zero_is_a_valid_initial_guess() {
        let request = RootRequest {
            method: Some(RootMethod::Secant),
            expression: Some("x^3 - x - 1".to_string()),
            x0: Some(0.0),
            x1: Some(2.0),
            tolerance: Some(1e-7),
            max_iterations: Some(100),
            ..RootRequest::default()
        };
        assert!(request.solve().is_ok());
    }

    #[test]
    fn missing_fields_are_named() {
        let request = RootRequest {
            method: Some(RootMethod::MultipleRoots),
            expression: Some("(x - 1)^2".to_string()),
            derivative: Some("2(x - 1)".to_string()),
            x0: Some(0.0),
            ..RootRequest::default()
        };
        assert_eq!(
            request.solve(),
            Err(NumericError::MissingField {
                field: "second_derivative"
            })
        );
        assert_err_contains(RootRequest::default().solve(), "'expression'");
    }

    #[test]
    fn stopping_rule_is_required() {
        let request = RootRequest {
            method: Some(RootMethod::Bisection),
            expression: Some("x".to_string()),
            xi: Some(-1.0),
            xf: Some(1.0),
            max_iterations: Some(50),
            ..RootRequest::default()
        };
        assert_eq!(
            request.solve(),
            Err(NumericError::MissingField { field: "tolerance" })
        );
        let request = RootRequest {
            tolerance: Some(1e-6),
            max_iterations: None,
            ..request
        };
        assert_eq!(
            request.solve(),
            Err(NumericError::MissingField {
                field: "max_iterations"
            })
        );

        let iterative = LinearSystemRequest {
            method: Some(LinearMethod::Iterative(IterativeMethod::Jacobi)),
            a: Some(vec![vec![2.0, 0.0], vec![0.0, 2.0]]),
            b: Some(vec![1.0, 1.0]),
            x0: Some(vec![0.0, 0.0]),
            max_iterations: Some(10),
            ..LinearSystemRequest::default()
        };
        assert_eq!(
            iterative.solve(),
            Err(NumericError::MissingField { field: "tolerance" })
        );
    }

    #[test]
    fn bad_expression_names_its_field() {
        let request = RootRequest {
            method: Some(RootMethod::Bisection),
            expression: Some("x +* 2".to_string()),
            xi: Some(0.0),
            xf: Some(1.0),
            ..RootRequest::default()
        };
        assert_err_contains(request.solve(), "'expression'");
    }

    #[test]
    fn non_positive_tolerance_is_rejected_before_solving() {
        let request = RootRequest {
            method: Some(RootMethod::Bisection),
            expression: Some("x".to_string()),
            xi: Some(-1.0),
            xf: Some(1.0),
            tolerance: Some(0.0),
            max_iterations: Some(100),
            ..RootRequest::default()
        };
        assert_err_contains(request.solve(), "'tolerance'");
    }

    #[test]
    fn invalid_bracket_has_no_trace() {
        let request = decode(json!({
            "kind": "root",
            "method": "bisection",
            "expression": "x^2 + 1",
            "xi": -1.0,
            "xf": 1.0,
            "tolerance": 1e-7,
            "max_iterations": 100
        }));
        assert!(matches!(
            request.solve(),
            Err(NumericError::InvalidBracket { .. })
        ));
    }

    #[test]
    fn linear_request_dispatches_direct_and_iterative_methods() {
        let direct = decode(json!({
            "kind": "linear_system",
            "method": "cholesky",
            "A": [[4.0, 2.0], [2.0, 3.0]],
            "b": [6.0, 5.0]
        }));
        let json = serde_json::to_value(direct.solve().unwrap()).unwrap();
        assert_eq!(json["family"], "direct");
        let x = json["solution"].as_array().unwrap();
        assert!((x[0].as_f64().unwrap() - 1.0).abs() < 1e-12);
        assert!((x[1].as_f64().unwrap() - 1.0).abs() < 1e-12);

        let iterative = decode(json!({
            "kind": "linear_system",
            "method": "gauss_seidel",
            "matrix_a": [[4.0, 2.0], [2.0, 3.0]],
            "vector_b": [6.0, 5.0],
            "x0": [0.0, 0.0],
            "tol": 1e-9,
            "niter": 100,
            "norm": "two"
        }));
        match iterative.solve().unwrap() {
            SolveResult::Iterative(result) => {
                assert!(result.converges);
                assert_eq!(result.norm, Norm::Two);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_linear_requests_fail_before_computation() {
        let ragged = LinearSystemRequest {
            method: Some(LinearMethod::Direct(DirectMethod::LuSimple)),
            a: Some(vec![vec![1.0, 2.0], vec![3.0]]),
            b: Some(vec![1.0, 1.0]),
            ..LinearSystemRequest::default()
        };
        assert_err_contains(ragged.solve(), "'A'");

        let short_b = LinearSystemRequest {
            method: Some(LinearMethod::Direct(DirectMethod::LuSimple)),
            a: Some(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            b: Some(vec![1.0]),
            ..LinearSystemRequest::default()
        };
        assert_err_contains(short_b.solve(), "'b'");

        let no_x0 = LinearSystemRequest {
            method: Some(LinearMethod::Iterative(IterativeMethod::Jacobi)),
            a: Some(vec![vec![2.0, 0.0], vec![0.0, 2.0]]),
            b: Some(vec![1.0, 1.0]),
            ..LinearSystemRequest::default()
        };
        assert_eq!(no_x0.solve(), Err(NumericError::MissingField { field: "x0" }));
    }

    #[test]
    fn vandermonde_request_returns_polynomial_text() {
        let request = decode(json!({
            "kind": "vandermonde",
            "x": [1.0, 2.0, 3.0],
            "y": [4.0, 5.0, 6.0]
        }));
        let json = serde_json::to_value(request.solve().unwrap()).unwrap();
        assert_eq!(json["family"], "interpolation");
        assert_eq!(json["polynomial"], "x + 3");
    }

    #[test]
    fn evaluate_request_tabulates() {
        let request = decode(json!({
            "kind": "evaluate",
            "expression": "sqrt(x)",
            "start": -1.0,
            "end": 1.0,
            "samples": 3
        }));
        match request.solve().unwrap() {
            SolveResult::Table { points } => {
                assert_eq!(points.len(), 3);
                assert_eq!(points[0].y, None);
                assert_eq!(points[2].y, Some(1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        let reversed = EvaluateRequest {
            expression: Some("x".to_string()),
            start: Some(1.0),
            end: Some(0.0),
            samples: None,
        };
        assert_err_contains(reversed.solve(), "'end'");

        let oversized = EvaluateRequest {
            expression: Some("x".to_string()),
            start: Some(0.0),
            end: Some(1.0),
            samples: Some(EvaluateRequest::MAX_SAMPLES + 1),
        };
        assert_err_contains(oversized.solve(), "'samples'");
        let unbounded = EvaluateRequest {
            expression: None,
            start: Some(f64::NAN),
            end: Some(1.0),
            samples: Some(3),
        };
        let f = Expression::parse("x").unwrap();
        assert_err_contains(unbounded.table(&f), "'start'");
    }

    #[test]
    fn identical_requests_give_identical_output() {
        let body = json!({
            "kind": "linear_system",
            "method": "jacobi",
            "A": [[10.0, 1.0], [2.0, 8.0]],
            "b": [11.0, 10.0],
            "x0": [0.0, 0.0],
            "tolerance": 1e-7,
            "max_iterations": 100
        });
        let first = serde_json::to_string(&decode(body.clone()).solve().unwrap()).unwrap();
        let second = serde_json::to_string(&decode(body).solve().unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
