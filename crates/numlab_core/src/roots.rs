//! Root finding for scalar functions.
//!
//! Seven interchangeable methods share one protocol: an iteration is appended to the
//! trace only once every evaluation it needs has succeeded, the loop stops on the
//! convergence criterion, on `max_iterations`, or on a mid-iteration failure, and in all
//! three cases the trace accumulated so far is returned. Precondition failures (bad
//! settings, no sign change over the starting interval) are returned as `Err` instead,
//! with no trace at all.

mod bracketing;
mod open;
mod types;

pub use bracketing::{bisection, false_position, incremental_search};
pub use open::{fixed_point, multiple_roots, newton_raphson, secant};
pub use types::{
    ConvergenceCriterion, ErrorKind, IterationRecord, RootMethod, RootSettings, RootSolution,
    StepState, Termination,
};

use crate::error::{require_finite, NumericResult};
use crate::expression::Expression;
use log::{debug, info, warn};

/// Step reduction factor applied by incremental search each time it finds a bracket.
pub const DEFAULT_REFINEMENT: f64 = 10.0;

/// A fully specified root-finding problem: method, functions and starting values.
#[derive(Debug, Clone)]
pub enum RootProblem {
    IncrementalSearch {
        f: Expression,
        x0: f64,
        step: f64,
        refinement: f64,
    },
    Bisection {
        f: Expression,
        a: f64,
        b: f64,
    },
    FalsePosition {
        f: Expression,
        a: f64,
        b: f64,
    },
    FixedPoint {
        f: Expression,
        g: Expression,
        x0: f64,
    },
    NewtonRaphson {
        f: Expression,
        df: Expression,
        x0: f64,
    },
    Secant {
        f: Expression,
        x0: f64,
        x1: f64,
    },
    MultipleRoots {
        f: Expression,
        df: Expression,
        d2f: Expression,
        x0: f64,
    },
}

impl RootProblem {
    pub fn method(&self) -> RootMethod {
        match self {
            RootProblem::IncrementalSearch { .. } => RootMethod::IncrementalSearch,
            RootProblem::Bisection { .. } => RootMethod::Bisection,
            RootProblem::FalsePosition { .. } => RootMethod::FalsePosition,
            RootProblem::FixedPoint { .. } => RootMethod::FixedPoint,
            RootProblem::NewtonRaphson { .. } => RootMethod::NewtonRaphson,
            RootProblem::Secant { .. } => RootMethod::Secant,
            RootProblem::MultipleRoots { .. } => RootMethod::MultipleRoots,
        }
    }

    pub fn solve(&self, settings: &RootSettings) -> NumericResult<RootSolution> {
        match self {
            RootProblem::IncrementalSearch {
                f,
                x0,
                step,
                refinement,
            } => incremental_search(f, *x0, *step, *refinement, settings),
            RootProblem::Bisection { f, a, b } => bisection(f, *a, *b, settings),
            RootProblem::FalsePosition { f, a, b } => false_position(f, *a, *b, settings),
            RootProblem::FixedPoint { f, g, x0 } => fixed_point(f, g, *x0, settings),
            RootProblem::NewtonRaphson { f, df, x0 } => newton_raphson(f, df, *x0, settings),
            RootProblem::Secant { f, x0, x1 } => secant(f, *x0, *x1, settings),
            RootProblem::MultipleRoots { f, df, d2f, x0 } => {
                multiple_roots(f, df, d2f, *x0, settings)
            }
        }
    }
}

/// How the body of a solve ended when it did not fail.
pub(crate) enum Stop {
    Converged(f64),
    ExactRoot(f64),
    Exhausted,
}

/// Append-only trace owned by a single solve.
pub(crate) struct Trace {
    method: RootMethod,
    records: Vec<IterationRecord>,
    bracket: Option<[f64; 2]>,
}

impl Trace {
    pub(crate) fn record(&mut self, state: StepState, error: f64) {
        let index = self.records.len() + 1;
        debug!("{} iteration {}: {:?}, error = {:e}", self.method.name(), index, state, error);
        self.records.push(IterationRecord {
            index,
            state,
            error,
        });
    }

    pub(crate) fn set_bracket(&mut self, a: f64, b: f64) {
        self.bracket = Some([a.min(b), a.max(b)]);
    }
}

/// Drives `body` and packages whatever it produced.
/// An `Err` from `body` becomes [`Termination::Failed`] with the partial trace kept.
pub(crate) fn run<F>(method: RootMethod, settings: &RootSettings, body: F) -> RootSolution
where
    F: FnOnce(&mut Trace) -> NumericResult<Stop>,
{
    let mut trace = Trace {
        method,
        records: Vec::new(),
        bracket: None,
    };
    let outcome = body(&mut trace);
    let (root, termination) = match outcome {
        Ok(Stop::Converged(root)) => (Some(root), Termination::Converged),
        Ok(Stop::ExactRoot(root)) => (Some(root), Termination::ExactRoot),
        Ok(Stop::Exhausted) => (None, Termination::MaxIterations),
        Err(error) => {
            warn!(
                "{} stopped after {} iterations: {}",
                method.name(),
                trace.records.len(),
                error
            );
            (None, Termination::Failed { error })
        }
    };
    let message = describe(method, settings, &trace.records, root, &termination);
    info!("{message}");

    RootSolution {
        method,
        iterations: trace.records,
        root,
        termination,
        bracket: trace.bracket,
        message,
    }
}

fn describe(
    method: RootMethod,
    settings: &RootSettings,
    records: &[IterationRecord],
    root: Option<f64>,
    termination: &Termination,
) -> String {
    let count = records.len();
    match (termination, root) {
        (Termination::Converged, Some(root)) => format!(
            "{root} is an approximation of a root with tolerance {} ({} iterations)",
            settings.criterion.tolerance, count
        ),
        (Termination::ExactRoot, Some(root)) => format!("{root} is a root of f(x)"),
        (Termination::Failed { error }, _) => {
            format!("{} failed after {count} iterations: {error}", method.name())
        }
        _ => format!(
            "{} did not converge within {} iterations",
            method.name(),
            settings.max_iterations
        ),
    }
}

/// Shared entry checks for every method.
pub(crate) fn check_start(settings: &RootSettings, starts: &[(&'static str, f64)]) -> NumericResult<()> {
    settings.validate()?;
    for &(field, value) in starts {
        require_finite(field, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConvergenceCriterion, RootMethod, RootProblem, RootSettings, Termination};
    use crate::error::NumericError;
    use crate::expression::Expression;

    fn expr(text: &str) -> Expression {
        Expression::parse(text).expect("expression should parse")
    }

    #[test]
    fn relative_error_falls_back_to_absolute_at_zero() {
        let criterion = ConvergenceCriterion::relative(1e-3);
        assert_eq!(criterion.error(2.0, 1.0), 0.5);
        assert_eq!(criterion.error(0.0, 0.25), 0.25);
        assert!(criterion.is_satisfied(5e-4));
        assert!(!criterion.is_satisfied(1e-3));
    }

    #[test]
    fn settings_validation_names_the_field() {
        let mut settings = RootSettings::default();
        settings.criterion.tolerance = 0.0;
        match settings.validate() {
            Err(NumericError::InvalidInput { field, .. }) => assert_eq!(field, "tolerance"),
            other => panic!("unexpected {other:?}"),
        }
        let settings = RootSettings {
            max_iterations: 0,
            ..RootSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn every_method_solves_through_the_problem_enum() {
        let settings = RootSettings::default();
        let problems = vec![
            RootProblem::IncrementalSearch {
                f: expr("x^2 - 4"),
                x0: 1.0,
                step: 0.1,
                refinement: 10.0,
            },
            RootProblem::Bisection {
                f: expr("x^2 - 4"),
                a: 0.0,
                b: 3.0,
            },
            RootProblem::FalsePosition {
                f: expr("x^2 - 4"),
                a: 0.0,
                b: 3.0,
            },
            RootProblem::FixedPoint {
                f: expr("x^2 - 4"),
                g: expr("(x + 4 / x) / 2"),
                x0: 1.0,
            },
            RootProblem::NewtonRaphson {
                f: expr("x^2 - 4"),
                df: expr("2x"),
                x0: 1.0,
            },
            RootProblem::Secant {
                f: expr("x^2 - 4"),
                x0: 1.0,
                x1: 3.0,
            },
            RootProblem::MultipleRoots {
                f: expr("x^2 - 4"),
                df: expr("2x"),
                d2f: expr("2"),
                x0: 1.0,
            },
        ];
        for problem in problems {
            let solution = problem.solve(&settings).expect("solve should start");
            assert_eq!(solution.method, problem.method());
            assert!(solution.converged(), "{:?}: {}", solution.method, solution.message);
            let root = solution.root.expect("converged solve has a root");
            assert!((root - 2.0).abs() < 1e-5, "{:?} gave {root}", solution.method);
        }
    }

    #[test]
    fn traces_are_reproducible() {
        let problem = RootProblem::Bisection {
            f: expr("exp(-x) - x"),
            a: 0.0,
            b: 1.0,
        };
        let settings = RootSettings::default();
        let first = serde_json::to_string(&problem.solve(&settings).unwrap()).unwrap();
        let second = serde_json::to_string(&problem.solve(&settings).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn failure_message_names_the_method() {
        let problem = RootProblem::NewtonRaphson {
            f: expr("x^2 + 1"),
            df: expr("2x"),
            x0: 0.0,
        };
        let solution = problem.solve(&RootSettings::default()).unwrap();
        assert!(matches!(solution.termination, Termination::Failed { .. }));
        assert_eq!(solution.method, RootMethod::NewtonRaphson);
        assert!(solution.message.contains("Newton-Raphson"));
        let json = serde_json::to_value(&solution).unwrap();
        assert_eq!(json["termination"]["status"], "failed");
        assert!(json["termination"]["error"]
            .as_str()
            .unwrap()
            .contains("derivative vanished"));
    }
}
