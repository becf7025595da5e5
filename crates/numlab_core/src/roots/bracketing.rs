//! Methods that walk or shrink an interval over which `f` changes sign.

use super::{check_start, run, RootMethod, RootSettings, RootSolution, StepState, Stop, Trace};
use crate::error::{NumericError, NumericResult};
use crate::traits::RealFunction;

/// Walks from `x0` in increments of `step` until `f` changes sign, then divides the
/// step by `refinement` and keeps walking from the left node of the bracket.
///
/// Stops when a node evaluates to exactly zero, or when a bracket is narrower than the
/// tolerance (the midpoint is returned as the root).
pub fn incremental_search(
    f: &impl RealFunction,
    x0: f64,
    step: f64,
    refinement: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    check_start(settings, &[("x0", x0), ("step", step), ("refinement", refinement)])?;
    if step == 0.0 {
        return Err(NumericError::InvalidInput {
            field: "step",
            reason: "must be non-zero".to_string(),
        });
    }
    if refinement <= 1.0 {
        return Err(NumericError::InvalidInput {
            field: "refinement",
            reason: format!("must be greater than 1, got {refinement}"),
        });
    }
    let f_start = f.evaluate_finite(x0)?;
    let criterion = settings.criterion;

    Ok(run(RootMethod::IncrementalSearch, settings, |trace| {
        if f_start == 0.0 {
            return Ok(Stop::ExactRoot(x0));
        }
        let (mut x0, mut f_x0, mut step) = (x0, f_start, step);

        for _ in 0..settings.max_iterations {
            let x1 = x0 + step;
            let f_x1 = f.evaluate_finite(x1)?;
            let error = criterion.error(x1, x0);
            trace.record(
                StepState::Incremental {
                    x0,
                    x1,
                    f_x0,
                    f_x1,
                    step,
                },
                error,
            );

            if f_x1 == 0.0 {
                trace.set_bracket(x0, x1);
                return Ok(Stop::ExactRoot(x1));
            }
            if f_x0.signum() != f_x1.signum() {
                trace.set_bracket(x0, x1);
                if criterion.is_satisfied(error) {
                    return Ok(Stop::Converged(x0 + (x1 - x0) / 2.0));
                }
                step /= refinement;
            } else {
                x0 = x1;
                f_x0 = f_x1;
            }
        }
        Ok(Stop::Exhausted)
    }))
}

/// Halves `[a, b]` each iteration, keeping the half where `f` changes sign.
pub fn bisection(
    f: &impl RealFunction,
    a: f64,
    b: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    let bracket = Bracket::open(f, a, b, settings)?;
    Ok(run(RootMethod::Bisection, settings, |trace| {
        bracket.shrink(f, settings, trace, |a, b, _, _| Ok(a + (b - a) / 2.0))
    }))
}

/// Regula falsi: the new estimate is where the secant through `(a, f(a))` and
/// `(b, f(b))` crosses zero.
pub fn false_position(
    f: &impl RealFunction,
    a: f64,
    b: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    let bracket = Bracket::open(f, a, b, settings)?;
    let threshold = settings.zero_threshold;
    Ok(run(RootMethod::FalsePosition, settings, |trace| {
        bracket.shrink(f, settings, trace, |a, b, f_a, f_b| {
            let denominator = f_a - f_b;
            if denominator.abs() <= threshold {
                return Err(NumericError::ZeroDenominator { x: b });
            }
            Ok(b - f_b * (a - b) / denominator)
        })
    }))
}

/// A validated starting interval with `a < b` and no same-sign endpoints.
#[derive(Debug, Clone, Copy)]
struct Bracket {
    a: f64,
    b: f64,
    f_a: f64,
    f_b: f64,
}

impl Bracket {
    fn open(f: &impl RealFunction, a: f64, b: f64, settings: &RootSettings) -> NumericResult<Self> {
        check_start(settings, &[("a", a), ("b", b)])?;
        if a == b {
            return Err(NumericError::InvalidInput {
                field: "b",
                reason: format!("interval [{a}, {b}] is empty"),
            });
        }
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        let f_a = f.evaluate_finite(a)?;
        let f_b = f.evaluate_finite(b)?;
        if f_a != 0.0 && f_b != 0.0 && f_a.signum() == f_b.signum() {
            return Err(NumericError::InvalidBracket {
                a,
                b,
                fa: f_a,
                fb: f_b,
            });
        }
        Ok(Self { a, b, f_a, f_b })
    }

    /// Shared loop of the bracketing methods; `estimate` picks the point inside `[a, b]`.
    /// The first error is measured against the endpoint the estimate replaces, later
    /// ones against the previous estimate.
    fn shrink<E>(
        self,
        f: &impl RealFunction,
        settings: &RootSettings,
        trace: &mut Trace,
        estimate: E,
    ) -> NumericResult<Stop>
    where
        E: Fn(f64, f64, f64, f64) -> NumericResult<f64>,
    {
        let Bracket {
            mut a,
            mut b,
            mut f_a,
            mut f_b,
        } = self;
        if f_a == 0.0 {
            return Ok(Stop::ExactRoot(a));
        }
        if f_b == 0.0 {
            return Ok(Stop::ExactRoot(b));
        }

        let criterion = settings.criterion;
        let mut previous: Option<f64> = None;
        for _ in 0..settings.max_iterations {
            let x = estimate(a, b, f_a, f_b)?;
            let f_x = f.evaluate_finite(x)?;
            let root_on_left = f_a.signum() != f_x.signum();
            let replaced = if root_on_left { b } else { a };
            let error = criterion.error(x, previous.unwrap_or(replaced));
            trace.record(
                StepState::Bracket {
                    a,
                    b,
                    x,
                    f_a,
                    f_b,
                    f_x,
                },
                error,
            );

            if f_x == 0.0 {
                return Ok(Stop::ExactRoot(x));
            }
            if criterion.is_satisfied(error) {
                return Ok(Stop::Converged(x));
            }
            if root_on_left {
                b = x;
                f_b = f_x;
            } else {
                a = x;
                f_a = f_x;
            }
            previous = Some(x);
        }
        Ok(Stop::Exhausted)
    }
}
