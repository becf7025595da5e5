//! Open methods: start from one or two points, no bracket required.

use super::{check_start, run, RootMethod, RootSettings, RootSolution, StepState, Stop};
use crate::error::{NumericError, NumericResult};
use crate::traits::RealFunction;

/// `x_{n+1} = g(x_n)`, with `f` evaluated at every new iterate.
///
/// Divergence (`|g'| > 1` near the root) is not detected; only `max_iterations` bounds it.
pub fn fixed_point(
    f: &impl RealFunction,
    g: &impl RealFunction,
    x0: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    check_start(settings, &[("x0", x0)])?;
    let f_start = f.evaluate_finite(x0)?;
    let criterion = settings.criterion;

    Ok(run(RootMethod::FixedPoint, settings, |trace| {
        if f_start == 0.0 {
            return Ok(Stop::ExactRoot(x0));
        }
        let mut x = x0;
        for _ in 0..settings.max_iterations {
            let g_x = g.evaluate_finite(x)?;
            let f_g_x = f.evaluate_finite(g_x)?;
            let error = criterion.error(g_x, x);
            trace.record(StepState::FixedPoint { x, g_x, f_g_x }, error);

            if f_g_x == 0.0 {
                return Ok(Stop::ExactRoot(g_x));
            }
            if criterion.is_satisfied(error) {
                return Ok(Stop::Converged(g_x));
            }
            x = g_x;
        }
        Ok(Stop::Exhausted)
    }))
}

/// `x_{n+1} = x_n - f(x_n) / f'(x_n)` with a caller-supplied derivative.
pub fn newton_raphson(
    f: &impl RealFunction,
    df: &impl RealFunction,
    x0: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    check_start(settings, &[("x0", x0)])?;
    let criterion = settings.criterion;

    Ok(run(RootMethod::NewtonRaphson, settings, |trace| {
        let mut x = x0;
        for _ in 0..settings.max_iterations {
            let f_x = f.evaluate_finite(x)?;
            if f_x == 0.0 {
                return Ok(Stop::ExactRoot(x));
            }
            let df_x = df.evaluate_finite(x)?;
            if df_x.abs() <= settings.zero_threshold {
                return Err(NumericError::ZeroDerivative { x });
            }
            let next = x - f_x / df_x;
            let error = criterion.error(next, x);
            trace.record(StepState::Newton { x, f_x, df_x, next }, error);

            if criterion.is_satisfied(error) {
                return Ok(Stop::Converged(next));
            }
            x = next;
        }
        Ok(Stop::Exhausted)
    }))
}

/// Newton with the derivative replaced by the slope through the last two iterates.
pub fn secant(
    f: &impl RealFunction,
    x0: f64,
    x1: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    check_start(settings, &[("x0", x0), ("x1", x1)])?;
    if x0 == x1 {
        return Err(NumericError::InvalidInput {
            field: "x1",
            reason: "must differ from x0".to_string(),
        });
    }
    let f_start = f.evaluate_finite(x0)?;
    let f_second = f.evaluate_finite(x1)?;
    let criterion = settings.criterion;

    Ok(run(RootMethod::Secant, settings, |trace| {
        if f_start == 0.0 {
            return Ok(Stop::ExactRoot(x0));
        }
        if f_second == 0.0 {
            return Ok(Stop::ExactRoot(x1));
        }
        let (mut x0, mut x1, mut f_x0, mut f_x1) = (x0, x1, f_start, f_second);
        for _ in 0..settings.max_iterations {
            let denominator = f_x1 - f_x0;
            if denominator.abs() <= settings.zero_threshold {
                return Err(NumericError::ZeroDenominator { x: x1 });
            }
            let next = x1 - f_x1 * (x1 - x0) / denominator;
            let f_next = f.evaluate_finite(next)?;
            let error = criterion.error(next, x1);
            trace.record(
                StepState::Secant {
                    x0,
                    x1,
                    f_x0,
                    f_x1,
                    next,
                    f_next,
                },
                error,
            );

            if f_next == 0.0 {
                return Ok(Stop::ExactRoot(next));
            }
            if criterion.is_satisfied(error) {
                return Ok(Stop::Converged(next));
            }
            x0 = x1;
            f_x0 = f_x1;
            x1 = next;
            f_x1 = f_next;
        }
        Ok(Stop::Exhausted)
    }))
}

/// Newton applied to `f / f'`, which restores quadratic convergence at roots of
/// multiplicity greater than one:
/// `x_{n+1} = x_n - f f' / (f'^2 - f f'')`.
pub fn multiple_roots(
    f: &impl RealFunction,
    df: &impl RealFunction,
    d2f: &impl RealFunction,
    x0: f64,
    settings: &RootSettings,
) -> NumericResult<RootSolution> {
    check_start(settings, &[("x0", x0)])?;
    let criterion = settings.criterion;

    Ok(run(RootMethod::MultipleRoots, settings, |trace| {
        let mut x = x0;
        for _ in 0..settings.max_iterations {
            let f_x = f.evaluate_finite(x)?;
            if f_x == 0.0 {
                return Ok(Stop::ExactRoot(x));
            }
            let df_x = df.evaluate_finite(x)?;
            let d2f_x = d2f.evaluate_finite(x)?;
            let denominator = df_x * df_x - f_x * d2f_x;
            if denominator.abs() <= settings.zero_threshold {
                return Err(NumericError::ZeroDenominator { x });
            }
            let next = x - f_x * df_x / denominator;
            let error = criterion.error(next, x);
            trace.record(
                StepState::MultipleRoots {
                    x,
                    f_x,
                    df_x,
                    d2f_x,
                    next,
                },
                error,
            );

            if criterion.is_satisfied(error) {
                return Ok(Stop::Converged(next));
            }
            x = next;
        }
        Ok(Stop::Exhausted)
    }))
}

#[cfg(test)]
mod tests {
    use super::{fixed_point, multiple_roots, newton_raphson, secant};
    use crate::error::{EvalError, NumericError};
    use crate::expression::Expression;
    use crate::roots::{ConvergenceCriterion, RootSettings, StepState, Termination};

    const OMEGA: f64 = 0.567_143_290_409_783_8;

    fn expr(text: &str) -> Expression {
        Expression::parse(text).expect("expression should parse")
    }

    #[test]
    fn newton_converges_to_sqrt_two_quickly() {
        let f = expr("x^2 - 2");
        let df = expr("2x");
        let settings = RootSettings::new(ConvergenceCriterion::absolute(1e-7), 50);
        let solution = newton_raphson(&f, &df, 1.0, &settings).unwrap();
        assert_eq!(solution.termination, Termination::Converged);
        assert!(solution.iterations.len() < 10);
        assert!((solution.root.unwrap() - 1.414_213_56).abs() < 1e-8);
        match solution.iterations[0].state {
            StepState::Newton { x, next, .. } => {
                assert_eq!(x, 1.0);
                assert_eq!(next, 1.5);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn newton_stops_on_vanishing_derivative_with_trace() {
        // x0 = 0 steps to 1 exactly, where f'(1) = 0.
        let f = expr("x^3 - 3x + 3");
        let df = expr("3x^2 - 3");
        let solution = newton_raphson(&f, &df, 0.0, &RootSettings::default()).unwrap();
        assert_eq!(solution.iterations.len(), 1);
        assert_eq!(
            solution.termination,
            Termination::Failed {
                error: NumericError::ZeroDerivative { x: 1.0 }
            }
        );

        let flat = newton_raphson(&expr("x^2 + 1"), &expr("2x"), 0.0, &RootSettings::default())
            .unwrap();
        assert!(flat.iterations.is_empty());
        assert!(!flat.converged());
    }

    #[test]
    fn newton_reports_non_finite_evaluation_as_failure() {
        let f = expr("ln(x)");
        let df = expr("1 / x");
        let solution = newton_raphson(&f, &df, 3.0, &RootSettings::default()).unwrap();
        assert!(matches!(
            solution.termination,
            Termination::Failed {
                error: NumericError::Eval(EvalError::Domain { function: "ln", .. })
            }
        ));
        assert_eq!(solution.iterations.len(), 1);
    }

    #[test]
    fn fixed_point_converges_for_contraction() {
        let f = expr("exp(-x) - x");
        let g = expr("exp(-x)");
        let solution = fixed_point(&f, &g, 0.5, &RootSettings::default()).unwrap();
        assert!(solution.converged());
        assert!((solution.root.unwrap() - OMEGA).abs() < 1e-6);
        assert!(solution.iterations.len() > 10);
    }

    #[test]
    fn fixed_point_divergence_is_bounded_by_iteration_cap() {
        let f = expr("x^2 - 2");
        let g = expr("x^2 + x - 2");
        let settings = RootSettings::new(ConvergenceCriterion::absolute(1e-7), 3);
        let solution = fixed_point(&f, &g, 3.0, &settings).unwrap();
        assert_eq!(solution.termination, Termination::MaxIterations);
        assert_eq!(solution.iterations.len(), 3);
    }

    #[test]
    fn secant_converges_and_shifts_its_window() {
        let f = expr("exp(-x) - x");
        let solution = secant(&f, 0.0, 1.0, &RootSettings::default()).unwrap();
        assert!(solution.converged());
        assert!((solution.root.unwrap() - OMEGA).abs() < 1e-9);
        for pair in solution.iterations.windows(2) {
            match (pair[0].state, pair[1].state) {
                (StepState::Secant { x1, next, .. }, StepState::Secant { x0, x1: later, .. }) => {
                    assert_eq!(x0, x1);
                    assert_eq!(later, next);
                }
                other => panic!("unexpected states {other:?}"),
            }
        }
    }

    #[test]
    fn secant_rejects_flat_secant_line() {
        let f = expr("x^2 - 4");
        let solution = secant(&f, -1.0, 1.0, &RootSettings::default()).unwrap();
        assert_eq!(
            solution.termination,
            Termination::Failed {
                error: NumericError::ZeroDenominator { x: 1.0 }
            }
        );
        assert!(solution.iterations.is_empty());
    }

    #[test]
    fn multiple_roots_handles_double_root() {
        let f = expr("x^3 - 3x + 2");
        let df = expr("3x^2 - 3");
        let d2f = expr("6x");
        let settings = RootSettings::new(ConvergenceCriterion::absolute(1e-7), 50);
        let solution = multiple_roots(&f, &df, &d2f, 0.0, &settings).unwrap();
        assert!(solution.converged(), "{}", solution.message);
        assert!((solution.root.unwrap() - 1.0).abs() < 1e-6);
        assert!(solution.iterations.len() <= 6);
    }
}
