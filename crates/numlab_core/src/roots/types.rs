//! Core types for root finding.
//!
//! Every method produces the same [`RootSolution`] shape; only the per-iteration
//! [`StepState`] differs between methods.

use crate::error::{require_positive, NumericError, NumericResult};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootMethod {
    IncrementalSearch,
    Bisection,
    FalsePosition,
    FixedPoint,
    NewtonRaphson,
    Secant,
    MultipleRoots,
}

impl RootMethod {
    pub fn name(self) -> &'static str {
        match self {
            RootMethod::IncrementalSearch => "incremental search",
            RootMethod::Bisection => "bisection",
            RootMethod::FalsePosition => "false position",
            RootMethod::FixedPoint => "fixed point",
            RootMethod::NewtonRaphson => "Newton-Raphson",
            RootMethod::Secant => "secant",
            RootMethod::MultipleRoots => "multiple roots",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    Absolute,
    Relative,
}

/// How successive estimates are compared and when the difference is small enough.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriterion {
    pub kind: ErrorKind,
    pub tolerance: f64,
}

impl Default for ConvergenceCriterion {
    fn default() -> Self {
        Self {
            kind: ErrorKind::Absolute,
            tolerance: 1e-7,
        }
    }
}

impl ConvergenceCriterion {
    pub fn absolute(tolerance: f64) -> Self {
        Self {
            kind: ErrorKind::Absolute,
            tolerance,
        }
    }

    pub fn relative(tolerance: f64) -> Self {
        Self {
            kind: ErrorKind::Relative,
            tolerance,
        }
    }

    /// `|new - old|`, divided by `|new|` for relative errors.
    /// A relative error at `new == 0` is undefined and falls back to the absolute one.
    pub fn error(&self, new: f64, old: f64) -> f64 {
        let delta = (new - old).abs();
        match self.kind {
            ErrorKind::Relative if new != 0.0 => delta / new.abs(),
            _ => delta,
        }
    }

    pub fn is_satisfied(&self, error: f64) -> bool {
        error < self.tolerance
    }
}

/// Settings shared by every root-finding method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RootSettings {
    pub criterion: ConvergenceCriterion,
    pub max_iterations: usize,
    /// Magnitude at or below which a derivative or update denominator counts as zero.
    pub zero_threshold: f64,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            criterion: ConvergenceCriterion::default(),
            max_iterations: 100,
            zero_threshold: f64::EPSILON,
        }
    }
}

impl RootSettings {
    pub fn new(criterion: ConvergenceCriterion, max_iterations: usize) -> Self {
        Self {
            criterion,
            max_iterations,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> NumericResult<()> {
        require_positive("tolerance", self.criterion.tolerance)?;
        if self.max_iterations == 0 {
            return Err(NumericError::InvalidInput {
                field: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.zero_threshold >= 0.0 && self.zero_threshold.is_finite()) {
            return Err(NumericError::InvalidInput {
                field: "zero_threshold",
                reason: format!("must be a non-negative finite number, got {}", self.zero_threshold),
            });
        }
        Ok(())
    }
}

/// Method-specific state recorded for one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepState {
    /// Consecutive search nodes `x0 < x1` (or `x0 > x1` for a negative step).
    Incremental {
        x0: f64,
        x1: f64,
        f_x0: f64,
        f_x1: f64,
        step: f64,
    },
    /// Bracket `[a, b]` before the update and the estimate `x` taken inside it.
    Bracket {
        a: f64,
        b: f64,
        x: f64,
        f_a: f64,
        f_b: f64,
        f_x: f64,
    },
    /// `g_x = g(x)` is the next iterate.
    FixedPoint { x: f64, g_x: f64, f_g_x: f64 },
    Newton {
        x: f64,
        f_x: f64,
        df_x: f64,
        next: f64,
    },
    Secant {
        x0: f64,
        x1: f64,
        f_x0: f64,
        f_x1: f64,
        next: f64,
        f_next: f64,
    },
    MultipleRoots {
        x: f64,
        f_x: f64,
        df_x: f64,
        d2f_x: f64,
        next: f64,
    },
}

/// One row of a root-finding trace. Indices start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationRecord {
    pub index: usize,
    #[serde(flatten)]
    pub state: StepState,
    pub error: f64,
}

/// Why a solve stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Termination {
    /// The error criterion was satisfied.
    Converged,
    /// `f` evaluated to exactly zero at the returned root.
    ExactRoot,
    /// The iteration cap was reached; the trace is complete but no root is claimed.
    MaxIterations,
    /// A mid-iteration failure; the trace holds every iteration completed before it.
    Failed {
        #[serde(serialize_with = "serialize_display")]
        error: NumericError,
    },
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Converged | Termination::ExactRoot)
    }
}

fn serialize_display<S: Serializer>(error: &NumericError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Result of one root-finding invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootSolution {
    pub method: RootMethod,
    pub iterations: Vec<IterationRecord>,
    pub root: Option<f64>,
    pub termination: Termination,
    /// Last sign-change interval seen (incremental search only).
    pub bracket: Option<[f64; 2]>,
    pub message: String,
}

impl RootSolution {
    pub fn converged(&self) -> bool {
        self.termination.is_success()
    }

    pub fn last_error(&self) -> Option<f64> {
        self.iterations.last().map(|record| record.error)
    }
}
