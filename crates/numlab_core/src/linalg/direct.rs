//! Direct solvers for square systems `A x = b`.
//!
//! Two engines cover all eight methods. Gaussian elimination and plain or pivoted LU run
//! the same row reduction over the augmented matrix `[A | b]` and differ only in what each
//! stage snapshots and in how the solution is recovered. Doolittle, Crout and Cholesky
//! compute `L` and `U` entry by entry with one routine parameterized by which diagonal is
//! fixed.
//!
//! A breakdown during the reduction (zero pivot, singular column, non-positive Cholesky
//! term) does not discard the work: the result carries the stages completed so far and the
//! error, with no solution.

use super::matrix::{
    back_substitution, forward_substitution, require_len, require_square,
    serialize_optional_vector, serialize_rows,
};
use crate::error::{NumericError, NumericResult};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectMethod {
    GaussianElimination,
    GaussianPartialPivot,
    GaussianTotalPivot,
    LuSimple,
    LuPartialPivot,
    Doolittle,
    Crout,
    Cholesky,
}

impl DirectMethod {
    pub fn name(self) -> &'static str {
        match self {
            DirectMethod::GaussianElimination => "Gaussian elimination",
            DirectMethod::GaussianPartialPivot => "Gaussian elimination with partial pivoting",
            DirectMethod::GaussianTotalPivot => "Gaussian elimination with total pivoting",
            DirectMethod::LuSimple => "LU factorization",
            DirectMethod::LuPartialPivot => "LU factorization with partial pivoting",
            DirectMethod::Doolittle => "Doolittle",
            DirectMethod::Crout => "Crout",
            DirectMethod::Cholesky => "Cholesky",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pivoting {
    None,
    Partial,
    Total,
}

/// What an elimination stage snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageView {
    Augmented,
    Factors,
}

/// Which diagonal a compact factorization fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalization {
    /// Doolittle: `diag(L) = 1`.
    UnitLower,
    /// Crout: `diag(U) = 1`.
    UnitUpper,
    /// Cholesky: `diag(L) = diag(U)` and `U = L^T` for symmetric input.
    Symmetric,
}

/// Pivot used at a stage, as a position in the working matrix (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotChoice {
    pub row: usize,
    pub column: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Snapshot {
    Augmented {
        #[serde(serialize_with = "serialize_rows")]
        matrix: DMatrix<f64>,
    },
    Factors {
        #[serde(serialize_with = "serialize_rows")]
        lower: DMatrix<f64>,
        #[serde(serialize_with = "serialize_rows")]
        upper: DMatrix<f64>,
    },
}

/// One displayable step. Stage 0 is the input before any reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub index: usize,
    pub label: String,
    pub pivot: Option<PivotChoice>,
    pub snapshot: Snapshot,
}

impl Stage {
    fn new(index: usize, pivot: Option<PivotChoice>, snapshot: Snapshot) -> Self {
        let label = if index == 0 {
            "initial".to_string()
        } else {
            format!("stage {index}")
        };
        debug!("{label}: pivot {pivot:?}");
        Self {
            index,
            label,
            pivot,
            snapshot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecompositionResult {
    pub method: DirectMethod,
    #[serde(serialize_with = "serialize_rows")]
    pub lower: DMatrix<f64>,
    #[serde(serialize_with = "serialize_rows")]
    pub upper: DMatrix<f64>,
    /// `row_permutation[i]` is the original row now at position `i`.
    pub row_permutation: Option<Vec<usize>>,
    /// `column_permutation[j]` is the original unknown now at position `j`.
    pub column_permutation: Option<Vec<usize>>,
    pub stages: Vec<Stage>,
    #[serde(serialize_with = "serialize_optional_vector")]
    pub solution: Option<DVector<f64>>,
    #[serde(
        serialize_with = "serialize_optional_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<NumericError>,
}

impl DecompositionResult {
    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// Drops the trace, keeping only the solution or the breakdown.
    pub fn into_solution(self) -> NumericResult<DVector<f64>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let last = self.upper.nrows().saturating_sub(1);
        self.solution
            .ok_or(NumericError::SingularMatrix { column: last })
    }
}

fn serialize_optional_error<S: Serializer>(
    error: &Option<NumericError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.collect_str(error),
        None => serializer.serialize_none(),
    }
}

/// Solves `A x = b` with the chosen method.
///
/// Shape problems are returned as `Err` before any work; breakdowns during the reduction
/// are reported inside the result.
pub fn solve_direct(
    method: DirectMethod,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
) -> NumericResult<DecompositionResult> {
    let n = require_square("A", a)?;
    require_len("b", b, n)?;

    let result = match method {
        DirectMethod::GaussianElimination => {
            eliminate(method, a, b, Pivoting::None, StageView::Augmented)
        }
        DirectMethod::GaussianPartialPivot => {
            eliminate(method, a, b, Pivoting::Partial, StageView::Augmented)
        }
        DirectMethod::GaussianTotalPivot => {
            eliminate(method, a, b, Pivoting::Total, StageView::Augmented)
        }
        DirectMethod::LuSimple => eliminate(method, a, b, Pivoting::None, StageView::Factors),
        DirectMethod::LuPartialPivot => {
            eliminate(method, a, b, Pivoting::Partial, StageView::Factors)
        }
        DirectMethod::Doolittle => factor(method, a, b, Normalization::UnitLower),
        DirectMethod::Crout => factor(method, a, b, Normalization::UnitUpper),
        DirectMethod::Cholesky => factor(method, a, b, Normalization::Symmetric),
    };

    match &result.error {
        Some(error) => warn!(
            "{} stopped after {} stages: {}",
            method.name(),
            result.stages.len() - 1,
            error
        ),
        None => info!("{} solved a {n}x{n} system", method.name()),
    }
    Ok(result)
}

struct Elimination {
    pivoting: Pivoting,
    work: DMatrix<f64>,
    lower: DMatrix<f64>,
    rhs: DVector<f64>,
    rows: Vec<usize>,
    columns: Vec<usize>,
}

impl Elimination {
    fn new(a: &DMatrix<f64>, b: &DVector<f64>, pivoting: Pivoting) -> Self {
        let n = a.nrows();
        Self {
            pivoting,
            work: DMatrix::from_fn(n, n + 1, |i, j| if j < n { a[(i, j)] } else { b[i] }),
            lower: DMatrix::identity(n, n),
            rhs: b.clone(),
            rows: (0..n).collect(),
            columns: (0..n).collect(),
        }
    }

    fn order(&self) -> usize {
        self.work.nrows()
    }

    fn upper(&self) -> DMatrix<f64> {
        self.work.columns(0, self.order()).into_owned()
    }

    fn snapshot(&self, view: StageView) -> Snapshot {
        match view {
            StageView::Augmented => Snapshot::Augmented {
                matrix: self.work.clone(),
            },
            StageView::Factors => Snapshot::Factors {
                lower: self.lower.clone(),
                upper: self.upper(),
            },
        }
    }

    fn choose_pivot(&self, k: usize) -> NumericResult<PivotChoice> {
        let n = self.order();
        let mut best = PivotChoice {
            row: k,
            column: k,
            value: self.work[(k, k)],
        };
        match self.pivoting {
            Pivoting::None => {
                if best.value == 0.0 {
                    return Err(NumericError::ZeroPivot {
                        stage: k + 1,
                        row: k,
                    });
                }
                return Ok(best);
            }
            Pivoting::Partial => {
                for i in k + 1..n {
                    if self.work[(i, k)].abs() > best.value.abs() {
                        best = PivotChoice {
                            row: i,
                            column: k,
                            value: self.work[(i, k)],
                        };
                    }
                }
            }
            Pivoting::Total => {
                for i in k..n {
                    for j in k..n {
                        if self.work[(i, j)].abs() > best.value.abs() {
                            best = PivotChoice {
                                row: i,
                                column: j,
                                value: self.work[(i, j)],
                            };
                        }
                    }
                }
            }
        }
        if best.value == 0.0 {
            return Err(NumericError::SingularMatrix { column: k });
        }
        Ok(best)
    }

    fn apply_pivot(&mut self, k: usize, pivot: PivotChoice) {
        if pivot.row != k {
            self.work.swap_rows(k, pivot.row);
            // Multipliers already computed travel with their rows.
            for j in 0..k {
                self.lower.swap((k, j), (pivot.row, j));
            }
            self.rows.swap(k, pivot.row);
        }
        if pivot.column != k {
            self.work.swap_columns(k, pivot.column);
            self.columns.swap(k, pivot.column);
        }
    }

    fn eliminate_column(&mut self, k: usize) {
        let n = self.order();
        let pivot = self.work[(k, k)];
        for i in k + 1..n {
            let factor = self.work[(i, k)] / pivot;
            self.lower[(i, k)] = factor;
            for j in k + 1..=n {
                self.work[(i, j)] -= factor * self.work[(k, j)];
            }
            self.work[(i, k)] = 0.0;
        }
    }

    fn reduce(&mut self, view: StageView, stages: &mut Vec<Stage>) -> NumericResult<()> {
        let n = self.order();
        for k in 0..n - 1 {
            let pivot = self.choose_pivot(k)?;
            self.apply_pivot(k, pivot);
            self.eliminate_column(k);
            stages.push(Stage::new(k + 1, Some(pivot), self.snapshot(view)));
        }
        if self.work[(n - 1, n - 1)] == 0.0 {
            return Err(match self.pivoting {
                Pivoting::None => NumericError::ZeroPivot {
                    stage: n,
                    row: n - 1,
                },
                Pivoting::Partial | Pivoting::Total => {
                    NumericError::SingularMatrix { column: n - 1 }
                }
            });
        }
        Ok(())
    }

    /// Back substitution on the reduced augmented column, or `L y = P b` then `U z = y`
    /// for the LU views. Either way the result is un-permuted by column.
    fn solve(&self, view: StageView) -> NumericResult<DVector<f64>> {
        let n = self.order();
        let upper = self.upper();
        let permuted = match view {
            StageView::Augmented => back_substitution(&upper, &self.work.column(n).into_owned())?,
            StageView::Factors => {
                let pb = DVector::from_fn(n, |i, _| self.rhs[self.rows[i]]);
                let y = forward_substitution(&self.lower, &pb)?;
                back_substitution(&upper, &y)?
            }
        };
        let mut x = DVector::zeros(n);
        for (position, &column) in self.columns.iter().enumerate() {
            x[column] = permuted[position];
        }
        Ok(x)
    }
}

fn eliminate(
    method: DirectMethod,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    pivoting: Pivoting,
    view: StageView,
) -> DecompositionResult {
    let mut state = Elimination::new(a, b, pivoting);
    let mut stages = vec![Stage::new(0, None, state.snapshot(view))];
    let outcome = state
        .reduce(view, &mut stages)
        .and_then(|()| state.solve(view));
    let (solution, error) = split(outcome);

    DecompositionResult {
        method,
        upper: state.upper(),
        lower: state.lower,
        row_permutation: (pivoting != Pivoting::None).then_some(state.rows),
        column_permutation: (pivoting == Pivoting::Total).then_some(state.columns),
        stages,
        solution,
        error,
    }
}

fn factor(
    method: DirectMethod,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    normalization: Normalization,
) -> DecompositionResult {
    let n = a.nrows();
    let mut lower = DMatrix::zeros(n, n);
    let mut upper = DMatrix::zeros(n, n);
    match normalization {
        Normalization::UnitLower => lower.fill_diagonal(1.0),
        Normalization::UnitUpper => upper.fill_diagonal(1.0),
        Normalization::Symmetric => {}
    }
    let mut stages = vec![Stage::new(
        0,
        None,
        Snapshot::Factors {
            lower: lower.clone(),
            upper: upper.clone(),
        },
    )];
    let outcome = factor_into(a, normalization, &mut lower, &mut upper, &mut stages).and_then(|()| {
        let y = forward_substitution(&lower, b)?;
        back_substitution(&upper, &y)
    });
    let (solution, error) = split(outcome);

    DecompositionResult {
        method,
        lower,
        upper,
        row_permutation: None,
        column_permutation: None,
        stages,
        solution,
        error,
    }
}

/// Fills row `k` of `U` and column `k` of `L` at stage `k + 1`.
fn factor_into(
    a: &DMatrix<f64>,
    normalization: Normalization,
    lower: &mut DMatrix<f64>,
    upper: &mut DMatrix<f64>,
    stages: &mut Vec<Stage>,
) -> NumericResult<()> {
    let n = a.nrows();
    for k in 0..n {
        let diagonal = a[(k, k)] - (0..k).map(|p| lower[(k, p)] * upper[(p, k)]).sum::<f64>();
        let divisor = match normalization {
            Normalization::UnitLower => {
                upper[(k, k)] = diagonal;
                diagonal
            }
            Normalization::UnitUpper => {
                lower[(k, k)] = diagonal;
                diagonal
            }
            Normalization::Symmetric => {
                if diagonal <= 0.0 {
                    return Err(NumericError::NotPositiveDefinite {
                        index: k,
                        value: diagonal,
                    });
                }
                let root = diagonal.sqrt();
                lower[(k, k)] = root;
                upper[(k, k)] = root;
                root
            }
        };
        if divisor == 0.0 {
            return Err(NumericError::ZeroPivot {
                stage: k + 1,
                row: k,
            });
        }

        for i in k + 1..n {
            let sum: f64 = (0..k).map(|p| lower[(i, p)] * upper[(p, k)]).sum();
            lower[(i, k)] = (a[(i, k)] - sum) / upper[(k, k)];
        }
        for j in k + 1..n {
            let sum: f64 = (0..k).map(|p| lower[(k, p)] * upper[(p, j)]).sum();
            upper[(k, j)] = (a[(k, j)] - sum) / lower[(k, k)];
        }

        stages.push(Stage::new(
            k + 1,
            Some(PivotChoice {
                row: k,
                column: k,
                value: divisor,
            }),
            Snapshot::Factors {
                lower: lower.clone(),
                upper: upper.clone(),
            },
        ));
    }
    Ok(())
}

fn split(outcome: NumericResult<DVector<f64>>) -> (Option<DVector<f64>>, Option<NumericError>) {
    match outcome {
        Ok(solution) => (Some(solution), None),
        Err(error) => (None, Some(error)),
    }
}
