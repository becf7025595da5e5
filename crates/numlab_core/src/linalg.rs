//! Dense linear algebra: direct and iterative solvers for `A x = b`, plus Vandermonde
//! interpolation built on top of the direct solvers.

mod direct;
mod iterative;
mod matrix;
mod vandermonde;

pub use direct::{
    solve_direct, DecompositionResult, DirectMethod, PivotChoice, Snapshot, Stage,
};
pub use iterative::{
    iteration_matrices, solve_iterative, IterationStep, IterativeMethod, IterativeSettings,
    IterativeSolveResult,
};
pub use matrix::{
    back_substitution, forward_substitution, from_rows, require_len, require_square,
    spectral_radius, to_rows, vector_from, Norm,
};
pub use vandermonde::{interpolate, vandermonde_matrix, Polynomial, VandermondeResult};
