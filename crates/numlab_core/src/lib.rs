/// The `numlab_core` crate is the numerical engine behind the Numlab calculator.
/// Every solver records its intermediate work, so callers can show a full trace of
/// how a result was reached and not just the final value.
///
/// Key components:
/// - **Expression**: parser and bytecode VM for user-typed functions of `x`.
/// - **Roots**: seven scalar root-finding methods sharing one trace format.
/// - **Linalg**: direct and iterative linear solvers plus Vandermonde interpolation.
/// - **Requests**: the serializable request/response boundary used by front ends.
pub mod error;
pub mod expression;
pub mod linalg;
pub mod requests;
pub mod roots;
pub mod traits;
