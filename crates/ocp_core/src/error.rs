//! Typed errors returned at the public solver boundary.
//!
//! Internal helpers that chain several fallible steps (Newton-style
//! corrections, linear solves) use [`anyhow::Result`] with `.context(..)`
//! and are converted to [`OcpError`] at the boundary, mirroring how the
//! upstream `equilibrium::solve_equilibrium` Newton loop layers `anyhow`
//! context over `bail!` before returning to its caller.
//!
//! `InfeasibleInitialGuess` and `LineSearchExhausted` are deliberately not
//! variants here: both are
//! non-fatal and recovered locally (slack lifting, accepting the smallest
//! trial step), so they are reported via `tracing::warn!` and the
//! iteration report's `made_progress`/`StalledStep` fields rather than
//! returned as `Err`.

use thiserror::Error;

/// Errors surfaced across the public solver API.
#[derive(Debug, Error)]
pub enum OcpError {
    /// A vector/matrix argument size disagrees with `nq`, `nv`, or the
    /// active `dimf` for its stage.
    #[error("invalid dimension: expected {expected}, got {got} ({what})")]
    InvalidDimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Cholesky of the `(a, f)` Hessian failed once; the caller has not
    /// yet retried with `epsilon * I` regularization. Recovered locally
    /// by the driver and logged, never returned across the public boundary
    /// on its own — escalates to [`FactorizationFailed`](Self::FactorizationFailed)
    /// if the regularized retry also fails.
    #[error("(a,f) saddle block at stage {stage} is not positive definite")]
    NonPositiveDefiniteBlock { stage: usize },

    /// Cholesky/elimination of the `(a, f)` Hessian failed even after one
    /// `epsilon * I` regularization retry.
    #[error("factorization of the (a,f) saddle block failed at stage {stage} after regularization retry")]
    FactorizationFailed { stage: usize },

    /// `dtau`, `T`, or `N` violate their domain at construction.
    #[error("domain error: {0}")]
    DomainError(String),
}

pub type Result<T> = std::result::Result<T, OcpError>;
