// =============================================================================
// Error Types
// =============================================================================
//
// All fallible operations in the crate return `Result<T>` with this error
// enum. The taxonomy mirrors the failure modes of the selection procedure:
//
//   - DimensionMismatch:  input shapes disagree (design/response/draws)
//   - EmptyPosterior:     a reference model with zero posterior draws
//   - UnsupportedFamily:  an unknown likelihood family tag
//   - InvalidSubset:      a covariate subset referencing columns outside the
//                         reference design matrix
//   - SingularDesign:     a rank-deficient reduced design matrix; surfaced to
//                         the caller instead of being silently regularized
//   - InsufficientDraws:  too few draws to compute a standard error
//
// Convergence-cap hits during per-draw fits are NOT errors: they are attached
// to the projected submodel as warnings (see `projection::ConvergenceWarning`)
// so a complete result is still returned.
//
// =============================================================================

use thiserror::Error;

/// Errors produced by the projection and selection procedures.
#[derive(Debug, Error)]
pub enum RustyProjError {
    /// Input array shapes disagree with each other.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The posterior draw collection is empty.
    #[error("reference model has no posterior draws")]
    EmptyPosterior,

    /// The requested likelihood family is not in the registry.
    #[error("unsupported family '{0}'; use 'gaussian', 'bernoulli', or 'poisson'")]
    UnsupportedFamily(String),

    /// A covariate subset references indices outside the reference model.
    #[error("invalid covariate subset: {0}")]
    InvalidSubset(String),

    /// The reduced design matrix is rank deficient.
    #[error("singular design: {0}")]
    SingularDesign(String),

    /// Too few posterior draws for the requested estimate.
    #[error("insufficient draws: {0}")]
    InsufficientDraws(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RustyProjError>;
