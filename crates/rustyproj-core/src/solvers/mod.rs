// =============================================================================
// Projection Solvers
// =============================================================================
//
// The numerical workhorses behind the projection engine:
//
//   - irls:  weighted maximum-likelihood fit of a submodel against a
//            pseudo-response (the reference draw's fitted values). For the
//            exponential-family likelihoods in the registry this fit IS the
//            KL-divergence minimizer, so no divergence integral is ever
//            evaluated.
//   - lasso: coordinate-descent L1 regularization path, used by the L1-path
//            search strategy to order covariates by penalty entry point.
//
// =============================================================================

mod irls;
mod lasso;

pub use irls::{fit_pseudo_glm, PseudoFit};
pub(crate) use lasso::l1_entry_order;
