// =============================================================================
// Posterior Projection
// =============================================================================
//
// Projection maps one reference posterior draw onto a candidate covariate
// subset: the projected parameters are the values minimizing KL divergence
// from that draw's predictive distribution to the submodel's predictive
// distribution. For the exponential-family likelihoods in the registry the
// minimizer is a weighted maximum-likelihood fit of the reduced design
// matrix against the draw's fitted values f_d = g⁻¹(X·β_d):
//
//   - Gaussian:           ordinary least squares of f_d on X_subset. The
//                         normal-equation matrix is the same for every draw,
//                         so it is factorized once and solved S times.
//   - Bernoulli/Poisson:  IRLS with f_d as the pseudo-response (see
//                         `solvers::irls`), capped at a fixed iteration
//                         budget per draw.
//
// Draws are mutually independent: each reads the shared reference model and
// writes only its own output slot, so the loop is a rayon parallel map with
// a single gather at the end. `project` is a pure function of its inputs.
//
// Dispersion families carry the projected dispersion alongside the
// coefficients. For the Gaussian family the projection has the closed form
//
//     σ⊥² = σ_d² + ‖f_d − f⊥_d‖² / n
//
// which inflates the reference dispersion by the mean squared distance
// between the reference and submodel fits.
//
// =============================================================================

use log::warn;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RustyProjError};
use crate::families::Family;
use crate::linalg::SpdFactor;
use crate::model::{CovariateSubset, ReferenceModel};
use crate::solvers::fit_pseudo_glm;

// =============================================================================
// Configuration
// =============================================================================

/// Controls for the per-draw projection fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Iteration cap for non-Gaussian per-draw IRLS fits.
    /// Exceeding the cap degrades to a warning, never a hang.
    pub max_iterations: usize,

    /// Relative deviance-change tolerance declaring a fit converged.
    pub tolerance: f64,

    /// Floor for IRLS working weights.
    pub min_weight: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { max_iterations: 50, tolerance: 1e-8, min_weight: 1e-10 }
    }
}

// =============================================================================
// Projected Submodel
// =============================================================================

/// A per-draw fit that exhausted the iteration cap. Attached to the result,
/// never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    /// Index of the affected posterior draw.
    pub draw: usize,
    /// Iterations spent before giving up.
    pub iterations: usize,
}

/// The projection of every reference posterior draw onto one covariate
/// subset. Created by `project` and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectedSubmodel {
    /// The covariate subset this submodel is restricted to.
    pub subset: CovariateSubset,

    /// Likelihood family, shared with the reference model.
    pub family: Family,

    /// Projected coefficients, one row per posterior draw (S × |subset|).
    pub coefficients: Array2<f64>,

    /// Projected per-draw dispersion for dispersion families.
    pub dispersion: Option<Array1<f64>>,

    /// Draws whose fit hit the iteration cap.
    pub warnings: Vec<ConvergenceWarning>,

    /// Mean per-draw projection objective (negative log-likelihood of the
    /// reference fitted values under the submodel fit); the submodel's
    /// distance to the reference. Zero for the reference itself.
    pub divergence: f64,
}

impl ProjectedSubmodel {
    /// Number of posterior draws carried.
    pub fn num_draws(&self) -> usize {
        self.coefficients.nrows()
    }

    /// Number of covariates in the subset.
    pub fn subset_size(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Posterior-mean projected coefficients.
    pub fn mean_coefficients(&self) -> Array1<f64> {
        self.coefficients
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.subset_size()))
    }

    /// Posterior-mean projected dispersion, when the family carries one.
    pub fn mean_dispersion(&self) -> Option<f64> {
        self.dispersion.as_ref().map(|d| d.sum() / d.len() as f64)
    }

    /// The reference model viewed as the full-subset submodel.
    ///
    /// Projecting onto the unrestricted space is the identity, so the
    /// reference draws are reused verbatim with zero divergence.
    pub fn from_reference(model: &ReferenceModel) -> Self {
        Self {
            subset: CovariateSubset::full(model.num_covariates()),
            family: model.family(),
            coefficients: model.draws().clone(),
            dispersion: model.dispersion().cloned(),
            warnings: Vec::new(),
            divergence: 0.0,
        }
    }
}

// =============================================================================
// Projection
// =============================================================================

/// One draw's projection output before the gather.
struct DrawFit {
    coefficients: Array1<f64>,
    dispersion: Option<f64>,
    objective: f64,
    warning: Option<ConvergenceWarning>,
}

/// Project the reference posterior onto a candidate covariate subset.
///
/// # Arguments
/// * `model` - The reference model (read-only, shared across workers)
/// * `subset` - Candidate subset of covariate indices
/// * `config` - Per-draw fit controls
///
/// # Returns
/// A `ProjectedSubmodel` with exactly one projected coefficient vector per
/// reference draw. Draws that hit the iteration cap contribute a
/// best-effort fit plus an attached `ConvergenceWarning`; no draw is ever
/// dropped.
///
/// # Errors
/// * `InvalidSubset` when the subset references a covariate index ≥ p
/// * `SingularDesign` when the reduced design matrix is rank deficient
pub fn project(
    model: &ReferenceModel,
    subset: &CovariateSubset,
    config: &ProjectionConfig,
) -> Result<ProjectedSubmodel> {
    subset.validate(model.num_covariates())?;

    let s = model.num_draws();
    let k = subset.len();
    let n = model.num_obs();
    let x_sub = model.reduced_design(subset);
    let family = model.family();

    let fits: Vec<DrawFit> = match family {
        Family::Gaussian => {
            // One factorization of X_subᵀX_sub serves every draw.
            let factor = if k > 0 {
                Some(SpdFactor::new(&x_sub.t().dot(&x_sub)).ok_or_else(|| {
                    RustyProjError::SingularDesign(format!(
                        "reduced design for subset {} is rank deficient",
                        subset
                    ))
                })?)
            } else {
                None
            };
            let sigmas = model
                .dispersion()
                .expect("the adapter guarantees dispersion for the Gaussian family");

            (0..s)
                .into_par_iter()
                .map(|d| {
                    let f = model.fitted_for_draw(d);
                    let coefficients = match &factor {
                        Some(fac) => fac.solve(&x_sub.t().dot(&f)),
                        None => Array1::zeros(0),
                    };
                    let f_perp = x_sub.dot(&coefficients);
                    let ssq = f
                        .iter()
                        .zip(f_perp.iter())
                        .map(|(&a, &b)| (a - b) * (a - b))
                        .sum::<f64>();
                    let sigma = (sigmas[d] * sigmas[d] + ssq / n as f64).sqrt();
                    let objective = family.neg_log_lik(&f, &f_perp, Some(sigma));
                    DrawFit {
                        coefficients,
                        dispersion: Some(sigma),
                        objective,
                        warning: None,
                    }
                })
                .collect()
        }
        Family::Bernoulli | Family::Poisson => {
            let collected: Result<Vec<DrawFit>> = (0..s)
                .into_par_iter()
                .map(|d| -> Result<DrawFit> {
                    let f = model.fitted_for_draw(d);
                    if k == 0 {
                        // Null model: the linear predictor is identically
                        // zero, nothing to fit.
                        let mu =
                            family.clamp_mu(&family.link().inverse(&Array1::zeros(n)));
                        return Ok(DrawFit {
                            coefficients: Array1::zeros(0),
                            dispersion: None,
                            objective: family.neg_log_lik(&f, &mu, None),
                            warning: None,
                        });
                    }
                    let fit = fit_pseudo_glm(&x_sub, &f, family, config)?;
                    let warning = if fit.converged {
                        None
                    } else {
                        Some(ConvergenceWarning { draw: d, iterations: fit.iterations })
                    };
                    let objective = family.neg_log_lik(&f, &fit.fitted, None);
                    Ok(DrawFit {
                        coefficients: fit.coefficients,
                        dispersion: None,
                        objective,
                        warning,
                    })
                })
                .collect();
            collected?
        }
    };

    // Gather per-draw results into the submodel's owned arrays.
    let mut coefficients = Array2::<f64>::zeros((s, k));
    for (d, fit) in fits.iter().enumerate() {
        coefficients.row_mut(d).assign(&fit.coefficients);
    }
    let dispersion = if family.has_dispersion() {
        Some(fits.iter().map(|f| f.dispersion.unwrap_or(f64::NAN)).collect())
    } else {
        None
    };
    let warnings: Vec<ConvergenceWarning> =
        fits.iter().filter_map(|f| f.warning.clone()).collect();
    let divergence = fits.iter().map(|f| f.objective).sum::<f64>() / s as f64;

    if !warnings.is_empty() {
        warn!(
            "projection onto subset {}: {}/{} draws hit the iteration cap",
            subset,
            warnings.len(),
            s
        );
    }

    Ok(ProjectedSubmodel { subset: subset.clone(), family, coefficients, dispersion, warnings, divergence })
}

// =============================================================================
// Tests
// =============================================================================
