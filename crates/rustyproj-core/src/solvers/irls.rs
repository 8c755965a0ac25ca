// =============================================================================
// IRLS: Iteratively Reweighted Least Squares on Pseudo-Responses
// =============================================================================
//
// The projection replaces a submodel's parameters, per posterior draw, with
// the values minimizing KL divergence from the reference draw's predictive
// distribution. Restricted to the families in the registry, that minimizer
// is the weighted maximum-likelihood fit of the reduced design matrix
// against the pseudo-response f = g⁻¹(Xβ_ref), so the solver below is a
// GLM fit whose "observations" are the reference draw's fitted values.
//
// Each iteration:
//
//     1. Working weights    w_i = 1 / (V(μ_i) · g'(μ_i)²)
//     2. Working response   z_i = η_i + (f_i - μ_i) · g'(μ_i)
//     3. Solve              (XᵀWX)β = XᵀWz
//     4. Update             η = Xβ, μ = g⁻¹(η)
//     5. Stop when the relative deviance change falls under the tolerance
//
// The pseudo-response is itself an attainable mean vector, so μ is
// initialized at f directly; for the full subset the very first solve
// reproduces the reference coefficients exactly.
//
// A draw that exhausts the iteration cap is NOT an error: the caller keeps
// the last iterate and attaches a convergence warning. A singular XᵀWX is an
// error (`SingularDesign`): the candidate's design is rank deficient and
// the fit must not be silently regularized.
//
// =============================================================================

use log::debug;
use ndarray::{Array1, Array2};

use crate::constants::WEIGHT_MAX;
use crate::error::{Result, RustyProjError};
use crate::families::Family;
use crate::linalg::SpdFactor;
use crate::projection::ProjectionConfig;

/// Result of one pseudo-response fit.
#[derive(Debug, Clone)]
pub struct PseudoFit {
    /// Fitted submodel coefficients.
    pub coefficients: Array1<f64>,
    /// Fitted values μ = g⁻¹(Xβ) under the submodel.
    pub fitted: Array1<f64>,
    /// Iterations used.
    pub iterations: usize,
    /// Whether the deviance tolerance was reached within the cap.
    pub converged: bool,
}

/// Fit a submodel to a pseudo-response by IRLS.
///
/// # Arguments
/// * `x` - Reduced design matrix (n × k, k ≥ 1)
/// * `target` - Pseudo-response: the reference draw's fitted values (length n)
/// * `family` - Likelihood family shared with the reference model
/// * `config` - Iteration cap, deviance tolerance, weight floor
///
/// # Errors
/// * `SingularDesign` when XᵀWX cannot be factorized
pub fn fit_pseudo_glm(
    x: &Array2<f64>,
    target: &Array1<f64>,
    family: Family,
    config: &ProjectionConfig,
) -> Result<PseudoFit> {
    let n = target.len();
    let k = x.ncols();
    let link = family.link();

    // Initialize at the target itself: it is a valid mean vector, and for
    // nested designs it puts the first iterate close to the optimum.
    let mut mu = family.clamp_mu(target);
    let mut eta = link.link(&mu);
    let mut deviance = family.deviance(target, &mu);
    let mut coefficients = Array1::<f64>::zeros(k);
    let mut converged = false;
    let mut iteration = 0;

    while iteration < config.max_iterations {
        iteration += 1;

        let variance = family.variance(&mu);
        let link_deriv = link.derivative(&mu);

        let weights: Array1<f64> = variance
            .iter()
            .zip(link_deriv.iter())
            .map(|(&v, &d)| (1.0 / (v * d * d)).clamp(config.min_weight, WEIGHT_MAX))
            .collect();

        let working_response: Array1<f64> = eta
            .iter()
            .zip(target.iter())
            .zip(mu.iter())
            .zip(link_deriv.iter())
            .map(|(((&e, &t), &m), &d)| e + (t - m) * d)
            .collect();

        coefficients = solve_weighted_least_squares(x, &working_response, &weights)?;

        eta = x.dot(&coefficients);
        mu = family.clamp_mu(&link.inverse(&eta));

        let deviance_old = deviance;
        deviance = family.deviance(target, &mu);

        let rel_change = if deviance_old.abs() > 1e-10 {
            (deviance_old - deviance).abs() / deviance_old.abs()
        } else {
            (deviance_old - deviance).abs()
        };

        debug!(
            "irls iteration {}: deviance = {:.6e}, rel_change = {:.2e}",
            iteration, deviance, rel_change
        );

        if rel_change < config.tolerance {
            converged = true;
            break;
        }
    }

    debug_assert_eq!(mu.len(), n);
    Ok(PseudoFit { coefficients, fitted: mu, iterations: iteration, converged })
}

/// Solve the weighted least-squares step: minimize Σ w_i (z_i − x_iᵀβ)².
///
/// Forms the normal equations through W^(1/2)-scaled copies of X and z, then
/// factors XᵀWX by Cholesky. A failed factorization is reported as
/// `SingularDesign`.
fn solve_weighted_least_squares(
    x: &Array2<f64>,
    z: &Array1<f64>,
    w: &Array1<f64>,
) -> Result<Array1<f64>> {
    let n = x.nrows();
    let k = x.ncols();

    let mut x_weighted = x.clone();
    let mut z_weighted = z.clone();
    for i in 0..n {
        let sw = w[i].sqrt();
        for j in 0..k {
            x_weighted[[i, j]] *= sw;
        }
        z_weighted[i] *= sw;
    }

    let xtx = x_weighted.t().dot(&x_weighted);
    let xtz = x_weighted.t().dot(&z_weighted);

    let factor = SpdFactor::new(&xtx).ok_or_else(|| {
        RustyProjError::SingularDesign(format!(
            "X'WX is not positive definite for a {}-column design; \
             the candidate's covariates are collinear",
            k
        ))
    })?;
    Ok(factor.solve(&xtz))
}

// =============================================================================
// Tests
// =============================================================================
