// =============================================================================
// Predictive Performance Evaluation
// =============================================================================
//
// Each submodel on the search path (and the reference model itself) is scored
// by its expected log predictive density, approximated from the projected
// posterior draws:
//
//     lppd_i = log( (1/S) Σ_s p(y_i | μ_si, φ_s) )      per observation
//     ELPD   = Σ_i lppd_i
//     SE     = sqrt( n · Var(lppd) )
//
// The inner average runs over the S projected draws, so no re-sampling is
// involved; the reference model is scored the same way directly from its own
// posterior draws, without re-projection. The computation is deterministic
// given the draws.
//
// The per-observation mixture average is evaluated in log space with the
// usual max-shift so that very small densities do not underflow.
//
// =============================================================================

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RustyProjError};
use crate::families::Family;
use crate::model::ReferenceModel;
use crate::projection::ProjectedSubmodel;

/// An ELPD estimate with its standard error and the per-observation log
/// predictive densities it was aggregated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    /// Expected log predictive density (higher is better).
    pub elpd: f64,

    /// Standard error of the estimate.
    pub se: f64,

    /// Per-observation log predictive densities, in observation order.
    pub pointwise: Vec<f64>,
}

/// Score a projected submodel against the reference model's response.
///
/// # Errors
/// * `InsufficientDraws` when the submodel carries fewer than two draws
/// * `InvalidSubset` / `DimensionMismatch` when the submodel does not
///   structurally belong to this reference model
pub fn evaluate_submodel(
    model: &ReferenceModel,
    submodel: &ProjectedSubmodel,
) -> Result<PerformanceEstimate> {
    require_draws(submodel.num_draws())?;
    submodel.subset.validate(model.num_covariates())?;
    if submodel.subset_size() != submodel.subset.len() {
        return Err(RustyProjError::DimensionMismatch(format!(
            "submodel carries {} coefficients for a subset of {} covariates",
            submodel.subset_size(),
            submodel.subset.len()
        )));
    }
    let x_sub = model.reduced_design(&submodel.subset);
    Ok(elpd_from_draws(
        &x_sub,
        &submodel.coefficients,
        submodel.dispersion.as_ref(),
        submodel.family,
        model.response(),
    ))
}

/// Score the reference model directly from its own posterior draws.
///
/// # Errors
/// * `InsufficientDraws` when the reference carries fewer than two draws
pub fn evaluate_reference(model: &ReferenceModel) -> Result<PerformanceEstimate> {
    require_draws(model.num_draws())?;
    Ok(elpd_from_draws(
        model.design(),
        model.draws(),
        model.dispersion(),
        model.family(),
        model.response(),
    ))
}

fn require_draws(s: usize) -> Result<()> {
    if s < 2 {
        return Err(RustyProjError::InsufficientDraws(format!(
            "{} draw(s); at least 2 are needed for a standard error",
            s
        )));
    }
    Ok(())
}

/// Shared ELPD kernel over an arbitrary (design, draws) pair.
fn elpd_from_draws(
    x: &Array2<f64>,
    draws: &Array2<f64>,
    dispersion: Option<&Array1<f64>>,
    family: Family,
    y: &Array1<f64>,
) -> PerformanceEstimate {
    let s = draws.nrows();
    let n = y.len();
    let link = family.link();

    let mut log_densities = Array2::<f64>::zeros((s, n));
    for d in 0..s {
        let eta = x.dot(&draws.row(d));
        let mu = family.clamp_mu(&link.inverse(&eta));
        let disp = dispersion.map(|v| v[d]);
        for i in 0..n {
            log_densities[[d, i]] = family.log_density(y[i], mu[i], disp);
        }
    }

    let pointwise: Vec<f64> = (0..n).map(|i| log_mean_exp(log_densities.column(i))).collect();
    let elpd: f64 = pointwise.iter().sum();

    let se = if n > 1 {
        let mean = elpd / n as f64;
        let var = pointwise.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
            / (n as f64 - 1.0);
        (n as f64 * var).sqrt()
    } else {
        0.0
    };

    PerformanceEstimate { elpd, se, pointwise }
}

/// log( (1/m) Σ exp(v_i) ), shifted by the maximum for stability.
fn log_mean_exp(values: ArrayView1<f64>) -> f64 {
    let m = values.len() as f64;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + (sum / m).ln()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CovariateSubset;
    use crate::projection::{project, ProjectionConfig};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn names(p: usize) -> Vec<String> {
        (0..p).map(|i| format!("x{}", i)).collect()
    }

    /// Gaussian reference with clear signal in both covariates and a small
    /// cloud of draws around the generating coefficients.
    fn signal_model() -> ReferenceModel {
        let n = 40;
        let mut x = Array2::<f64>::zeros((n, 2));
        for i in 0..n {
            let t = i as f64;
            x[[i, 0]] = 1.0;
            x[[i, 1]] = (t * 0.9).sin() * 2.0;
        }
        let beta = array![0.5, 1.5];
        let y = x.dot(&beta);

        // deterministic draw cloud around beta
        let offsets = [-0.06, -0.02, 0.02, 0.06];
        let mut draws = Array2::<f64>::zeros((offsets.len(), 2));
        for (d, off) in offsets.iter().enumerate() {
            draws[[d, 0]] = beta[0] + off;
            draws[[d, 1]] = beta[1] - off;
        }
        let sigma = Array1::from_elem(offsets.len(), 1.0);
        ReferenceModel::new(x, y, names(2), Family::Gaussian, draws, Some(sigma)).unwrap()
    }

    #[test]
    fn test_log_mean_exp_matches_direct_average() {
        let v = array![2.0f64.ln(), 4.0f64.ln()];
        assert_abs_diff_eq!(log_mean_exp(v.view()), 3.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_mean_exp_handles_large_magnitudes() {
        let v = array![-1000.0, -1000.0];
        assert_abs_diff_eq!(log_mean_exp(v.view()), -1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_draw_is_insufficient() {
        let x = array![[1.0], [1.0]];
        let y = array![0.0, 1.0];
        let draws = array![[0.5]];
        let model =
            ReferenceModel::new(x, y, names(1), Family::Gaussian, draws, Some(array![1.0]))
                .unwrap();
        let err = evaluate_reference(&model).unwrap_err();
        assert!(matches!(err, RustyProjError::InsufficientDraws(_)));
    }

    #[test]
    fn test_reference_and_full_submodel_agree() {
        let model = signal_model();
        let reference = evaluate_reference(&model).unwrap();
        let full = ProjectedSubmodel::from_reference(&model);
        let as_submodel = evaluate_submodel(&model, &full).unwrap();
        assert_abs_diff_eq!(reference.elpd, as_submodel.elpd, epsilon = 1e-12);
        assert_abs_diff_eq!(reference.se, as_submodel.se, epsilon = 1e-12);
    }

    #[test]
    fn test_null_model_scores_below_reference() {
        let model = signal_model();
        let reference = evaluate_reference(&model).unwrap();
        let null = project(&model, &CovariateSubset::empty(), &ProjectionConfig::default())
            .unwrap();
        let null_est = evaluate_submodel(&model, &null).unwrap();
        assert!(null_est.elpd < reference.elpd);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let model = signal_model();
        let a = evaluate_reference(&model).unwrap();
        let b = evaluate_reference(&model).unwrap();
        assert_eq!(a.elpd, b.elpd);
        assert_eq!(a.se, b.se);
        assert_eq!(a.pointwise, b.pointwise);
    }

    #[test]
    fn test_pointwise_sums_to_elpd() {
        let model = signal_model();
        let est = evaluate_reference(&model).unwrap();
        assert_eq!(est.pointwise.len(), model.num_obs());
        assert_abs_diff_eq!(est.pointwise.iter().sum::<f64>(), est.elpd, epsilon = 1e-12);
    }
}
