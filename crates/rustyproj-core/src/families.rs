// =============================================================================
// Likelihood Families
// =============================================================================
//
// The family registry for the selection procedure. A family bundles:
//
//   - the canonical link function
//   - the variance function V(μ), which drives IRLS working weights
//   - the unit deviance, used as the fitting objective and convergence
//     criterion
//   - the pointwise log predictive density, used for ELPD estimation
//
// The supported set is fixed and enumerable, so families are a closed tagged
// union rather than an open trait: every numerical routine dispatches on the
// tag with an exhaustive match.
//
// DEVIANCE WITH CONTINUOUS PSEUDO-RESPONSES
// -----------------------------------------
// The projection fits each submodel against the reference model's fitted
// values, not against raw observations. For Bernoulli that means the
// "response" is a probability in (0, 1) and for Poisson a positive rate.
// The unit-deviance formulas below are written with x·ln(x) handled at
// x = 0, so they are valid for these fractional targets as well as for
// observed 0/1 and count data.
//
// =============================================================================

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

use crate::constants::{
    LN_TWO_PI, MU_MAX_PROBABILITY, MU_MIN_POSITIVE, MU_MIN_PROBABILITY,
};
use crate::error::{Result, RustyProjError};
use crate::links::Link;

/// Supported likelihood families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    Gaussian,
    Bernoulli,
    Poisson,
}

impl Family {
    /// Look up a family by name.
    ///
    /// Matching is case-insensitive and accepts the usual aliases
    /// ("normal" for Gaussian, "binomial" for Bernoulli). Unknown names fail
    /// with `UnsupportedFamily` instead of silently defaulting.
    pub fn from_name(name: &str) -> Result<Family> {
        match name.to_lowercase().as_str() {
            "gaussian" | "normal" => Ok(Family::Gaussian),
            "bernoulli" | "binomial" => Ok(Family::Bernoulli),
            "poisson" => Ok(Family::Poisson),
            _ => Err(RustyProjError::UnsupportedFamily(name.to_string())),
        }
    }

    /// Human-readable family name.
    pub fn name(&self) -> &'static str {
        match self {
            Family::Gaussian => "gaussian",
            Family::Bernoulli => "bernoulli",
            Family::Poisson => "poisson",
        }
    }

    /// The canonical link for this family.
    pub fn link(&self) -> Link {
        match self {
            Family::Gaussian => Link::Identity,
            Family::Bernoulli => Link::Logit,
            Family::Poisson => Link::Log,
        }
    }

    /// Whether the family carries a per-draw dispersion parameter.
    pub fn has_dispersion(&self) -> bool {
        matches!(self, Family::Gaussian)
    }

    /// Variance function V(μ).
    pub fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Family::Gaussian => Array1::ones(mu.len()),
            Family::Bernoulli => mu.mapv(|m| {
                let m = m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                m * (1.0 - m)
            }),
            Family::Poisson => mu.mapv(|m| m.max(MU_MIN_POSITIVE)),
        }
    }

    /// Clamp a mean vector into the family's valid range.
    pub fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Family::Gaussian => mu.clone(),
            Family::Bernoulli => {
                mu.mapv(|m| m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY))
            }
            Family::Poisson => mu.mapv(|m| m.max(MU_MIN_POSITIVE)),
        }
    }

    /// Per-observation deviance contribution.
    pub fn unit_deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Family::Gaussian => {
                y.iter().zip(mu.iter()).map(|(&yi, &mi)| (yi - mi).powi(2)).collect()
            }
            Family::Bernoulli => y
                .iter()
                .zip(mu.iter())
                .map(|(&yi, &mi)| {
                    let mi = mi.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                    2.0 * (xlogy(yi, yi / mi) + xlogy(1.0 - yi, (1.0 - yi) / (1.0 - mi)))
                })
                .collect(),
            Family::Poisson => y
                .iter()
                .zip(mu.iter())
                .map(|(&yi, &mi)| {
                    let mi = mi.max(MU_MIN_POSITIVE);
                    2.0 * (xlogy(yi, yi / mi) - (yi - mi))
                })
                .collect(),
        }
    }

    /// Total deviance: the sum of unit deviances.
    pub fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> f64 {
        self.unit_deviance(y, mu).sum()
    }

    /// Pointwise log predictive density log p(y | μ, φ).
    ///
    /// The dispersion argument is the Gaussian standard deviation; it is
    /// ignored by Bernoulli and Poisson, and defaults to 1.0 for Gaussian
    /// when absent.
    pub fn log_density(&self, y: f64, mu: f64, dispersion: Option<f64>) -> f64 {
        match self {
            Family::Gaussian => {
                let sigma = dispersion.unwrap_or(1.0).max(MU_MIN_POSITIVE);
                let z = (y - mu) / sigma;
                -0.5 * (LN_TWO_PI + 2.0 * sigma.ln() + z * z)
            }
            Family::Bernoulli => {
                let m = mu.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                y * m.ln() + (1.0 - y) * (1.0 - m).ln()
            }
            Family::Poisson => {
                let m = mu.max(MU_MIN_POSITIVE);
                y * m.ln() - m - ln_gamma(y + 1.0)
            }
        }
    }

    /// Aggregate negative log-likelihood of a response vector under fitted
    /// means, used as the projection objective and the search-time proxy
    /// metric.
    pub fn neg_log_lik(
        &self,
        y: &Array1<f64>,
        mu: &Array1<f64>,
        dispersion: Option<f64>,
    ) -> f64 {
        y.iter()
            .zip(mu.iter())
            .map(|(&yi, &mi)| -self.log_density(yi, mi, dispersion))
            .sum()
    }
}

/// x·ln(y) with the x = 0 limit handled (0·ln(anything) = 0).
#[inline]
fn xlogy(x: f64, y: f64) -> f64 {
    if x == 0.0 { 0.0 } else { x * y.ln() }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(Family::from_name("gaussian").unwrap(), Family::Gaussian);
        assert_eq!(Family::from_name("Normal").unwrap(), Family::Gaussian);
        assert_eq!(Family::from_name("binomial").unwrap(), Family::Bernoulli);
        assert_eq!(Family::from_name("BERNOULLI").unwrap(), Family::Bernoulli);
        assert_eq!(Family::from_name("poisson").unwrap(), Family::Poisson);
    }

    #[test]
    fn test_from_name_unknown_fails() {
        let err = Family::from_name("weibull").unwrap_err();
        assert!(matches!(err, RustyProjError::UnsupportedFamily(_)));
    }

    #[test]
    fn test_canonical_links() {
        assert_eq!(Family::Gaussian.link(), Link::Identity);
        assert_eq!(Family::Bernoulli.link(), Link::Logit);
        assert_eq!(Family::Poisson.link(), Link::Log);
    }

    #[test]
    fn test_gaussian_log_density_matches_formula() {
        // log N(1.0 | 0.0, 2.0)
        let ld = Family::Gaussian.log_density(1.0, 0.0, Some(2.0));
        let expected = -0.5 * ((2.0 * std::f64::consts::PI * 4.0f64).ln() + 0.25);
        assert_abs_diff_eq!(ld, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_bernoulli_log_density_at_extremes_is_finite() {
        // μ clamped away from {0, 1} before the logarithm
        assert!(Family::Bernoulli.log_density(1.0, 0.0, None).is_finite());
        assert!(Family::Bernoulli.log_density(0.0, 1.0, None).is_finite());
    }

    #[test]
    fn test_poisson_log_density_matches_pmf() {
        // log P(3 | μ = 2) = 3 ln 2 - 2 - ln 3!
        let ld = Family::Poisson.log_density(3.0, 2.0, None);
        let expected = 3.0 * 2.0f64.ln() - 2.0 - 6.0f64.ln();
        assert_abs_diff_eq!(ld, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_deviance_zero_at_saturation() {
        let y = array![0.0, 0.5, 1.0];
        let dev = Family::Bernoulli.unit_deviance(&y, &y);
        for d in dev.iter() {
            assert_abs_diff_eq!(*d, 0.0, epsilon = 1e-8);
        }

        let y = array![0.5, 2.0, 7.0];
        let dev = Family::Poisson.unit_deviance(&y, &y);
        for d in dev.iter() {
            assert_abs_diff_eq!(*d, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_poisson_unit_deviance_fractional_target() {
        // valid for continuous pseudo-responses, not just counts
        let y = array![0.3];
        let mu = array![0.7];
        let dev = Family::Poisson.unit_deviance(&y, &mu);
        let expected = 2.0 * (0.3 * (0.3f64 / 0.7).ln() - (0.3 - 0.7));
        assert_abs_diff_eq!(dev[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_variance_functions() {
        let mu = array![0.25];
        assert_abs_diff_eq!(Family::Gaussian.variance(&mu)[0], 1.0);
        assert_abs_diff_eq!(Family::Bernoulli.variance(&mu)[0], 0.25 * 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(Family::Poisson.variance(&mu)[0], 0.25, epsilon = 1e-12);
    }
}
