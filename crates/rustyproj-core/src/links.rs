// =============================================================================
// Link Functions
// =============================================================================
//
// A link function g connects the mean of the response to the linear predictor:
//
//     g(μ) = η = Xβ
//
// Each supported family has one canonical link, so the set of links is closed
// and dispatch is a plain match on the tag:
//
//   - Identity:  η = μ                  (Gaussian)
//   - Logit:     η = ln(μ / (1 - μ))    (Bernoulli)
//   - Log:       η = ln(μ)              (Poisson)
//
// Every method is a pure function. Inputs are clamped before logarithms and
// exponentials so evaluations stay finite at the extremes of the predictor
// range (see `constants`).
//
// =============================================================================

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::constants::{ETA_EXP_MAX, MU_MAX_PROBABILITY, MU_MIN_POSITIVE, MU_MIN_PROBABILITY};

/// Canonical link functions for the supported families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    Identity,
    Logit,
    Log,
}

impl Link {
    /// Human-readable link name.
    pub fn name(&self) -> &'static str {
        match self {
            Link::Identity => "identity",
            Link::Logit => "logit",
            Link::Log => "log",
        }
    }

    /// Apply the link: η = g(μ).
    pub fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => mu.clone(),
            Link::Logit => mu.mapv(|m| {
                let m = m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                (m / (1.0 - m)).ln()
            }),
            Link::Log => mu.mapv(|m| m.max(MU_MIN_POSITIVE).ln()),
        }
    }

    /// Apply the inverse link: μ = g⁻¹(η).
    pub fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => eta.clone(),
            Link::Logit => eta.mapv(inv_logit),
            Link::Log => eta.mapv(|e| e.clamp(-ETA_EXP_MAX, ETA_EXP_MAX).exp()),
        }
    }

    /// Link derivative dη/dμ = g'(μ), used for IRLS working weights and the
    /// working response.
    pub fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        match self {
            Link::Identity => Array1::ones(mu.len()),
            Link::Logit => mu.mapv(|m| {
                let m = m.clamp(MU_MIN_PROBABILITY, MU_MAX_PROBABILITY);
                1.0 / (m * (1.0 - m))
            }),
            Link::Log => mu.mapv(|m| 1.0 / m.max(MU_MIN_POSITIVE)),
        }
    }
}

/// Numerically stable inverse logit.
///
/// Evaluates exp only on a non-positive argument so it never overflows.
#[inline]
pub(crate) fn inv_logit(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
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
    fn test_identity_roundtrip() {
        let mu = array![-2.0, 0.0, 3.5];
        let eta = Link::Identity.link(&mu);
        assert_eq!(eta, mu);
        assert_eq!(Link::Identity.inverse(&eta), mu);
    }

    #[test]
    fn test_logit_roundtrip() {
        let mu = array![0.01, 0.25, 0.5, 0.75, 0.99];
        let eta = Link::Logit.link(&mu);
        let back = Link::Logit.inverse(&eta);
        for (m, b) in mu.iter().zip(back.iter()) {
            assert_abs_diff_eq!(m, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_roundtrip() {
        let mu = array![0.1, 1.0, 10.0, 250.0];
        let eta = Link::Log.link(&mu);
        let back = Link::Log.inverse(&eta);
        for (m, b) in mu.iter().zip(back.iter()) {
            assert_abs_diff_eq!(m, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_inverse_logit_extreme_predictors_stay_finite() {
        let eta = array![-800.0, -40.0, 0.0, 40.0, 800.0];
        let mu = Link::Logit.inverse(&eta);
        assert!(mu.iter().all(|m| m.is_finite() && *m >= 0.0 && *m <= 1.0));
        assert_abs_diff_eq!(mu[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_log_inverse_clamps_overflow() {
        let eta = array![1e4];
        let mu = Link::Log.inverse(&eta);
        assert!(mu[0].is_finite());
    }

    #[test]
    fn test_logit_derivative_matches_formula() {
        let mu = array![0.2];
        let d = Link::Logit.derivative(&mu);
        assert_abs_diff_eq!(d[0], 1.0 / (0.2 * 0.8), epsilon = 1e-12);
    }
}
