// =============================================================================
// Numerical Constants
// =============================================================================
//
// Shared clamps applied before logarithms, divisions, and exponentials so
// that family evaluations stay finite at link extremes.
//
// =============================================================================

/// Smallest mean value for families requiring μ > 0 (Poisson).
pub const MU_MIN_POSITIVE: f64 = 1e-10;

/// Smallest probability for the Bernoulli family.
pub const MU_MIN_PROBABILITY: f64 = 1e-10;

/// Largest probability for the Bernoulli family.
pub const MU_MAX_PROBABILITY: f64 = 1.0 - 1e-10;

/// Linear predictors are clamped to ±ETA_EXP_MAX before exponentiation.
pub const ETA_EXP_MAX: f64 = 700.0;

/// Upper clip for IRLS working weights.
pub const WEIGHT_MAX: f64 = 1e10;

/// ln(2π), used by the Gaussian log-density.
pub const LN_TWO_PI: f64 = 1.837_877_066_409_345_3;
