// =============================================================================
// Reference Model Adapter
// =============================================================================
//
// The adapter wraps an externally-fitted Bayesian GLM into the normalized
// in-core representation the rest of the procedure reads:
//
//   - design matrix X (n observations × p covariates)
//   - response vector y (length n)
//   - likelihood family
//   - S posterior coefficient draws (S × p), plus a per-draw dispersion
//     vector for dispersion families
//
// Construction is intentionally thin: shape and uniqueness validation only,
// no numerical work. Sampling, formula parsing, and prior specification are
// the fitting collaborator's responsibility. After validation the model is
// immutable and safely shared by reference across parallel workers.
//
// If the modeller wants an intercept, it arrives as a ones column of the
// design matrix like any other covariate; the engine gives it no special
// treatment.
//
// =============================================================================

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RustyProjError};
use crate::families::Family;

// =============================================================================
// Covariate Subsets
// =============================================================================

/// A set of covariate indices identifying one candidate submodel.
///
/// Indices are kept sorted and deduplicated, so two subsets with the same
/// members compare equal regardless of construction order. The empty subset
/// (the null model) and the full subset (the reference itself) are always
/// valid members of the search space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CovariateSubset {
    indices: Vec<usize>,
}

impl CovariateSubset {
    /// The empty subset.
    pub fn empty() -> Self {
        Self { indices: Vec::new() }
    }

    /// The full subset {0, …, p−1}.
    pub fn full(p: usize) -> Self {
        Self { indices: (0..p).collect() }
    }

    /// Build a subset from arbitrary indices (sorted and deduplicated).
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// A new subset with one covariate added.
    pub fn with_added(&self, index: usize) -> Self {
        let mut indices = self.indices.clone();
        indices.push(index);
        Self::new(indices)
    }

    /// The member indices, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Check every member against the covariate count of a reference model.
    pub fn validate(&self, num_covariates: usize) -> Result<()> {
        if let Some(&bad) = self.indices.iter().find(|&&i| i >= num_covariates) {
            return Err(RustyProjError::InvalidSubset(format!(
                "index {} out of range for a model with {} covariates",
                bad, num_covariates
            )));
        }
        Ok(())
    }

    /// True when `other` is `self` plus exactly one covariate.
    pub fn is_parent_of(&self, other: &CovariateSubset) -> bool {
        other.len() == self.len() + 1 && self.indices.iter().all(|i| other.contains(*i))
    }
}

impl std::fmt::Display for CovariateSubset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (k, i) in self.indices.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", i)?;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Reference Model
// =============================================================================

/// The fully-fit reference model in its normalized in-core form.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    x: Array2<f64>,
    y: Array1<f64>,
    names: Vec<String>,
    family: Family,
    draws: Array2<f64>,
    dispersion: Option<Array1<f64>>,
}

impl ReferenceModel {
    /// Adapt an externally-fitted model.
    ///
    /// # Arguments
    /// * `x` - Design matrix (n × p)
    /// * `y` - Response vector (length n)
    /// * `names` - Unique covariate names (length p)
    /// * `family` - Likelihood family
    /// * `draws` - Posterior coefficient draws (S × p, one row per draw)
    /// * `dispersion` - Per-draw dispersion (length S); required for
    ///   dispersion families (Gaussian), rejected otherwise
    ///
    /// # Errors
    /// * `DimensionMismatch` when any shape or name constraint is violated
    /// * `EmptyPosterior` when `draws` has no rows
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        names: Vec<String>,
        family: Family,
        draws: Array2<f64>,
        dispersion: Option<Array1<f64>>,
    ) -> Result<Self> {
        let (n, p) = (x.nrows(), x.ncols());

        if n == 0 || p == 0 {
            return Err(RustyProjError::DimensionMismatch(format!(
                "design matrix must be non-empty, got {} rows x {} columns",
                n, p
            )));
        }
        if y.len() != n {
            return Err(RustyProjError::DimensionMismatch(format!(
                "X has {} rows but y has {} elements",
                n,
                y.len()
            )));
        }
        if names.len() != p {
            return Err(RustyProjError::DimensionMismatch(format!(
                "X has {} columns but {} covariate names were given",
                p,
                names.len()
            )));
        }
        for (i, a) in names.iter().enumerate() {
            if names[..i].contains(a) {
                return Err(RustyProjError::DimensionMismatch(format!(
                    "covariate names must be unique, '{}' appears twice",
                    a
                )));
            }
        }
        if draws.nrows() == 0 {
            return Err(RustyProjError::EmptyPosterior);
        }
        if draws.ncols() != p {
            return Err(RustyProjError::DimensionMismatch(format!(
                "X has {} columns but draws have length {}",
                p,
                draws.ncols()
            )));
        }
        match (&dispersion, family.has_dispersion()) {
            (Some(d), true) => {
                if d.len() != draws.nrows() {
                    return Err(RustyProjError::DimensionMismatch(format!(
                        "{} draws but {} dispersion values",
                        draws.nrows(),
                        d.len()
                    )));
                }
            }
            (None, true) => {
                return Err(RustyProjError::DimensionMismatch(format!(
                    "the {} family requires per-draw dispersion values",
                    family.name()
                )));
            }
            (Some(_), false) => {
                return Err(RustyProjError::DimensionMismatch(format!(
                    "the {} family carries no dispersion parameter",
                    family.name()
                )));
            }
            (None, false) => {}
        }

        Ok(Self { x, y, names, family, draws, dispersion })
    }

    pub fn num_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_covariates(&self) -> usize {
        self.x.ncols()
    }

    pub fn num_draws(&self) -> usize {
        self.draws.nrows()
    }

    pub fn design(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn response(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn draws(&self) -> &Array2<f64> {
        &self.draws
    }

    pub fn dispersion(&self) -> Option<&Array1<f64>> {
        self.dispersion.as_ref()
    }

    /// Fitted values μ = g⁻¹(X·β_s) for one posterior draw.
    pub fn fitted_for_draw(&self, draw: usize) -> Array1<f64> {
        let eta = self.x.dot(&self.draws.row(draw));
        self.family.link().inverse(&eta)
    }

    /// Posterior-mean fitted values: the average of per-draw fitted values.
    ///
    /// Note the average is taken on the response scale, after the inverse
    /// link, not on the linear predictor scale.
    pub fn mean_fitted(&self) -> Array1<f64> {
        let mut acc = Array1::<f64>::zeros(self.num_obs());
        for s in 0..self.num_draws() {
            acc += &self.fitted_for_draw(s);
        }
        acc / self.num_draws() as f64
    }

    /// Extract the reduced design matrix X[:, subset] for a candidate.
    ///
    /// The subset must already be validated against this model.
    pub fn reduced_design(&self, subset: &CovariateSubset) -> Array2<f64> {
        let cols: Vec<_> = subset.indices().iter().map(|&j| self.x.column(j)).collect();
        if cols.is_empty() {
            Array2::zeros((self.num_obs(), 0))
        } else {
            ndarray::stack(Axis(1), &cols).expect("columns share the row count")
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
