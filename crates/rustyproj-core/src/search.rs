// =============================================================================
// Submodel Search Engine
// =============================================================================
//
// The search explores the lattice of covariate subsets and returns an ordered
// sequence of nested projected submodels of increasing size: step 0 is the
// empty subset, the final step (at the default size budget) is the full
// subset, and each step adds exactly one covariate to the previous one. The
// full-size entry is never projected: its predictive distribution equals
// the reference's, so the reference draws are reused verbatim.
//
// Two strategies, chosen by configuration rather than at call sites:
//
//   - Forward stepwise (default). At step k every not-yet-included covariate
//     is projected as a size-k candidate (in parallel; candidates within a
//     step are independent) and the candidate whose posterior-mean predictive
//     has the lowest aggregate negative log-likelihood against the
//     reference's posterior-mean fitted values wins. Ties break to the
//     lowest covariate index. Worst case O(p²) projections, the reason this
//     is a greedy pass and not an exhaustive 2^p enumeration.
//
//   - L1 path. A lasso fit to the posterior-mean fitted values over a
//     relaxing penalty schedule orders covariates by entry point; the nested
//     path follows that order directly, one projection per prefix.
//
// A candidate whose reduced design is rank deficient is excluded from that
// step (and logged); every other failure aborts the whole search so a
// corrupted path is never reported as complete. Steps are strictly
// sequential (step k needs the accepted subset from step k−1), so
// parallelism stays within a step.
//
// The search-time score is an in-sample proxy for divergence; the
// cross-validated ELPD reported downstream comes from the evaluator and is
// never conflated with it. Setting `score_with_elpd` switches the proxy to
// the candidate's own ELPD estimate, which affects search ordering only.
//
// =============================================================================

use log::{debug, warn};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RustyProjError};
use crate::evaluate::evaluate_submodel;
use crate::model::{CovariateSubset, ReferenceModel};
use crate::projection::{project, ProjectedSubmodel, ProjectionConfig};
use crate::solvers::l1_entry_order;

// =============================================================================
// Configuration
// =============================================================================

/// Search strategy over the submodel lattice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Greedy forward stepwise search (the default).
    #[default]
    Forward,
    /// Covariate ordering from an L1 regularization path.
    L1Path,
}

/// Controls for one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Which strategy drives the path.
    pub strategy: SearchStrategy,

    /// Largest submodel size to visit; defaults to p (the full model).
    pub max_size: Option<usize>,

    /// Per-draw projection controls shared by every candidate fit.
    pub projection: ProjectionConfig,

    /// Score forward-search candidates by their in-sample ELPD estimate
    /// instead of the aggregate negative log-likelihood proxy. Affects
    /// search ordering only, never the reported ELPD.
    pub score_with_elpd: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Forward,
            max_size: None,
            projection: ProjectionConfig::default(),
            score_with_elpd: false,
        }
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Run the configured search and return the nested path of projected
/// submodels, sizes 0..=max_size in order.
pub fn search(model: &ReferenceModel, config: &SearchConfig) -> Result<Vec<ProjectedSubmodel>> {
    match config.strategy {
        SearchStrategy::Forward => forward_search(model, config),
        SearchStrategy::L1Path => l1_path_search(model, config),
    }
}

fn resolved_max_size(model: &ReferenceModel, config: &SearchConfig) -> usize {
    let p = model.num_covariates();
    config.max_size.unwrap_or(p).min(p)
}

// =============================================================================
// Forward Stepwise
// =============================================================================

fn forward_search(
    model: &ReferenceModel,
    config: &SearchConfig,
) -> Result<Vec<ProjectedSubmodel>> {
    let p = model.num_covariates();
    let max_size = resolved_max_size(model, config);
    let mean_fitted = model.mean_fitted();

    let mut path = Vec::with_capacity(max_size + 1);
    path.push(project(model, &CovariateSubset::empty(), &config.projection)?);
    let mut current = CovariateSubset::empty();

    for step in 1..=max_size {
        if step == p {
            // The full subset's predictive distribution equals the
            // reference's; reuse the draws instead of re-fitting.
            debug!("step {}: full subset, reusing reference draws", step);
            path.push(ProjectedSubmodel::from_reference(model));
            break;
        }

        let candidates: Vec<usize> = (0..p).filter(|j| !current.contains(*j)).collect();
        let projected: Vec<Option<(usize, ProjectedSubmodel)>> = candidates
            .par_iter()
            .map(|&j| -> Result<Option<(usize, ProjectedSubmodel)>> {
                match project(model, &current.with_added(j), &config.projection) {
                    Ok(sub) => Ok(Some((j, sub))),
                    Err(RustyProjError::SingularDesign(msg)) => {
                        warn!("step {}: excluding covariate {}: {}", step, j, msg);
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let viable: Vec<(usize, ProjectedSubmodel)> =
            projected.into_iter().flatten().collect();
        if viable.is_empty() {
            return Err(RustyProjError::SingularDesign(format!(
                "every candidate at step {} has a rank-deficient design",
                step
            )));
        }

        // Candidates arrive in ascending index order; strict comparison
        // keeps the lowest index among exact ties.
        let mut best: Option<(f64, usize, ProjectedSubmodel)> = None;
        for (j, sub) in viable {
            let score = candidate_score(model, &sub, &mean_fitted, config)?;
            if best.as_ref().map_or(true, |(b, _, _)| score < *b) {
                best = Some((score, j, sub));
            }
        }
        let (score, j, sub) = best.expect("at least one viable candidate");
        debug!(
            "step {}: selected covariate {} ('{}'), score {:.6}",
            step,
            j,
            model.names()[j],
            score
        );
        current = sub.subset.clone();
        path.push(sub);
    }

    Ok(path)
}

/// The search-time proxy metric for one candidate (lower is better).
fn candidate_score(
    model: &ReferenceModel,
    sub: &ProjectedSubmodel,
    mean_fitted: &Array1<f64>,
    config: &SearchConfig,
) -> Result<f64> {
    if config.score_with_elpd {
        return Ok(-evaluate_submodel(model, sub)?.elpd);
    }
    let family = model.family();
    let x_sub = model.reduced_design(&sub.subset);
    let eta = x_sub.dot(&sub.mean_coefficients());
    let mu = family.clamp_mu(&family.link().inverse(&eta));
    Ok(family.neg_log_lik(mean_fitted, &mu, sub.mean_dispersion()))
}

// =============================================================================
// L1 Path
// =============================================================================

fn l1_path_search(
    model: &ReferenceModel,
    config: &SearchConfig,
) -> Result<Vec<ProjectedSubmodel>> {
    let p = model.num_covariates();
    let max_size = resolved_max_size(model, config);
    let mean_fitted = model.mean_fitted();

    let mut order = l1_entry_order(
        model.design(),
        &mean_fitted,
        model.family(),
        &config.projection,
    );
    // Covariates that never entered the path are appended in index order so
    // the nested path always reaches the full subset.
    for j in 0..p {
        if !order.contains(&j) {
            order.push(j);
        }
    }
    debug!("l1 path order: {:?}", order);

    let mut path = Vec::with_capacity(max_size + 1);
    path.push(project(model, &CovariateSubset::empty(), &config.projection)?);
    let mut current = CovariateSubset::empty();

    for step in 1..=max_size {
        current = current.with_added(order[step - 1]);
        if current.len() == p {
            path.push(ProjectedSubmodel::from_reference(model));
        } else {
            path.push(project(model, &current, &config.projection)?);
        }
    }

    Ok(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::Family;
    use ndarray::{array, Array2};

    fn names(p: usize) -> Vec<String> {
        (0..p).map(|i| format!("x{}", i)).collect()
    }

    /// Gaussian reference over 3 covariates where only column 1 carries
    /// signal; two deterministic draws around the generating coefficients.
    fn one_signal_model() -> ReferenceModel {
        let n = 30;
        let mut x = Array2::<f64>::zeros((n, 3));
        for i in 0..n {
            let t = i as f64;
            x[[i, 0]] = 1.0;
            x[[i, 1]] = (t * 1.1).sin() * 2.0;
            x[[i, 2]] = (t * 0.37).cos();
        }
        let beta = array![0.2, 2.0, 0.0];
        let y = x.dot(&beta);
        let draws = array![[0.19, 1.98, 0.01], [0.21, 2.02, -0.01]];
        let sigma = array![1.0, 1.0];
        ReferenceModel::new(x, y, names(3), Family::Gaussian, draws, Some(sigma)).unwrap()
    }

    fn assert_valid_path(path: &[ProjectedSubmodel], p: usize) {
        assert_eq!(path.len(), p + 1);
        assert!(path[0].subset.is_empty());
        assert_eq!(path[p].subset, CovariateSubset::full(p));
        for k in 0..p {
            assert_eq!(path[k].subset_size(), k);
            assert!(path[k].subset.is_parent_of(&path[k + 1].subset));
        }
        // no subset repeats
        for a in 0..path.len() {
            for b in (a + 1)..path.len() {
                assert_ne!(path[a].subset, path[b].subset);
            }
        }
    }

    #[test]
    fn test_forward_path_is_monotonically_nested() {
        let model = one_signal_model();
        let path = search(&model, &SearchConfig::default()).unwrap();
        assert_valid_path(&path, 3);
    }

    #[test]
    fn test_forward_search_picks_signal_covariate_first() {
        let model = one_signal_model();
        let path = search(&model, &SearchConfig::default()).unwrap();
        assert_eq!(path[1].subset.indices(), &[1]);
    }

    #[test]
    fn test_full_entry_reuses_reference_draws() {
        let model = one_signal_model();
        let path = search(&model, &SearchConfig::default()).unwrap();
        let full = path.last().unwrap();
        assert_eq!(&full.coefficients, model.draws());
        assert_eq!(full.divergence, 0.0);
        assert!(full.warnings.is_empty());
    }

    #[test]
    fn test_max_size_truncates_path() {
        let model = one_signal_model();
        let config = SearchConfig { max_size: Some(1), ..SearchConfig::default() };
        let path = search(&model, &config).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[1].subset_size(), 1);
    }

    #[test]
    fn test_l1_path_has_same_invariants() {
        let model = one_signal_model();
        let config = SearchConfig { strategy: SearchStrategy::L1Path, ..SearchConfig::default() };
        let path = search(&model, &config).unwrap();
        assert_valid_path(&path, 3);
        assert_eq!(path[1].subset.indices(), &[1]);
    }

    #[test]
    fn test_elpd_scored_search_matches_on_clear_signal() {
        let model = one_signal_model();
        let config = SearchConfig { score_with_elpd: true, ..SearchConfig::default() };
        let path = search(&model, &config).unwrap();
        assert_valid_path(&path, 3);
        assert_eq!(path[1].subset.indices(), &[1]);
    }

    #[test]
    fn test_collinear_candidate_is_excluded_not_fatal() {
        // column 2 duplicates column 1, so once 1 is accepted the candidate
        // {1, 2} is rank deficient and must be skipped while the search
        // continues through the remaining covariate
        let n = 20;
        let mut x = Array2::<f64>::zeros((n, 3));
        for i in 0..n {
            let t = i as f64;
            x[[i, 0]] = (t * 0.51).cos();
            x[[i, 1]] = (t * 1.1).sin();
            x[[i, 2]] = x[[i, 1]];
        }
        let beta = array![0.5, 1.5, 0.0];
        let y = x.dot(&beta);
        let draws = array![[0.5, 1.5, 0.0], [0.49, 1.51, 0.0]];
        let sigma = array![1.0, 1.0];
        let model =
            ReferenceModel::new(x, y, names(3), Family::Gaussian, draws, Some(sigma)).unwrap();

        let config = SearchConfig { max_size: Some(2), ..SearchConfig::default() };
        let path = search(&model, &config).unwrap();
        assert_eq!(path.len(), 3);
        // the duplicated covariate cannot join the accepted signal covariate
        let last = &path[2].subset;
        assert!(!(last.contains(1) && last.contains(2)));
    }
}
