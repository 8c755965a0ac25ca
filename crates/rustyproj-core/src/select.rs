// =============================================================================
// Selection
// =============================================================================
//
// The final stage of the procedure: score every entry on the search path,
// then apply the one-standard-error stopping rule to pick the smallest
// submodel statistically indistinguishable from the reference.
//
// An entry qualifies when
//
//     elpd ≥ elpd_ref − multiplier · se
//
// where se is the entry's own reported standard error and the multiplier
// defaults to 1.0. Scanning in increasing size order, the first qualifying
// entry wins; when none qualifies the full reference model is selected.
// Selection is deterministic; all randomness lives upstream in whatever
// sampler produced the posterior draws.
//
// `run_selection` is the top-level driver wiring search → evaluation →
// selection. Its output is a fully owned, serializable record: a report or
// plot layer can consume it without touching the engine's internals.
//
// =============================================================================

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::evaluate::{evaluate_reference, evaluate_submodel, PerformanceEstimate};
use crate::model::{CovariateSubset, ReferenceModel};
use crate::projection::ProjectedSubmodel;
use crate::search::{search, SearchConfig};

// =============================================================================
// Configuration
// =============================================================================

/// Controls for a full selection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Search strategy, size budget and projection controls.
    pub search: SearchConfig,

    /// Width of the stopping rule in units of the entry's standard error.
    pub se_multiplier: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { search: SearchConfig::default(), se_multiplier: 1.0 }
    }
}

// =============================================================================
// Outbound Records
// =============================================================================

/// One visited submodel with its predictive-performance estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPathEntry {
    /// Position on the path; equals the subset size.
    pub step: usize,

    /// The covariate subset visited at this step.
    pub subset: CovariateSubset,

    /// The projected submodel, including any convergence warnings.
    pub submodel: ProjectedSubmodel,

    /// Cross-validated predictive accuracy of this entry.
    pub performance: PerformanceEstimate,
}

/// The outcome of a selection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    /// The chosen covariate subset.
    pub selected: CovariateSubset,

    /// Index of the chosen entry within `path`.
    pub selected_step: usize,

    /// Predictive accuracy of the reference model.
    pub reference: PerformanceEstimate,

    /// Every submodel visited by the search, in increasing size order.
    pub path: Vec<SearchPathEntry>,
}

// =============================================================================
// Selector
// =============================================================================

/// Apply the one-standard-error rule over a scored path.
///
/// Returns the step index of the smallest qualifying entry, or the final
/// entry when none qualifies.
pub fn select_step(
    path: &[SearchPathEntry],
    reference: &PerformanceEstimate,
    se_multiplier: f64,
) -> usize {
    for entry in path {
        if entry.performance.elpd >= reference.elpd - se_multiplier * entry.performance.se {
            return entry.step;
        }
    }
    path.len() - 1
}

/// Run the full procedure: search the submodel lattice, score every path
/// entry and the reference, and select the smallest adequate submodel.
///
/// # Errors
/// Any structural or numerical error from the search or the evaluator aborts
/// the run; a partial path is never returned.
pub fn run_selection(
    model: &ReferenceModel,
    config: &SelectionConfig,
) -> Result<SelectionResult> {
    let submodels = search(model, &config.search)?;
    let reference = evaluate_reference(model)?;

    let path: Vec<SearchPathEntry> = submodels
        .into_par_iter()
        .enumerate()
        .map(|(step, submodel)| -> Result<SearchPathEntry> {
            let performance = evaluate_submodel(model, &submodel)?;
            Ok(SearchPathEntry {
                step,
                subset: submodel.subset.clone(),
                submodel,
                performance,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let selected_step = select_step(&path, &reference, config.se_multiplier);
    debug!(
        "selected step {} (subset {}) with elpd {:.3} against reference {:.3}",
        selected_step, path[selected_step].subset, path[selected_step].performance.elpd,
        reference.elpd
    );

    Ok(SelectionResult {
        selected: path[selected_step].subset.clone(),
        selected_step,
        reference,
        path,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::Family;
    use ndarray::Array2;

    fn entry(step: usize, elpd: f64, se: f64) -> SearchPathEntry {
        let subset = CovariateSubset::new((0..step).collect());
        SearchPathEntry {
            step,
            subset: subset.clone(),
            submodel: ProjectedSubmodel {
                subset,
                family: Family::Poisson,
                coefficients: Array2::zeros((2, step)),
                dispersion: None,
                warnings: Vec::new(),
                divergence: 0.0,
            },
            performance: PerformanceEstimate { elpd, se, pointwise: vec![] },
        }
    }

    fn reference(elpd: f64) -> PerformanceEstimate {
        PerformanceEstimate { elpd, se: 2.0, pointwise: vec![] }
    }

    #[test]
    fn test_selects_smallest_entry_within_one_se() {
        let path = vec![
            entry(0, -150.0, 3.0),
            entry(1, -103.0, 2.5),
            entry(2, -101.0, 2.0),
            entry(3, -100.0, 2.0),
        ];
        let reference = reference(-100.0);
        // entry 1: -103 >= -102.5 is false; entry 2: -101 >= -102 holds
        assert_eq!(select_step(&path, &reference, 1.0), 2);
    }

    #[test]
    fn test_multiplier_widens_the_rule() {
        let path = vec![
            entry(0, -150.0, 3.0),
            entry(1, -103.0, 2.5),
            entry(2, -100.0, 2.0),
        ];
        let reference = reference(-100.0);
        assert_eq!(select_step(&path, &reference, 1.0), 2);
        // doubling the multiplier admits the size-1 entry
        assert_eq!(select_step(&path, &reference, 2.0), 1);
    }

    #[test]
    fn test_falls_back_to_full_model() {
        let path = vec![
            entry(0, -500.0, 1.0),
            entry(1, -400.0, 1.0),
            entry(2, -300.0, 1.0),
        ];
        // no entry comes close to the reference
        let reference = reference(-100.0);
        assert_eq!(select_step(&path, &reference, 1.0), 2);
    }

    #[test]
    fn test_zero_multiplier_requires_matching_elpd() {
        let path = vec![
            entry(0, -120.0, 5.0),
            entry(1, -99.0, 5.0),
            entry(2, -100.0, 5.0),
        ];
        let reference = reference(-100.0);
        // entry 1 beats the reference outright, multiplier irrelevant
        assert_eq!(select_step(&path, &reference, 0.0), 1);
    }
}
