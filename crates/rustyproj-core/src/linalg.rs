// =============================================================================
// Linear Algebra Kernel
// =============================================================================
//
// Arrays are stored as ndarray types throughout the crate; nalgebra supplies
// the Cholesky factorization behind the normal-equation solves. This module
// is the only place the two meet.
//
// There is deliberately no LU or pseudo-inverse fallback here: a failed
// Cholesky factorization means the reduced design matrix is rank deficient,
// and callers surface that as `SingularDesign` rather than solving a
// regularized stand-in problem.
//
// The factorization is kept as a value (`SpdFactor`) because the Gaussian
// projection solves against the same XᵀX for every posterior draw: one
// factorization, S triangular solves.
//
// =============================================================================

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2};

/// Convert an ndarray matrix to a nalgebra matrix.
pub(crate) fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = (a.nrows(), a.ncols());
    DMatrix::from_fn(nrows, ncols, |i, j| a[[i, j]])
}

/// Convert an ndarray vector to a nalgebra vector.
pub(crate) fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
    DVector::from_iterator(v.len(), v.iter().copied())
}

/// Convert a nalgebra vector back to ndarray.
pub(crate) fn to_array1(v: &DVector<f64>) -> Array1<f64> {
    Array1::from_iter(v.iter().copied())
}

/// Smallest allowed ratio between the extreme Cholesky pivots. A pivot that
/// collapses this far relative to the largest is rounding residue of a rank
/// deficient matrix, not a genuine direction of the design.
const PIVOT_RATIO_MIN: f64 = 1e-7;

/// A Cholesky factorization of a symmetric positive-definite matrix,
/// reusable across many right-hand sides.
pub(crate) struct SpdFactor {
    chol: Cholesky<f64, Dyn>,
}

impl SpdFactor {
    /// Factor a symmetric positive-definite matrix.
    ///
    /// Returns `None` when the matrix is not positive definite (for the
    /// normal equations XᵀWX that means X is rank deficient), or when a
    /// pivot is so small relative to the largest that the factorization only
    /// succeeded through rounding noise.
    pub fn new(a: &Array2<f64>) -> Option<Self> {
        let chol = Cholesky::new(to_dmatrix(a))?;
        let diag = chol.l_dirty().diagonal();
        let max = diag.iter().copied().fold(0.0f64, f64::max);
        if diag.iter().any(|&d| !d.is_finite() || d <= max * PIVOT_RATIO_MIN) {
            return None;
        }
        Some(Self { chol })
    }

    /// Solve A·x = b against the cached factorization.
    pub fn solve(&self, b: &Array1<f64>) -> Array1<f64> {
        to_array1(&self.chol.solve(&to_dvector(b)))
    }
}

// =============================================================================
// Tests
// =============================================================================
