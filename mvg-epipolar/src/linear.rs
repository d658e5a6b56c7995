//! Shared spectral machinery for the direct linear transform solvers.

use float_ord::FloatOrd;
use mvg_core::nalgebra::{OMatrix, OVector, SymmetricEigen, U9};

pub(crate) const EIGEN_CONVERGENCE: f64 = 1e-12;
pub(crate) const EIGEN_ITERATIONS: usize = 1000;
/// Relative bound under which an eigenvalue of the normal matrix is treated
/// as part of the nullspace.
pub(crate) const RANK_EPSILON: f64 = 1e-12;

pub(crate) type Design9 = OVector<f64, U9>;
pub(crate) type Normal9 = OMatrix<f64, U9, U9>;

/// The eigen decomposition of a 9x9 normal matrix `A' * A` with its
/// eigenvalue indices sorted ascending.
pub(crate) struct Spectrum {
    eigen: SymmetricEigen<f64, U9>,
    order: [usize; 9],
}

impl Spectrum {
    pub(crate) fn new(normal: Normal9) -> Option<Self> {
        let eigen = normal.try_symmetric_eigen(EIGEN_CONVERGENCE, EIGEN_ITERATIONS)?;
        let mut order = [0, 1, 2, 3, 4, 5, 6, 7, 8];
        order.sort_unstable_by_key(|&ix| FloatOrd(eigen.eigenvalues[ix]));
        Some(Self { eigen, order })
    }

    /// The `rank`-th smallest eigenvalue.
    pub(crate) fn eigenvalue(&self, rank: usize) -> f64 {
        self.eigen.eigenvalues[self.order[rank]]
    }

    /// The eigenvector paired with the `rank`-th smallest eigenvalue.
    pub(crate) fn eigenvector(&self, rank: usize) -> Design9 {
        self.eigen.eigenvectors.column(self.order[rank]).into_owned()
    }

    /// Whether the nullspace is wider than `expected`, indicating a
    /// degenerate correspondence configuration.
    pub(crate) fn nullity_exceeds(&self, expected: usize) -> bool {
        let largest = self.eigenvalue(8);
        if largest < RANK_EPSILON {
            return true;
        }
        self.eigenvalue(expected) < RANK_EPSILON * largest
    }
}
