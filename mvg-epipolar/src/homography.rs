use crate::{
    linear::{Design9, Normal9, Spectrum},
    Conditioner,
};
use arrayvec::ArrayVec;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use mvg_core::{
    nalgebra::{Matrix2, Matrix2x4, Matrix3, Vector2, Vector3},
    FeatureMatch, GeometryError, HypothesisEstimator,
};
use sample_consensus::Model;

/// A plane-induced projective mapping from the first view onto the second.
///
/// For a correspondence `FeatureMatch(a, b)` of a point on the inducing
/// plane, `H * a ~ b` in homogeneous coordinates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct HomographyMatrix(pub Matrix3<f64>);

impl HomographyMatrix {
    /// The geometric distance between the mapped first-view point and the
    /// observed second-view point.
    ///
    /// Correspondences mapped to infinity get an infinite residual.
    pub fn transfer_residual(&self, data: &FeatureMatch) -> f64 {
        let &FeatureMatch(a, b) = data;
        let mapped = self.0 * Vector3::new(a.x, a.y, 1.0);
        let residual = (mapped.xy() / mapped.z - b.coords).norm();
        if residual.is_finite() {
            residual
        } else {
            f64::INFINITY
        }
    }

    /// The norm of the algebraic error `[b]_x * H * a` restricted to its two
    /// independent components.
    pub fn algebraic_residual(&self, data: &FeatureMatch) -> f64 {
        self.algebraic_error(data).norm()
    }

    /// The first-order geometric (Sampson) approximation of the
    /// reprojection error, in squared distance units.
    ///
    /// Falls back to the squared algebraic error when the error Jacobian is
    /// rank deficient.
    pub fn sampson_residual(&self, data: &FeatureMatch) -> f64 {
        let &FeatureMatch(a, b) = data;
        let h = self.0;
        let mapped = h * Vector3::new(a.x, a.y, 1.0);
        let error = self.algebraic_error(data);
        // Jacobian of the algebraic error in (a.x, a.y, b.x, b.y).
        let jacobian = Matrix2x4::new(
            h[(0, 0)] - b.x * h[(2, 0)],
            h[(0, 1)] - b.x * h[(2, 1)],
            -mapped.z,
            0.0,
            h[(1, 0)] - b.y * h[(2, 0)],
            h[(1, 1)] - b.y * h[(2, 1)],
            0.0,
            -mapped.z,
        );
        let gram: Matrix2<f64> = jacobian * jacobian.transpose();
        gram.try_inverse()
            .map(|inverse| (error.transpose() * inverse * error)[0])
            .unwrap_or_else(|| error.norm_squared())
    }

    fn algebraic_error(&self, data: &FeatureMatch) -> Vector2<f64> {
        let &FeatureMatch(a, b) = data;
        let mapped = self.0 * Vector3::new(a.x, a.y, 1.0);
        Vector2::new(mapped.x - b.x * mapped.z, mapped.y - b.y * mapped.z)
    }
}

impl Model<FeatureMatch> for HomographyMatrix {
    fn residual(&self, data: &FeatureMatch) -> f64 {
        self.transfer_residual(data)
    }
}

/// The 4-point direct linear transform for homography estimation by Hartley
/// and Zisserman.
///
/// Accepts 4 or more correspondences; with more than 4 the solution is the
/// algebraic least-squares fit. Coordinates are conditioned internally, so
/// pixel coordinates are acceptable.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyDlt;

impl HomographyDlt {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<FeatureMatch> for HomographyDlt {
    type Model = HomographyMatrix;
    type ModelIter = ArrayVec<HomographyMatrix, 1>;

    fn min_samples(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        if data.len() < 4 {
            return Err(GeometryError::DegenerateInput(
                "homography estimation requires at least 4 correspondences",
            ));
        }
        let conditioner_a = Conditioner::fit(data.iter().map(|m| m.0));
        let conditioner_b = Conditioner::fit(data.iter().map(|m| m.1));
        let (conditioner_a, conditioner_b) = conditioner_a
            .zip(conditioner_b)
            .ok_or(GeometryError::DegenerateInput(
                "all correspondences coincide in one view",
            ))?;

        let mut normal = Normal9::zeros();
        for m in data {
            let a = conditioner_a.apply(m.0);
            let b = conditioner_b.apply(m.1);
            let rows = [
                Design9::from_column_slice(&[
                    0.0,
                    0.0,
                    0.0,
                    -a.x,
                    -a.y,
                    -1.0,
                    b.y * a.x,
                    b.y * a.y,
                    b.y,
                ]),
                Design9::from_column_slice(&[
                    a.x,
                    a.y,
                    1.0,
                    0.0,
                    0.0,
                    0.0,
                    -b.x * a.x,
                    -b.x * a.y,
                    -b.x,
                ]),
            ];
            for row in &rows {
                normal += row * row.transpose();
            }
        }

        let spectrum = Spectrum::new(normal).ok_or(GeometryError::DegenerateInput(
            "homography normal matrix eigen decomposition failed",
        ))?;
        if spectrum.nullity_exceeds(1) {
            return Err(GeometryError::DegenerateInput(
                "correspondences do not determine a unique homography",
            ));
        }
        let h = spectrum.eigenvector(0);
        let conditioned = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
        let mut homography =
            conditioner_b.inverse_matrix() * conditioned * conditioner_a.matrix();
        // Fix the arbitrary projective scale.
        let scale = homography.norm();
        if scale < f64::EPSILON {
            return Err(GeometryError::DegenerateInput(
                "homography estimate collapsed to zero",
            ));
        }
        homography /= scale * homography[(2, 2)].signum();

        let mut hypotheses = ArrayVec::new();
        hypotheses.push(HomographyMatrix(homography));
        Ok(hypotheses)
    }
}
