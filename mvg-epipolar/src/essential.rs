use crate::{FundamentalLinear7, FundamentalLinear8, FundamentalMatrix};
use arrayvec::ArrayVec;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use mvg_core::{
    nalgebra::{Matrix3, Rotation3, Vector3, SVD},
    CameraToCamera, FeatureMatch, GeometryError, HypothesisEstimator, Pose,
};
use num_traits::Float;
use sample_consensus::Model;

/// The essential matrix `E` relating two calibrated views, satisfying
/// `b' * E * a = 0` for correspondences in normalized image coordinates.
///
/// An essential matrix decomposes as `[t]_x * R` and therefore has two equal
/// singular values and one zero singular value. Decomposing it yields four
/// pose candidates (two rotations times two translation signs) with the
/// translation scale unknown; resolving that four-fold ambiguity requires
/// triangulating points, which lives downstream of this crate.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct EssentialMatrix(pub Matrix3<f64>);

impl EssentialMatrix {
    /// Project onto the closest essential matrix in the Frobenius sense by
    /// averaging the two large singular values and zeroing the third.
    pub fn recondition(self, epsilon: f64, max_iterations: usize) -> Option<Self> {
        let mut svd = self.0.try_svd(true, true, epsilon, max_iterations)?;
        let mean = (svd.singular_values[0] + svd.singular_values[1]) / 2.0;
        svd.singular_values[0] = mean;
        svd.singular_values[1] = mean;
        svd.singular_values[2] = 0.0;
        svd.recompose().ok().map(Self)
    }

    /// The two candidate rotations together with the unscaled translation.
    ///
    /// The translation sign is also undetermined, so the full candidate set
    /// is produced by [`EssentialMatrix::possible_unscaled_poses`].
    pub fn possible_rotations_unscaled_translation(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<(Rotation3<f64>, Rotation3<f64>, Vector3<f64>)> {
        let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let svd = SVD::try_new(self.0, true, true, epsilon, max_iterations)?;
        let mut u = svd.u?;
        let mut v_t = svd.v_t?;
        // The singular value pattern (s, s, 0) leaves the last column of U
        // and the last row of V* undetermined up to sign, so the sign is
        // chosen to make both factors proper rotations.
        if u.determinant() < 0.0 {
            u.column_mut(2).neg_mut();
        }
        if v_t.determinant() < 0.0 {
            v_t.row_mut(2).neg_mut();
        }
        Some((
            Rotation3::from_matrix_unchecked(u * w * v_t),
            Rotation3::from_matrix_unchecked(u * w.transpose() * v_t),
            u.column(2).into_owned(),
        ))
    }

    /// All four pose candidates consistent with this essential matrix.
    ///
    /// Exactly one of them places triangulated points in front of both
    /// cameras for non-degenerate scenes.
    pub fn possible_unscaled_poses(
        &self,
        epsilon: f64,
        max_iterations: usize,
    ) -> Option<[CameraToCamera; 4]> {
        self.possible_rotations_unscaled_translation(epsilon, max_iterations)
            .map(|(rot_a, rot_b, t)| {
                [
                    CameraToCamera::from_parts(t, rot_a),
                    CameraToCamera::from_parts(t, rot_b),
                    CameraToCamera::from_parts(-t, rot_a),
                    CameraToCamera::from_parts(-t, rot_b),
                ]
            })
    }

    /// The absolute algebraic epipolar error `|b' * E * a|`.
    pub fn algebraic_residual(&self, data: &FeatureMatch) -> f64 {
        FundamentalMatrix(self.0).algebraic_residual(data)
    }

    /// See [`FundamentalMatrix::sampson_residual`]; the essential matrix is
    /// a fundamental matrix of normalized coordinates.
    pub fn sampson_residual(&self, data: &FeatureMatch) -> f64 {
        FundamentalMatrix(self.0).sampson_residual(data)
    }
}

/// The essential matrix `[t]_x * R` corresponding to this relative pose.
///
/// If a camera point `a` maps to `b` under [`Pose::transform`], then
/// `b' * E * a` is approximately zero for the returned matrix.
impl From<CameraToCamera> for EssentialMatrix {
    fn from(pose: CameraToCamera) -> Self {
        Self(pose.0.translation.vector.cross_matrix() * *pose.0.rotation.matrix())
    }
}

impl Model<FeatureMatch> for EssentialMatrix {
    fn residual(&self, data: &FeatureMatch) -> f64 {
        Float::sqrt(self.sampson_residual(data))
    }
}

/// The 8-point algorithm on normalized image coordinates, projected onto
/// the essential manifold with [`EssentialMatrix::recondition`].
#[derive(Debug, Clone, Copy)]
pub struct EssentialLinear8 {
    pub epsilon: f64,
    pub iterations: usize,
}

impl EssentialLinear8 {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for EssentialLinear8 {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
        }
    }
}

impl HypothesisEstimator<FeatureMatch> for EssentialLinear8 {
    type Model = EssentialMatrix;
    type ModelIter = ArrayVec<EssentialMatrix, 1>;

    fn min_samples(&self) -> usize {
        8
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        let mut hypotheses = ArrayVec::new();
        for fundamental in FundamentalLinear8::new().estimate(data)? {
            let essential = EssentialMatrix(fundamental.0)
                .recondition(self.epsilon, self.iterations)
                .ok_or(GeometryError::DegenerateInput(
                    "essential manifold projection failed",
                ))?;
            hypotheses.push(essential);
        }
        Ok(hypotheses)
    }
}

/// The 7-point algorithm on normalized image coordinates, projected onto
/// the essential manifold.
#[derive(Debug, Clone, Copy)]
pub struct EssentialLinear7 {
    pub epsilon: f64,
    pub iterations: usize,
}

impl EssentialLinear7 {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for EssentialLinear7 {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
        }
    }
}

impl HypothesisEstimator<FeatureMatch> for EssentialLinear7 {
    type Model = EssentialMatrix;
    type ModelIter = ArrayVec<EssentialMatrix, 3>;

    fn min_samples(&self) -> usize {
        7
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        let mut hypotheses = ArrayVec::new();
        for fundamental in FundamentalLinear7::new().estimate(data)? {
            let essential = EssentialMatrix(fundamental.0)
                .recondition(self.epsilon, self.iterations)
                .ok_or(GeometryError::DegenerateInput(
                    "essential manifold projection failed",
                ))?;
            hypotheses.push(essential);
        }
        Ok(hypotheses)
    }
}
