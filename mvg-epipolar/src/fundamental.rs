use crate::{
    linear::{Design9, Normal9, Spectrum, EIGEN_CONVERGENCE, EIGEN_ITERATIONS},
    Conditioner,
};
use arrayvec::ArrayVec;
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use mvg_core::{
    nalgebra::{Matrix3, Point2, Vector3},
    solve_cubic_real, FeatureMatch, GeometryError, HypothesisEstimator,
};
use num_traits::Float;
use sample_consensus::Model;

/// The fundamental matrix `F` relating two uncalibrated views, satisfying
/// `b' * F * a = 0` for every correspondence `FeatureMatch(a, b)` of a rigid
/// scene point.
///
/// `F` has rank 2 and is determined only up to scale. The estimators in this
/// crate always return rank-2, Frobenius-normalized matrices.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct FundamentalMatrix(pub Matrix3<f64>);

impl FundamentalMatrix {
    /// The absolute algebraic epipolar error `|b' * F * a|`.
    pub fn algebraic_residual(&self, data: &FeatureMatch) -> f64 {
        let &FeatureMatch(a, b) = data;
        Float::abs((lift(b).transpose() * self.0 * lift(a))[0])
    }

    /// The first-order geometric (Sampson) approximation of the epipolar
    /// error, in squared distance units:
    ///
    /// `(b' F a)^2 / ((Fa)_1^2 + (Fa)_2^2 + (F'b)_1^2 + (F'b)_2^2)`
    pub fn sampson_residual(&self, data: &FeatureMatch) -> f64 {
        let &FeatureMatch(a, b) = data;
        let line_b = self.0 * lift(a);
        let line_a = self.0.transpose() * lift(b);
        let algebraic = (lift(b).transpose() * self.0 * lift(a))[0];
        let gradient_squared =
            line_b.x * line_b.x + line_b.y * line_b.y + line_a.x * line_a.x + line_a.y * line_a.y;
        if gradient_squared < f64::EPSILON {
            return f64::INFINITY;
        }
        algebraic * algebraic / gradient_squared
    }

    /// The epipolar line in the second view induced by a first-view point,
    /// as homogeneous line coordinates.
    pub fn epipolar_line(&self, a: Point2<f64>) -> Vector3<f64> {
        self.0 * lift(a)
    }

    /// Project onto the closest rank-2 matrix by zeroing the smallest
    /// singular value.
    pub fn enforce_rank2(self) -> Option<Self> {
        let mut svd = self
            .0
            .try_svd(true, true, EIGEN_CONVERGENCE, EIGEN_ITERATIONS)?;
        svd.singular_values[2] = 0.0;
        svd.recompose().ok().map(Self)
    }
}

impl Model<FeatureMatch> for FundamentalMatrix {
    fn residual(&self, data: &FeatureMatch) -> f64 {
        self.sampson_residual(data)
    }
}

fn lift(p: Point2<f64>) -> Vector3<f64> {
    Vector3::new(p.x, p.y, 1.0)
}

/// Fix the projective scale and sign of a matrix estimate.
pub(crate) fn fix_scale(mut mat: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let scale = mat.norm();
    if scale < f64::EPSILON {
        return None;
    }
    let lead = mat.iter().cloned().fold(0.0f64, |acc, n| {
        if n.abs() > acc.abs() {
            n
        } else {
            acc
        }
    });
    mat /= scale * lead.signum();
    Some(mat)
}

/// One design row of the epipolar constraint `b' * M * a = 0` with the
/// matrix unknowns laid out row-major.
pub(crate) fn epipolar_row(a: Point2<f64>, b: Point2<f64>) -> Design9 {
    Design9::from_column_slice(&[
        b.x * a.x,
        b.x * a.y,
        b.x,
        b.y * a.x,
        b.y * a.y,
        b.y,
        a.x,
        a.y,
        1.0,
    ])
}

pub(crate) fn matrix_from_design(f: &Design9) -> Matrix3<f64> {
    Matrix3::new(f[0], f[1], f[2], f[3], f[4], f[5], f[6], f[7], f[8])
}

/// The least-squares 8-point algorithm by Hartley and Zisserman.
///
/// Accepts 8 or more correspondences and conditions coordinates internally.
/// The rank-2 constraint is enforced on the conditioned estimate before
/// deconditioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalLinear8;

impl FundamentalLinear8 {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<FeatureMatch> for FundamentalLinear8 {
    type Model = FundamentalMatrix;
    type ModelIter = ArrayVec<FundamentalMatrix, 1>;

    fn min_samples(&self) -> usize {
        8
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        if data.len() < 8 {
            return Err(GeometryError::DegenerateInput(
                "the 8-point algorithm requires at least 8 correspondences",
            ));
        }
        let conditioners = Conditioner::fit(data.iter().map(|m| m.0))
            .zip(Conditioner::fit(data.iter().map(|m| m.1)));
        let (conditioner_a, conditioner_b) = conditioners.ok_or(
            GeometryError::DegenerateInput("all correspondences coincide in one view"),
        )?;

        let mut normal = Normal9::zeros();
        for m in data {
            let row = epipolar_row(conditioner_a.apply(m.0), conditioner_b.apply(m.1));
            normal += &row * row.transpose();
        }
        let spectrum = Spectrum::new(normal).ok_or(GeometryError::DegenerateInput(
            "epipolar normal matrix eigen decomposition failed",
        ))?;
        if spectrum.nullity_exceeds(1) {
            return Err(GeometryError::DegenerateInput(
                "correspondences do not determine a unique fundamental matrix",
            ));
        }
        let conditioned = matrix_from_design(&spectrum.eigenvector(0));
        let rank2 = FundamentalMatrix(conditioned)
            .enforce_rank2()
            .ok_or(GeometryError::DegenerateInput(
                "singular value decomposition of the estimate failed",
            ))?;
        let deconditioned =
            conditioner_b.matrix().transpose() * rank2.0 * conditioner_a.matrix();
        let fundamental = fix_scale(deconditioned).ok_or(GeometryError::DegenerateInput(
            "fundamental matrix estimate collapsed to zero",
        ))?;

        let mut hypotheses = ArrayVec::new();
        hypotheses.push(FundamentalMatrix(fundamental));
        Ok(hypotheses)
    }
}

/// The minimal 7-point algorithm.
///
/// The epipolar constraint on 7 correspondences leaves a two-dimensional
/// nullspace `F1, F2`; the rank-2 requirement `det(F1 + l * F2) = 0` is a
/// cubic in `l` with 1 to 3 real roots, each yielding one hypothesis. Only
/// the first 7 correspondences are consumed; disambiguation between the
/// hypotheses requires extra correspondences and is performed by
/// [`mvg_core::Disambiguate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalLinear7;

impl FundamentalLinear7 {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<FeatureMatch> for FundamentalLinear7 {
    type Model = FundamentalMatrix;
    type ModelIter = ArrayVec<FundamentalMatrix, 3>;

    fn min_samples(&self) -> usize {
        7
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        if data.len() < 7 {
            return Err(GeometryError::DegenerateInput(
                "the 7-point algorithm requires 7 correspondences",
            ));
        }
        let sample = &data[..7];
        let conditioners = Conditioner::fit(sample.iter().map(|m| m.0))
            .zip(Conditioner::fit(sample.iter().map(|m| m.1)));
        let (conditioner_a, conditioner_b) = conditioners.ok_or(
            GeometryError::DegenerateInput("all correspondences coincide in one view"),
        )?;

        let mut normal = Normal9::zeros();
        for m in sample {
            let row = epipolar_row(conditioner_a.apply(m.0), conditioner_b.apply(m.1));
            normal += &row * row.transpose();
        }
        let spectrum = Spectrum::new(normal).ok_or(GeometryError::DegenerateInput(
            "epipolar normal matrix eigen decomposition failed",
        ))?;
        // 7 generic correspondences leave exactly a 2d nullspace; a wider
        // nullspace means the sample was degenerate.
        if spectrum.nullity_exceeds(2) {
            return Err(GeometryError::DegenerateInput(
                "correspondences span fewer than 7 independent epipolar constraints",
            ));
        }
        let f1 = matrix_from_design(&spectrum.eigenvector(0));
        let f2 = matrix_from_design(&spectrum.eigenvector(1));

        // Recover the coefficients of the cubic det(F1 + l * F2) from four
        // determinant samples.
        let d0 = f1.determinant();
        let d1 = (f1 + f2).determinant();
        let dm1 = (f1 - f2).determinant();
        let d2 = (f1 + 2.0 * f2).determinant();
        let c0 = d0;
        let c2 = (d1 + dm1) / 2.0 - d0;
        let odd = (d1 - dm1) / 2.0;
        let c3 = ((d2 - d0 - 4.0 * c2) / 2.0 - odd) / 3.0;
        let c1 = odd - c3;

        let mut hypotheses = ArrayVec::new();
        for lambda in solve_cubic_real(c3, c2, c1, c0) {
            let conditioned = FundamentalMatrix(f1 + lambda * f2);
            // The root already makes the matrix singular; the projection
            // cleans up floating point error.
            let rank2 = match conditioned.enforce_rank2() {
                Some(rank2) => rank2,
                None => continue,
            };
            let deconditioned =
                conditioner_b.matrix().transpose() * rank2.0 * conditioner_a.matrix();
            if let Some(fundamental) = fix_scale(deconditioned) {
                hypotheses.push(FundamentalMatrix(fundamental));
            }
        }
        if hypotheses.is_empty() {
            return Err(GeometryError::DegenerateInput(
                "no real root of the rank constraint cubic",
            ));
        }
        Ok(hypotheses)
    }
}
