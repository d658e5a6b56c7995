use crate::driver::{driver, interpret};
use core::marker::PhantomData;
use levenberg_marquardt::LeastSquaresProblem;
use mvg_core::{
    nalgebra::{storage::Owned, DVector, Dynamic, Matrix3, OMatrix, OVector, U9},
    ConvergeConfig, FeatureMatch, GeometryError, ModelRefiner, Refinement, ResidualModel,
};
use mvg_epipolar::{FundamentalMatrix, HomographyMatrix, SampsonDistance};

/// Central-difference step for the matrix-parameter Jacobians. The
/// parameter vector is kept near unit norm, so an absolute step is fine.
const JACOBIAN_STEP: f64 = 1e-6;

fn normalized_matrix(params: &OVector<f64, U9>) -> Matrix3<f64> {
    let matrix = Matrix3::from_iterator(params.iter().copied());
    matrix / matrix.norm()
}

fn matrix_params(matrix: &Matrix3<f64>) -> OVector<f64, U9> {
    OVector::<f64, U9>::from_iterator(matrix.iter().copied()) / matrix.norm()
}

/// Shared 9-parameter least-squares problem for the `3x3` projective
/// models.
///
/// The matrix is renormalized to unit Frobenius norm before every residual
/// evaluation, which removes the overall scale from the objective; the
/// remaining null gradient direction is absorbed by the driver's damping.
struct MatrixProblem<'a, M, R> {
    params: OVector<f64, U9>,
    residual: &'a R,
    data: &'a [FeatureMatch],
    model: PhantomData<M>,
}

impl<'a, M, R> MatrixProblem<'a, M, R>
where
    M: From<Matrix3<f64>>,
    R: ResidualModel<M, FeatureMatch>,
{
    fn residual_vector(&self, params: &OVector<f64, U9>) -> DVector<f64> {
        let model = M::from(normalized_matrix(params));
        DVector::from_iterator(
            self.data.len(),
            self.data.iter().map(|m| self.residual.residual(&model, m)),
        )
    }
}

impl<'a, M, R> LeastSquaresProblem<f64, Dynamic, U9> for MatrixProblem<'a, M, R>
where
    M: From<Matrix3<f64>>,
    R: ResidualModel<M, FeatureMatch>,
{
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U9>;
    type ParameterStorage = Owned<f64, U9>;

    fn set_params(&mut self, x: &OVector<f64, U9>) {
        self.params = *x;
    }

    fn params(&self) -> OVector<f64, U9> {
        self.params
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let residuals = self.residual_vector(&self.params);
        residuals.iter().all(|n| n.is_finite()).then_some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U9>> {
        let mut jacobian = OMatrix::<f64, Dynamic, U9>::zeros(self.data.len());
        for col in 0..9 {
            let mut forward = self.params;
            let mut backward = self.params;
            forward[col] += JACOBIAN_STEP;
            backward[col] -= JACOBIAN_STEP;
            let column =
                (self.residual_vector(&forward) - self.residual_vector(&backward))
                    / (2.0 * JACOBIAN_STEP);
            if !column.iter().all(|n| n.is_finite()) {
                return None;
            }
            jacobian.column_mut(col).copy_from(&column);
        }
        Some(jacobian)
    }
}

fn minimize_matrix<M, R>(
    matrix: Matrix3<f64>,
    residual: &R,
    data: &[FeatureMatch],
    config: &ConvergeConfig,
) -> Result<(Matrix3<f64>, usize, bool), GeometryError>
where
    M: From<Matrix3<f64>>,
    R: ResidualModel<M, FeatureMatch>,
{
    if data.is_empty() {
        return Err(GeometryError::DegenerateInput(
            "refinement requires at least one correspondence",
        ));
    }
    let problem = MatrixProblem::<M, R> {
        params: matrix_params(&matrix),
        residual,
        data,
        model: PhantomData,
    };
    let (problem, report) = driver(config).minimize(problem);
    let (iterations, converged) = interpret(&report)?;
    Ok((normalized_matrix(&problem.params), iterations, converged))
}

fn residual_sum<M, R: ResidualModel<M, FeatureMatch>>(
    residual: &R,
    model: &M,
    data: &[FeatureMatch],
) -> f64 {
    data.iter()
        .map(|m| residual.residual(model, m).powi(2))
        .sum()
}

/// Levenberg-Marquardt refinement of a homography over all nine matrix
/// entries, with the scale gauge fixed by Frobenius normalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyRefiner<R = SampsonDistance> {
    pub residual: R,
    pub config: ConvergeConfig,
}

impl<R> HomographyRefiner<R> {
    pub fn new(residual: R, config: ConvergeConfig) -> Self {
        Self { residual, config }
    }
}

impl<R> ModelRefiner<HomographyMatrix, FeatureMatch> for HomographyRefiner<R>
where
    R: ResidualModel<HomographyMatrix, FeatureMatch>,
{
    fn refine(
        &self,
        model: HomographyMatrix,
        data: &[FeatureMatch],
    ) -> Result<Refinement<HomographyMatrix>, GeometryError> {
        let (matrix, iterations, converged) =
            minimize_matrix::<HomographyMatrix, R>(model.0, &self.residual, data, &self.config)?;
        let model = HomographyMatrix(matrix);
        Ok(Refinement {
            residual: residual_sum(&self.residual, &model, data),
            model,
            iterations,
            converged,
        })
    }
}

/// Levenberg-Marquardt refinement of a fundamental matrix.
///
/// The solve itself is unconstrained over the nine entries; the rank-2
/// constraint is re-enforced once after convergence, the same correction
/// the linear estimator applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalRefiner<R = SampsonDistance> {
    pub residual: R,
    pub config: ConvergeConfig,
}

impl<R> FundamentalRefiner<R> {
    pub fn new(residual: R, config: ConvergeConfig) -> Self {
        Self { residual, config }
    }
}

impl<R> ModelRefiner<FundamentalMatrix, FeatureMatch> for FundamentalRefiner<R>
where
    R: ResidualModel<FundamentalMatrix, FeatureMatch>,
{
    fn refine(
        &self,
        model: FundamentalMatrix,
        data: &[FeatureMatch],
    ) -> Result<Refinement<FundamentalMatrix>, GeometryError> {
        let (matrix, iterations, converged) =
            minimize_matrix::<FundamentalMatrix, R>(model.0, &self.residual, data, &self.config)?;
        let model = FundamentalMatrix(matrix)
            .enforce_rank2()
            .ok_or(GeometryError::DegenerateInput(
                "refined fundamental matrix could not be reduced to rank 2",
            ))?;
        Ok(Refinement {
            residual: residual_sum(&self.residual, &model, data),
            model,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvg_core::nalgebra::{Point2, Point3, Vector3};
    use mvg_core::{CameraPoint, CameraToCamera, Pose, Projective};
    use mvg_epipolar::TransferDistance;

    fn planted_homography() -> (HomographyMatrix, Vec<FeatureMatch>) {
        let truth = Matrix3::new(1.2, 0.1, -0.3, -0.05, 0.9, 0.2, 0.01, -0.02, 1.0);
        let matches: Vec<_> = [
            (0.0, 0.0),
            (1.0, 0.0),
            (0.0, 1.0),
            (1.0, 1.0),
            (0.5, 0.25),
            (-0.5, 0.75),
        ]
        .into_iter()
        .map(|(x, y)| {
            let a = Vector3::new(x, y, 1.0);
            let b = truth * a;
            FeatureMatch(Point2::new(x, y), Point2::new(b.x / b.z, b.y / b.z))
        })
        .collect();
        (HomographyMatrix(truth / truth.norm()), matches)
    }

    #[test]
    fn homography_refinement_is_idempotent_at_the_optimum() {
        let (truth, matches) = planted_homography();
        let refiner = HomographyRefiner::new(TransferDistance, ConvergeConfig::default());
        let refinement = refiner.refine(truth, &matches).unwrap();
        assert!(refinement.converged);
        assert!(refinement.residual < 1e-12);
        let delta = (refinement.model.0 * refinement.model.0[(2, 2)].signum()
            - truth.0 * truth.0[(2, 2)].signum())
        .norm();
        assert!(delta < 1e-6);
    }

    #[test]
    fn homography_refinement_recovers_from_perturbation() {
        let (truth, matches) = planted_homography();
        let perturbed = HomographyMatrix(truth.0 + Matrix3::from_element(1e-3));
        let refiner = HomographyRefiner::new(TransferDistance, ConvergeConfig::default());
        let before: f64 = residual_sum(&TransferDistance, &perturbed, &matches);
        let refinement = refiner.refine(perturbed, &matches).unwrap();
        assert!(refinement.residual < before);
        assert!(refinement.residual < 1e-10);
    }

    #[test]
    fn fundamental_refinement_keeps_rank_two() {
        let pose = CameraToCamera::from_parts(
            Vector3::new(0.2, -0.05, 0.1),
            mvg_core::nalgebra::Rotation3::new(Vector3::new(0.05, 0.1, -0.02)),
        );
        let matches: Vec<_> = [
            Point3::new(0.2, 0.1, 2.0),
            Point3::new(-0.3, 0.2, 1.5),
            Point3::new(0.1, -0.25, 2.5),
            Point3::new(0.4, 0.3, 1.8),
            Point3::new(-0.1, -0.1, 2.2),
            Point3::new(0.25, -0.3, 1.6),
            Point3::new(-0.35, 0.05, 2.8),
            Point3::new(0.05, 0.35, 2.1),
        ]
        .into_iter()
        .map(|point| {
            let camera = CameraPoint::from_point(point);
            FeatureMatch(
                camera.image_point().unwrap(),
                pose.transform(camera).image_point().unwrap(),
            )
        })
        .collect();
        let truth = FundamentalMatrix(mvg_epipolar::EssentialMatrix::from(pose).0);
        let perturbed = FundamentalMatrix(truth.0 + Matrix3::from_element(2e-4));
        let refiner = FundamentalRefiner::new(SampsonDistance, ConvergeConfig::default());
        let refinement = refiner.refine(perturbed, &matches).unwrap();
        assert!(refinement.residual < 1e-12);
        let svd = refinement.model.0.svd(false, false);
        assert!(svd.singular_values[2] < 1e-9 * svd.singular_values[0]);
    }
}
