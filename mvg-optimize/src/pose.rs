use crate::driver::{driver, interpret};
use levenberg_marquardt::LeastSquaresProblem;
use mvg_core::{
    nalgebra::{storage::Owned, DVector, Dynamic, Matrix2x4, OMatrix, Vector4, Vector6, U6},
    ConvergeConfig, FeatureWorldMatch, GeometryError, ModelRefiner, Pose, Projective, Refinement,
    ReprojectionDistance, ResidualModel, WorldToCamera,
};

/// Jacobian of the perspective projection `(x/z, y/z)` with respect to the
/// homogeneous point it projects. The homogeneous coordinate has no
/// influence because the input is kept at `w = 1`.
pub(crate) fn projection_jacobian(point: Vector4<f64>) -> Matrix2x4<f64> {
    let z = point.z;
    Matrix2x4::new(
        1.0 / z,
        0.0,
        -point.x / (z * z),
        0.0,
        0.0,
        1.0 / z,
        -point.y / (z * z),
        0.0,
    )
}

struct PoseProblem<'a> {
    pose: WorldToCamera,
    data: &'a [FeatureWorldMatch],
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U6> for PoseProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U6>;
    type ParameterStorage = Owned<f64, U6>;

    fn set_params(&mut self, x: &Vector6<f64>) {
        self.pose = Pose::from_se3(*x);
    }

    fn params(&self) -> Vector6<f64> {
        self.pose.se3()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut residuals = DVector::zeros(self.data.len() * 2);
        for (ix, &FeatureWorldMatch(image, world)) in self.data.iter().enumerate() {
            let projected = self.pose.transform(world).image_point()?;
            residuals[2 * ix] = projected.x - image.x;
            residuals[2 * ix + 1] = projected.y - image.y;
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U6>> {
        let mut jacobian = OMatrix::<f64, Dynamic, U6>::zeros(self.data.len() * 2);
        for (ix, &FeatureWorldMatch(_, world)) in self.data.iter().enumerate() {
            let (camera, jacobian_pose) = self.pose.transform_jacobian_self(world);
            let h = camera.homogeneous();
            if h.z.abs() < f64::EPSILON {
                return None;
            }
            let rows = projection_jacobian(h) * jacobian_pose;
            jacobian.row_mut(2 * ix).copy_from(&rows.row(0));
            jacobian.row_mut(2 * ix + 1).copy_from(&rows.row(1));
        }
        Some(jacobian)
    }
}

/// Levenberg-Marquardt refinement of a world pose over its 6 se(3)
/// parameters, minimizing reprojection error in normalized image
/// coordinates. The Jacobian is the analytic pose transform Jacobian
/// chained with the projection Jacobian.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseRefiner {
    pub config: ConvergeConfig,
}

impl PoseRefiner {
    pub fn new(config: ConvergeConfig) -> Self {
        Self { config }
    }
}

impl ModelRefiner<WorldToCamera, FeatureWorldMatch> for PoseRefiner {
    fn refine(
        &self,
        model: WorldToCamera,
        data: &[FeatureWorldMatch],
    ) -> Result<Refinement<WorldToCamera>, GeometryError> {
        if data.is_empty() {
            return Err(GeometryError::DegenerateInput(
                "refinement requires at least one correspondence",
            ));
        }
        let problem = PoseProblem { pose: model, data };
        let (problem, report) = driver(&self.config).minimize(problem);
        let (iterations, converged) = interpret(&report)?;
        let residual = data
            .iter()
            .map(|m| ReprojectionDistance.residual(&problem.pose, m).powi(2))
            .sum();
        Ok(Refinement {
            model: problem.pose,
            iterations,
            residual,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvg_core::nalgebra::{Point3, Rotation3, Vector3};
    use mvg_core::WorldPoint;

    fn scene() -> (WorldToCamera, Vec<FeatureWorldMatch>) {
        let pose = WorldToCamera::from_parts(
            Vector3::new(0.1, -0.2, 0.5),
            Rotation3::new(Vector3::new(0.1, 0.05, -0.1)),
        );
        let matches = [
            Point3::new(0.2, 0.1, 2.0),
            Point3::new(-0.3, 0.2, 1.5),
            Point3::new(0.1, -0.25, 2.5),
            Point3::new(0.4, 0.3, 1.8),
            Point3::new(-0.1, -0.1, 2.2),
            Point3::new(0.3, -0.2, 1.7),
        ]
        .into_iter()
        .map(|point| {
            let world = WorldPoint::from_point(point);
            FeatureWorldMatch(pose.transform(world).image_point().unwrap(), world)
        })
        .collect();
        (pose, matches)
    }

    #[test]
    fn pose_refinement_restores_a_perturbed_pose() {
        let (pose, matches) = scene();
        let perturbed =
            WorldToCamera::from_se3(pose.se3() + Vector6::new(0.02, -0.01, 0.015, 0.01, -0.02, 0.01));
        let refinement = PoseRefiner::default().refine(perturbed, &matches).unwrap();
        assert!(refinement.converged);
        assert!(refinement.residual < 1e-12);
        assert!(
            (refinement.model.isometry().translation.vector
                - pose.isometry().translation.vector)
                .norm()
                < 1e-6
        );
        assert!(
            refinement
                .model
                .isometry()
                .rotation
                .angle_to(&pose.isometry().rotation)
                < 1e-6
        );
    }

    #[test]
    fn pose_refinement_at_the_optimum_changes_nothing() {
        let (pose, matches) = scene();
        let refinement = PoseRefiner::default().refine(pose, &matches).unwrap();
        assert!(refinement.residual < 1e-20);
        assert!(
            (refinement.model.isometry().translation.vector
                - pose.isometry().translation.vector)
                .norm()
                < 1e-9
        );
    }
}
