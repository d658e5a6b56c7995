use crate::driver::{driver, interpret};
use crate::pose::projection_jacobian;
use levenberg_marquardt::LeastSquaresProblem;
use mvg_core::{
    nalgebra::{storage::Owned, DVector, Dynamic, OMatrix, Point2, Point3, Vector3, U3},
    ConvergeConfig, GeometryError, ModelRefiner, Pose, Projective, Refinement, WorldPoint,
    WorldToCamera,
};

struct PointProblem<'a> {
    point: Point3<f64>,
    data: &'a [(WorldToCamera, Point2<f64>)],
}

impl<'a> LeastSquaresProblem<f64, Dynamic, U3> for PointProblem<'a> {
    type ResidualStorage = Owned<f64, Dynamic>;
    type JacobianStorage = Owned<f64, Dynamic, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, x: &Vector3<f64>) {
        self.point = Point3::from(*x);
    }

    fn params(&self) -> Vector3<f64> {
        self.point.coords
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let world = WorldPoint::from_point(self.point);
        let mut residuals = DVector::zeros(self.data.len() * 2);
        for (ix, &(pose, observation)) in self.data.iter().enumerate() {
            let projected = pose.transform(world).image_point()?;
            residuals[2 * ix] = projected.x - observation.x;
            residuals[2 * ix + 1] = projected.y - observation.y;
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dynamic, U3>> {
        let world = WorldPoint::from_point(self.point);
        let mut jacobian = OMatrix::<f64, Dynamic, U3>::zeros(self.data.len() * 2);
        for (ix, &(pose, _)) in self.data.iter().enumerate() {
            let camera = pose.transform(world).homogeneous();
            if camera.z.abs() < f64::EPSILON {
                return None;
            }
            // The camera point moves with the world point through the
            // rotation alone.
            let rows = projection_jacobian(camera).fixed_columns::<3>(0)
                * *pose.isometry().rotation.matrix();
            jacobian.row_mut(2 * ix).copy_from(&rows.row(0));
            jacobian.row_mut(2 * ix + 1).copy_from(&rows.row(1));
        }
        Some(jacobian)
    }
}

/// Levenberg-Marquardt refinement of a triangulated point over its 3
/// euclidean coordinates, minimizing reprojection error across all the
/// observing views.
///
/// Composes with the linear triangulators through
/// [`mvg_core::EstimateThenRefine`] to realize triangulate-then-refine.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointRefiner {
    pub config: ConvergeConfig,
}

impl PointRefiner {
    pub fn new(config: ConvergeConfig) -> Self {
        Self { config }
    }
}

impl ModelRefiner<WorldPoint, (WorldToCamera, Point2<f64>)> for PointRefiner {
    fn refine(
        &self,
        model: WorldPoint,
        data: &[(WorldToCamera, Point2<f64>)],
    ) -> Result<Refinement<WorldPoint>, GeometryError> {
        if data.is_empty() {
            return Err(GeometryError::DegenerateInput(
                "refinement requires at least one observation",
            ));
        }
        let point = model.point().ok_or(GeometryError::DegenerateInput(
            "cannot refine a point at infinity",
        ))?;
        let problem = PointProblem { point, data };
        let (problem, report) = driver(&self.config).minimize(problem);
        let (iterations, converged) = interpret(&report)?;
        let refined = WorldPoint::from_point(problem.point);
        let residual = data
            .iter()
            .map(|&(pose, observation)| {
                pose.transform(refined)
                    .image_point()
                    .map(|projected| (projected - observation).norm_squared())
                    .unwrap_or(f64::INFINITY)
            })
            .sum();
        Ok(Refinement {
            model: refined,
            iterations,
            residual,
            converged,
        })
    }
}
