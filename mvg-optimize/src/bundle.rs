use crate::scene::{Observation, SceneStructureMetric, SceneStructureProjective};
use crate::schur::SchurSystem;
use log::{debug, trace};
use mvg_core::{
    nalgebra::{
        DMatrix, DVector, IsometryMatrix3, Point2, Rotation3, Translation3, Vector2, Vector3,
        Vector4,
    },
    ConvergeConfig, GeometryError, Pose, Projective, ProjectiveCamera, WorldPoint, WorldToCamera,
};

/// Outcome of one bundle adjustment run. `converged` is `false` when the
/// iteration cap was hit first; the scene still holds the best state found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleAdjustReport {
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
}

/// Consecutive rejected damping attempts before the iteration gives up.
const MAX_REJECTIONS: usize = 10;
const INITIAL_LAMBDA: f64 = 1e-4;
const MIN_LAMBDA: f64 = 1e-12;

/// The parts of bundle adjustment that differ between the metric and
/// projective formulations: parameter block sizes, the residual and its
/// Jacobian blocks, and how an update step is applied.
trait BaModel {
    type Camera: Clone;

    fn camera_dim(&self) -> usize;
    fn point_dim(&self) -> usize;
    fn residual(
        &self,
        camera: &Self::Camera,
        point: &WorldPoint,
        image: Point2<f64>,
    ) -> Option<Vector2<f64>>;
    /// Jacobian blocks of the residual against the camera and point
    /// parameters, evaluated at the current state.
    fn linearize(
        &self,
        camera: &Self::Camera,
        point: &WorldPoint,
    ) -> Option<(DMatrix<f64>, DMatrix<f64>)>;
    fn step_camera(&self, camera: &Self::Camera, delta: &DVector<f64>) -> Self::Camera;
    fn step_point(&self, point: &WorldPoint, delta: &DVector<f64>) -> WorldPoint;
}

/// Jacobian of `(x/z, y/z)` with respect to the 3d point, as a dynamic
/// block for the accumulator.
fn projection_block(point: Vector3<f64>) -> DMatrix<f64> {
    let z = point.z;
    DMatrix::from_row_slice(
        2,
        3,
        &[
            1.0 / z,
            0.0,
            -point.x / (z * z),
            0.0,
            1.0 / z,
            -point.y / (z * z),
        ],
    )
}

/// Metric formulation: 6 se(3) camera parameters with the rotation update
/// applied through the so(3) exponential map, 3 euclidean point parameters.
struct MetricBa;

impl BaModel for MetricBa {
    type Camera = WorldToCamera;

    fn camera_dim(&self) -> usize {
        6
    }

    fn point_dim(&self) -> usize {
        3
    }

    fn residual(
        &self,
        camera: &WorldToCamera,
        point: &WorldPoint,
        image: Point2<f64>,
    ) -> Option<Vector2<f64>> {
        let projected = camera.transform(*point).image_point()?;
        let camera_point = camera.transform(*point).homogeneous();
        (camera_point.z > 0.0).then_some(projected - image)
    }

    fn linearize(
        &self,
        camera: &WorldToCamera,
        point: &WorldPoint,
    ) -> Option<(DMatrix<f64>, DMatrix<f64>)> {
        let p = point.point()?;
        let y = camera.isometry() * p;
        if y.z <= 0.0 {
            return None;
        }
        let projection = projection_block(y.coords);

        // Left-composed perturbation: y(d) = exp(dw) y + dt, so the
        // translation block is the identity and the rotation block is the
        // negated cross matrix of y.
        let mut jacobian_camera = DMatrix::zeros(2, 6);
        jacobian_camera.slice_mut((0, 0), (2, 3)).copy_from(&projection);
        let rotation_block = &projection * (-y.coords.cross_matrix());
        jacobian_camera
            .slice_mut((0, 3), (2, 3))
            .copy_from(&rotation_block);

        let point_block = &projection * camera.isometry().rotation.matrix();
        let mut jacobian_point = DMatrix::zeros(2, 3);
        jacobian_point.copy_from(&point_block);
        Some((jacobian_camera, jacobian_point))
    }

    fn step_camera(&self, camera: &WorldToCamera, delta: &DVector<f64>) -> WorldToCamera {
        let translation = Translation3::new(delta[0], delta[1], delta[2]);
        let rotation = Rotation3::new(Vector3::new(delta[3], delta[4], delta[5]));
        WorldToCamera(IsometryMatrix3::from_parts(translation, rotation) * camera.isometry())
    }

    fn step_point(&self, point: &WorldPoint, delta: &DVector<f64>) -> WorldPoint {
        let h = point.homogeneous();
        WorldPoint(Vector4::new(
            h.x / h.w + delta[0],
            h.y / h.w + delta[1],
            h.z / h.w + delta[2],
            1.0,
        ))
    }
}

/// Projective formulation: the full 12 camera matrix entries and the 4
/// homogeneous point coordinates are free parameters, renormalized after
/// every step to pin the scale gauge.
struct ProjectiveBa;

impl BaModel for ProjectiveBa {
    type Camera = ProjectiveCamera;

    fn camera_dim(&self) -> usize {
        12
    }

    fn point_dim(&self) -> usize {
        4
    }

    fn residual(
        &self,
        camera: &ProjectiveCamera,
        point: &WorldPoint,
        image: Point2<f64>,
    ) -> Option<Vector2<f64>> {
        camera.project(*point).map(|projected| projected - image)
    }

    fn linearize(
        &self,
        camera: &ProjectiveCamera,
        point: &WorldPoint,
    ) -> Option<(DMatrix<f64>, DMatrix<f64>)> {
        let x = point.homogeneous();
        let v = camera.0 * x;
        if v.z.abs() < f64::EPSILON {
            return None;
        }
        let projection = projection_block(v);

        // Row-major camera parameter order: entry (i, k) lands in column
        // 4i + k, and only the i-th projection output depends on it.
        let mut jacobian_camera = DMatrix::zeros(2, 12);
        for i in 0..3 {
            for k in 0..4 {
                for row in 0..2 {
                    jacobian_camera[(row, 4 * i + k)] = projection[(row, i)] * x[k];
                }
            }
        }

        let point_block = &projection * camera.0;
        let mut jacobian_point = DMatrix::zeros(2, 4);
        jacobian_point.copy_from(&point_block);
        Some((jacobian_camera, jacobian_point))
    }

    fn step_camera(&self, camera: &ProjectiveCamera, delta: &DVector<f64>) -> ProjectiveCamera {
        let mut matrix = camera.0;
        for i in 0..3 {
            for k in 0..4 {
                matrix[(i, k)] += delta[4 * i + k];
            }
        }
        ProjectiveCamera(matrix / matrix.norm())
    }

    fn step_point(&self, point: &WorldPoint, delta: &DVector<f64>) -> WorldPoint {
        let stepped = point.homogeneous() + Vector4::new(delta[0], delta[1], delta[2], delta[3]);
        WorldPoint(stepped / stepped.norm())
    }
}

fn total_cost<M: BaModel>(
    model: &M,
    views: &[M::Camera],
    points: &[WorldPoint],
    observations: &[Observation],
) -> Option<f64> {
    let mut cost = 0.0;
    for o in observations {
        let residual = model.residual(&views[o.view], &points[o.point], o.image)?;
        cost += residual.norm_squared();
    }
    cost.is_finite().then_some(cost)
}

/// The damped Gauss-Newton loop shared by both formulations.
///
/// `views` and `points` are working copies; the caller commits them to the
/// scene only when this returns `Ok`.
fn optimize<M: BaModel>(
    model: &M,
    views: &mut Vec<M::Camera>,
    points: &mut Vec<WorldPoint>,
    observations: &[Observation],
    config: &ConvergeConfig,
) -> Result<BundleAdjustReport, GeometryError> {
    let initial_cost = total_cost(model, views, points, observations).ok_or(
        GeometryError::DegenerateInput("scene contains observations that do not project"),
    )?;
    let mut cost = initial_cost;
    let mut lambda = INITIAL_LAMBDA;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        let mut system = SchurSystem::new(
            views.len(),
            points.len(),
            model.camera_dim(),
            model.point_dim(),
        );
        for o in observations {
            let residual = model
                .residual(&views[o.view], &points[o.point], o.image)
                .ok_or(GeometryError::OptimizationDiverged { iterations })?;
            let (jacobian_camera, jacobian_point) = model
                .linearize(&views[o.view], &points[o.point])
                .ok_or(GeometryError::OptimizationDiverged { iterations })?;
            system.accumulate(
                o.view,
                o.point,
                &jacobian_camera,
                &jacobian_point,
                &DVector::from_column_slice(&[residual.x, residual.y]),
            );
        }
        if system.gradient_norm() < config.gtol {
            converged = true;
            break;
        }

        let mut accepted = false;
        let mut decrease = 0.0;
        for _ in 0..MAX_REJECTIONS {
            if let Some((camera_deltas, point_deltas)) = system.solve(lambda) {
                let candidate_views: Vec<_> = views
                    .iter()
                    .zip(&camera_deltas)
                    .map(|(view, delta)| model.step_camera(view, delta))
                    .collect();
                let candidate_points: Vec<_> = points
                    .iter()
                    .zip(&point_deltas)
                    .map(|(point, delta)| model.step_point(point, delta))
                    .collect();
                if let Some(new_cost) =
                    total_cost(model, &candidate_views, &candidate_points, observations)
                {
                    if new_cost < cost {
                        *views = candidate_views;
                        *points = candidate_points;
                        decrease = cost - new_cost;
                        cost = new_cost;
                        lambda = (lambda * 0.1).max(MIN_LAMBDA);
                        accepted = true;
                        break;
                    }
                }
            }
            trace!("rejected step at lambda {:e}", lambda);
            lambda *= 10.0;
        }

        if !accepted {
            if iterations == 0 {
                return Err(GeometryError::OptimizationDiverged { iterations });
            }
            // No decreasing step exists at any damping level; the state is
            // stationary up to numerical precision.
            converged = true;
            break;
        }
        iterations += 1;
        debug!(
            "iteration {}: cost {:e}, lambda {:e}",
            iterations, cost, lambda
        );
        if decrease <= config.ftol * cost.max(f64::EPSILON) {
            converged = true;
            break;
        }
    }

    Ok(BundleAdjustReport {
        iterations,
        initial_cost,
        final_cost: cost,
        converged,
    })
}

/// Schur-complement bundle adjustment over a metric scene.
///
/// Rotations are updated through the so(3) exponential map and the scene
/// is only modified when the adjustment succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleAdjustMetric {
    pub config: ConvergeConfig,
}

impl BundleAdjustMetric {
    pub fn new(config: ConvergeConfig) -> Self {
        Self { config }
    }

    pub fn adjust(
        &self,
        scene: &mut SceneStructureMetric,
    ) -> Result<BundleAdjustReport, GeometryError> {
        let mut views = scene.views().to_vec();
        let mut points = scene.points().to_vec();
        let report = optimize(
            &MetricBa,
            &mut views,
            &mut points,
            scene.observations(),
            &self.config,
        )?;
        scene.commit(views, points);
        Ok(report)
    }
}

/// Schur-complement bundle adjustment over a projective scene.
///
/// Cameras and points are homogeneous; both are renormalized after every
/// accepted step.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleAdjustProjective {
    pub config: ConvergeConfig,
}

impl BundleAdjustProjective {
    pub fn new(config: ConvergeConfig) -> Self {
        Self { config }
    }

    pub fn adjust(
        &self,
        scene: &mut SceneStructureProjective,
    ) -> Result<BundleAdjustReport, GeometryError> {
        let mut views = scene.views().to_vec();
        let mut points = scene.points().to_vec();
        let report = optimize(
            &ProjectiveBa,
            &mut views,
            &mut points,
            scene.observations(),
            &self.config,
        )?;
        scene.commit(views, points);
        Ok(report)
    }
}

/// Observations of a point far enough behind a camera produce infinite
/// projections; the initial cost check turns that into a degenerate-input
/// failure instead of iterating on garbage.
#[cfg(test)]
mod tests {
    use super::*;
    use mvg_core::nalgebra::Point3;

    #[test]
    fn scene_with_point_behind_camera_is_rejected() {
        let mut scene = SceneStructureMetric::new();
        let view = scene.add_view(WorldToCamera::identity());
        let point = scene.add_point(WorldPoint::from_point(Point3::new(0.0, 0.0, -1.0)));
        scene
            .add_observation(view, point, Point2::new(0.0, 0.0))
            .unwrap();
        assert!(matches!(
            BundleAdjustMetric::default().adjust(&mut scene),
            Err(GeometryError::DegenerateInput(_))
        ));
    }
}
