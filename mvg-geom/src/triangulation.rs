use arrayvec::ArrayVec;
use float_ord::FloatOrd;
use mvg_core::{
    nalgebra::{Matrix3x4, Matrix4, Point2, RowVector4, Vector3, Vector4},
    CameraPoint, CameraToCamera, GeometryError, HypothesisEstimator, Pose, Projective,
    ProjectiveCamera, WorldPoint, WorldToCamera,
};

const EIGEN_CONVERGENCE: f64 = 1e-12;
const EIGEN_ITERATIONS: usize = 1000;
const RANK_EPSILON: f64 = 1e-12;

fn lift(p: Point2<f64>) -> Vector3<f64> {
    Vector3::new(p.x, p.y, 1.0)
}

fn pose_matrix(pose: &WorldToCamera) -> Matrix3x4<f64> {
    pose.homogeneous().fixed_rows::<3>(0).into_owned()
}

/// Smallest eigenvector of a stacked 4x4 normal matrix, rejecting inputs
/// whose nullspace is wider than one dimension (parallel rays, repeated
/// views).
fn homogeneous_solution(normal: Matrix4<f64>) -> Result<Vector4<f64>, GeometryError> {
    let eigen = normal
        .try_symmetric_eigen(EIGEN_CONVERGENCE, EIGEN_ITERATIONS)
        .ok_or(GeometryError::DegenerateInput(
            "triangulation eigen decomposition failed",
        ))?;
    let mut order = [0, 1, 2, 3];
    order.sort_unstable_by_key(|&ix| FloatOrd(eigen.eigenvalues[ix]));
    let largest = eigen.eigenvalues[order[3]];
    if largest < RANK_EPSILON || eigen.eigenvalues[order[1]] < RANK_EPSILON * largest {
        return Err(GeometryError::DegenerateInput(
            "observation rays do not intersect in a unique point",
        ));
    }
    let solution = eigen.eigenvectors.column(order[0]).into_owned();
    if solution.iter().all(|n| n.is_finite()) {
        Ok(solution)
    } else {
        Err(GeometryError::DegenerateInput(
            "triangulation produced a non-finite solution",
        ))
    }
}

/// Check that the triangulated point lies in front of every observing
/// camera, and return it as a euclidean-normalized world point.
fn cheirality_filtered(
    solution: Vector4<f64>,
    poses: impl Iterator<Item = WorldToCamera>,
) -> Result<WorldPoint, GeometryError> {
    let candidate = WorldPoint::from_homogeneous(solution);
    let point = candidate.point().ok_or(GeometryError::DegenerateInput(
        "triangulated point lies at infinity",
    ))?;
    let world = WorldPoint::from_point(point);
    for pose in poses {
        let camera = pose.transform(world);
        if !(camera.homogeneous().z / camera.homogeneous().w > 0.0) {
            return Err(GeometryError::DegenerateInput(
                "triangulated point lies behind a camera",
            ));
        }
    }
    Ok(world)
}

/// Two-view triangulation in the frame of the first camera, based on
/// algorithm 12 from "Multiple View Geometry in Computer Vision, Second
/// Edition".
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RelativeDlt {
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl RelativeDlt {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for RelativeDlt {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }
}

impl RelativeDlt {
    /// Triangulate the point observed at `a` in the first camera and `b`
    /// in the second, where `pose` maps first-camera coordinates into the
    /// second camera.
    ///
    /// The point is returned in the first camera's frame and must pass the
    /// cheirality check in both cameras.
    pub fn triangulate(
        &self,
        pose: CameraToCamera,
        a: Point2<f64>,
        b: Point2<f64>,
    ) -> Result<CameraPoint, GeometryError> {
        let a = lift(a).normalize();
        let b = lift(b).normalize();
        let pose_h = pose.homogeneous();
        let mut design = Matrix4::zeros();
        design
            .row_mut(0)
            .copy_from(&RowVector4::new(-a.z, 0.0, a.x, 0.0));
        design
            .row_mut(1)
            .copy_from(&RowVector4::new(0.0, -a.z, a.y, 0.0));
        design
            .row_mut(2)
            .copy_from(&(b.x * pose_h.row(2) - b.z * pose_h.row(0)));
        design
            .row_mut(3)
            .copy_from(&(b.y * pose_h.row(2) - b.z * pose_h.row(1)));

        let svd = design
            .try_svd(false, true, self.epsilon, self.max_iterations)
            .ok_or(GeometryError::DegenerateInput(
                "triangulation singular value decomposition failed",
            ))?;
        let v_t = svd.v_t.ok_or(GeometryError::DegenerateInput(
            "triangulation singular value decomposition failed",
        ))?;
        let point = CameraPoint::from_homogeneous(v_t.row(3).transpose());
        if !point.homogeneous().iter().all(|n| n.is_finite()) {
            return Err(GeometryError::DegenerateInput(
                "triangulation produced a non-finite solution",
            ));
        }
        let in_front_a = point.bearing().dot(&a) > 0.0;
        let in_front_b = point
            .bearing()
            .dot(&(pose.isometry().inverse() * b))
            > 0.0;
        if in_front_a && in_front_b {
            Ok(point)
        } else {
            Err(GeometryError::DegenerateInput(
                "triangulated point lies behind a camera",
            ))
        }
    }
}

/// N-view metric triangulation by the direct linear transform.
///
/// Each view contributes two design rows; the rows of each view are scaled
/// by the inverse norm of the lifted observation so no single view
/// dominates. The result must lie in front of every camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct NViewDlt;

impl NViewDlt {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<(WorldToCamera, Point2<f64>)> for NViewDlt {
    type Model = WorldPoint;
    type ModelIter = ArrayVec<WorldPoint, 1>;

    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(
        &self,
        data: &[(WorldToCamera, Point2<f64>)],
    ) -> Result<Self::ModelIter, GeometryError> {
        if data.len() < 2 {
            return Err(GeometryError::DegenerateInput(
                "triangulation requires at least 2 observations",
            ));
        }
        let mut normal = Matrix4::zeros();
        for (pose, observation) in data {
            let p = pose_matrix(pose);
            let weight = 1.0 / lift(*observation).norm();
            let rows = [
                (observation.x * p.row(2) - p.row(0)) * weight,
                (observation.y * p.row(2) - p.row(1)) * weight,
            ];
            for row in &rows {
                normal += row.transpose() * row;
            }
        }
        let solution = homogeneous_solution(normal)?;
        let world = cheirality_filtered(solution, data.iter().map(|&(pose, _)| pose))?;
        let mut out = ArrayVec::new();
        out.push(world);
        Ok(out)
    }
}

/// N-view metric triangulation by the Linear-Eigen method of Hartley and
/// Sturm's "Triangulation".
///
/// Minimizes the image-space residual `<xz, yz>` linearly by projecting
/// each view's transform through the observed bearing, which weights the
/// views geometrically rather than algebraically.
#[derive(Debug, Clone, Copy, Default)]
pub struct NViewGeometric;

impl NViewGeometric {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<(WorldToCamera, Point2<f64>)> for NViewGeometric {
    type Model = WorldPoint;
    type ModelIter = ArrayVec<WorldPoint, 1>;

    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(
        &self,
        data: &[(WorldToCamera, Point2<f64>)],
    ) -> Result<Self::ModelIter, GeometryError> {
        if data.len() < 2 {
            return Err(GeometryError::DegenerateInput(
                "triangulation requires at least 2 observations",
            ));
        }
        let mut normal = Matrix4::zeros();
        for (pose, observation) in data {
            let p = pose_matrix(pose);
            let bearing = lift(*observation).normalize();
            let term = p - bearing * bearing.transpose() * p;
            normal += term.transpose() * term;
        }
        let solution = homogeneous_solution(normal)?;
        let world = cheirality_filtered(solution, data.iter().map(|&(pose, _)| pose))?;
        let mut out = ArrayVec::new();
        out.push(world);
        Ok(out)
    }
}

/// N-view projective triangulation by the direct linear transform.
///
/// Operates on uncalibrated [`ProjectiveCamera`] matrices. The result is a
/// homogeneous point that may legitimately lie at infinity; no cheirality
/// filtering is possible or performed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectiveDlt;

impl ProjectiveDlt {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<(ProjectiveCamera, Point2<f64>)> for ProjectiveDlt {
    type Model = WorldPoint;
    type ModelIter = ArrayVec<WorldPoint, 1>;

    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(
        &self,
        data: &[(ProjectiveCamera, Point2<f64>)],
    ) -> Result<Self::ModelIter, GeometryError> {
        projective_triangulation(data, true)
    }
}

/// N-view projective triangulation minimizing the raw algebraic error.
///
/// Identical to [`ProjectiveDlt`] but without the per-view row scaling, so
/// views with large observation coordinates weigh more. Cheaper to reason
/// about, occasionally worse conditioned.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectiveAlgebraic;

impl ProjectiveAlgebraic {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<(ProjectiveCamera, Point2<f64>)> for ProjectiveAlgebraic {
    type Model = WorldPoint;
    type ModelIter = ArrayVec<WorldPoint, 1>;

    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(
        &self,
        data: &[(ProjectiveCamera, Point2<f64>)],
    ) -> Result<Self::ModelIter, GeometryError> {
        projective_triangulation(data, false)
    }
}

fn projective_triangulation(
    data: &[(ProjectiveCamera, Point2<f64>)],
    scale_rows: bool,
) -> Result<ArrayVec<WorldPoint, 1>, GeometryError> {
    if data.len() < 2 {
        return Err(GeometryError::DegenerateInput(
            "triangulation requires at least 2 observations",
        ));
    }
    let mut normal = Matrix4::zeros();
    for (camera, observation) in data {
        let p = camera.0;
        let weight = if scale_rows {
            1.0 / lift(*observation).norm()
        } else {
            1.0
        };
        let rows = [
            (observation.x * p.row(2) - p.row(0)) * weight,
            (observation.y * p.row(2) - p.row(1)) * weight,
        ];
        for row in &rows {
            normal += row.transpose() * row;
        }
    }
    let solution = homogeneous_solution(normal)?;
    // Unit-normalize the homogeneous representative for determinism.
    let mut out = ArrayVec::new();
    out.push(WorldPoint::from_homogeneous(solution / solution.norm()));
    Ok(out)
}
