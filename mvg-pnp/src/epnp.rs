use crate::fit_world_to_camera;
use arrayvec::ArrayVec;
use mvg_core::{
    nalgebra::{DMatrix, Matrix2x4, Matrix3, Matrix6, Vector2, Vector3, Vector6},
    FeatureWorldMatch, GeometryError, HypothesisEstimator, Pose, Projective, WorldToCamera,
};

/// The EPnP linear pose solver of Lepetit, Moreno-Noguer and Fua.
///
/// Expresses every world point as an affine combination of four control
/// points chosen from the point cloud's principal axes, solves a linear
/// system for the control points in the camera frame, and aligns the two
/// frames rigidly. Requires at least 4 correspondences and produces a
/// single hypothesis.
#[derive(Debug, Clone, Copy)]
pub struct EPnP {
    /// Lower bound on each control point axis length, as a fraction of the
    /// longest axis. Keeps the control point basis invertible for flat or
    /// nearly flat point clouds.
    pub conditioning: f64,
    /// Gauss-Newton reprojection polish steps applied to the linear
    /// estimate. Zero disables polishing.
    pub polish_iterations: usize,
}

impl EPnP {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for EPnP {
    fn default() -> Self {
        Self {
            conditioning: 0.1,
            polish_iterations: 0,
        }
    }
}

fn reprojection_cost(pose: WorldToCamera, data: &[FeatureWorldMatch]) -> f64 {
    data.iter()
        .map(|&FeatureWorldMatch(image, world)| {
            pose.transform(world)
                .image_point()
                .map(|projected| (projected - image).norm_squared())
                .unwrap_or(f64::INFINITY)
        })
        .sum()
}

impl EPnP {
    /// Undamped Gauss-Newton steps on the 6 se(3) parameters, accepting
    /// only cost-decreasing updates and stopping at the first step that
    /// fails to improve.
    fn polish(&self, mut pose: WorldToCamera, data: &[FeatureWorldMatch]) -> WorldToCamera {
        let mut cost = reprojection_cost(pose, data);
        for _ in 0..self.polish_iterations {
            let mut normal = Matrix6::<f64>::zeros();
            let mut gradient = Vector6::<f64>::zeros();
            for &FeatureWorldMatch(image, world) in data {
                let (camera, jacobian_pose) = pose.transform_jacobian_self(world);
                let h = camera.homogeneous();
                if h.z.abs() < f64::EPSILON {
                    return pose;
                }
                let projection = Matrix2x4::new(
                    1.0 / h.z,
                    0.0,
                    -h.x / (h.z * h.z),
                    0.0,
                    0.0,
                    1.0 / h.z,
                    -h.y / (h.z * h.z),
                    0.0,
                );
                let rows = projection * jacobian_pose;
                let residual = Vector2::new(h.x / h.z - image.x, h.y / h.z - image.y);
                normal += rows.transpose() * rows;
                gradient += rows.transpose() * residual;
            }
            let delta = match normal.cholesky() {
                Some(cholesky) => cholesky.solve(&-gradient),
                None => break,
            };
            let candidate = WorldToCamera::from_se3(pose.se3() + delta);
            let candidate_cost = reprojection_cost(candidate, data);
            if candidate_cost < cost {
                pose = candidate;
                cost = candidate_cost;
            } else {
                break;
            }
        }
        pose
    }
}

impl HypothesisEstimator<FeatureWorldMatch> for EPnP {
    type Model = WorldToCamera;
    type ModelIter = ArrayVec<WorldToCamera, 1>;

    fn min_samples(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[FeatureWorldMatch]) -> Result<Self::ModelIter, GeometryError> {
        let n = data.len();
        if n < 4 {
            return Err(GeometryError::DegenerateInput(
                "EPnP requires at least 4 correspondences",
            ));
        }
        let mut world = Vec::with_capacity(n);
        for m in data {
            world.push(m.1.point().ok_or(GeometryError::DegenerateInput(
                "world point lies at infinity",
            ))?);
        }

        // Control points: the centroid plus one point along each principal
        // axis of the cloud, with short axes inflated so the basis stays
        // invertible for planar clouds.
        let centroid = world.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n as f64;
        let mut covariance = Matrix3::zeros();
        for p in &world {
            let d = p.coords - centroid;
            covariance += d * d.transpose();
        }
        covariance /= n as f64;
        let eigen = covariance.symmetric_eigen();
        let longest = eigen
            .eigenvalues
            .iter()
            .fold(0.0f64, |acc, &v| acc.max(v.abs()))
            .sqrt();
        if longest < f64::EPSILON {
            return Err(GeometryError::DegenerateInput(
                "world points coincide",
            ));
        }

        let mut control_w = [centroid; 4];
        for i in 0..3 {
            let scale = eigen.eigenvalues[i]
                .abs()
                .sqrt()
                .max(self.conditioning * longest);
            control_w[i + 1] = centroid + eigen.eigenvectors.column(i) * scale;
        }

        let basis = Matrix3::from_columns(&[
            control_w[1] - control_w[0],
            control_w[2] - control_w[0],
            control_w[3] - control_w[0],
        ]);
        let basis_inverse = basis.try_inverse().ok_or(GeometryError::DegenerateInput(
            "control point basis is not invertible",
        ))?;

        let mut alphas = Vec::with_capacity(n);
        for p in &world {
            let coeff = basis_inverse * (p.coords - control_w[0]);
            alphas.push([1.0 - coeff.x - coeff.y - coeff.z, coeff.x, coeff.y, coeff.z]);
        }

        // Each observation contributes two rows relating the camera-frame
        // control points to the normalized image coordinates.
        let mut design = DMatrix::<f64>::zeros(2 * n, 12);
        for (i, (alpha, m)) in alphas.iter().zip(data).enumerate() {
            let (u, v) = (m.0.x, m.0.y);
            for (j, &a) in alpha.iter().enumerate() {
                let c = 3 * j;
                design[(2 * i, c)] = a;
                design[(2 * i, c + 2)] = -u * a;
                design[(2 * i + 1, c + 1)] = a;
                design[(2 * i + 1, c + 2)] = -v * a;
            }
        }

        let svd = design.svd(false, true);
        let v_t = svd.v_t.ok_or(GeometryError::DegenerateInput(
            "singular value decomposition of the EPnP design matrix failed",
        ))?;
        let solution = v_t.row(v_t.nrows() - 1);

        let mut control_c = [Vector3::zeros(); 4];
        for (j, cc) in control_c.iter_mut().enumerate() {
            *cc = Vector3::new(solution[3 * j], solution[3 * j + 1], solution[3 * j + 2]);
        }

        // The nullspace vector is scale free; recover the metric scale from
        // the control point separations in both frames.
        let mut sum_w = 0.0;
        let mut sum_c = 0.0;
        for i in 0..4 {
            for j in (i + 1)..4 {
                sum_w += (control_w[i] - control_w[j]).norm_squared();
                sum_c += (control_c[i] - control_c[j]).norm_squared();
            }
        }
        if sum_c <= f64::EPSILON {
            return Err(GeometryError::DegenerateInput(
                "camera-frame control points collapsed",
            ));
        }
        let scale = (sum_w / sum_c).sqrt();
        for cc in &mut control_c {
            *cc *= scale;
        }

        let mut camera = Vec::with_capacity(n);
        for alpha in &alphas {
            let mut pc = Vector3::zeros();
            for (j, &a) in alpha.iter().enumerate() {
                pc += control_c[j] * a;
            }
            camera.push(pc);
        }
        // The nullspace sign is arbitrary; the scene must sit in front of
        // the camera.
        let behind = camera.iter().filter(|pc| pc.z < 0.0).count();
        if 2 * behind > n {
            for pc in &mut camera {
                *pc = -*pc;
            }
        }

        let mut pose = fit_world_to_camera(&world, &camera)?;
        if self.polish_iterations > 0 {
            pose = self.polish(pose, data);
        }
        let mut hypotheses = ArrayVec::new();
        hypotheses.push(pose);
        Ok(hypotheses)
    }
}
