use arrayvec::ArrayVec;
use float_ord::FloatOrd;
use mvg_core::{
    nalgebra::{Matrix3, Point2, Rotation3, Vector3},
    FeatureMatch, FeatureWorldMatch, GeometryError, HypothesisEstimator, Pose, Projective,
    WorldToCamera,
};
use mvg_epipolar::HomographyDlt;
use sample_consensus::Model;

/// The infinitesimal plane-based pose solver of Collins and Bartoli.
///
/// Requires all world points to lie on a plane. Fits the plane, estimates
/// the plane-to-image homography, and extracts the two pose solutions that
/// a perspective view of a plane admits. Both are returned, ordered by
/// reprojection error, so downstream disambiguation can pick between them
/// with held-out correspondences.
#[derive(Debug, Clone, Copy)]
pub struct Ippe {
    /// Maximum out-of-plane spread as a fraction of the longest in-plane
    /// axis before the scene is rejected as non-planar.
    pub planarity: f64,
}

impl Ippe {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for Ippe {
    fn default() -> Self {
        Self { planarity: 1e-3 }
    }
}

impl HypothesisEstimator<FeatureWorldMatch> for Ippe {
    type Model = WorldToCamera;
    type ModelIter = ArrayVec<WorldToCamera, 2>;

    fn min_samples(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[FeatureWorldMatch]) -> Result<Self::ModelIter, GeometryError> {
        let n = data.len();
        if n < 4 {
            return Err(GeometryError::DegenerateInput(
                "planar pose estimation requires at least 4 correspondences",
            ));
        }
        let mut world = Vec::with_capacity(n);
        for m in data {
            world.push(m.1.point().ok_or(GeometryError::DegenerateInput(
                "world point lies at infinity",
            ))?);
        }

        // Fit the scene plane from the covariance spectrum: the two largest
        // axes span the plane, the smallest is the out-of-plane spread.
        let centroid = world.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n as f64;
        let mut covariance = Matrix3::zeros();
        for p in &world {
            let d = p.coords - centroid;
            covariance += d * d.transpose();
        }
        covariance /= n as f64;
        let eigen = covariance.symmetric_eigen();
        let mut order = [0, 1, 2];
        order.sort_unstable_by_key(|&ix| FloatOrd(eigen.eigenvalues[ix]));
        let thickness = eigen.eigenvalues[order[0]].max(0.0).sqrt();
        let width = eigen.eigenvalues[order[2]].max(0.0).sqrt();
        let breadth = eigen.eigenvalues[order[1]].max(0.0).sqrt();
        if width < f64::EPSILON || breadth < self.planarity * width {
            return Err(GeometryError::DegenerateInput(
                "world points are collinear or coincident",
            ));
        }
        if thickness > self.planarity * width {
            return Err(GeometryError::DegenerateInput(
                "world points are not coplanar",
            ));
        }
        let axis_u = eigen.eigenvectors.column(order[2]).into_owned();
        let axis_v = eigen.eigenvectors.column(order[1]).into_owned();

        // Plane-to-image homography in the centered plane frame.
        let plane_matches: Vec<FeatureMatch> = world
            .iter()
            .zip(data)
            .map(|(w, m)| {
                let d = w.coords - centroid;
                FeatureMatch(Point2::new(d.dot(&axis_u), d.dot(&axis_v)), m.0)
            })
            .collect();
        let homography = HomographyDlt::new()
            .estimate(&plane_matches)?
            .into_iter()
            .next()
            .ok_or(GeometryError::DegenerateInput(
                "plane-to-image homography estimation produced nothing",
            ))?;

        let (rotation_a, rotation_b) = plane_rotations(&homography.0)?;
        let plane_to_world = Matrix3::from_columns(&[axis_u, axis_v, axis_u.cross(&axis_v)]);

        let mut hypotheses: ArrayVec<WorldToCamera, 2> = ArrayVec::new();
        for plane_rotation in [rotation_a, rotation_b] {
            let translation = match fit_plane_translation(&plane_rotation, &plane_matches) {
                Some(translation) => translation,
                None => continue,
            };
            // Compose with the rigid world-to-plane frame change.
            let rotation =
                Rotation3::from_matrix_unchecked(plane_rotation * plane_to_world.transpose());
            let pose = WorldToCamera::from_parts(
                translation - rotation * centroid,
                rotation,
            );
            hypotheses.push(pose);
        }
        if hypotheses.is_empty() {
            return Err(GeometryError::DegenerateInput(
                "no finite translation for either planar pose",
            ));
        }
        // Best pose first.
        hypotheses.sort_unstable_by_key(|pose| {
            FloatOrd(data.iter().map(|m| pose.residual(m)).sum::<f64>())
        });
        Ok(hypotheses)
    }
}

/// The two rotations mapping the plane frame into the camera frame that are
/// consistent with the plane-to-image homography to first order around the
/// plane origin.
fn plane_rotations(h: &Matrix3<f64>) -> Result<(Matrix3<f64>, Matrix3<f64>), GeometryError> {
    if h[(2, 2)].abs() < f64::EPSILON {
        return Err(GeometryError::DegenerateInput(
            "plane origin projects to infinity",
        ));
    }
    let u0 = h[(0, 2)] / h[(2, 2)];
    let v0 = h[(1, 2)] / h[(2, 2)];
    // Jacobian of the homography at the plane origin.
    let j00 = (h[(0, 0)] - u0 * h[(2, 0)]) / h[(2, 2)];
    let j01 = (h[(0, 1)] - u0 * h[(2, 1)]) / h[(2, 2)];
    let j10 = (h[(1, 0)] - v0 * h[(2, 0)]) / h[(2, 2)];
    let j11 = (h[(1, 1)] - v0 * h[(2, 1)]) / h[(2, 2)];

    // Rotate the viewing ray of the plane origin onto the optical axis and
    // correct the Jacobian for that rotation.
    let ray = Vector3::new(u0, v0, 1.0).normalize();
    let rv = Rotation3::rotation_between(&Vector3::z(), &ray).unwrap_or_else(Rotation3::identity);
    let rv = *rv.matrix();
    let b00 = rv[(0, 0)] - u0 * rv[(2, 0)];
    let b01 = rv[(0, 1)] - u0 * rv[(2, 1)];
    let b10 = rv[(1, 0)] - v0 * rv[(2, 0)];
    let b11 = rv[(1, 1)] - v0 * rv[(2, 1)];
    let det = b00 * b11 - b01 * b10;
    if det.abs() < f64::EPSILON {
        return Err(GeometryError::DegenerateInput(
            "viewing geometry of the plane origin is singular",
        ));
    }
    let a00 = (b11 * j00 - b01 * j10) / det;
    let a01 = (b11 * j01 - b01 * j11) / det;
    let a10 = (b00 * j10 - b10 * j00) / det;
    let a11 = (b00 * j11 - b10 * j01) / det;

    // Largest singular value of A fixes the scale of the rotation block.
    let ata00 = a00 * a00 + a10 * a10;
    let ata01 = a00 * a01 + a10 * a11;
    let ata11 = a01 * a01 + a11 * a11;
    let gamma_squared =
        0.5 * (ata00 + ata11 + ((ata00 - ata11).powi(2) + 4.0 * ata01 * ata01).sqrt());
    if gamma_squared < f64::EPSILON {
        return Err(GeometryError::DegenerateInput(
            "homography Jacobian collapsed at the plane origin",
        ));
    }
    let gamma = gamma_squared.sqrt();
    let r00 = a00 / gamma;
    let r01 = a01 / gamma;
    let r10 = a10 / gamma;
    let r11 = a11 / gamma;

    // The third row of the rotation block is determined up to a joint sign,
    // which is exactly the two-fold planar pose ambiguity.
    let b0 = (1.0 - r00 * r00 - r10 * r10).max(0.0).sqrt();
    let mut b1 = (1.0 - r01 * r01 - r11 * r11).max(0.0).sqrt();
    if -(r00 * r01 + r10 * r11) < 0.0 {
        b1 = -b1;
    }

    let build = |b0: f64, b1: f64| {
        let col0 = Vector3::new(r00, r10, b0);
        let col1 = Vector3::new(r01, r11, b1);
        let col2 = col0.cross(&col1);
        rv * Matrix3::from_columns(&[col0, col1, col2])
    };
    Ok((build(b0, b1), build(-b0, -b1)))
}

/// Least-squares translation aligning the rotated plane points with their
/// observations.
fn fit_plane_translation(
    rotation: &Matrix3<f64>,
    plane_matches: &[FeatureMatch],
) -> Option<Vector3<f64>> {
    let mut normal = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    for m in plane_matches {
        let rotated = rotation * Vector3::new(m.0.x, m.0.y, 0.0);
        let (u, v) = (m.1.x, m.1.y);
        for row in [
            (Vector3::new(1.0, 0.0, -u), u * rotated.z - rotated.x),
            (Vector3::new(0.0, 1.0, -v), v * rotated.z - rotated.y),
        ] {
            normal += row.0 * row.0.transpose();
            rhs += row.0 * row.1;
        }
    }
    normal.try_inverse().map(|inverse| inverse * rhs)
}
