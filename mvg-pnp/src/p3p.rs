use crate::fit_world_to_camera;
use arrayvec::ArrayVec;
use float_ord::FloatOrd;
use mvg_core::{
    nalgebra::{Matrix3, Point3, Vector3},
    solve_cubic_real, solve_quadratic_real, solve_quartic_real, FeatureWorldMatch, GeometryError,
    HypothesisEstimator, Projective, WorldToCamera,
};

const DEPTH_EPSILON: f64 = 1e-12;
const COLLINEARITY_EPSILON: f64 = 1e-9;

/// The triangle geometry shared by the perspective-3-point solvers: three
/// world points, the unit bearings observing them, the squared side lengths
/// of the world triangle, and the cosines of the inter-bearing angles.
///
/// Side `a` is opposite the first point, `b` the second, `c` the third, and
/// the depths along the bearings are written `s1, s2 = u * s1, s3 = v * s1`.
struct Triangle {
    world: [Point3<f64>; 3],
    bearings: [Vector3<f64>; 3],
    a2: f64,
    b2: f64,
    c2: f64,
    cos_alpha: f64,
    cos_beta: f64,
    cos_gamma: f64,
}

impl Triangle {
    fn new(data: &[FeatureWorldMatch]) -> Result<Self, GeometryError> {
        if data.len() < 3 {
            return Err(GeometryError::DegenerateInput(
                "perspective-3-point requires 3 correspondences",
            ));
        }
        let mut world = [Point3::origin(); 3];
        let mut bearings = [Vector3::zeros(); 3];
        for (i, m) in data.iter().take(3).enumerate() {
            world[i] = m.1.point().ok_or(GeometryError::DegenerateInput(
                "world point lies at infinity",
            ))?;
            bearings[i] = Vector3::new(m.0.x, m.0.y, 1.0).normalize();
        }

        let a = (world[1] - world[2]).norm();
        let b = (world[0] - world[2]).norm();
        let c = (world[0] - world[1]).norm();
        if a < DEPTH_EPSILON || b < DEPTH_EPSILON || c < DEPTH_EPSILON {
            return Err(GeometryError::DegenerateInput(
                "duplicate world points in the minimal sample",
            ));
        }
        let area = (world[1] - world[0]).cross(&(world[2] - world[0])).norm();
        if area < COLLINEARITY_EPSILON * b * c {
            return Err(GeometryError::DegenerateInput(
                "collinear world points do not constrain the pose",
            ));
        }

        Ok(Self {
            world,
            bearings,
            a2: a * a,
            b2: b * b,
            c2: c * c,
            cos_alpha: bearings[1].dot(&bearings[2]),
            cos_beta: bearings[0].dot(&bearings[2]),
            cos_gamma: bearings[0].dot(&bearings[1]),
        })
    }

    /// The first depth from the law of cosines on side `b`, given the depth
    /// ratio `v = s3 / s1`.
    fn first_depth_from_v(&self, v: f64) -> Option<f64> {
        let denom = 1.0 + v * v - 2.0 * v * self.cos_beta;
        if denom < DEPTH_EPSILON {
            return None;
        }
        let s1 = (self.b2 / denom).sqrt();
        s1.is_finite().then_some(s1)
    }

    /// Recover a pose from the depth triple, rejecting non-positive depths.
    fn pose_from_depths(&self, s1: f64, s2: f64, s3: f64) -> Option<(f64, WorldToCamera)> {
        if s1 <= 0.0 || s2 <= 0.0 || s3 <= 0.0 {
            return None;
        }
        let camera = [
            self.bearings[0] * s1,
            self.bearings[1] * s2,
            self.bearings[2] * s3,
        ];
        fit_world_to_camera(&self.world, &camera)
            .ok()
            .map(|pose| (s1, pose))
    }
}

/// Multiply two polynomials of degree at most 4, truncating to degree 4.
fn convolve5(a: &[f64; 5], b: &[f64; 5]) -> [f64; 5] {
    let mut out = [0.0; 5];
    for i in 0..5 {
        for j in 0..5 - i {
            out[i + j] += a[i] * b[j];
        }
    }
    out
}

/// Grunert's perspective-3-point solution.
///
/// Eliminates the depths from the three law-of-cosines equations into a
/// quartic in the depth ratio `u = s2 / s1`, producing up to 4 pose
/// hypotheses ordered by increasing first depth. Wrap in
/// [`mvg_core::Disambiguate`] with extra correspondences to select one.
#[derive(Debug, Clone, Copy, Default)]
pub struct P3PGrunert;

impl P3PGrunert {
    pub fn new() -> Self {
        Self
    }
}

impl HypothesisEstimator<FeatureWorldMatch> for P3PGrunert {
    type Model = WorldToCamera;
    type ModelIter = ArrayVec<WorldToCamera, 4>;

    fn min_samples(&self) -> usize {
        3
    }

    fn estimate(&self, data: &[FeatureWorldMatch]) -> Result<Self::ModelIter, GeometryError> {
        let triangle = Triangle::new(data)?;
        let Triangle {
            a2,
            b2,
            c2,
            cos_alpha,
            cos_beta,
            cos_gamma,
            ..
        } = triangle;

        let d = (b2 - a2) / c2;
        let e = b2 / c2;

        // v is a rational function of u: v = n(u) / den(u), leaving the
        // quartic n^2 - 2 cos(beta) n den + e den^2 = 0 in u alone.
        let n_poly = [1.0 - d, 2.0 * d * cos_gamma, -(1.0 + d), 0.0, 0.0];
        let den_poly = [2.0 * cos_beta, -2.0 * cos_alpha, 0.0, 0.0, 0.0];
        let e_poly = [1.0 - e, 2.0 * e * cos_gamma, -e, 0.0, 0.0];

        let n2 = convolve5(&n_poly, &n_poly);
        let n_den = convolve5(&n_poly, &den_poly);
        let e_den2 = convolve5(&e_poly, &convolve5(&den_poly, &den_poly));
        let mut coeffs = [0.0; 5];
        for i in 0..5 {
            coeffs[i] = n2[i] - 2.0 * cos_beta * n_den[i] + e_den2[i];
        }

        let mut solutions: ArrayVec<(f64, WorldToCamera), 4> = ArrayVec::new();
        for u in solve_quartic_real(coeffs[4], coeffs[3], coeffs[2], coeffs[1], coeffs[0]) {
            let den = den_poly[0] + den_poly[1] * u;
            if den.abs() < DEPTH_EPSILON {
                continue;
            }
            let v = (n_poly[0] + n_poly[1] * u + n_poly[2] * u * u) / den;
            let law_of_cosines_c = 1.0 + u * u - 2.0 * u * cos_gamma;
            if law_of_cosines_c < DEPTH_EPSILON {
                continue;
            }
            let s1 = (c2 / law_of_cosines_c).sqrt();
            if let Some(solution) = triangle.pose_from_depths(s1, u * s1, v * s1) {
                if solutions.len() < solutions.capacity() {
                    solutions.push(solution);
                }
            }
        }
        if solutions.is_empty() {
            return Err(GeometryError::DegenerateInput(
                "no geometrically valid root of the perspective-3-point quartic",
            ));
        }
        solutions.sort_unstable_by_key(|&(depth, _)| FloatOrd(depth));
        Ok(solutions.into_iter().map(|(_, pose)| pose).collect())
    }
}

/// Finsterwalder's perspective-3-point solution.
///
/// Forms a pencil of conics in the depth ratios `(u, v)`, finds a pencil
/// parameter making the conic degenerate (a cubic), splits the degenerate
/// conic into two lines, and intersects each line with one conic of the
/// pencil. Produces up to 4 pose hypotheses ordered by increasing first
/// depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct P3PFinsterwalder;

impl P3PFinsterwalder {
    pub fn new() -> Self {
        Self
    }
}

impl P3PFinsterwalder {
    /// The conic `G + lambda * H = 0` of the pencil, as a symmetric matrix
    /// acting on `(u, v, 1)`.
    fn pencil_conic(triangle: &Triangle, lambda: f64) -> Matrix3<f64> {
        let Triangle {
            a2,
            b2,
            c2,
            cos_alpha,
            cos_beta,
            cos_gamma,
            ..
        } = *triangle;
        let quad_u = 1.0 + lambda;
        let cross = -cos_alpha;
        let quad_v = (b2 - a2) / b2 - lambda * c2 / b2;
        let lin_u = -lambda * cos_gamma;
        let lin_v = (a2 + lambda * c2) * cos_beta / b2;
        let constant = -a2 / b2 + lambda * (b2 - c2) / b2;
        Matrix3::new(
            quad_u, cross, lin_u, cross, quad_v, lin_v, lin_u, lin_v, constant,
        )
    }

    /// Split a degenerate (rank-2) conic into its two lines.
    ///
    /// Returns `None` when the lines are complex, which happens when the
    /// chosen pencil parameter does not correspond to a real intersection.
    fn split_degenerate_conic(conic: Matrix3<f64>) -> Option<[Vector3<f64>; 2]> {
        // The adjugate of a rank-2 conic is a rank-1 outer product of the
        // intersection point of the two lines.
        let adjugate = adjugate3(&conic);
        let (index, diagonal) = (0..3)
            .map(|i| (i, adjugate[(i, i)]))
            .min_by_key(|&(_, d)| FloatOrd(d))?;
        if diagonal >= 0.0 {
            return None;
        }
        let intersection = adjugate.column(index).into_owned() / (-diagonal).sqrt();
        // Adding the cross matrix of the intersection point splits the
        // symmetric rank-2 form into the rank-1 product of the two lines.
        let split = conic + intersection.cross_matrix();
        let (row, col) = split
            .iter()
            .enumerate()
            .max_by_key(|&(_, n)| FloatOrd(n.abs()))
            .map(|(flat, _)| (flat % 3, flat / 3))?;
        let line_a = split.row(row).transpose();
        let line_b = split.column(col).into_owned();
        (line_a.norm() > DEPTH_EPSILON && line_b.norm() > DEPTH_EPSILON)
            .then_some([line_a, line_b])
    }
}

/// The adjugate of a 3x3 matrix, with `m * adjugate(m) = det(m) * I`.
fn adjugate3(m: &Matrix3<f64>) -> Matrix3<f64> {
    let mut out = Matrix3::zeros();
    for i in 0..3 {
        for j in 0..3 {
            let r0 = (i + 1) % 3;
            let r1 = (i + 2) % 3;
            let c0 = (j + 1) % 3;
            let c1 = (j + 2) % 3;
            // Transposed cofactor.
            out[(j, i)] = m[(r0, c0)] * m[(r1, c1)] - m[(r0, c1)] * m[(r1, c0)];
        }
    }
    out
}

impl HypothesisEstimator<FeatureWorldMatch> for P3PFinsterwalder {
    type Model = WorldToCamera;
    type ModelIter = ArrayVec<WorldToCamera, 4>;

    fn min_samples(&self) -> usize {
        3
    }

    fn estimate(&self, data: &[FeatureWorldMatch]) -> Result<Self::ModelIter, GeometryError> {
        let triangle = Triangle::new(data)?;

        // det(G + lambda * H) is a cubic in lambda; recover its coefficients
        // from four determinant samples.
        let d0 = Self::pencil_conic(&triangle, 0.0).determinant();
        let d1 = Self::pencil_conic(&triangle, 1.0).determinant();
        let dm1 = Self::pencil_conic(&triangle, -1.0).determinant();
        let d2 = Self::pencil_conic(&triangle, 2.0).determinant();
        let c0 = d0;
        let c2 = (d1 + dm1) / 2.0 - d0;
        let odd = (d1 - dm1) / 2.0;
        let c3 = ((d2 - d0 - 4.0 * c2) / 2.0 - odd) / 3.0;
        let c1 = odd - c3;

        let base_conic = Self::pencil_conic(&triangle, 0.0);
        let mut solutions: ArrayVec<(f64, WorldToCamera), 4> = ArrayVec::new();
        for lambda in solve_cubic_real(c3, c2, c1, c0) {
            let lines = match Self::split_degenerate_conic(Self::pencil_conic(&triangle, lambda)) {
                Some(lines) => lines,
                None => continue,
            };
            for line in lines {
                // Walk the line parametrically and intersect it with the
                // base conic of the pencil, giving up to two (u, v) pairs.
                let anchor = if line.x.abs() >= line.y.abs() {
                    Vector3::new(-line.z / line.x, 0.0, 1.0)
                } else {
                    Vector3::new(0.0, -line.z / line.y, 1.0)
                };
                let direction = Vector3::new(line.y, -line.x, 0.0);
                let qa = (direction.transpose() * base_conic * direction)[0];
                let qb = 2.0 * (direction.transpose() * base_conic * anchor)[0];
                let qc = (anchor.transpose() * base_conic * anchor)[0];
                for t in solve_quadratic_real(qa, qb, qc) {
                    let u = anchor.x + t * direction.x;
                    let v = anchor.y + t * direction.y;
                    let s1 = match triangle.first_depth_from_v(v) {
                        Some(s1) => s1,
                        None => continue,
                    };
                    if let Some(solution) = triangle.pose_from_depths(s1, u * s1, v * s1) {
                        if solutions.len() < solutions.capacity() {
                            solutions.push(solution);
                        }
                    }
                }
            }
            if !solutions.is_empty() {
                break;
            }
        }
        if solutions.is_empty() {
            return Err(GeometryError::DegenerateInput(
                "no geometrically valid intersection of the degenerate conic lines",
            ));
        }
        solutions.sort_unstable_by_key(|&(depth, _)| FloatOrd(depth));
        Ok(solutions.into_iter().map(|(_, pose)| pose).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvg_core::nalgebra::Matrix3 as M3;

    #[test]
    fn adjugate_satisfies_defining_identity() {
        let m = M3::new(2.0, -1.0, 0.5, 0.3, 1.7, -0.2, -0.9, 0.4, 1.1);
        let product = m * adjugate3(&m);
        let expected = M3::identity() * m.determinant();
        assert!((product - expected).norm() < 1e-12);
    }
}
