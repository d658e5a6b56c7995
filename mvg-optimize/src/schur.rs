use mvg_core::nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

/// Block-sparse Gauss-Newton normal equations for a camera/point problem,
/// reduced by eliminating the points through the Schur complement.
///
/// With `U` the block-diagonal camera part, `V` the block-diagonal point
/// part, `W` the camera-point coupling, and `g = J^T r` the gradient, the
/// camera update solves `S dc = -gc + W V^-1 gp` with
/// `S = U - W V^-1 W^T`, and the point updates back-substitute as
/// `dp_j = V_j^-1 (-gp_j - sum_i W_ij^T dc_i)`. `V` is inverted one small
/// block at a time, so the dense factorization only ever sees the camera
/// dimensions.
pub(crate) struct SchurSystem {
    camera_dim: usize,
    point_dim: usize,
    /// Per-camera diagonal blocks of `J^T J`.
    u: Vec<DMatrix<f64>>,
    /// Per-point diagonal blocks of `J^T J`.
    v: Vec<DMatrix<f64>>,
    /// Camera-point coupling blocks, keyed by `(camera, point)`.
    w: BTreeMap<(usize, usize), DMatrix<f64>>,
    camera_gradient: Vec<DVector<f64>>,
    point_gradient: Vec<DVector<f64>>,
}

impl SchurSystem {
    pub(crate) fn new(
        cameras: usize,
        points: usize,
        camera_dim: usize,
        point_dim: usize,
    ) -> Self {
        Self {
            camera_dim,
            point_dim,
            u: vec![DMatrix::zeros(camera_dim, camera_dim); cameras],
            v: vec![DMatrix::zeros(point_dim, point_dim); points],
            w: BTreeMap::new(),
            camera_gradient: vec![DVector::zeros(camera_dim); cameras],
            point_gradient: vec![DVector::zeros(point_dim); points],
        }
    }

    /// Accumulate one observation's residual and Jacobian blocks.
    ///
    /// `jacobian_camera` is `2 x camera_dim`, `jacobian_point` is
    /// `2 x point_dim`, and `residual` has 2 rows.
    pub(crate) fn accumulate(
        &mut self,
        camera: usize,
        point: usize,
        jacobian_camera: &DMatrix<f64>,
        jacobian_point: &DMatrix<f64>,
        residual: &DVector<f64>,
    ) {
        self.u[camera] += jacobian_camera.transpose() * jacobian_camera;
        self.v[point] += jacobian_point.transpose() * jacobian_point;
        *self
            .w
            .entry((camera, point))
            .or_insert_with(|| DMatrix::zeros(self.camera_dim, self.point_dim)) +=
            jacobian_camera.transpose() * jacobian_point;
        self.camera_gradient[camera] += jacobian_camera.transpose() * residual;
        self.point_gradient[point] += jacobian_point.transpose() * residual;
    }

    /// Infinity norm of the full gradient, for the convergence check.
    pub(crate) fn gradient_norm(&self) -> f64 {
        self.camera_gradient
            .iter()
            .chain(self.point_gradient.iter())
            .flat_map(|g| g.iter())
            .fold(0.0, |acc: f64, &n| acc.max(n.abs()))
    }

    /// Solve the damped system `(J^T J + lambda I) delta = -J^T r`.
    ///
    /// Returns per-camera and per-point update vectors, or `None` when a
    /// point block or the reduced camera system is not positive definite
    /// at this damping level.
    pub(crate) fn solve(&self, lambda: f64) -> Option<(Vec<DVector<f64>>, Vec<DVector<f64>>)> {
        let cameras = self.u.len();
        let points = self.v.len();

        let v_inverse: Vec<DMatrix<f64>> = self
            .v
            .iter()
            .map(|v| {
                let mut damped = v.clone();
                for d in 0..self.point_dim {
                    damped[(d, d)] += lambda;
                }
                damped.cholesky().map(|c| c.inverse())
            })
            .collect::<Option<_>>()?;

        // Assemble the reduced camera system.
        let mut s = DMatrix::zeros(cameras * self.camera_dim, cameras * self.camera_dim);
        let mut rhs = DVector::zeros(cameras * self.camera_dim);
        for (camera, u) in self.u.iter().enumerate() {
            let mut block = u.clone();
            for d in 0..self.camera_dim {
                block[(d, d)] += lambda;
            }
            s.slice_mut(
                (camera * self.camera_dim, camera * self.camera_dim),
                (self.camera_dim, self.camera_dim),
            )
            .copy_from(&block);
            rhs.rows_mut(camera * self.camera_dim, self.camera_dim)
                .copy_from(&(-&self.camera_gradient[camera]));
        }
        for ((camera_a, point), w_a) in &self.w {
            let w_a_v = w_a * &v_inverse[*point];
            let correction = &w_a_v * &self.point_gradient[*point];
            let mut rhs_block = rhs.rows_mut(camera_a * self.camera_dim, self.camera_dim);
            rhs_block += correction;
            for camera_b in 0..cameras {
                if let Some(w_b) = self.w.get(&(camera_b, *point)) {
                    let reduction = &w_a_v * w_b.transpose();
                    let mut s_block = s.slice_mut(
                        (camera_a * self.camera_dim, camera_b * self.camera_dim),
                        (self.camera_dim, self.camera_dim),
                    );
                    s_block -= reduction;
                }
            }
        }

        let camera_delta_flat = s.cholesky()?.solve(&rhs);
        let camera_deltas: Vec<DVector<f64>> = (0..cameras)
            .map(|camera| {
                camera_delta_flat
                    .rows(camera * self.camera_dim, self.camera_dim)
                    .into_owned()
            })
            .collect();

        // Back-substitute the points.
        let mut point_deltas: Vec<DVector<f64>> = (0..points)
            .map(|point| -&self.point_gradient[point])
            .collect();
        for ((camera, point), w) in &self.w {
            let update = w.transpose() * &camera_deltas[*camera];
            point_deltas[*point] -= update;
        }
        for (point, delta) in point_deltas.iter_mut().enumerate() {
            *delta = &v_inverse[point] * &*delta;
        }

        Some((camera_deltas, point_deltas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solve the same normal equations densely and through the Schur
    /// reduction; the updates must agree.
    #[test]
    fn reduction_matches_dense_solve() {
        let camera_dim = 2;
        let point_dim = 2;
        let mut system = SchurSystem::new(2, 2, camera_dim, point_dim);
        let observations = [
            (0, 0, [1.0, 0.2, 0.1, 0.9], [0.5, -0.1, 0.3, 0.8], [0.2, -0.1]),
            (0, 1, [0.8, -0.3, 0.2, 1.1], [0.7, 0.2, -0.2, 0.6], [-0.3, 0.4]),
            (1, 0, [1.2, 0.1, -0.1, 0.7], [0.4, 0.3, 0.1, 0.9], [0.1, 0.2]),
            (1, 1, [0.9, 0.0, 0.3, 1.0], [0.6, -0.2, 0.2, 0.7], [-0.2, -0.1]),
        ];
        let total = 2 * camera_dim + 2 * point_dim;
        let mut jacobian = DMatrix::zeros(observations.len() * 2, total);
        let mut residual = DVector::zeros(observations.len() * 2);
        for (row, (camera, point, jc, jp, r)) in observations.iter().enumerate() {
            let jc = DMatrix::from_row_slice(2, camera_dim, jc);
            let jp = DMatrix::from_row_slice(2, point_dim, jp);
            let r = DVector::from_row_slice(r);
            system.accumulate(*camera, *point, &jc, &jp, &r);
            jacobian
                .slice_mut((row * 2, camera * camera_dim), (2, camera_dim))
                .copy_from(&jc);
            jacobian
                .slice_mut((row * 2, 2 * camera_dim + point * point_dim), (2, point_dim))
                .copy_from(&jp);
            residual.rows_mut(row * 2, 2).copy_from(&r);
        }

        let lambda = 1e-3;
        let mut normal = jacobian.transpose() * &jacobian;
        for d in 0..total {
            normal[(d, d)] += lambda;
        }
        let dense = normal
            .cholesky()
            .unwrap()
            .solve(&(-(jacobian.transpose() * &residual)));

        let (camera_deltas, point_deltas) = system.solve(lambda).unwrap();
        for camera in 0..2 {
            let block = dense.rows(camera * camera_dim, camera_dim);
            assert!((&camera_deltas[camera] - block).norm() < 1e-10);
        }
        for point in 0..2 {
            let block = dense.rows(2 * camera_dim + point * point_dim, point_dim);
            assert!((&point_deltas[point] - block).norm() < 1e-10);
        }
    }
}
