use mvg_core::nalgebra::{Matrix3, Point2, Vector2};

/// An isotropic conditioning transform for a set of 2d observations.
///
/// Linear estimation of homographies and fundamental matrices is numerically
/// sensitive to the coordinate magnitude, so each view's observations are
/// translated to their centroid and scaled so the mean distance from the
/// origin becomes `sqrt(2)` before the design matrix is built. The resulting
/// matrix estimate is then mapped back through [`Conditioner::matrix`] and
/// [`Conditioner::inverse_matrix`].
#[derive(Debug, Clone, Copy)]
pub struct Conditioner {
    centroid: Vector2<f64>,
    scale: f64,
}

impl Conditioner {
    /// Fit the conditioning transform to a set of observations.
    ///
    /// Returns `None` when the set is empty or all points coincide, in which
    /// case no valid conditioning (and no valid estimate) exists.
    pub fn fit(points: impl Iterator<Item = Point2<f64>> + Clone) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = Vector2::zeros();
        for p in points.clone() {
            sum += p.coords;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let centroid = sum / count as f64;
        let mean_distance =
            points.map(|p| (p.coords - centroid).norm()).sum::<f64>() / count as f64;
        if mean_distance < f64::EPSILON {
            return None;
        }
        Some(Self {
            centroid,
            scale: core::f64::consts::SQRT_2 / mean_distance,
        })
    }

    /// Condition one observation.
    pub fn apply(&self, point: Point2<f64>) -> Point2<f64> {
        ((point.coords - self.centroid) * self.scale).into()
    }

    /// The homogeneous conditioning matrix `T` with `apply(p) ~ T * p`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.scale,
            0.0,
            -self.scale * self.centroid.x,
            0.0,
            self.scale,
            -self.scale * self.centroid.y,
            0.0,
            0.0,
            1.0,
        )
    }

    /// The inverse of [`Conditioner::matrix`], computed in closed form.
    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            1.0 / self.scale,
            0.0,
            self.centroid.x,
            0.0,
            1.0 / self.scale,
            self.centroid.y,
            0.0,
            0.0,
            1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mvg_core::nalgebra::Vector3;

    #[test]
    fn conditioned_points_have_unit_spread() {
        let points = [
            Point2::new(320.0, 240.0),
            Point2::new(10.0, 400.0),
            Point2::new(615.0, 12.0),
            Point2::new(400.0, 300.0),
        ];
        let conditioner = Conditioner::fit(points.iter().copied()).unwrap();
        let conditioned: Vec<_> = points.iter().map(|&p| conditioner.apply(p)).collect();
        let centroid = conditioned
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.coords)
            / conditioned.len() as f64;
        assert_relative_eq!(centroid.norm(), 0.0, epsilon = 1e-12);
        let mean_distance =
            conditioned.iter().map(|p| p.coords.norm()).sum::<f64>() / conditioned.len() as f64;
        assert_relative_eq!(mean_distance, core::f64::consts::SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn matrix_agrees_with_apply() {
        let points = [
            Point2::new(1.0, 5.0),
            Point2::new(-3.0, 2.0),
            Point2::new(7.0, -4.0),
        ];
        let conditioner = Conditioner::fit(points.iter().copied()).unwrap();
        for &p in &points {
            let lifted = conditioner.matrix() * Vector3::new(p.x, p.y, 1.0);
            let applied = conditioner.apply(p);
            assert_relative_eq!(lifted.x / lifted.z, applied.x, epsilon = 1e-12);
            assert_relative_eq!(lifted.y / lifted.z, applied.y, epsilon = 1e-12);
        }
        let round_trip = conditioner.inverse_matrix() * conditioner.matrix();
        assert_relative_eq!(round_trip, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn coincident_points_are_rejected() {
        let points = [Point2::new(2.0, 2.0); 6];
        assert!(Conditioner::fit(points.iter().copied()).is_none());
    }
}
