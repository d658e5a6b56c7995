use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Matrix3, Rotation3, Unit, Vector3};
use num_traits::Float;

/// A member of the lie algebra so(3), the tangent space of 3d rotation.
///
/// This is only intended to be used in optimization problems where it is
/// desirable to have unconstrained variables representing the degrees of
/// freedom of the rotation. In all other cases a rotation matrix should be
/// used to store rotations, since the conversion to and from a rotation
/// matrix is non-trivial.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct Skew3(pub Vector3<f64>);

impl Skew3 {
    /// Converts the Skew3 to a Rotation3 matrix.
    pub fn rotation(self) -> Rotation3<f64> {
        self.into()
    }

    /// Converts the Skew3 into a Rotation3 matrix quickly, but only works
    /// when the rotation is very small.
    pub fn rotation_small(self) -> Rotation3<f64> {
        Rotation3::from_matrix(&(Matrix3::identity() + self.hat()))
    }

    /// This converts the Skew3 into its skew-symmetric matrix form.
    pub fn hat(self) -> Matrix3<f64> {
        self.0.cross_matrix()
    }

    /// The jacobian of the output of a rotation in respect to the
    /// rotation itself.
    ///
    /// `y = R * x`
    ///
    /// The derivative is purely based on the current output vector, and thus
    /// doesn't take `self`.
    pub fn jacobian_self(y: Vector3<f64>) -> Matrix3<f64> {
        y.cross_matrix()
    }
}

/// This is the exponential map.
impl From<Skew3> for Rotation3<f64> {
    fn from(w: Skew3) -> Self {
        // This check is done to avoid the degenerate case where the angle is near zero.
        let theta2 = w.0.norm_squared();
        if theta2 <= f64::epsilon() {
            w.rotation_small()
        } else {
            let theta = theta2.sqrt();
            let axis = Unit::new_unchecked(w.0 / theta);
            Self::from_axis_angle(&axis, theta)
        }
    }
}

/// This is the log map.
impl From<Rotation3<f64>> for Skew3 {
    fn from(r: Rotation3<f64>) -> Self {
        let skew3 = r.scaled_axis();
        let skew3 = if skew3.iter().any(|n| n.is_nan()) {
            Vector3::zeros()
        } else {
            skew3
        };
        Self(skew3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exp_log_round_trip() {
        let w = Skew3(Vector3::new(0.2, -0.4, 0.1));
        let recovered = Skew3::from(w.rotation());
        assert_relative_eq!(w.0, recovered.0, epsilon = 1e-12);
    }

    #[test]
    fn log_of_identity_is_zero() {
        let w = Skew3::from(Rotation3::identity());
        assert_relative_eq!(w.0, Vector3::zeros());
    }

    #[test]
    fn hat_applies_the_cross_product() {
        let w = Skew3(Vector3::new(0.3, 0.1, -0.2));
        let x = Vector3::new(1.0, -2.0, 0.5);
        assert_relative_eq!(w.hat() * x, w.0.cross(&x), epsilon = 1e-15);
    }
}
