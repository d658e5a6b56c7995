use crate::{Pose, Projective, WorldPoint, WorldToCamera};
use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Matrix3x4, Point2};

/// An uncalibrated projective camera, a general rank-3 `3x4` projection
/// matrix defined up to scale.
///
/// The projective reconstruction operations use this in place of
/// [`WorldToCamera`]; there is no rotation/translation split and no notion
/// of being in front of or behind the camera.
#[derive(Debug, Clone, Copy, PartialEq, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct ProjectiveCamera(pub Matrix3x4<f64>);

impl ProjectiveCamera {
    /// Project a homogeneous world point into the image.
    ///
    /// Returns `None` when the point projects onto the principal plane or
    /// the projection is otherwise not finite.
    pub fn project(&self, point: WorldPoint) -> Option<Point2<f64>> {
        let projected = self.0 * point.homogeneous();
        let uv = Point2::new(projected.x / projected.z, projected.y / projected.z);
        uv.coords.iter().all(|n| n.is_finite()).then_some(uv)
    }
}

/// Every metric camera is also a projective camera.
impl From<WorldToCamera> for ProjectiveCamera {
    fn from(pose: WorldToCamera) -> Self {
        let homogeneous = pose.homogeneous();
        Self(homogeneous.fixed_rows::<3>(0).into_owned())
    }
}
