use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::{Point2, Point3, Unit, Vector3, Vector4};

/// This trait is implemented for homogeneous projective 3d coordinates.
pub trait Projective: From<Vector4<f64>> + Clone + Copy {
    /// Retrieve the homogeneous vector.
    ///
    /// No constraints are put on this vector. It may be rescaled freely and
    /// remains equivalent to the original coordinate.
    fn homogeneous(self) -> Vector4<f64>;

    /// Create the coordinate from a homogeneous vector.
    fn from_homogeneous(vector: Vector4<f64>) -> Self {
        vector.into()
    }

    /// Retrieve the euclidean 3d point by normalizing the homogeneous coordinate.
    ///
    /// This fails for points at or near infinity (`w` close to zero).
    fn point(self) -> Option<Point3<f64>> {
        Point3::from_homogeneous(self.homogeneous())
    }

    /// Convert a euclidean 3d point into homogeneous coordinates.
    fn from_point(point: Point3<f64>) -> Self {
        point.to_homogeneous().into()
    }

    /// Retrieve the normalized bearing of the coordinate.
    fn bearing(self) -> Unit<Vector3<f64>> {
        Unit::new_normalize(self.homogeneous().xyz())
    }

    /// Perspective projection onto the `z = 1` virtual image plane, producing
    /// normalized image coordinates.
    ///
    /// The result is independent of the homogeneous scale. Returns `None`
    /// when the point lies on the principal plane (`z` of zero) or the
    /// projection is otherwise not finite.
    fn image_point(self) -> Option<Point2<f64>> {
        let h = self.homogeneous();
        let uv = Point2::new(h.x / h.z, h.y / h.z);
        uv.coords.iter().all(|n| n.is_finite()).then_some(uv)
    }
}

/// A 3d homogeneous point relative to some camera's optical center and
/// orientation, where the positive X axis is right, positive Y axis is down,
/// and positive Z axis is forwards from the optical center.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct CameraPoint(pub Vector4<f64>);

impl Projective for CameraPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}

/// A 3d homogeneous point in world coordinates.
///
/// The unit of distance is unspecified and relative to the current
/// reconstruction; scale is arbitrary until fixed by an external reference.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
pub struct WorldPoint(pub Vector4<f64>);

impl Projective for WorldPoint {
    fn homogeneous(self) -> Vector4<f64> {
        self.into()
    }
}
