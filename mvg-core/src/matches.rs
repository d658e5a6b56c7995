use crate::WorldPoint;
use nalgebra::Point2;

/// A 2d point correspondence between two views of the same scene point.
///
/// The first element is the observation in the reference view and the second
/// is the observation in the current view, so an epipolar matrix `M` relating
/// the two satisfies `second' * M * first = 0` in homogeneous coordinates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FeatureMatch(pub Point2<f64>, pub Point2<f64>);

/// A normalized 2d observation of a known world point, used by the PnP solvers.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FeatureWorldMatch(pub Point2<f64>, pub WorldPoint);
