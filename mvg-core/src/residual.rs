use crate::{FeatureWorldMatch, Pose, Projective, WorldToCamera};

/// A pure function mapping a model and one observation to a scalar residual.
///
/// Residual models are selectable per refinement or disambiguation call
/// (Sampson, transfer, algebraic, reprojection) and own no state. The
/// concrete strategies for the epipolar matrices live next to their models;
/// pose reprojection lives here because poses are a core type.
pub trait ResidualModel<M, D> {
    fn residual(&self, model: &M, data: &D) -> f64;
}

/// Reprojection distance of a world point through a pose, in normalized
/// image coordinates. Observations that project behind or onto the
/// principal plane get an infinite residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReprojectionDistance;

impl ResidualModel<WorldToCamera, FeatureWorldMatch> for ReprojectionDistance {
    fn residual(&self, model: &WorldToCamera, data: &FeatureWorldMatch) -> f64 {
        let &FeatureWorldMatch(image, world) = data;
        let camera = model.transform(world);
        if camera.homogeneous().z.is_sign_negative() {
            return f64::INFINITY;
        }
        camera
            .image_point()
            .map(|projected| (projected - image).norm())
            .unwrap_or(f64::INFINITY)
    }
}
