use crate::RelativeDlt;
use mvg_core::{CameraToCamera, FeatureMatch, GeometryError};
use mvg_epipolar::EssentialMatrix;

/// Resolves the four-fold rotation/translation ambiguity of an essential
/// matrix decomposition by cheirality voting.
///
/// Each correspondence is triangulated under each of the four candidate
/// poses from [`EssentialMatrix::possible_unscaled_poses`]; a triangulation
/// counts as a vote when the point lands in front of both cameras. The pose
/// with the most votes wins, with earlier candidates winning ties.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PoseRecovery {
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl PoseRecovery {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for PoseRecovery {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            max_iterations: 1000,
        }
    }
}

impl PoseRecovery {
    /// Recover the relative pose of the second camera from `essential` and
    /// the correspondences it was estimated from.
    ///
    /// The translation of the returned pose has unit norm; the true scale
    /// is unobservable from two views. At least one correspondence is
    /// required to vote, and at least one candidate pose must place a point
    /// in front of both cameras.
    pub fn recover(
        &self,
        essential: EssentialMatrix,
        matches: &[FeatureMatch],
    ) -> Result<CameraToCamera, GeometryError> {
        if matches.is_empty() {
            return Err(GeometryError::InsufficientDisambiguationSamples);
        }
        let poses = essential
            .possible_unscaled_poses(self.epsilon, self.max_iterations)
            .ok_or(GeometryError::DegenerateInput(
                "essential matrix could not be decomposed",
            ))?;
        let triangulator = RelativeDlt::new();
        let mut best: Option<(CameraToCamera, usize)> = None;
        for pose in poses {
            let votes = matches
                .iter()
                .filter(|&&FeatureMatch(a, b)| triangulator.triangulate(pose, a, b).is_ok())
                .count();
            if best.map_or(true, |(_, best_votes)| votes > best_votes) {
                best = Some((pose, votes));
            }
        }
        match best {
            Some((pose, votes)) if votes > 0 => Ok(pose),
            _ => Err(GeometryError::DegenerateInput(
                "no candidate pose places a point in front of both cameras",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mvg_core::{
        nalgebra::{IsometryMatrix3, Point3, Rotation3, Vector3},
        CameraPoint, Pose, Projective,
    };

    #[test]
    fn recovers_pose_of_known_motion() {
        let pose = CameraToCamera(IsometryMatrix3::from_parts(
            Vector3::new(0.3, -0.1, 0.2).normalize().into(),
            Rotation3::new(Vector3::new(0.05, 0.1, -0.05)),
        ));
        let essential = EssentialMatrix::from(pose);
        let matches: Vec<_> = [
            Point3::new(0.2, 0.1, 2.0),
            Point3::new(-0.3, 0.2, 1.5),
            Point3::new(0.1, -0.25, 2.5),
            Point3::new(0.4, 0.3, 1.8),
            Point3::new(-0.1, -0.1, 2.2),
        ]
        .into_iter()
        .map(|point| {
            let camera = CameraPoint::from_point(point);
            FeatureMatch(
                camera.image_point().unwrap(),
                pose.transform(camera).image_point().unwrap(),
            )
        })
        .collect();

        let recovered = PoseRecovery::new().recover(essential, &matches).unwrap();
        let truth = pose.isometry();
        let got = recovered.isometry();
        assert!((got.translation.vector - truth.translation.vector).norm() < 1e-6);
        assert!(got.rotation.angle_to(&truth.rotation) < 1e-6);
    }

    #[test]
    fn refuses_to_vote_without_correspondences() {
        let pose = CameraToCamera(IsometryMatrix3::from_parts(
            Vector3::new(1.0, 0.0, 0.0).into(),
            Rotation3::identity(),
        ));
        let essential = EssentialMatrix::from(pose);
        assert!(matches!(
            PoseRecovery::new().recover(essential, &[]),
            Err(GeometryError::InsufficientDisambiguationSamples)
        ));
    }
}
