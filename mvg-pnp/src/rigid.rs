use mvg_core::{
    nalgebra::{Matrix3, Point3, Rotation3, Vector3},
    GeometryError, Pose, WorldToCamera,
};

/// Fit the rigid transform taking `world` points onto `camera` points with
/// the Kabsch algorithm.
///
/// Every PnP solver in this crate ends here once it has reconstructed the
/// observed points in the camera frame.
pub fn fit_world_to_camera(
    world: &[Point3<f64>],
    camera: &[Vector3<f64>],
) -> Result<WorldToCamera, GeometryError> {
    if world.len() != camera.len() || world.len() < 3 {
        return Err(GeometryError::DegenerateInput(
            "rigid alignment requires at least 3 paired points",
        ));
    }
    let n = world.len() as f64;
    let centroid_w = world.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let centroid_c = camera.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n;

    let mut cross_covariance = Matrix3::zeros();
    for (pw, pc) in world.iter().zip(camera.iter()) {
        cross_covariance += (pc - centroid_c) * (pw.coords - centroid_w).transpose();
    }

    let svd = cross_covariance.svd(true, true);
    let (u, v_t) = svd
        .u
        .zip(svd.v_t)
        .ok_or(GeometryError::DegenerateInput(
            "singular value decomposition of the cross covariance failed",
        ))?;
    let mut u = u;
    if (u * v_t).determinant() < 0.0 {
        // Flip the reflection into a proper rotation.
        u.column_mut(2).neg_mut();
    }
    let rotation = Rotation3::from_matrix_unchecked(u * v_t);
    let translation = centroid_c - rotation * centroid_w;
    Ok(WorldToCamera::from_parts(translation, rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mvg_core::nalgebra::IsometryMatrix3;

    #[test]
    fn recovers_known_transform() {
        let pose = IsometryMatrix3::from_parts(
            Vector3::new(0.3, -0.2, 1.5).into(),
            Rotation3::from_euler_angles(0.1, -0.3, 0.25),
        );
        let world = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.2),
            Point3::new(0.0, 1.0, -0.1),
            Point3::new(0.4, 0.6, 0.9),
        ];
        let camera: Vec<Vector3<f64>> = world
            .iter()
            .map(|p| pose.transform_point(p).coords)
            .collect();
        let fitted = fit_world_to_camera(&world, &camera).unwrap();
        assert_relative_eq!(
            fitted.0.translation.vector,
            pose.translation.vector,
            epsilon = 1e-10
        );
        assert!(fitted.0.rotation.rotation_to(&pose.rotation).angle() < 1e-10);
    }

    #[test]
    fn too_few_points_are_rejected() {
        let world = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        let camera = [Vector3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 1.0)];
        assert!(fit_world_to_camera(&world, &camera).is_err());
    }
}
