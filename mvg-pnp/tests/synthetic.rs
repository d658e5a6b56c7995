use mvg_core::{
    nalgebra::{Point3, Rotation3, Vector3},
    Disambiguate, FeatureWorldMatch, GeometryError, HypothesisEstimator, Pose, Projective,
    ReprojectionDistance, ResidualModel, WorldPoint, WorldToCamera,
};
use mvg_pnp::{EPnP, Ippe, P3PFinsterwalder, P3PGrunert};

const ROT_MAGNITUDE: f64 = 0.25;
const TRANSLATION_JITTER: f64 = 0.3;

fn random_pose() -> WorldToCamera {
    let translation =
        Vector3::new(0.0, 0.0, 0.4) + (Vector3::new_random() - Vector3::repeat(0.5)) * TRANSLATION_JITTER;
    let rotation = Rotation3::new(
        (Vector3::new_random() - Vector3::repeat(0.5)) * 2.0 * ROT_MAGNITUDE,
    );
    WorldToCamera::from_parts(translation, rotation)
}

fn observe(pose: WorldToCamera, world: &[Point3<f64>]) -> Option<Vec<FeatureWorldMatch>> {
    world
        .iter()
        .map(|&p| {
            let world_point = WorldPoint::from_point(p);
            pose.transform(world_point)
                .image_point()
                .map(|image| FeatureWorldMatch(image, world_point))
        })
        .collect()
}

fn poses_match(estimated: WorldToCamera, truth: WorldToCamera, tolerance: f64) -> bool {
    let translation =
        (estimated.0.translation.vector - truth.0.translation.vector).norm();
    let angle = estimated.0.rotation.rotation_to(&truth.0.rotation).angle();
    translation < tolerance && angle < tolerance
}

fn spatial_points() -> Vec<Point3<f64>> {
    let mut points = Vec::new();
    for z in 0..2 {
        for y in 0..3 {
            for x in 0..4 {
                points.push(Point3::new(
                    x as f64 * 0.1 - 0.15,
                    y as f64 * 0.1 - 0.1,
                    0.6 + z as f64 * 0.1,
                ));
            }
        }
    }
    points
}

fn planar_points() -> Vec<Point3<f64>> {
    let mut points = Vec::new();
    for y in 0..4 {
        for x in 0..4 {
            points.push(Point3::new(
                x as f64 * 0.1 - 0.15,
                y as f64 * 0.1 - 0.15,
                0.8,
            ));
        }
    }
    points
}

fn p3p_round<E>(estimator: E) -> bool
where
    E: HypothesisEstimator<FeatureWorldMatch, Model = WorldToCamera>,
{
    let truth = random_pose();
    let world = [
        Point3::new(0.2, -0.1, 0.8),
        Point3::new(-0.1, 0.2, 1.1),
        Point3::new(0.15, 0.1, 0.9),
        Point3::new(-0.2, -0.15, 1.0),
        Point3::new(0.05, 0.25, 0.7),
    ];
    let matches = match observe(truth, &world) {
        Some(matches) => matches,
        None => return false,
    };
    let disambiguator = Disambiguate::new(estimator, ReprojectionDistance);
    match disambiguator.estimate_prefix(&matches) {
        Ok(pose) => poses_match(pose, truth, 1e-6),
        Err(_) => false,
    }
}

#[test]
fn grunert_randomized() {
    let successes = (0..1000).filter(|_| p3p_round(P3PGrunert::new())).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 950);
}

#[test]
fn finsterwalder_randomized() {
    let successes = (0..1000)
        .filter(|_| p3p_round(P3PFinsterwalder::new()))
        .count();
    eprintln!("successes: {}", successes);
    assert!(successes > 900);
}

#[test]
fn grunert_rejects_collinear_points() {
    let truth = random_pose();
    let world = [
        Point3::new(0.0, 0.0, 0.8),
        Point3::new(0.1, 0.05, 0.9),
        Point3::new(0.2, 0.1, 1.0),
    ];
    let matches = observe(truth, &world).unwrap();
    assert!(matches!(
        P3PGrunert::new().estimate(&matches),
        Err(GeometryError::DegenerateInput(_))
    ));
    assert!(matches!(
        P3PFinsterwalder::new().estimate(&matches),
        Err(GeometryError::DegenerateInput(_))
    ));
}

#[test]
fn epnp_recovers_pose_from_spatial_cloud() {
    let successes = (0..200)
        .filter(|_| {
            let truth = random_pose();
            let matches = match observe(truth, &spatial_points()) {
                Some(matches) => matches,
                None => return false,
            };
            let pose = match EPnP::new().estimate(&matches) {
                Ok(hypotheses) => hypotheses.into_iter().next().unwrap(),
                Err(_) => return false,
            };
            poses_match(pose, truth, 1e-4)
        })
        .count();
    eprintln!("successes: {}", successes);
    assert!(successes > 190);
}

#[test]
fn epnp_handles_planar_cloud() {
    // The conditioning floor keeps the control point basis invertible even
    // though the cloud is flat.
    let truth = random_pose();
    let matches = observe(truth, &planar_points()).unwrap();
    let pose = EPnP::new()
        .estimate(&matches)
        .expect("planar cloud should still be solvable")
        .into_iter()
        .next()
        .unwrap();
    assert!(poses_match(pose, truth, 1e-3));
}

#[test]
fn epnp_polish_never_degrades_the_linear_estimate() {
    let polished_solver = EPnP {
        polish_iterations: 10,
        ..Default::default()
    };
    for _ in 0..50 {
        let truth = random_pose();
        let matches = match observe(truth, &spatial_points()) {
            Some(matches) => matches,
            None => continue,
        };
        let linear = EPnP::new().estimate(&matches).unwrap()[0];
        let polished = polished_solver.estimate(&matches).unwrap()[0];
        let error = |pose: WorldToCamera| -> f64 {
            matches
                .iter()
                .map(|m| ReprojectionDistance.residual(&pose, m).powi(2))
                .sum()
        };
        assert!(error(polished) <= error(linear) + 1e-18);
    }
}

#[test]
fn ippe_recovers_planar_pose() {
    let successes = (0..200)
        .filter(|_| {
            let truth = random_pose();
            let matches = match observe(truth, &planar_points()) {
                Some(matches) => matches,
                None => return false,
            };
            let hypotheses = match Ippe::new().estimate(&matches) {
                Ok(hypotheses) => hypotheses,
                Err(_) => return false,
            };
            // The pose pair comes back ordered by reprojection error, so
            // the first hypothesis is the physically correct one.
            poses_match(hypotheses[0], truth, 1e-4)
        })
        .count();
    eprintln!("successes: {}", successes);
    assert!(successes > 190);
}

#[test]
fn ippe_rejects_spatial_cloud() {
    let truth = random_pose();
    let matches = observe(truth, &spatial_points()).unwrap();
    assert!(matches!(
        Ippe::new().estimate(&matches),
        Err(GeometryError::DegenerateInput(_))
    ));
}

#[test]
fn p3p_requires_extra_correspondence_to_disambiguate() {
    let truth = random_pose();
    let world = [
        Point3::new(0.2, -0.1, 0.8),
        Point3::new(-0.1, 0.2, 1.1),
        Point3::new(0.15, 0.1, 0.9),
    ];
    let matches = observe(truth, &world).unwrap();
    let disambiguator = Disambiguate::new(P3PGrunert::new(), ReprojectionDistance);
    assert_eq!(
        disambiguator.estimate_single(&matches, &[]).err(),
        Some(GeometryError::InsufficientDisambiguationSamples)
    );
}
