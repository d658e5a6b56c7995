use mvg_core::{
    nalgebra::{IsometryMatrix3, Matrix3, Point2, Point3, Rotation3, Vector3},
    CameraPoint, CameraToCamera, Disambiguate, FeatureMatch, GeometryError, HypothesisEstimator,
    Pose, Projective,
};
use mvg_epipolar::{
    EssentialNister5, FundamentalLinear7, FundamentalLinear8, HomographyDlt, SampsonDistance,
};

const SAMPLE_POINTS: usize = 16;
const RESIDUAL_THRESHOLD: f64 = 1e-4;

const ROT_MAGNITUDE: f64 = 0.2;
const POINT_BOX_SIZE: f64 = 2.0;
const POINT_DISTANCE: f64 = 3.0;

/// A random relative pose and the projections of a shared random point cloud
/// into both views, in normalized image coordinates.
fn two_view_scene(points: usize) -> (CameraToCamera, Vec<FeatureMatch>) {
    let relative_pose = CameraToCamera(IsometryMatrix3::from_parts(
        Vector3::new_random().into(),
        Rotation3::new(Vector3::new_random() * std::f64::consts::PI * 2.0 * ROT_MAGNITUDE),
    ));
    let matches = (0..points)
        .map(|_| {
            let mut p = Point3::from(Vector3::new_random() * POINT_BOX_SIZE);
            p.x -= 0.5 * POINT_BOX_SIZE;
            p.y -= 0.5 * POINT_BOX_SIZE;
            p.z += POINT_DISTANCE;
            let a = CameraPoint::from_point(p);
            let b = relative_pose.transform(a);
            FeatureMatch(
                a.image_point().expect("point was generated in front"),
                b.image_point().expect("point stayed in front for this pose"),
            )
        })
        .collect();
    (relative_pose, matches)
}

#[test]
fn homography_recovers_exactly_from_noise_free_points() {
    let truth = Matrix3::new(1.2, 0.1, 30.0, -0.05, 0.95, -12.0, 1e-4, -2e-4, 1.0);
    let matches: Vec<FeatureMatch> = [
        (12.0, 44.0),
        (610.0, 15.0),
        (33.0, 420.0),
        (580.0, 455.0),
        (320.0, 240.0),
        (150.0, 310.0),
        (455.0, 120.0),
        (260.0, 70.0),
    ]
    .iter()
    .map(|&(x, y)| {
        let mapped = truth * Vector3::new(x, y, 1.0);
        FeatureMatch(
            Point2::new(x, y),
            Point2::new(mapped.x / mapped.z, mapped.y / mapped.z),
        )
    })
    .collect();

    let homography = HomographyDlt::new()
        .estimate(&matches)
        .expect("homography estimation failed")
        .into_iter()
        .next()
        .expect("no hypothesis returned");
    let estimated = homography.0 / homography.0[(2, 2)];
    let expected = truth / truth[(2, 2)];
    for (est, exp) in estimated.iter().zip(expected.iter()) {
        assert!(
            (est - exp).abs() < 1e-6,
            "entry mismatch: {} vs {}",
            est,
            exp
        );
    }
    for m in &matches {
        assert!(homography.transfer_residual(m) < 1e-6);
    }
}

#[test]
fn homography_rejects_degenerate_sample() {
    // Three of the four points are collinear, so the homography is not unique.
    let truth = Matrix3::new(2.0, 0.0, 5.0, 0.0, 0.5, -3.0, 0.0, 0.0, 1.0);
    let matches: Vec<FeatureMatch> = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (5.0, 1.0)]
        .iter()
        .map(|&(x, y)| {
            let mapped = truth * Vector3::new(x, y, 1.0);
            FeatureMatch(
                Point2::new(x, y),
                Point2::new(mapped.x / mapped.z, mapped.y / mapped.z),
            )
        })
        .collect();
    assert!(matches!(
        HomographyDlt::new().estimate(&matches),
        Err(GeometryError::DegenerateInput(_))
    ));
}

#[test]
fn eight_point_randomized() {
    let successes = (0..1000).filter(|_| eight_point_round()).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 950);
}

fn eight_point_round() -> bool {
    let (_, matches) = two_view_scene(SAMPLE_POINTS);
    let fundamental = match FundamentalLinear8::new().estimate(&matches) {
        Ok(hypotheses) => hypotheses.into_iter().next().unwrap(),
        Err(_) => return false,
    };
    matches
        .iter()
        .all(|m| fundamental.algebraic_residual(m) < RESIDUAL_THRESHOLD)
}

#[test]
fn eight_point_refuses_seven_correspondences() {
    let (_, matches) = two_view_scene(7);
    assert!(matches!(
        FundamentalLinear8::new().estimate(&matches),
        Err(GeometryError::DegenerateInput(_))
    ));
}

#[test]
fn seven_point_randomized() {
    let successes = (0..1000).filter(|_| seven_point_round()).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 950);
}

fn seven_point_round() -> bool {
    let (_, matches) = two_view_scene(SAMPLE_POINTS);
    let disambiguator = Disambiguate::new(FundamentalLinear7::new(), SampsonDistance);
    let fundamental = match disambiguator.estimate_prefix(&matches) {
        Ok(fundamental) => fundamental,
        Err(_) => return false,
    };
    matches
        .iter()
        .all(|m| fundamental.sampson_residual(m) < RESIDUAL_THRESHOLD)
}

#[test]
fn five_point_randomized() {
    let successes = (0..1000).filter(|_| five_point_round()).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 950);
}

fn five_point_round() -> bool {
    let (_, matches) = two_view_scene(SAMPLE_POINTS);
    let hypotheses = match EssentialNister5::new().estimate(&matches) {
        Ok(hypotheses) => hypotheses,
        Err(_) => return false,
    };
    // The solver is allowed up to 10 essential matrix hypotheses; at least
    // one must explain every correspondence.
    assert!(hypotheses.len() <= 10);
    hypotheses.iter().any(|essential| {
        matches
            .iter()
            .all(|m| essential.algebraic_residual(m) < RESIDUAL_THRESHOLD)
    })
}

#[test]
fn five_point_disambiguation_requires_extra_correspondences() {
    let (_, matches) = two_view_scene(5);
    let disambiguator = Disambiguate::new(EssentialNister5::new(), SampsonDistance);
    assert_eq!(
        disambiguator.estimate_single(&matches, &[]).err(),
        Some(GeometryError::InsufficientDisambiguationSamples)
    );
}

#[test]
fn five_point_disambiguation_selects_consistent_hypothesis() {
    let successes = (0..200).filter(|_| five_point_disambiguation_round()).count();
    eprintln!("successes: {}", successes);
    assert!(successes > 190);
}

fn five_point_disambiguation_round() -> bool {
    let (_, matches) = two_view_scene(SAMPLE_POINTS);
    let disambiguator = Disambiguate::new(EssentialNister5::new(), SampsonDistance);
    let essential = match disambiguator.estimate_prefix(&matches) {
        Ok(essential) => essential,
        Err(_) => return false,
    };
    matches
        .iter()
        .all(|m| essential.algebraic_residual(m) < RESIDUAL_THRESHOLD)
}
