use mvg::factory::{
    self, EpipolarAlgorithm, PnpAlgorithm, PnpConfig, ResidualKind, TriangulationMode,
};
use mvg::sample_consensus::Model;
use mvg::{
    nalgebra::{Point2, Point3, Rotation3, Vector3},
    CameraPoint, CameraToCamera, ConvergeConfig, EstimateThenRefine, FeatureMatch,
    FeatureWorldMatch, GeometryError, HypothesisEstimator, ModelRefiner, Pose, PoseRecovery,
    Projective, WorldPoint, WorldToCamera,
};

fn relative_pose() -> CameraToCamera {
    CameraToCamera::from_parts(
        Vector3::new(0.3, -0.1, 0.15).normalize(),
        Rotation3::new(Vector3::new(0.05, 0.1, -0.05)),
    )
}

fn scene_points() -> Vec<Point3<f64>> {
    vec![
        Point3::new(0.2, 0.1, 2.0),
        Point3::new(-0.3, 0.2, 1.5),
        Point3::new(0.1, -0.25, 2.5),
        Point3::new(0.4, 0.3, 1.8),
        Point3::new(-0.1, -0.1, 2.2),
        Point3::new(0.25, -0.3, 1.6),
        Point3::new(-0.35, 0.05, 2.8),
        Point3::new(0.05, 0.35, 2.1),
        Point3::new(0.33, 0.12, 1.9),
        Point3::new(-0.22, -0.28, 2.4),
    ]
}

fn two_view_matches() -> (CameraToCamera, Vec<FeatureMatch>) {
    let pose = relative_pose();
    let matches = scene_points()
        .into_iter()
        .map(|point| {
            let camera = CameraPoint::from_point(point);
            FeatureMatch(
                camera.image_point().unwrap(),
                pose.transform(camera).image_point().unwrap(),
            )
        })
        .collect();
    (pose, matches)
}

#[test]
fn unsupported_selections_fail_at_construction() {
    assert!(matches!(
        factory::fundamental(EpipolarAlgorithm::Nister5),
        Err(GeometryError::UnsupportedAlgorithm(_))
    ));
    assert!(matches!(
        factory::triangulate_two_view_metric(TriangulationMode::Algebraic),
        Err(GeometryError::UnsupportedAlgorithm(_))
    ));
    assert!(matches!(
        factory::triangulate_n_view_metric(TriangulationMode::Algebraic),
        Err(GeometryError::UnsupportedAlgorithm(_))
    ));
    assert!(matches!(
        factory::triangulate_n_view_projective(TriangulationMode::Geometric),
        Err(GeometryError::UnsupportedAlgorithm(_))
    ));
}

#[test]
fn multi_valued_single_estimators_require_a_disambiguation_budget() {
    assert!(matches!(
        factory::fundamental_single(EpipolarAlgorithm::Linear7, 0),
        Err(GeometryError::InsufficientDisambiguationSamples)
    ));
    assert!(matches!(
        factory::essential_single(EpipolarAlgorithm::Nister5, 0),
        Err(GeometryError::InsufficientDisambiguationSamples)
    ));
    assert!(matches!(
        factory::pnp_single(PnpAlgorithm::P3pGrunert, PnpConfig::default(), 0),
        Err(GeometryError::InsufficientDisambiguationSamples)
    ));
    assert!(factory::fundamental_single(EpipolarAlgorithm::Linear8, 0).is_ok());
    assert!(factory::pnp_single(PnpAlgorithm::Epnp, PnpConfig::default(), 0).is_ok());
}

#[test]
fn seven_point_through_the_factory_selects_the_planted_matrix() {
    let (_, matches) = two_view_matches();
    let estimator = factory::fundamental_single(EpipolarAlgorithm::Linear7, 3).unwrap();
    let fundamental = estimator.estimate(&matches[..7], &matches[7..]).unwrap();
    for m in &matches {
        assert!(fundamental.residual(m) < 1e-8);
    }
}

#[test]
fn five_point_through_the_factory_recovers_the_relative_pose() {
    let (pose, matches) = two_view_matches();
    let estimator = factory::essential_single(EpipolarAlgorithm::Nister5, 5).unwrap();
    let essential = estimator.estimate(&matches[..5], &matches[5..]).unwrap();
    for m in &matches {
        assert!(essential.residual(m) < 1e-6);
    }
    let recovered = PoseRecovery::new().recover(essential, &matches).unwrap();
    let truth = pose.isometry();
    let got = recovered.isometry();
    assert!((got.translation.vector - truth.translation.vector).norm() < 1e-4);
    assert!(got.rotation.angle_to(&truth.rotation) < 1e-4);
}

#[test]
fn pnp_through_the_factory_recovers_a_pose() {
    let truth = WorldToCamera::from_parts(
        Vector3::new(0.1, -0.05, 0.4),
        Rotation3::new(Vector3::new(0.1, -0.05, 0.05)),
    );
    let matches: Vec<_> = scene_points()
        .into_iter()
        .map(|point| {
            let world = WorldPoint::from_point(point);
            FeatureWorldMatch(truth.transform(world).image_point().unwrap(), world)
        })
        .collect();
    let estimator =
        factory::pnp_single(PnpAlgorithm::P3pGrunert, PnpConfig::default(), 5).unwrap();
    let pose = estimator.estimate(&matches[..3], &matches[3..]).unwrap();
    assert!(
        (pose.isometry().translation.vector - truth.isometry().translation.vector).norm() < 1e-6
    );
    assert!(pose.isometry().rotation.angle_to(&truth.isometry().rotation) < 1e-6);
}

#[test]
fn triangulation_with_refinement_is_never_worse_than_the_linear_solve() {
    let views = [
        WorldToCamera::identity(),
        WorldToCamera::from_parts(
            Vector3::new(-0.4, 0.1, 0.0),
            Rotation3::new(Vector3::new(0.0, -0.1, 0.02)),
        ),
        WorldToCamera::from_parts(
            Vector3::new(0.35, -0.15, 0.05),
            Rotation3::new(Vector3::new(0.08, 0.12, 0.0)),
        ),
    ];
    let truth = Point3::new(0.15, -0.1, 2.1);
    // Small observation noise so the linear and geometric optima differ.
    let noise = [
        Point2::new(4e-4, -2e-4),
        Point2::new(-3e-4, 3e-4),
        Point2::new(2e-4, 4e-4),
    ];
    let data: Vec<_> = views
        .iter()
        .zip(noise)
        .map(|(&pose, jitter)| {
            let observed = pose
                .transform(WorldPoint::from_point(truth))
                .image_point()
                .unwrap();
            (pose, Point2::new(observed.x + jitter.x, observed.y + jitter.y))
        })
        .collect();

    let reprojection_error = |point: WorldPoint| -> f64 {
        data.iter()
            .map(|&(pose, observation)| {
                (pose.transform(point).image_point().unwrap() - observation).norm_squared()
            })
            .sum()
    };

    let linear = factory::triangulate_n_view_metric(TriangulationMode::Dlt).unwrap();
    let refined = EstimateThenRefine::new(linear, factory::point_refiner(ConvergeConfig::default()));
    let linear_point = linear.estimate(&data).unwrap().remove(0);
    let refined_point = refined.estimate(&data).unwrap().remove(0);
    assert!(reprojection_error(refined_point) <= reprojection_error(linear_point) + 1e-18);
}

#[test]
fn two_view_triangulators_agree_on_clean_data() {
    let pose = relative_pose();
    let point = CameraPoint::from_point(Point3::new(0.2, -0.1, 2.3));
    let a = point.image_point().unwrap();
    let b = pose.transform(point).image_point().unwrap();
    let dlt = factory::triangulate_two_view_metric(TriangulationMode::Dlt).unwrap();
    let geometric = factory::triangulate_two_view_metric(TriangulationMode::Geometric).unwrap();
    let from_dlt = dlt.triangulate(pose, a, b).unwrap().point().unwrap();
    let from_geometric = geometric.triangulate(pose, a, b).unwrap().point().unwrap();
    assert!((from_dlt - point.point().unwrap()).norm() < 1e-7);
    assert!((from_geometric - point.point().unwrap()).norm() < 1e-7);
}

#[test]
fn matrix_refiners_accept_both_residual_kinds() {
    let (_, matches) = two_view_matches();
    let estimator = factory::fundamental(EpipolarAlgorithm::Linear8).unwrap();
    let fundamental = estimator.estimate(&matches).unwrap().remove(0);
    for kind in [ResidualKind::Sampson, ResidualKind::Simple] {
        let refiner = factory::fundamental_refiner(kind, ConvergeConfig::default());
        let refinement = refiner.refine(fundamental, &matches).unwrap();
        assert!(refinement.residual < 1e-10);
    }
}
