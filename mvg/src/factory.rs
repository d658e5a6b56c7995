//! Algorithm selection by enum, in the style of a configuration layer.
//!
//! Every constructor validates its selection eagerly: combinations that
//! have no implementation fail with
//! [`GeometryError::UnsupportedAlgorithm`] before any data is seen, and
//! single-answer constructors for multi-hypothesis algorithms require a
//! non-zero disambiguation budget up front.

use arrayvec::ArrayVec;
use mvg_core::{
    nalgebra::Point2, CameraPoint, CameraToCamera, ConvergeConfig, Disambiguate, FeatureMatch,
    FeatureWorldMatch, GeometryError, HypothesisEstimator, ModelRefiner, Pose, Projective,
    ProjectiveCamera, Refinement, ReprojectionDistance, ResidualModel, WorldPoint, WorldToCamera,
};
use mvg_epipolar::{
    AlgebraicDistance, EssentialLinear7, EssentialLinear8, EssentialMatrix, EssentialNister5,
    FundamentalLinear7, FundamentalLinear8, FundamentalMatrix, HomographyMatrix, SampsonDistance,
    TransferDistance,
};
use mvg_geom::{NViewDlt, NViewGeometric, ProjectiveAlgebraic, ProjectiveDlt, RelativeDlt};
use mvg_optimize::{
    BundleAdjustMetric, BundleAdjustProjective, FundamentalRefiner, HomographyRefiner,
    PointRefiner, PoseRefiner,
};
use mvg_pnp::{Ippe, P3PFinsterwalder, P3PGrunert, EPnP};

/// Epipolar matrix estimation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpipolarAlgorithm {
    /// Least-squares 8-point, one hypothesis.
    Linear8,
    /// Minimal 7-point, up to 3 hypotheses.
    Linear7,
    /// Minimal 5-point, essential matrices only, up to 10 hypotheses.
    Nister5,
}

/// Perspective-n-point pose estimation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpAlgorithm {
    P3pGrunert,
    P3pFinsterwalder,
    Epnp,
    Ippe,
}

/// Triangulation objective selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangulationMode {
    /// Direct linear transform with row scaling.
    Dlt,
    /// Bearing-weighted linear objective; metric poses only.
    Geometric,
    /// Raw algebraic objective; projective cameras only.
    Algebraic,
}

/// Residual selection for the matrix refiners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// First-order geometric (Sampson) error.
    Sampson,
    /// The cheap model-native error: transfer distance for homographies,
    /// algebraic distance for epipolar matrices.
    Simple,
}

/// Configuration for the PnP solvers; fields apply to the algorithms that
/// use them and are ignored by the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PnpConfig {
    /// EPnP control point conditioning floor.
    pub epnp_conditioning: f64,
    /// EPnP Gauss-Newton polish steps; zero disables polishing.
    pub epnp_polish_iterations: usize,
    /// IPPE out-of-plane tolerance.
    pub ippe_planarity: f64,
}

impl Default for PnpConfig {
    fn default() -> Self {
        Self {
            epnp_conditioning: 0.1,
            epnp_polish_iterations: 0,
            ippe_planarity: 1e-3,
        }
    }
}

/// A fundamental matrix estimator selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum FundamentalEstimator {
    Linear8(FundamentalLinear8),
    Linear7(FundamentalLinear7),
}

impl HypothesisEstimator<FeatureMatch> for FundamentalEstimator {
    type Model = FundamentalMatrix;
    type ModelIter = ArrayVec<FundamentalMatrix, 3>;

    fn min_samples(&self) -> usize {
        match self {
            Self::Linear8(estimator) => estimator.min_samples(),
            Self::Linear7(estimator) => estimator.min_samples(),
        }
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        match self {
            Self::Linear8(estimator) => Ok(estimator.estimate(data)?.into_iter().collect()),
            Self::Linear7(estimator) => estimator.estimate(data),
        }
    }
}

/// An essential matrix estimator selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum EssentialEstimator {
    Linear8(EssentialLinear8),
    Linear7(EssentialLinear7),
    Nister5(EssentialNister5),
}

impl HypothesisEstimator<FeatureMatch> for EssentialEstimator {
    type Model = EssentialMatrix;
    type ModelIter = ArrayVec<EssentialMatrix, 10>;

    fn min_samples(&self) -> usize {
        match self {
            Self::Linear8(estimator) => estimator.min_samples(),
            Self::Linear7(estimator) => estimator.min_samples(),
            Self::Nister5(estimator) => estimator.min_samples(),
        }
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        match self {
            Self::Linear8(estimator) => Ok(estimator.estimate(data)?.into_iter().collect()),
            Self::Linear7(estimator) => Ok(estimator.estimate(data)?.into_iter().collect()),
            Self::Nister5(estimator) => estimator.estimate(data),
        }
    }
}

/// A PnP estimator selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum PnpEstimator {
    Grunert(P3PGrunert),
    Finsterwalder(P3PFinsterwalder),
    Epnp(EPnP),
    Ippe(Ippe),
}

impl HypothesisEstimator<FeatureWorldMatch> for PnpEstimator {
    type Model = WorldToCamera;
    type ModelIter = ArrayVec<WorldToCamera, 4>;

    fn min_samples(&self) -> usize {
        match self {
            Self::Grunert(estimator) => estimator.min_samples(),
            Self::Finsterwalder(estimator) => estimator.min_samples(),
            Self::Epnp(estimator) => estimator.min_samples(),
            Self::Ippe(estimator) => estimator.min_samples(),
        }
    }

    fn estimate(&self, data: &[FeatureWorldMatch]) -> Result<Self::ModelIter, GeometryError> {
        match self {
            Self::Grunert(estimator) => estimator.estimate(data),
            Self::Finsterwalder(estimator) => estimator.estimate(data),
            Self::Epnp(estimator) => Ok(estimator.estimate(data)?.into_iter().collect()),
            Self::Ippe(estimator) => Ok(estimator.estimate(data)?.into_iter().collect()),
        }
    }
}

/// A multi-hypothesis estimator reduced to a single answer.
///
/// When the wrapped algorithm is single-valued the extra correspondences
/// are optional; multi-valued algorithms require them, and the factory
/// constructors already reject configurations that promise none.
#[derive(Debug, Clone, Copy)]
pub struct SingleEstimator<E, R> {
    estimator: E,
    residual: R,
    requires_extra: bool,
}

impl<E, R> SingleEstimator<E, R> {
    /// Estimate from `sample`, disambiguating with `extra` when present.
    pub fn estimate<D>(&self, sample: &[D], extra: &[D]) -> Result<E::Model, GeometryError>
    where
        E: HypothesisEstimator<D> + Clone,
        R: ResidualModel<E::Model, D> + Clone,
    {
        if !extra.is_empty() {
            return Disambiguate::new(self.estimator.clone(), self.residual.clone())
                .estimate_single(sample, extra);
        }
        if self.requires_extra {
            return Err(GeometryError::InsufficientDisambiguationSamples);
        }
        self.estimator
            .estimate(sample)?
            .into_iter()
            .next()
            .ok_or(GeometryError::DegenerateInput(
                "estimator produced no hypotheses",
            ))
    }
}

pub fn fundamental(
    algorithm: EpipolarAlgorithm,
) -> Result<FundamentalEstimator, GeometryError> {
    match algorithm {
        EpipolarAlgorithm::Linear8 => Ok(FundamentalEstimator::Linear8(FundamentalLinear8::new())),
        EpipolarAlgorithm::Linear7 => Ok(FundamentalEstimator::Linear7(FundamentalLinear7::new())),
        EpipolarAlgorithm::Nister5 => Err(GeometryError::UnsupportedAlgorithm(
            "the 5-point algorithm estimates essential matrices only",
        )),
    }
}

/// Single-answer fundamental estimation.
///
/// `extra` is the number of disambiguation correspondences the caller
/// promises to supply; selecting the multi-valued 7-point algorithm with
/// zero fails here rather than at estimation time.
pub fn fundamental_single(
    algorithm: EpipolarAlgorithm,
    extra: usize,
) -> Result<SingleEstimator<FundamentalEstimator, SampsonDistance>, GeometryError> {
    let estimator = fundamental(algorithm)?;
    let requires_extra = matches!(algorithm, EpipolarAlgorithm::Linear7);
    if requires_extra && extra == 0 {
        return Err(GeometryError::InsufficientDisambiguationSamples);
    }
    Ok(SingleEstimator {
        estimator,
        residual: SampsonDistance,
        requires_extra,
    })
}

pub fn essential(algorithm: EpipolarAlgorithm) -> EssentialEstimator {
    match algorithm {
        EpipolarAlgorithm::Linear8 => EssentialEstimator::Linear8(EssentialLinear8::new()),
        EpipolarAlgorithm::Linear7 => EssentialEstimator::Linear7(EssentialLinear7::new()),
        EpipolarAlgorithm::Nister5 => EssentialEstimator::Nister5(EssentialNister5::new()),
    }
}

/// Single-answer essential estimation; see [`fundamental_single`].
pub fn essential_single(
    algorithm: EpipolarAlgorithm,
    extra: usize,
) -> Result<SingleEstimator<EssentialEstimator, SampsonDistance>, GeometryError> {
    let requires_extra = matches!(
        algorithm,
        EpipolarAlgorithm::Linear7 | EpipolarAlgorithm::Nister5
    );
    if requires_extra && extra == 0 {
        return Err(GeometryError::InsufficientDisambiguationSamples);
    }
    Ok(SingleEstimator {
        estimator: essential(algorithm),
        residual: SampsonDistance,
        requires_extra,
    })
}

pub fn pnp(algorithm: PnpAlgorithm, config: PnpConfig) -> PnpEstimator {
    match algorithm {
        PnpAlgorithm::P3pGrunert => PnpEstimator::Grunert(P3PGrunert::new()),
        PnpAlgorithm::P3pFinsterwalder => PnpEstimator::Finsterwalder(P3PFinsterwalder::new()),
        PnpAlgorithm::Epnp => PnpEstimator::Epnp(EPnP {
            conditioning: config.epnp_conditioning,
            polish_iterations: config.epnp_polish_iterations,
        }),
        PnpAlgorithm::Ippe => PnpEstimator::Ippe(Ippe {
            planarity: config.ippe_planarity,
        }),
    }
}

/// Single-answer PnP.
///
/// The P3P solvers are multi-valued and need extra correspondences; EPnP
/// is single-valued and IPPE already orders its pose pair best-first.
pub fn pnp_single(
    algorithm: PnpAlgorithm,
    config: PnpConfig,
    extra: usize,
) -> Result<SingleEstimator<PnpEstimator, ReprojectionDistance>, GeometryError> {
    let requires_extra = matches!(
        algorithm,
        PnpAlgorithm::P3pGrunert | PnpAlgorithm::P3pFinsterwalder
    );
    if requires_extra && extra == 0 {
        return Err(GeometryError::InsufficientDisambiguationSamples);
    }
    Ok(SingleEstimator {
        estimator: pnp(algorithm, config),
        residual: ReprojectionDistance,
        requires_extra,
    })
}

/// Two-view triangulation in the first camera's frame.
#[derive(Debug, Clone, Copy)]
pub enum TwoViewTriangulator {
    Dlt(RelativeDlt),
    Geometric(NViewGeometric),
}

impl TwoViewTriangulator {
    pub fn triangulate(
        &self,
        pose: CameraToCamera,
        a: Point2<f64>,
        b: Point2<f64>,
    ) -> Result<CameraPoint, GeometryError> {
        match self {
            Self::Dlt(triangulator) => triangulator.triangulate(pose, a, b),
            Self::Geometric(triangulator) => {
                // The world frame is the first camera's frame.
                let views = [
                    (WorldToCamera::identity(), a),
                    (WorldToCamera(pose.isometry()), b),
                ];
                let point = triangulator
                    .estimate(&views)?
                    .into_iter()
                    .next()
                    .ok_or(GeometryError::DegenerateInput(
                        "triangulation produced no solution",
                    ))?;
                Ok(CameraPoint::from_homogeneous(point.homogeneous()))
            }
        }
    }
}

pub fn triangulate_two_view_metric(
    mode: TriangulationMode,
) -> Result<TwoViewTriangulator, GeometryError> {
    match mode {
        TriangulationMode::Dlt => Ok(TwoViewTriangulator::Dlt(RelativeDlt::new())),
        TriangulationMode::Geometric => Ok(TwoViewTriangulator::Geometric(NViewGeometric::new())),
        TriangulationMode::Algebraic => Err(GeometryError::UnsupportedAlgorithm(
            "the algebraic objective is only available for projective cameras",
        )),
    }
}

/// An N-view metric triangulator selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum NViewTriangulator {
    Dlt(NViewDlt),
    Geometric(NViewGeometric),
}

impl HypothesisEstimator<(WorldToCamera, Point2<f64>)> for NViewTriangulator {
    type Model = WorldPoint;
    type ModelIter = ArrayVec<WorldPoint, 1>;

    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(
        &self,
        data: &[(WorldToCamera, Point2<f64>)],
    ) -> Result<Self::ModelIter, GeometryError> {
        match self {
            Self::Dlt(triangulator) => triangulator.estimate(data),
            Self::Geometric(triangulator) => triangulator.estimate(data),
        }
    }
}

pub fn triangulate_n_view_metric(
    mode: TriangulationMode,
) -> Result<NViewTriangulator, GeometryError> {
    match mode {
        TriangulationMode::Dlt => Ok(NViewTriangulator::Dlt(NViewDlt::new())),
        TriangulationMode::Geometric => Ok(NViewTriangulator::Geometric(NViewGeometric::new())),
        TriangulationMode::Algebraic => Err(GeometryError::UnsupportedAlgorithm(
            "the algebraic objective is only available for projective cameras",
        )),
    }
}

/// An N-view projective triangulator selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum ProjectiveTriangulator {
    Dlt(ProjectiveDlt),
    Algebraic(ProjectiveAlgebraic),
}

impl HypothesisEstimator<(ProjectiveCamera, Point2<f64>)> for ProjectiveTriangulator {
    type Model = WorldPoint;
    type ModelIter = ArrayVec<WorldPoint, 1>;

    fn min_samples(&self) -> usize {
        2
    }

    fn estimate(
        &self,
        data: &[(ProjectiveCamera, Point2<f64>)],
    ) -> Result<Self::ModelIter, GeometryError> {
        match self {
            Self::Dlt(triangulator) => triangulator.estimate(data),
            Self::Algebraic(triangulator) => triangulator.estimate(data),
        }
    }
}

pub fn triangulate_n_view_projective(
    mode: TriangulationMode,
) -> Result<ProjectiveTriangulator, GeometryError> {
    match mode {
        TriangulationMode::Dlt => Ok(ProjectiveTriangulator::Dlt(ProjectiveDlt::new())),
        TriangulationMode::Algebraic => {
            Ok(ProjectiveTriangulator::Algebraic(ProjectiveAlgebraic::new()))
        }
        TriangulationMode::Geometric => Err(GeometryError::UnsupportedAlgorithm(
            "the geometric weighting requires metric poses for the cheirality test",
        )),
    }
}

/// A homography refiner with its residual selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum SelectedHomographyRefiner {
    Sampson(HomographyRefiner<SampsonDistance>),
    Transfer(HomographyRefiner<TransferDistance>),
}

impl ModelRefiner<HomographyMatrix, FeatureMatch> for SelectedHomographyRefiner {
    fn refine(
        &self,
        model: HomographyMatrix,
        data: &[FeatureMatch],
    ) -> Result<Refinement<HomographyMatrix>, GeometryError> {
        match self {
            Self::Sampson(refiner) => refiner.refine(model, data),
            Self::Transfer(refiner) => refiner.refine(model, data),
        }
    }
}

pub fn homography_refiner(
    kind: ResidualKind,
    config: ConvergeConfig,
) -> SelectedHomographyRefiner {
    match kind {
        ResidualKind::Sampson => {
            SelectedHomographyRefiner::Sampson(HomographyRefiner::new(SampsonDistance, config))
        }
        ResidualKind::Simple => {
            SelectedHomographyRefiner::Transfer(HomographyRefiner::new(TransferDistance, config))
        }
    }
}

/// A fundamental matrix refiner with its residual selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum SelectedFundamentalRefiner {
    Sampson(FundamentalRefiner<SampsonDistance>),
    Algebraic(FundamentalRefiner<AlgebraicDistance>),
}

impl ModelRefiner<FundamentalMatrix, FeatureMatch> for SelectedFundamentalRefiner {
    fn refine(
        &self,
        model: FundamentalMatrix,
        data: &[FeatureMatch],
    ) -> Result<Refinement<FundamentalMatrix>, GeometryError> {
        match self {
            Self::Sampson(refiner) => refiner.refine(model, data),
            Self::Algebraic(refiner) => refiner.refine(model, data),
        }
    }
}

pub fn fundamental_refiner(
    kind: ResidualKind,
    config: ConvergeConfig,
) -> SelectedFundamentalRefiner {
    match kind {
        ResidualKind::Sampson => {
            SelectedFundamentalRefiner::Sampson(FundamentalRefiner::new(SampsonDistance, config))
        }
        ResidualKind::Simple => {
            SelectedFundamentalRefiner::Algebraic(FundamentalRefiner::new(AlgebraicDistance, config))
        }
    }
}

pub fn pose_refiner(config: ConvergeConfig) -> PoseRefiner {
    PoseRefiner::new(config)
}

pub fn point_refiner(config: ConvergeConfig) -> PointRefiner {
    PointRefiner::new(config)
}

pub fn bundle_adjust_metric(config: ConvergeConfig) -> BundleAdjustMetric {
    BundleAdjustMetric::new(config)
}

pub fn bundle_adjust_projective(config: ConvergeConfig) -> BundleAdjustProjective {
    BundleAdjustProjective::new(config)
}
