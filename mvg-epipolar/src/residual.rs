use crate::{EssentialMatrix, FundamentalMatrix, HomographyMatrix};
use mvg_core::{FeatureMatch, ResidualModel};

/// First-order geometric (Sampson) error, in squared distance units.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampsonDistance;

/// Absolute algebraic error of the model equation. Cheap but biased by the
/// coordinate magnitude; prefer [`SampsonDistance`] unless profiling says
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlgebraicDistance;

/// One-way transfer distance through a homography, in distance units.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferDistance;

impl ResidualModel<FundamentalMatrix, FeatureMatch> for SampsonDistance {
    fn residual(&self, model: &FundamentalMatrix, data: &FeatureMatch) -> f64 {
        model.sampson_residual(data)
    }
}

impl ResidualModel<EssentialMatrix, FeatureMatch> for SampsonDistance {
    fn residual(&self, model: &EssentialMatrix, data: &FeatureMatch) -> f64 {
        model.sampson_residual(data)
    }
}

impl ResidualModel<HomographyMatrix, FeatureMatch> for SampsonDistance {
    fn residual(&self, model: &HomographyMatrix, data: &FeatureMatch) -> f64 {
        model.sampson_residual(data)
    }
}

impl ResidualModel<FundamentalMatrix, FeatureMatch> for AlgebraicDistance {
    fn residual(&self, model: &FundamentalMatrix, data: &FeatureMatch) -> f64 {
        model.algebraic_residual(data)
    }
}

impl ResidualModel<EssentialMatrix, FeatureMatch> for AlgebraicDistance {
    fn residual(&self, model: &EssentialMatrix, data: &FeatureMatch) -> f64 {
        model.algebraic_residual(data)
    }
}

impl ResidualModel<HomographyMatrix, FeatureMatch> for AlgebraicDistance {
    fn residual(&self, model: &HomographyMatrix, data: &FeatureMatch) -> f64 {
        model.algebraic_residual(data)
    }
}

impl ResidualModel<HomographyMatrix, FeatureMatch> for TransferDistance {
    fn residual(&self, model: &HomographyMatrix, data: &FeatureMatch) -> f64 {
        model.transfer_residual(data)
    }
}
