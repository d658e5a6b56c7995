use crate::{GeometryError, HypothesisEstimator, ResidualModel};
use float_ord::FloatOrd;

/// Wraps a multi-hypothesis estimator to produce a single answer.
///
/// The hypothesis set is ranked by the summed residual over `extra`
/// correspondences that are disjoint from the minimal sample, and the
/// hypothesis with the lowest aggregate wins. Ties are broken by hypothesis
/// generation order (first generated wins) for determinism.
///
/// The same reducer resolves the multi-valuedness of the epipolar minimal
/// solvers (7-point, 5-point) and of the P3P solvers; only the residual
/// model differs.
#[derive(Debug, Clone, Copy)]
pub struct Disambiguate<E, R> {
    estimator: E,
    residual: R,
}

impl<E, R> Disambiguate<E, R> {
    pub fn new(estimator: E, residual: R) -> Self {
        Self {
            estimator,
            residual,
        }
    }

    /// Estimate from `sample` and select the best hypothesis using `extra`.
    ///
    /// Fails with [`GeometryError::InsufficientDisambiguationSamples`] when
    /// `extra` is empty; this is checked before the numeric solve runs.
    pub fn estimate_single<D>(&self, sample: &[D], extra: &[D]) -> Result<E::Model, GeometryError>
    where
        E: HypothesisEstimator<D>,
        R: ResidualModel<E::Model, D>,
    {
        if extra.is_empty() {
            return Err(GeometryError::InsufficientDisambiguationSamples);
        }
        self.estimator
            .estimate(sample)?
            .into_iter()
            .min_by_key(|model| {
                FloatOrd(
                    extra
                        .iter()
                        .map(|data| self.residual.residual(model, data))
                        .sum::<f64>(),
                )
            })
            .ok_or(GeometryError::DegenerateInput(
                "estimator produced no hypotheses",
            ))
    }

    /// Convenience form of [`Disambiguate::estimate_single`] which takes the
    /// minimal sample from the front of `data` and disambiguates with the
    /// remainder.
    pub fn estimate_prefix<D>(&self, data: &[D]) -> Result<E::Model, GeometryError>
    where
        E: HypothesisEstimator<D>,
        R: ResidualModel<E::Model, D>,
    {
        let min = self.estimator.min_samples();
        if data.len() < min {
            return Err(GeometryError::DegenerateInput(
                "fewer correspondences than the minimal sample size",
            ));
        }
        let (sample, extra) = data.split_at(min);
        self.estimate_single(sample, extra)
    }
}
