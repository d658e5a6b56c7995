use crate::GeometryError;

/// An estimation algorithm that produces a bounded set of model hypotheses
/// from a sample of data.
///
/// Implementors must be stateless between calls: reusing an instance for a
/// second, unrelated sample must behave as if the instance were freshly
/// constructed.
pub trait HypothesisEstimator<D> {
    /// The model produced (an epipolar matrix, a pose, a triangulated point, ...).
    type Model;
    /// Bounded collection of hypotheses from one estimation call.
    type ModelIter: IntoIterator<Item = Self::Model>;

    /// The smallest number of data items the algorithm can operate on.
    fn min_samples(&self) -> usize;

    /// Produce the hypothesis set for this sample.
    fn estimate(&self, data: &[D]) -> Result<Self::ModelIter, GeometryError>;
}

/// The outcome of a non-linear refinement.
///
/// `converged` is `false` when the iteration cap was reached before the
/// convergence tolerances were met. The model is still the best one found,
/// so the caller can decide whether to accept it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement<M> {
    pub model: M,
    pub iterations: usize,
    /// Final sum of squared residuals.
    pub residual: f64,
    pub converged: bool,
}

/// A non-linear refiner for a particular model and observation type.
pub trait ModelRefiner<M, D> {
    /// Iteratively minimize the sum of squared residuals starting from
    /// `model`, returning the refined model together with the iteration
    /// count and final residual.
    fn refine(&self, model: M, data: &[D]) -> Result<Refinement<M>, GeometryError>;
}

/// Runs an estimator and feeds every hypothesis through a refiner.
///
/// This is the single estimate-then-refine composition used across the
/// workspace: homographies, epipolar matrices, poses, and triangulated
/// points all compose the same way. When refinement of a hypothesis
/// diverges, the unrefined hypothesis is kept so that the caller can still
/// disambiguate over the full set.
#[derive(Debug, Clone, Copy)]
pub struct EstimateThenRefine<E, R> {
    estimator: E,
    refiner: R,
}

impl<E, R> EstimateThenRefine<E, R> {
    pub fn new(estimator: E, refiner: R) -> Self {
        Self { estimator, refiner }
    }
}

impl<D, E, R> HypothesisEstimator<D> for EstimateThenRefine<E, R>
where
    E: HypothesisEstimator<D>,
    E::Model: Clone,
    R: ModelRefiner<E::Model, D>,
{
    type Model = E::Model;
    type ModelIter = Vec<E::Model>;

    fn min_samples(&self) -> usize {
        self.estimator.min_samples()
    }

    fn estimate(&self, data: &[D]) -> Result<Vec<E::Model>, GeometryError> {
        let hypotheses = self.estimator.estimate(data)?;
        let mut refined = Vec::new();
        for model in hypotheses {
            match self.refiner.refine(model.clone(), data) {
                Ok(refinement) => refined.push(refinement.model),
                Err(GeometryError::OptimizationDiverged { .. }) => refined.push(model),
                Err(other) => return Err(other),
            }
        }
        Ok(refined)
    }
}
