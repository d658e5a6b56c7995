use thiserror::Error;

/// Failure taxonomy shared by every estimator, triangulator, refiner, and
/// bundle adjuster in this workspace.
///
/// Estimation and refinement failures are always local to a single call.
/// They never corrupt caller-owned data such as a scene structure that is
/// being optimized; optimizers only commit their result on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// The sample was insufficient, collinear, coincident, or otherwise
    /// rank-deficient for the requested solve. The caller must supply a
    /// different or larger sample.
    #[error("degenerate input: {0}")]
    DegenerateInput(&'static str),

    /// A hypothesis disambiguator was invoked without any extra
    /// correspondences to rank the hypotheses with. This is a caller
    /// configuration error and is raised eagerly.
    #[error("hypothesis disambiguation requires at least one extra correspondence")]
    InsufficientDisambiguationSamples,

    /// An algorithm-selection enum value has no implementation for the
    /// requested algorithm family. A programming error, raised at
    /// construction time rather than during the numeric solve.
    #[error("unsupported algorithm selection: {0}")]
    UnsupportedAlgorithm(&'static str),

    /// The optimizer could not find any cost-decreasing step within its
    /// damping retry budget. The caller should fall back to the
    /// pre-refinement estimate.
    #[error("optimization diverged after {iterations} iterations")]
    OptimizationDiverged { iterations: usize },
}
