//! # Triangulation and Pose Recovery
//!
//! Linear triangulators in metric and projective space, plus the
//! cheirality-based selection of the correct relative pose from an
//! essential matrix decomposition.
//!
//! The N-view triangulators implement [`mvg_core::HypothesisEstimator`]
//! over `(camera, observation)` pairs, so they compose with the same
//! refinement and disambiguation adapters as the matrix and pose
//! estimators.

mod recover;
mod triangulation;

pub use recover::*;
pub use triangulation::*;
