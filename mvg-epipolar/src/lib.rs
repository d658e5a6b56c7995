//! # Epipolar and Planar Two-View Estimation
//!
//! Linear and minimal solvers relating two views of the same scene:
//!
//! * [`HomographyDlt`] - 4-point direct linear transform for planar scenes
//! * [`FundamentalLinear8`] - least-squares 8-point algorithm
//! * [`FundamentalLinear7`] - minimal 7-point algorithm (up to 3 hypotheses)
//! * [`EssentialLinear8`] / [`EssentialLinear7`] - the same solvers on
//!   normalized image coordinates, projected onto the essential manifold
//! * [`EssentialNister5`] - minimal 5-point algorithm (up to 10 hypotheses)
//!
//! All solvers consume [`mvg_core::FeatureMatch`] correspondences where the
//! estimated matrix `M` satisfies `second' * M * first = 0`. The homography
//! and fundamental solvers internally condition coordinates (Hartley
//! normalization) so they accept pixel coordinates; the essential solvers
//! require normalized image coordinates.

mod essential;
mod fundamental;
mod homography;
mod linear;
mod nister;
mod normalize;
mod residual;

pub use essential::*;
pub use fundamental::*;
pub use homography::*;
pub use nister::*;
pub use normalize::*;
pub use residual::*;
