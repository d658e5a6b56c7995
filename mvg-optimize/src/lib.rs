//! # Non-Linear Refinement and Bundle Adjustment
//!
//! Levenberg-Marquardt refiners for the single-model estimators
//! (homography, fundamental matrix, pose, triangulated point) and a
//! Schur-complement bundle adjustment engine over metric and projective
//! scene structures.
//!
//! The refiners implement [`mvg_core::ModelRefiner`], so any of them can
//! be composed with an estimator through
//! [`mvg_core::EstimateThenRefine`]. All of them honor
//! [`mvg_core::ConvergeConfig`] and report hitting the iteration cap as
//! partial convergence rather than an error.

mod bundle;
mod driver;
mod matrix;
mod point;
mod pose;
mod scene;
mod schur;

pub use bundle::*;
pub use matrix::*;
pub use point::*;
pub use pose::*;
pub use scene::*;
