//! # Multi-View Geometry Core
//!
//! This library provides the common abstractions and types shared by the estimation,
//! triangulation, and optimization crates of the multi-view geometry workspace.
//! This includes point correspondences, poses, projective points, the error taxonomy,
//! convergence configuration, and the generic estimator/refiner traits. The crate is
//! designed to be small so that every downstream crate can interoperate through it.
//!
//! All 2d observations in this workspace are [`nalgebra::Point2`] coordinates. Whether
//! they are pixel or normalized image coordinates is asserted by the caller and required
//! by the individual algorithms; no coordinate-system inference is performed here.

mod camera;
mod config;
mod disambiguate;
mod error;
mod estimate;
mod matches;
mod point;
mod poly;
mod pose;
mod residual;
mod so3;

pub use camera::*;
pub use config::*;
pub use disambiguate::*;
pub use error::*;
pub use estimate::*;
pub use matches::*;
pub use nalgebra;
pub use point::*;
pub use poly::*;
pub use pose::*;
pub use residual::*;
pub use sample_consensus;
pub use so3::*;
