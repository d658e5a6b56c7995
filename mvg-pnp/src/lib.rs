//! # Perspective-n-Point Pose Estimation
//!
//! Solvers recovering a [`mvg_core::WorldToCamera`] pose from observations
//! of known world points:
//!
//! * [`P3PGrunert`] - minimal 3-point solver via the direct quartic
//! * [`P3PFinsterwalder`] - minimal 3-point solver via a cubic and a pair of
//!   degenerate conic lines
//! * [`EPnP`] - linear control-point solver for 4 or more points
//! * [`Ippe`] - planar solver returning the perspective pose pair
//!
//! All observations are in normalized image coordinates. The minimal
//! solvers produce several hypotheses and are intended to be wrapped in
//! [`mvg_core::Disambiguate`] or a sample consensus loop.

mod epnp;
mod ippe;
mod p3p;
mod rigid;

pub use epnp::*;
pub use ippe::*;
pub use p3p::*;
pub use rigid::*;
