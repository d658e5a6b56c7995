//! # Multi-View Geometry
//!
//! Facade over the multi-view geometry workspace: re-exports the shared
//! core types, the epipolar and PnP estimators, the triangulators, and the
//! non-linear refinement machinery, plus the [`factory`] layer that turns
//! algorithm-selection enums into configured estimator objects.
//!
//! Users who know exactly which algorithm they want can use the concrete
//! types directly; the factory exists for callers that select algorithms
//! from configuration.

pub use mvg_core::*;
pub use mvg_epipolar::*;
pub use mvg_geom::*;
pub use mvg_optimize::*;
pub use mvg_pnp::*;

pub mod factory;
