use levenberg_marquardt::{LevenbergMarquardt, MinimizationReport, TerminationReason};
use mvg_core::{ConvergeConfig, GeometryError};

/// Build the shared Levenberg-Marquardt driver from a convergence
/// configuration.
///
/// `ftol` doubles as the step tolerance since the two express the same
/// "stop when nothing changes" intent at the caller level.
pub(crate) fn driver(config: &ConvergeConfig) -> LevenbergMarquardt<f64> {
    LevenbergMarquardt::new()
        .with_ftol(config.ftol)
        .with_xtol(config.ftol)
        .with_gtol(config.gtol)
        .with_patience(config.max_iterations.max(1))
}

/// Translate a minimization report into `(iterations, converged)`.
///
/// The count is the driver's residual-evaluation count, which includes
/// rejected damping steps; it is the only counter the report exposes and
/// is an upper bound on the accepted iterations.
///
/// Running out of patience or stalling without a possible improvement is
/// partial convergence; the model at that point is still the best one
/// found. Numerical breakdown and evaluation failures are divergence.
pub(crate) fn interpret(report: &MinimizationReport<f64>) -> Result<(usize, bool), GeometryError> {
    let iterations = report.number_of_evaluations;
    match report.termination {
        TerminationReason::Converged { .. } | TerminationReason::ResidualsZero => {
            Ok((iterations, true))
        }
        TerminationReason::LostPatience | TerminationReason::NoImprovementPossible(_) => {
            Ok((iterations, false))
        }
        _ => Err(GeometryError::OptimizationDiverged { iterations }),
    }
}
