/// Convergence criteria shared by all the iterative refiners and by bundle
/// adjustment.
///
/// Iteration stops when the relative function-value change falls below
/// `ftol`, when the gradient norm falls below `gtol`, or when
/// `max_iterations` is reached. Hitting the iteration cap is reported as
/// partial convergence by the refiners, not treated as an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergeConfig {
    /// Relative function-value tolerance.
    pub ftol: f64,
    /// Gradient norm tolerance.
    pub gtol: f64,
    /// Hard cap on the number of iterations.
    pub max_iterations: usize,
}

impl ConvergeConfig {
    pub fn new(ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            ftol,
            gtol,
            max_iterations,
        }
    }
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            gtol: 1e-8,
            max_iterations: 100,
        }
    }
}
