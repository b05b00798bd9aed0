//! Acquisition functions scoring candidate inputs from the surrogate
//! posterior; the inner optimizer maximizes them over the unit box.
mod ei;
mod ucb;

pub use ei::{ExpectedImprovement, ProbabilityOfImprovement};
pub use ucb::Ucb;

use ndarray::ArrayView1;

const SQRT_2PI: f64 = 2.5066282746310007;

/// A surrogate-derived score over candidate inputs.
///
/// Acquisitions are rebuilt each iteration from the current surrogate,
/// iteration counter and aggregator; they must be safe to evaluate where
/// the posterior deviation vanishes.
pub trait AcquiFunction: Sync {
    /// Score of the candidate `x`.
    fn value(&self, x: &ArrayView1<f64>) -> f64;
}

/// Cumulative distribution function of the standard normal at `x`
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x / std::f64::consts::SQRT_2)
}

/// Probability density function of the standard normal at `x`
pub(crate) fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}
