use ndarray::{Array1, Array2, ArrayView1};
use std::time::Duration;

/// An objective function evaluated by the optimizer, defined over the
/// unit box `[0, 1]^dim_in` (rescaling physical coordinates is the
/// caller's responsibility).
///
/// Returning `None` blacklists the input: the point is recorded as
/// forbidden, it raises the surrogate uncertainty around itself but never
/// anchors the posterior mean.
pub trait ObjectiveFunction: Sync {
    /// Input dimension.
    fn dim_in(&self) -> usize;
    /// Output dimension.
    fn dim_out(&self) -> usize;
    /// Evaluate at `x`; `None` signals a forbidden input.
    fn eval(&self, x: &ArrayView1<f64>) -> Option<Array1<f64>>;
}

/// An [`ObjectiveFunction`] built from a closure.
///
/// ```
/// use ndarray::{array, ArrayView1};
/// use opale_bo::Objective;
///
/// let objective = Objective::new(1, 1, |x: &ArrayView1<f64>| {
///     Some(array![-(x[0] - 0.3) * (x[0] - 0.3)])
/// });
/// ```
#[derive(Clone)]
pub struct Objective<F> {
    dim_in: usize,
    dim_out: usize,
    func: F,
}

impl<F> Objective<F>
where
    F: Fn(&ArrayView1<f64>) -> Option<Array1<f64>> + Sync,
{
    /// An objective of the given dimensions backed by `func`.
    pub fn new(dim_in: usize, dim_out: usize, func: F) -> Self {
        Objective {
            dim_in,
            dim_out,
            func,
        }
    }
}

impl<F> ObjectiveFunction for Objective<F>
where
    F: Fn(&ArrayView1<f64>) -> Option<Array1<f64>> + Sync,
{
    fn dim_in(&self) -> usize {
        self.dim_in
    }

    fn dim_out(&self) -> usize {
        self.dim_out
    }

    fn eval(&self, x: &ArrayView1<f64>) -> Option<Array1<f64>> {
        (self.func)(x)
    }
}

/// Reduction from a vector observation to the scalar reward maximized by
/// the optimizer.
pub trait Aggregator: Sync {
    /// Scalar reward of the observation `y`.
    fn apply(&self, y: &ArrayView1<f64>) -> f64;
}

/// Takes the first component of the observation (the default).
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstElem;

impl Aggregator for FirstElem {
    fn apply(&self, y: &ArrayView1<f64>) -> f64 {
        y[0]
    }
}

/// Rewards proximity to a target observation: the negated Euclidean
/// distance, maximal (zero) when the target is hit.
#[derive(Clone, Debug)]
pub struct DistanceToTarget {
    target: Array1<f64>,
}

impl DistanceToTarget {
    /// An aggregator pulling observations towards `target`.
    pub fn new(target: Array1<f64>) -> Self {
        DistanceToTarget { target }
    }
}

impl Aggregator for DistanceToTarget {
    fn apply(&self, y: &ArrayView1<f64>) -> f64 {
        -(y.to_owned() - &self.target).mapv(|v| v * v).sum().sqrt()
    }
}

/// A snapshot of the run handed to stop criteria and observers.
#[derive(Clone, Debug)]
pub struct RunState {
    /// Iterations of the current run (restarts with every `optimize` call)
    pub current_iteration: usize,
    /// Iterations across every run of this optimizer
    pub total_iterations: usize,
    /// Number of observed samples so far
    pub nb_samples: usize,
    /// Number of blacklisted samples so far
    pub nb_blacklisted: usize,
    /// Best scalarised reward so far, if any observation exists
    pub best_reward: Option<f64>,
    /// Wall time since the current run started
    pub elapsed: Duration,
}

/// The outcome of an optimization run.
#[derive(Clone, Debug)]
pub struct OptimResult {
    /// Best sample found (the argmax of the aggregated reward)
    pub x_opt: Array1<f64>,
    /// Observation at the best sample
    pub y_opt: Array1<f64>,
    /// History of evaluated samples, one row each
    pub x_hist: Array2<f64>,
    /// History of observations, parallel to `x_hist`
    pub y_hist: Array2<f64>,
    /// Final run state
    pub state: RunState,
}
