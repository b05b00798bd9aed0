//! Pluggable kernel hyperparameter optimizers.
//!
//! The optimizer receives a closure returning the log-marginal-likelihood
//! and its gradient, a starting point and a feasible box, everything in
//! log10 scale, and returns the best hyperparameters it found (or `None`
//! to keep the current ones). The owning GP handles the natural/log10
//! round trip and the final consistency checks.

use ndarray::{Array1, ArrayView1};
use opale_opt::{Eval, InnerOptimizer, OptimFn, ParallelRepeater, Rprop};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A maximizer of the kernel log-marginal-likelihood.
pub trait HyperParamsOptimizer: Clone + Default + Sync + Send {
    /// Maximize `objective` over the `bounds` box starting from `theta0`
    /// (log10 scale). `None` keeps the current hyperparameters.
    fn optimize<F: OptimFn>(
        &self,
        objective: &F,
        theta0: &Array1<f64>,
        bounds: &[(f64, f64)],
    ) -> Option<Array1<f64>>;
}

/// The default likelihood optimizer: resilient backpropagation restarted
/// from several random points of the feasible box in parallel.
///
/// The box is mapped onto the unit cube so that the restart machinery of
/// [`ParallelRepeater`] applies unchanged; gradients are rescaled by the
/// box widths.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct RpropRestarts {
    restarts: usize,
    iterations: usize,
}

impl Default for RpropRestarts {
    fn default() -> Self {
        RpropRestarts {
            restarts: 10,
            iterations: 150,
        }
    }
}

impl RpropRestarts {
    /// A likelihood optimizer with `restarts` parallel trials of
    /// `iterations` RPROP steps each.
    pub fn new(restarts: usize, iterations: usize) -> Self {
        RpropRestarts {
            restarts,
            iterations,
        }
    }
}

impl HyperParamsOptimizer for RpropRestarts {
    fn optimize<F: OptimFn>(
        &self,
        objective: &F,
        theta0: &Array1<f64>,
        bounds: &[(f64, f64)],
    ) -> Option<Array1<f64>> {
        let widths: Array1<f64> = bounds.iter().map(|(lo, up)| up - lo).collect();
        let lows: Array1<f64> = bounds.iter().map(|(lo, _)| *lo).collect();

        let to_box = |u: &ArrayView1<f64>| &lows + &(u.to_owned() * &widths);
        let in_unit = |theta: &Array1<f64>| (theta - &lows) / &widths;

        let unit_objective = |u: &ArrayView1<f64>, eval_grad: bool| -> Eval {
            let theta = to_box(u);
            let (value, grad) = objective(&theta.view(), eval_grad);
            (value, grad.map(|g| g * &widths))
        };

        let optimizer = ParallelRepeater::new(Rprop::new(self.iterations), self.restarts);
        let u0 = in_unit(theta0);
        let u_best = optimizer.optimize(&unit_objective, &u0.view(), true);
        let best = to_box(&u_best.view());

        let (value, _) = objective(&best.view(), false);
        value.is_finite().then_some(best)
    }
}

/// Disables hyperparameter optimization altogether.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct NoOpt;

impl HyperParamsOptimizer for NoOpt {
    fn optimize<F: OptimFn>(
        &self,
        _objective: &F,
        _theta0: &Array1<f64>,
        _bounds: &[(f64, f64)],
    ) -> Option<Array1<f64>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use opale_opt::no_grad;

    #[test]
    fn test_rprop_restarts_concave() {
        opale_opt::tools::rng::seed(5);
        // concave in the box [-2, 1] x [-2, 1], maximum at (-1, 0)
        let objective = |theta: &ArrayView1<f64>, eval_grad: bool| {
            let value = -(theta[0] + 1.) * (theta[0] + 1.) - theta[1] * theta[1];
            let grad = eval_grad.then(|| array![-2. * (theta[0] + 1.), -2. * theta[1]]);
            (value, grad)
        };
        let best = RpropRestarts::new(4, 100)
            .optimize(&objective, &array![0., 0.], &[(-2., 1.), (-2., 1.)])
            .unwrap();
        assert_abs_diff_eq!(best[0], -1., epsilon = 0.05);
        assert_abs_diff_eq!(best[1], 0., epsilon = 0.05);
    }

    #[test]
    fn test_no_opt_keeps_params() {
        let objective = |_theta: &ArrayView1<f64>, _g: bool| no_grad(1.0);
        assert!(NoOpt
            .optimize(&objective, &array![0.5], &[(0., 1.)])
            .is_none());
    }
}
