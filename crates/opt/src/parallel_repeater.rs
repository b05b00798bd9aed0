use crate::optimizer::{InnerOptimizer, OptimFn};
use crate::tools::{par, rng};
use ndarray::{Array1, ArrayView1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Runs an optimizer from several independent starting points in parallel
/// and keeps the best result.
///
/// The first trial starts from the supplied point, the remaining ones from
/// uniform random points in the unit box. Candidates are compared by a
/// final gradient-free evaluation.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ParallelRepeater<O: InnerOptimizer> {
    repeats: usize,
    inner: O,
}

impl<O: InnerOptimizer> ParallelRepeater<O> {
    /// Repeat `inner` from `repeats` starting points (`repeats >= 1`).
    pub fn new(inner: O, repeats: usize) -> Self {
        assert!(repeats >= 1, "parallel repeater needs at least one trial");
        ParallelRepeater { repeats, inner }
    }
}

impl<O: InnerOptimizer> InnerOptimizer for ParallelRepeater<O> {
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, bounded: bool) -> Array1<f64> {
        let dim = init.len();
        let trials = par::par_map(self.repeats, |trial| {
            let start = if trial == 0 {
                init.to_owned()
            } else {
                rng::random_unit_vector(dim)
            };
            let candidate = self.inner.optimize(f, &start.view(), bounded);
            let (value, _) = f(&candidate.view(), false);
            (value, candidate)
        });

        trials
            .into_iter()
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, candidate)| candidate)
            .expect("at least one repeater trial")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::rng;
    use crate::{no_grad, Rprop};
    use ndarray::array;

    #[test]
    fn test_repeater_escapes_poor_start() {
        rng::seed(11);
        // two local maxima, the better one at x = 0.8
        let f = |x: &ArrayView1<f64>, g: bool| {
            let v = x[0];
            let value =
                (-(v - 0.2) * (v - 0.2) / 0.005).exp() + 2. * (-(v - 0.8) * (v - 0.8) / 0.005).exp();
            let grad = g.then(|| {
                let d1 = -2. * (v - 0.2) / 0.005 * (-(v - 0.2) * (v - 0.2) / 0.005).exp();
                let d2 = -4. * (v - 0.8) / 0.005 * (-(v - 0.8) * (v - 0.8) / 0.005).exp();
                array![d1 + d2]
            });
            (value, grad)
        };

        let single = Rprop::new(100);
        let repeated = ParallelRepeater::new(Rprop::new(100), 32);

        let best = repeated.optimize(&f, &array![0.2].view(), true);
        let single_best = single.optimize(&f, &array![0.2].view(), true);

        let (v_rep, _) = f(&best.view(), false);
        let (v_single, _) = f(&single_best.view(), false);
        assert!(v_rep >= v_single);
        assert!((best[0] - 0.8).abs() < 0.05, "best={best}");
    }
}
