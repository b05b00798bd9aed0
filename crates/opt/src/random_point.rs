use crate::optimizer::{InnerOptimizer, OptimFn};
use crate::tools::rng;
use ndarray::{Array1, ArrayView1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Returns one uniform random point in the unit box, without evaluating
/// the function.
///
/// Useful as a baseline and as a perturbation stage inside a chained
/// optimizer.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct RandomPoint;

impl InnerOptimizer for RandomPoint {
    fn optimize<F: OptimFn>(&self, _f: &F, init: &ArrayView1<f64>, _bounded: bool) -> Array1<f64> {
        rng::random_unit_vector(init.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::no_grad;
    use ndarray::array;

    #[test]
    fn test_random_mono_dim() {
        let f = |x: &ArrayView1<f64>, _g: bool| no_grad(3. * x[0] + 5.);
        for _ in 0..1000 {
            let best = RandomPoint.optimize(&f, &array![0.5].view(), true);
            assert_eq!(best.len(), 1);
            assert!((0.0..1.0).contains(&best[0]));
        }
    }

    #[test]
    fn test_random_bi_dim() {
        let f = |x: &ArrayView1<f64>, _g: bool| no_grad(3. * x[0] - 7. * x[1] + 2.);
        for _ in 0..1000 {
            let best = RandomPoint.optimize(&f, &array![0.5, 0.5].view(), true);
            assert_eq!(best.len(), 2);
            assert!(best.iter().all(|&v| (0.0..1.0).contains(&v)));
        }
    }
}
