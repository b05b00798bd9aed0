use crate::optimizer::{InnerOptimizer, OptimFn};
use ndarray::{Array1, ArrayView1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Exhaustive search over a uniform grid with `bins` bins per axis.
///
/// Every grid node, bounds included, is evaluated once: `(bins + 1)^d`
/// evaluations in dimension `d`. This is a degraded fallback intended for
/// sanity checks and very low dimensions; prefer [`Cmaes`](crate::Cmaes)
/// for real runs.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct GridSearch {
    bins: usize,
}

impl Default for GridSearch {
    fn default() -> Self {
        GridSearch { bins: 10 }
    }
}

impl GridSearch {
    /// A grid search with `bins` bins per axis (`bins >= 1`).
    pub fn new(bins: usize) -> Self {
        assert!(bins >= 1, "grid search needs at least one bin per axis");
        GridSearch { bins }
    }

    /// Grid resolution per axis.
    pub fn bins(&self) -> usize {
        self.bins
    }
}

impl InnerOptimizer for GridSearch {
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, _bounded: bool) -> Array1<f64> {
        let dim = init.len();
        let step = 1.0 / self.bins as f64;

        let mut indices = vec![0usize; dim];
        let mut point = Array1::zeros(dim);
        let mut best_point = point.clone();
        let mut best_value = f64::NEG_INFINITY;

        loop {
            for (p, &i) in point.iter_mut().zip(indices.iter()) {
                *p = i as f64 * step;
            }
            let (value, _) = f(&point.view(), false);
            if value > best_value {
                best_value = value;
                best_point.assign(&point);
            }

            // odometer increment over the grid indices
            let mut axis = 0;
            loop {
                if axis == dim {
                    return best_point;
                }
                indices[axis] += 1;
                if indices[axis] <= self.bins {
                    break;
                }
                indices[axis] = 0;
                axis += 1;
            }
        }
    }
}
