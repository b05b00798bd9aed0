use crate::optimizer::{InnerOptimizer, OptimFn};
use ndarray::{arr1, Array1, ArrayView1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Derivative-free adapter over the COBYLA algorithm
/// (linear approximation trust region, no gradients).
///
/// This is the default third-party derivative-free optimizer; with the
/// `nlopt` feature enabled, [`NLoptNoGrad`](crate::NLoptNoGrad) gives
/// access to the NLopt global algorithms instead.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Cobyla {
    max_eval: usize,
}

impl Default for Cobyla {
    fn default() -> Self {
        Cobyla { max_eval: 500 }
    }
}

impl Cobyla {
    /// A COBYLA run with the given evaluation budget.
    pub fn new(max_eval: usize) -> Self {
        Cobyla { max_eval }
    }
}

impl InnerOptimizer for Cobyla {
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, bounded: bool) -> Array1<f64> {
        use cobyla::{minimize, Func, RhoBeg, StopTols};

        let x0 = init.to_vec();
        let bounds: Vec<(f64, f64)> = if bounded {
            vec![(0., 1.); init.len()]
        } else {
            vec![(f64::NEG_INFINITY, f64::INFINITY); init.len()]
        };
        let cons: Vec<&dyn Func<()>> = vec![];

        let res = minimize(
            |x: &[f64], _u: &mut ()| -f(&ArrayView1::from(x), false).0,
            &x0,
            &bounds,
            &cons,
            (),
            self.max_eval,
            RhoBeg::All(0.5),
            Some(StopTols {
                ftol_rel: 1e-6,
                ..StopTols::default()
            }),
        );
        match res {
            Ok((_, x_opt, _)) => arr1(&x_opt),
            Err((status, x_opt, _)) => {
                log::warn!("Cobyla optimizer error status={status:?}");
                arr1(&x_opt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::no_grad;
    use ndarray::array;

    #[test]
    fn test_cobyla_quadratic() {
        let f = |x: &ArrayView1<f64>, _g: bool| {
            no_grad(-(x[0] - 0.4) * (x[0] - 0.4) - (x[1] - 0.6) * (x[1] - 0.6))
        };
        let best = Cobyla::new(300).optimize(&f, &array![0.1, 0.1].view(), true);
        assert!((best[0] - 0.4).abs() < 0.05, "best={best}");
        assert!((best[1] - 0.6).abs() < 0.05, "best={best}");
    }
}
