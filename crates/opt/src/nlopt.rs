use crate::optimizer::{InnerOptimizer, OptimFn};
use ndarray::{arr1, Array1, ArrayView1};

/// Derivative-free adapter over NLopt global algorithms.
///
/// Defaults to `GN_DIRECT_L_RAND`, a randomized locally-biased DIRECT
/// variant well suited to multimodal acquisition landscapes.
#[derive(Clone, Copy, Debug)]
pub struct NLoptNoGrad {
    algo: nlopt::Algorithm,
    max_eval: usize,
}

impl Default for NLoptNoGrad {
    fn default() -> Self {
        NLoptNoGrad {
            algo: nlopt::Algorithm::GnDirectLRand,
            max_eval: 500,
        }
    }
}

impl NLoptNoGrad {
    /// An NLopt run of `algo` with the given evaluation budget.
    /// The algorithm must be a derivative-free one.
    pub fn new(algo: nlopt::Algorithm, max_eval: usize) -> Self {
        NLoptNoGrad { algo, max_eval }
    }
}

impl InnerOptimizer for NLoptNoGrad {
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, bounded: bool) -> Array1<f64> {
        use nlopt::{Nlopt, Target};

        let objfn = |x: &[f64], _grad: Option<&mut [f64]>, _u: &mut ()| {
            f(&ArrayView1::from(x), false).0
        };
        let mut optimizer = Nlopt::new(self.algo, init.len(), objfn, Target::Maximize, ());
        if bounded {
            optimizer.set_lower_bound(0.).unwrap();
            optimizer.set_upper_bound(1.).unwrap();
        }
        optimizer.set_maxeval(self.max_eval as u32).unwrap();

        let mut x_opt = init.to_vec();
        match optimizer.optimize(&mut x_opt) {
            Ok(_) => arr1(&x_opt),
            Err((err, _)) => {
                log::warn!("NLopt optimizer error: {err:?}");
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
    fn test_nlopt_quadratic() {
        let f = |x: &ArrayView1<f64>, _g: bool| no_grad(-(x[0] - 0.4) * (x[0] - 0.4));
        let best = NLoptNoGrad::default().optimize(&f, &array![0.1].view(), true);
        assert!((best[0] - 0.4).abs() < 0.05, "best={best}");
    }
}
