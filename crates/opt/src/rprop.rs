use crate::optimizer::{clamp_unit, InnerOptimizer, OptimFn};
use ndarray::{Array1, ArrayView1, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

const ETA_PLUS: f64 = 1.2;
const ETA_MINUS: f64 = 0.5;
const DELTA_0: f64 = 0.1;
const DELTA_MIN: f64 = 1e-6;
const DELTA_MAX: f64 = 50.0;

/// Resilient backpropagation (iRprop-) ascent.
///
/// Per-coordinate step sizes grow while the gradient sign is stable and
/// shrink when it flips; only the gradient sign is used, which makes the
/// method robust to badly scaled objectives such as log-likelihoods.
/// Requires gradients: the function is always called with the gradient
/// flag set, and an evaluation returning no gradient stops the ascent at
/// the current iterate.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Rprop {
    iterations: usize,
}

impl Default for Rprop {
    fn default() -> Self {
        Rprop { iterations: 300 }
    }
}

impl Rprop {
    /// An iRprop- ascent running for at most `iterations` steps.
    pub fn new(iterations: usize) -> Self {
        Rprop { iterations }
    }
}

impl InnerOptimizer for Rprop {
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, bounded: bool) -> Array1<f64> {
        let dim = init.len();
        let mut x = init.to_owned();
        if bounded {
            clamp_unit(&mut x);
        }

        let mut delta = Array1::from_elem(dim, DELTA_0);
        let mut prev_grad: Array1<f64> = Array1::zeros(dim);

        let mut best_x = x.clone();
        let (mut best_value, _) = f(&x.view(), false);

        for _ in 0..self.iterations {
            let (value, grad) = f(&x.view(), true);
            let Some(mut grad) = grad else {
                break;
            };
            if value > best_value {
                best_value = value;
                best_x.assign(&x);
            }
            if grad.iter().any(|g| !g.is_finite()) {
                break;
            }

            Zip::from(&mut x)
                .and(&mut delta)
                .and(&mut grad)
                .and(&prev_grad)
                .for_each(|xi, di, gi, pgi| {
                    let sign = gi.signum();
                    if *gi * pgi > 0.0 {
                        *di = (*di * ETA_PLUS).min(DELTA_MAX);
                        *xi += sign * *di;
                    } else if *gi * pgi < 0.0 {
                        *di = (*di * ETA_MINUS).max(DELTA_MIN);
                        // iRprop-: no step on a sign flip, forget the gradient
                        *gi = 0.0;
                    } else if *gi != 0.0 {
                        *xi += sign * *di;
                    }
                });
            if bounded {
                clamp_unit(&mut x);
            }
            prev_grad = grad;
        }

        let (final_value, _) = f(&x.view(), false);
        if final_value > best_value {
            x
        } else {
            best_x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // concave quadratic with maximum at (0.3, 0.7)
    fn quadratic(x: &ArrayView1<f64>, eval_grad: bool) -> crate::Eval {
        let center = array![0.3, 0.7];
        let d = x.to_owned() - &center;
        let value = -d.mapv(|v| v * v).sum();
        let grad = eval_grad.then(|| d.mapv(|v| -2. * v));
        (value, grad)
    }

    #[test]
    fn test_rprop_quadratic() {
        let best = Rprop::new(200).optimize(&quadratic, &array![0.9, 0.1].view(), true);
        assert_abs_diff_eq!(best[0], 0.3, epsilon = 1e-2);
        assert_abs_diff_eq!(best[1], 0.7, epsilon = 1e-2);
    }

    #[test]
    fn test_rprop_stays_in_box() {
        // maximum outside the box, ascent must stick to the boundary
        let f = |x: &ArrayView1<f64>, g: bool| {
            let value = x[0];
            (value, g.then(|| array![1.0]))
        };
        let best = Rprop::new(100).optimize(&f, &array![0.5].view(), true);
        assert_abs_diff_eq!(best[0], 1.0, epsilon = 1e-9);
    }
}
