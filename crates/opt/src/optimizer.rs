use ndarray::{Array1, ArrayView1};

/// The result of one objective evaluation: a value and, when the caller
/// asked for it and the function can provide one, the gradient at the
/// evaluation point.
pub type Eval = (f64, Option<Array1<f64>>);

/// Wrap a gradient-free evaluation.
pub fn no_grad(value: f64) -> Eval {
    (value, None)
}

/// A function optimized by an [`InnerOptimizer`].
///
/// The boolean flag requests the gradient; gradient-free optimizers always
/// pass `false` and gradient-based ones `true`.
pub trait OptimFn: Fn(&ArrayView1<f64>, bool) -> Eval + Sync {}
impl<T> OptimFn for T where T: Fn(&ArrayView1<f64>, bool) -> Eval + Sync {}

/// A maximizer of a scalar function over `R^d`, or over the unit box
/// `[0, 1]^d` when `bounded` is set.
///
/// Implementations are deterministic given the state of
/// [`tools::rng`](crate::tools::rng); stochastic ones draw all their
/// randomness from it.
pub trait InnerOptimizer: Sync {
    /// Maximize `f` starting from `init` and return the best point found.
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, bounded: bool) -> Array1<f64>;
}

/// Clamp `x` into the unit box.
pub(crate) fn clamp_unit(x: &mut Array1<f64>) {
    x.mapv_inplace(|v| v.clamp(0.0, 1.0));
}
