use crate::optimizer::{InnerOptimizer, OptimFn};
use ndarray::{Array1, ArrayView1};
use paste::paste;

// Chaining is expressed on tuples: each stage starts from the result of
// the previous one, the first from the supplied starting point.
//
//     let opt = (GridSearch::new(20), RandomPoint, GridSearch::new(20));
//     let best = opt.optimize(&f, &x0.view(), true);
macro_rules! impl_chained {
    ($($opt:ident),+) => {
        paste! {
            impl<$($opt: InnerOptimizer),+> InnerOptimizer for ($($opt,)+) {
                fn optimize<F: OptimFn>(
                    &self,
                    f: &F,
                    init: &ArrayView1<f64>,
                    bounded: bool,
                ) -> Array1<f64> {
                    let ($([<$opt:lower>],)+) = self;
                    let mut best = init.to_owned();
                    $(
                        best = [<$opt:lower>].optimize(f, &best.view(), bounded);
                    )+
                    best
                }
            }
        }
    };
}

impl_chained!(O1);
impl_chained!(O1, O2);
impl_chained!(O1, O2, O3);
impl_chained!(O1, O2, O3, O4);
impl_chained!(O1, O2, O3, O4, O5);

#[cfg(test)]
mod tests {
    use crate::{no_grad, GridSearch, InnerOptimizer, RandomPoint};
    use ndarray::{array, ArrayView1};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_chained() {
        let calls = AtomicUsize::new(0);
        let f = |x: &ArrayView1<f64>, _g: bool| {
            calls.fetch_add(1, Ordering::SeqCst);
            no_grad(3. * x[0] + 5.)
        };

        let optimizer = (
            GridSearch::new(20),
            RandomPoint,
            GridSearch::new(20),
            GridSearch::new(20),
        );
        let best = optimizer.optimize(&f, &array![0.5].view(), true);

        assert_eq!(best.len(), 1);
        assert!(best[0] > -1e-7 && best[0] < 1. + 1e-7);
        // three grid stages, RandomPoint never evaluates
        assert_eq!(calls.load(Ordering::SeqCst), 21 * 3);
    }
}
