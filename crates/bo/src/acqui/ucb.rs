use crate::acqui::AcquiFunction;
use crate::types::Aggregator;
use ndarray::ArrayView1;
use opale_gp::SurrogateModel;

/// Upper Confidence Bound acquisition: `agg(mu(x)) + alpha * sigma(x)`.
///
/// The deviation term follows the first output component, consistent with
/// the default [`FirstElem`](crate::FirstElem) aggregator. The iteration
/// counter is carried so that custom exploration schedules can read it;
/// the stock schedule keeps `alpha` constant.
pub struct Ucb<'a, M: SurrogateModel<f64>, A: Aggregator> {
    model: &'a M,
    agg: &'a A,
    alpha: f64,
    iteration: usize,
}

impl<'a, M: SurrogateModel<f64>, A: Aggregator> Ucb<'a, M, A> {
    /// A UCB over `model` at iteration `iteration`.
    pub fn new(model: &'a M, agg: &'a A, alpha: f64, iteration: usize) -> Self {
        Ucb {
            model,
            agg,
            alpha,
            iteration,
        }
    }

    /// Iteration this acquisition was built for.
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl<M: SurrogateModel<f64>, A: Aggregator> AcquiFunction for Ucb<'_, M, A> {
    fn value(&self, x: &ArrayView1<f64>) -> f64 {
        let (mu, sigma2) = self.model.query(x);
        self.agg.apply(&mu.view()) + self.alpha * sigma2[0].max(0.).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FirstElem;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2, array, Array1};
    use opale_gp::{Matern52, MultiGp, NoOpt, NullMean};

    #[test]
    fn test_ucb_tracks_mean_and_deviation() {
        let mut model = MultiGp::<f64, Matern52<f64>, NullMean, NoOpt>::new(
            Matern52::new(1., 0.25),
            NullMean::new(1),
        );
        model
            .compute(&arr2(&[[0.2], [0.8]]), &arr2(&[[1.], [3.]]), &Array1::zeros(2))
            .unwrap();

        let agg = FirstElem;
        let ucb = Ucb::new(&model, &agg, 0.5, 0);

        // at a noiseless training point the score reduces to the mean
        let (mu, sigma2) = model.query(&array![0.8].view());
        assert!(sigma2[0] < 1e-10);
        assert_abs_diff_eq!(ucb.value(&array![0.8].view()), mu[0], epsilon = 1e-6);

        // away from the data the deviation bonus kicks in
        let (mu, _) = model.query(&array![0.5].view());
        assert!(ucb.value(&array![0.5].view()) > mu[0]);
    }

    #[test]
    fn test_ucb_safe_at_zero_deviation() {
        let model = MultiGp::<f64, Matern52<f64>, NullMean, NoOpt>::with_dims(
            1,
            1,
            Matern52::new(0., 0.25),
            NullMean::new(1),
        );
        let agg = FirstElem;
        let ucb = Ucb::new(&model, &agg, 0.5, 3);
        let value = ucb.value(&arr1(&[0.5]).view());
        assert!(value.is_finite());
        assert_eq!(ucb.iteration(), 3);
    }
}
