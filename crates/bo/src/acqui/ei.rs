use crate::acqui::{norm_cdf, norm_pdf, AcquiFunction};
use crate::types::Aggregator;
use ndarray::ArrayView1;
use opale_gp::SurrogateModel;

/// Expected Improvement over the best scalarised reward seen so far
/// (maximization form), with an optional `xi` jitter favouring
/// exploration. Zero where the posterior deviation vanishes.
pub struct ExpectedImprovement<'a, M: SurrogateModel<f64>, A: Aggregator> {
    model: &'a M,
    agg: &'a A,
    best: f64,
    xi: f64,
}

impl<'a, M: SurrogateModel<f64>, A: Aggregator> ExpectedImprovement<'a, M, A> {
    /// An EI over `model` given the incumbent reward `best`.
    pub fn new(model: &'a M, agg: &'a A, best: f64, xi: f64) -> Self {
        ExpectedImprovement {
            model,
            agg,
            best,
            xi,
        }
    }
}

impl<M: SurrogateModel<f64>, A: Aggregator> AcquiFunction for ExpectedImprovement<'_, M, A> {
    fn value(&self, x: &ArrayView1<f64>) -> f64 {
        let (mu, sigma2) = self.model.query(x);
        let sigma = sigma2[0].max(0.).sqrt();
        if sigma.abs() < f64::EPSILON {
            return 0.;
        }
        let diff = self.agg.apply(&mu.view()) - self.best - self.xi;
        let u = diff / sigma;
        diff * norm_cdf(u) + sigma * norm_pdf(u)
    }
}

/// Probability of improving on the best scalarised reward seen so far.
/// Zero where the posterior deviation vanishes.
pub struct ProbabilityOfImprovement<'a, M: SurrogateModel<f64>, A: Aggregator> {
    model: &'a M,
    agg: &'a A,
    best: f64,
    xi: f64,
}

impl<'a, M: SurrogateModel<f64>, A: Aggregator> ProbabilityOfImprovement<'a, M, A> {
    /// A POI over `model` given the incumbent reward `best`.
    pub fn new(model: &'a M, agg: &'a A, best: f64, xi: f64) -> Self {
        ProbabilityOfImprovement {
            model,
            agg,
            best,
            xi,
        }
    }
}

impl<M: SurrogateModel<f64>, A: Aggregator> AcquiFunction for ProbabilityOfImprovement<'_, M, A> {
    fn value(&self, x: &ArrayView1<f64>) -> f64 {
        let (mu, sigma2) = self.model.query(x);
        let sigma = sigma2[0].max(0.).sqrt();
        if sigma.abs() < f64::EPSILON {
            return 0.;
        }
        norm_cdf((self.agg.apply(&mu.view()) - self.best - self.xi) / sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FirstElem;
    use ndarray::{arr2, array, Array1};
    use opale_gp::{Matern52, MultiGp, NoOpt, NullMean};

    fn fitted_model() -> MultiGp<f64, Matern52<f64>, NullMean, NoOpt> {
        let mut model = MultiGp::new(Matern52::new(1., 0.25), NullMean::new(1));
        model
            .compute(
                &arr2(&[[0.2], [0.8]]),
                &arr2(&[[1.], [3.]]),
                &Array1::zeros(2),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_ei_zero_at_training_points() {
        let model = fitted_model();
        let agg = FirstElem;
        let ei = ExpectedImprovement::new(&model, &agg, 3., 0.);
        // essentially no deviation left at a noiseless training point
        assert!(ei.value(&array![0.8].view()) < 1e-6);
        // somewhere uncertain the improvement expectation is positive
        assert!(ei.value(&array![0.5].view()) > 0.);
    }

    #[test]
    fn test_poi_bounded() {
        let model = fitted_model();
        let agg = FirstElem;
        let poi = ProbabilityOfImprovement::new(&model, &agg, 1.5, 0.);
        for x in [0.1, 0.3, 0.5, 0.7, 0.9] {
            let p = poi.value(&array![x].view());
            assert!((0.0..=1.0).contains(&p), "p({x})={p}");
        }
    }

    #[test]
    fn test_ei_prefers_promising_region() {
        let model = fitted_model();
        let agg = FirstElem;
        let ei = ExpectedImprovement::new(&model, &agg, 2., 0.);
        // the posterior mean climbs towards x = 0.8, improvement follows
        assert!(ei.value(&array![0.7].view()) > ei.value(&array![0.3].view()));
    }
}
