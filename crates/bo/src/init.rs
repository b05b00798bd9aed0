use ndarray::Array2;
use opale_opt::tools::rng;

/// A strategy producing the samples evaluated before the optimization
/// loop starts. The loop evaluates each point and routes blacklisted
/// ones like any other evaluation.
pub trait InitStrategy {
    /// Points to evaluate, one row each, in the unit box.
    fn points(&self, dim_in: usize) -> Array2<f64>;
}

/// Uniform random sampling of the unit box.
#[derive(Clone, Copy, Debug)]
pub struct RandomSampling {
    nb_samples: usize,
}

impl RandomSampling {
    /// Draw `nb_samples` uniform points.
    pub fn new(nb_samples: usize) -> Self {
        RandomSampling { nb_samples }
    }
}

impl InitStrategy for RandomSampling {
    fn points(&self, dim_in: usize) -> Array2<f64> {
        let mut points = Array2::zeros((self.nb_samples, dim_in));
        for mut row in points.rows_mut() {
            row.assign(&rng::random_unit_vector(dim_in));
        }
        points
    }
}

/// No initialization: the loop starts from whatever history exists.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInit;

impl InitStrategy for NoInit {
    fn points(&self, dim_in: usize) -> Array2<f64> {
        Array2::zeros((0, dim_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_sampling_in_unit_box() {
        rng::seed(42);
        let points = RandomSampling::new(20).points(3);
        assert_eq!(points.dim(), (20, 3));
        assert!(points.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_no_init_is_empty() {
        assert_eq!(NoInit.points(2).nrows(), 0);
    }
}
