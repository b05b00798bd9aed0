//! A module for covariance (kernel) functions used by the GP surrogates.
//!
//! The following kernels are implemented:
//! * squared exponential with ARD lengthscales,
//! * matern 3/2,
//! * matern 5/2.
//!
//! Kernels expose their tunable hyperparameters as a flat vector so that
//! the marginal-likelihood optimizer can drive them generically; gradients
//! are taken with respect to those hyperparameters in natural scale.

use linfa::Float;
use ndarray::{Array1, ArrayView1, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default initial lengthscale, in unit-box coordinates
pub const DEFAULT_LENGTHSCALE: f64 = 0.5;
/// Default search bounds for lengthscale hyperparameters
pub const DEFAULT_LENGTHSCALE_BOUNDS: (f64, f64) = (1e-2, 1e1);

/// A trait for covariance models `k(x, x')` used by the GP surrogates.
///
/// A kernel must be symmetric and positive semidefinite. Tunable
/// hyperparameters are exposed through [`params`](CovarianceModel::params)
/// / [`set_params`](CovarianceModel::set_params) and their gradient
/// through [`param_gradient`](CovarianceModel::param_gradient); a kernel
/// with no tunable hyperparameters returns an empty vector.
pub trait CovarianceModel<F: Float>: Clone + fmt::Display + Sync + Send {
    /// Covariance between two points.
    fn value(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F;

    /// Gradient of `k(a, b)` with respect to the hyperparameter vector.
    fn param_gradient(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> Array1<F>;

    /// Current hyperparameter vector.
    fn params(&self) -> Array1<F>;

    /// Replace the hyperparameter vector.
    fn set_params(&mut self, params: &ArrayView1<F>);

    /// Number of tunable hyperparameters.
    fn n_params(&self) -> usize {
        self.params().len()
    }

    /// Feasible box for each hyperparameter, in natural scale.
    fn param_bounds(&self) -> Vec<(F, F)>;

    /// A copy of this kernel sized for `dim` input components.
    /// Isotropic kernels are unaffected.
    fn ard_resized(&self, dim: usize) -> Self {
        let _ = dim;
        self.clone()
    }
}

/// Squared exponential kernel with one lengthscale per input component
/// (automatic relevance determination).
///
/// `k(a, b) = sigma2 * exp(-1/2 sum_i ((a_i - b_i) / l_i)^2)`
///
/// A single lengthscale broadcasts over all components, so a freshly
/// constructed kernel is isotropic until
/// [`ard_resized`](CovarianceModel::ard_resized) expands it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct SquaredExpARD<F: Float> {
    sigma2: F,
    lengthscales: Array1<F>,
    bounds: (F, F),
}

impl<F: Float> Default for SquaredExpARD<F> {
    fn default() -> Self {
        SquaredExpARD::new(F::one())
    }
}

impl<F: Float> SquaredExpARD<F> {
    /// An isotropic squared exponential kernel of variance `sigma2`
    /// awaiting ARD expansion.
    pub fn new(sigma2: F) -> Self {
        SquaredExpARD {
            sigma2,
            lengthscales: Array1::from_elem(1, F::cast(DEFAULT_LENGTHSCALE)),
            bounds: (
                F::cast(DEFAULT_LENGTHSCALE_BOUNDS.0),
                F::cast(DEFAULT_LENGTHSCALE_BOUNDS.1),
            ),
        }
    }

    /// Set the lengthscale search bounds.
    pub fn with_bounds(mut self, bounds: (F, F)) -> Self {
        self.bounds = bounds;
        self
    }

    fn lengthscale(&self, i: usize) -> F {
        if self.lengthscales.len() == 1 {
            self.lengthscales[0]
        } else {
            self.lengthscales[i]
        }
    }
}

impl<F: Float> CovarianceModel<F> for SquaredExpARD<F> {
    fn value(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
        let mut sq = F::zero();
        for i in 0..a.len() {
            let d = (a[i] - b[i]) / self.lengthscale(i);
            sq = sq + d * d;
        }
        self.sigma2 * F::exp(F::cast(-0.5) * sq)
    }

    fn param_gradient(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> Array1<F> {
        let k = self.value(a, b);
        let mut grad = Array1::zeros(self.lengthscales.len());
        for i in 0..a.len() {
            let j = if self.lengthscales.len() == 1 { 0 } else { i };
            let l = self.lengthscales[j];
            let d = a[i] - b[i];
            // d k / d l_j = k * d^2 / l^3
            grad[j] = grad[j] + k * d * d / (l * l * l);
        }
        grad
    }

    fn params(&self) -> Array1<F> {
        self.lengthscales.to_owned()
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.lengthscales = params.to_owned();
    }

    fn param_bounds(&self) -> Vec<(F, F)> {
        vec![self.bounds; self.lengthscales.len()]
    }

    fn ard_resized(&self, dim: usize) -> Self {
        if self.lengthscales.len() == dim {
            return self.clone();
        }
        let mut resized = self.clone();
        resized.lengthscales = Array1::from_elem(dim, self.lengthscales[0]);
        resized
    }
}

impl<F: Float> fmt::Display for SquaredExpARD<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExpARD")
    }
}

macro_rules! declare_matern {
    ($name:ident, $nu:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq)]
        #[cfg_attr(
            feature = "serializable",
            derive(Serialize, Deserialize),
            serde(bound(deserialize = "F: Deserialize<'de>"))
        )]
        pub struct $name<F: Float> {
            sigma2: F,
            l: F,
            bounds: (F, F),
        }

        impl<F: Float> Default for $name<F> {
            fn default() -> Self {
                $name::new(F::one(), F::cast(DEFAULT_LENGTHSCALE))
            }
        }

        impl<F: Float> $name<F> {
            /// An isotropic kernel of variance `sigma2` and lengthscale `l`.
            pub fn new(sigma2: F, l: F) -> Self {
                $name {
                    sigma2,
                    l,
                    bounds: (
                        F::cast(DEFAULT_LENGTHSCALE_BOUNDS.0),
                        F::cast(DEFAULT_LENGTHSCALE_BOUNDS.1),
                    ),
                }
            }

            /// Set the lengthscale search bounds.
            pub fn with_bounds(mut self, bounds: (F, F)) -> Self {
                self.bounds = bounds;
                self
            }

            fn scaled_dist(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
                let mut sq = F::zero();
                Zip::from(a).and(b).for_each(|&ai, &bi| {
                    let d = ai - bi;
                    sq = sq + d * d;
                });
                F::cast($nu).sqrt() * sq.sqrt() / self.l
            }
        }

        impl<F: Float> fmt::Display for $name<F> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, stringify!($name))
            }
        }
    };
}

declare_matern!(
    Matern32,
    3.0,
    "Isotropic Matern 3/2 kernel.\n\n\
     `k(a, b) = sigma2 * (1 + u) * exp(-u)` with `u = sqrt(3) |a - b| / l`."
);
declare_matern!(
    Matern52,
    5.0,
    "Isotropic Matern 5/2 kernel.\n\n\
     `k(a, b) = sigma2 * (1 + u + u^2/3) * exp(-u)` with `u = sqrt(5) |a - b| / l`."
);

impl<F: Float> CovarianceModel<F> for Matern32<F> {
    fn value(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
        let u = self.scaled_dist(a, b);
        self.sigma2 * (F::one() + u) * F::exp(-u)
    }

    fn param_gradient(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> Array1<F> {
        let u = self.scaled_dist(a, b);
        // d k / d l = sigma2 * exp(-u) * u^2 / l
        Array1::from_elem(1, self.sigma2 * F::exp(-u) * u * u / self.l)
    }

    fn params(&self) -> Array1<F> {
        Array1::from_elem(1, self.l)
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.l = params[0];
    }

    fn param_bounds(&self) -> Vec<(F, F)> {
        vec![self.bounds]
    }
}

impl<F: Float> CovarianceModel<F> for Matern52<F> {
    fn value(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> F {
        let u = self.scaled_dist(a, b);
        self.sigma2 * (F::one() + u + u * u / F::cast(3.)) * F::exp(-u)
    }

    fn param_gradient(&self, a: &ArrayView1<F>, b: &ArrayView1<F>) -> Array1<F> {
        let u = self.scaled_dist(a, b);
        // d k / d l = sigma2 * exp(-u) * u^2 (1 + u) / (3 l)
        let g = self.sigma2 * F::exp(-u) * u * u * (F::one() + u) / (F::cast(3.) * self.l);
        Array1::from_elem(1, g)
    }

    fn params(&self) -> Array1<F> {
        Array1::from_elem(1, self.l)
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.l = params[0];
    }

    fn param_bounds(&self) -> Vec<(F, F)> {
        vec![self.bounds]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use paste::paste;

    macro_rules! test_kernel_gradient {
        ($kernel:ident, $build:expr) => {
            paste! {
                #[test]
                fn [<test_ $kernel:snake _param_gradient>]() {
                    let kernel = $build;
                    let a = array![0.3, 0.7];
                    let b = array![0.6, 0.2];
                    let grad = kernel.param_gradient(&a.view(), &b.view());

                    let eps = 1e-6;
                    let theta = kernel.params();
                    for j in 0..theta.len() {
                        let mut up = kernel.clone();
                        let mut down = kernel.clone();
                        let mut t_up = theta.to_owned();
                        let mut t_down = theta.to_owned();
                        t_up[j] += eps;
                        t_down[j] -= eps;
                        up.set_params(&t_up.view());
                        down.set_params(&t_down.view());
                        let fd = (up.value(&a.view(), &b.view())
                            - down.value(&a.view(), &b.view()))
                            / (2. * eps);
                        assert_abs_diff_eq!(grad[j], fd, epsilon = 1e-6);
                    }
                }

                #[test]
                fn [<test_ $kernel:snake _symmetry>]() {
                    let kernel = $build;
                    let a = array![0.1, 0.9];
                    let b = array![0.4, 0.3];
                    assert_abs_diff_eq!(
                        kernel.value(&a.view(), &b.view()),
                        kernel.value(&b.view(), &a.view()),
                        epsilon = 1e-15
                    );
                    // variance on the diagonal
                    assert_abs_diff_eq!(kernel.value(&a.view(), &a.view()), 2.5, epsilon = 1e-12);
                }
            }
        };
    }

    test_kernel_gradient!(SquaredExpARD, SquaredExpARD::new(2.5).ard_resized(2));
    test_kernel_gradient!(Matern32, Matern32::new(2.5, 0.4));
    test_kernel_gradient!(Matern52, Matern52::new(2.5, 0.4));

    #[test]
    fn test_ard_broadcast_matches_resized() {
        let iso: SquaredExpARD<f64> = SquaredExpARD::new(1.);
        let ard = iso.ard_resized(3);
        let a = array![0.1, 0.5, 0.9];
        let b = array![0.2, 0.4, 0.6];
        assert_abs_diff_eq!(
            iso.value(&a.view(), &b.view()),
            ard.value(&a.view(), &b.view()),
            epsilon = 1e-15
        );
        assert_eq!(ard.n_params(), 3);
        assert_eq!(iso.n_params(), 1);
    }
}
