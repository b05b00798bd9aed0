//! This library implements the [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! surrogates of the [opale](https://github.com/opale-rs/opale) Bayesian
//! optimizer: a scalar GP maintained through incremental Cholesky updates
//! and a vector-output wrapper composing one scalar GP per output with a
//! shared mean function.
//!
//! Beyond the usual fit/query cycle the surrogates support:
//! * rank-one extension of the Cholesky factor when one sample is
//!   appended, in `O(n^2)` instead of a full `O(n^3)` refactorization,
//! * blacklisted inputs that collapse the posterior variance around
//!   forbidden points without anchoring the posterior mean,
//! * kernel hyperparameter fitting by log-marginal-likelihood
//!   maximization with analytic gradients (resilient backpropagation with
//!   parallel restarts by default).
//!
//! ```
//! use ndarray::{arr1, arr2, array, Array1};
//! use opale_gp::{GaussianProcess, Matern52, NullMean, NoOpt};
//!
//! let mut gp = GaussianProcess::<f64, _, _, NoOpt>::new(
//!     Matern52::new(1., 0.25),
//!     NullMean::default(),
//! );
//! gp.compute(
//!     &arr2(&[[0.0], [0.5], [1.0]]),
//!     &arr1(&[0.0, 1.0, 0.0]),
//!     &Array1::zeros(3),
//! )
//! .expect("GP fit");
//!
//! let (mu, sigma2) = gp.query(&array![0.5].view());
//! assert!((mu - 1.0).abs() < 1e-5);
//! assert!(sigma2 < 1e-8);
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
mod hyperparameters;
mod kernels;
mod mean_models;
mod multi;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use hyperparameters::*;
pub use kernels::*;
pub use mean_models::*;
pub use multi::*;
