//! This library implements the inner optimizers used by the
//! [opale](https://github.com/opale-rs/opale) Bayesian optimizer to maximize
//! acquisition functions (and kernel log-likelihoods) over the unit box
//! `[0, 1]^d`.
//!
//! All optimizers implement the [`InnerOptimizer`] trait: they maximize a
//! user function returning a `(value, optional gradient)` pair, starting
//! from a given point, optionally constrained to the unit box.
//!
//! Available optimizers:
//! * [`GridSearch`]: exhaustive grid evaluation, a degraded fallback,
//! * [`RandomPoint`]: one uniform random point, a baseline,
//! * [`Cmaes`]: a self-contained (mu/mu_w, lambda) CMA-ES,
//! * [`Cobyla`]: derivative-free adapter over the [cobyla](https://crates.io/crates/cobyla) crate,
//! * [`NLoptNoGrad`]: derivative-free adapter over NLopt (feature `nlopt`),
//! * [`Rprop`]: iRprop- gradient ascent with per-coordinate adaptive steps.
//!
//! Optimizers compose: tuples chain sequentially (the result of one stage
//! seeds the next) and [`ParallelRepeater`] restarts an optimizer from
//! several random points in parallel.
//!
//! ```
//! use ndarray::{array, ArrayView1};
//! use opale_opt::{no_grad, GridSearch, InnerOptimizer, RandomPoint};
//!
//! // maximize a concave function over [0, 1]
//! let f = |x: &ArrayView1<f64>, _grad: bool| no_grad(-(x[0] - 0.3) * (x[0] - 0.3));
//! let opt = (GridSearch::new(20), RandomPoint, GridSearch::new(20));
//! let best = opt.optimize(&f, &array![0.5].view(), true);
//! assert!((best[0] - 0.3).abs() < 0.1);
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod chained;
mod cmaes;
mod cobyla;
mod grid_search;
#[cfg(feature = "nlopt")]
mod nlopt;
mod optimizer;
mod parallel_repeater;
mod random_point;
mod rprop;
pub mod tools;

pub use self::cmaes::*;
pub use self::cobyla::*;
pub use self::grid_search::*;
#[cfg(feature = "nlopt")]
pub use self::nlopt::*;
pub use self::optimizer::*;
pub use self::parallel_repeater::*;
pub use self::random_point::*;
pub use self::rprop::*;
