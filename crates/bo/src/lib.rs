//! This library implements Bayesian optimization of expensive black-box
//! functions over the unit box `[0, 1]^d`.
//!
//! The optimizer fits a Gaussian process surrogate
//! ([opale-gp](https://crates.io/crates/opale-gp)) on the evaluations seen
//! so far, maximizes an acquisition function (UCB by default, EI and POI
//! available) with an inner optimizer
//! ([opale-opt](https://crates.io/crates/opale-opt), CMA-ES by default)
//! to pick the next input, evaluates the objective there and extends the
//! surrogate through an incremental Cholesky update. Kernel
//! hyperparameters are re-fitted periodically by marginal-likelihood
//! maximization.
//!
//! An objective may blacklist an input (e.g. a failed experiment) by
//! returning `None`: the point raises the surrogate uncertainty around
//! itself without anchoring the posterior mean, and the loop moves on.
//!
//! # Example
//!
//! ```no_run
//! use ndarray::{array, ArrayView1};
//! use opale_bo::{BOptimizer, BoConfig, FirstElem, Objective};
//!
//! // maximize a 1-D function over [0, 1]
//! let objective = Objective::new(1, 1, |x: &ArrayView1<f64>| {
//!     Some(array![-(x[0] - 0.3) * (x[0] - 0.3)])
//! });
//!
//! let config = BoConfig::default().n_init(10).max_iters(50);
//! let mut optimizer = BOptimizer::new(config);
//! let res = optimizer
//!     .optimize(&objective, &FirstElem, true)
//!     .expect("optimization");
//! println!("best f(x) = {} at x = {}", res.y_opt[0], res.x_opt);
//! ```
//!
//! Policies compose at construction time: the kernel and mean through
//! [`BOptimizer::kernel`] / [`BOptimizer::mean`], the acquisition through
//! [`BoConfig::acqui`], the inner optimizer through
//! [`BOptimizer::acqui_optimizer`], and the initialization / stop /
//! observer hooks through their respective setters.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod acqui;
mod boptimizer;
mod config;
mod errors;
mod init;
mod observer;
mod stop;
mod types;

pub use acqui::*;
pub use boptimizer::*;
pub use config::*;
pub use errors::*;
pub use init::*;
pub use observer::*;
pub use stop::*;
pub use types::*;
