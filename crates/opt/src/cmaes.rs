use crate::optimizer::{clamp_unit, InnerOptimizer, OptimFn};
use crate::tools::rng;
use linfa_linalg::eigh::*;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::{Distribution, StandardNormal};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A self-contained (mu/mu_w, lambda) CMA-ES maximizer.
///
/// Covariance matrix adaptation evolution strategy with cumulative
/// step-size adaptation, rank-one and rank-mu covariance updates. The
/// population size is `4 + 3 ln d`, weights are log-decreasing over the
/// best half of the population. Candidates are clamped to the unit box
/// when `bounded` is set.
///
/// The search distribution is re-diagonalized every generation, which is
/// cheap at the dimensions a surrogate-based optimizer runs at.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Cmaes {
    max_fevals: usize,
    sigma0: f64,
}

impl Default for Cmaes {
    fn default() -> Self {
        Cmaes {
            max_fevals: 1000,
            sigma0: 0.3,
        }
    }
}

impl Cmaes {
    /// A CMA-ES with the given evaluation budget.
    pub fn new(max_fevals: usize) -> Self {
        Cmaes {
            max_fevals,
            ..Default::default()
        }
    }

    /// Set the initial step size (in unit-box coordinates).
    pub fn sigma0(mut self, sigma0: f64) -> Self {
        self.sigma0 = sigma0;
        self
    }
}

impl InnerOptimizer for Cmaes {
    fn optimize<F: OptimFn>(&self, f: &F, init: &ArrayView1<f64>, bounded: bool) -> Array1<f64> {
        let n = init.len();
        let nf = n as f64;

        let lambda = 4 + (3. * nf.ln()).floor() as usize;
        let mu = lambda / 2;
        let mut weights: Array1<f64> =
            Array1::from_iter((0..mu).map(|i| ((mu as f64) + 0.5).ln() - ((i + 1) as f64).ln()));
        let total = weights.sum();
        weights.mapv_inplace(|w| w / total);
        let mueff = 1.0 / weights.mapv(|w| w * w).sum();

        let cc = (4. + mueff / nf) / (nf + 4. + 2. * mueff / nf);
        let cs = (mueff + 2.) / (nf + mueff + 5.);
        let c1 = 2. / ((nf + 1.3) * (nf + 1.3) + mueff);
        let cmu = (1. - c1).min(2. * (mueff - 2. + 1. / mueff) / ((nf + 2.) * (nf + 2.) + mueff));
        let damps = 1. + 2. * (0.0f64).max(((mueff - 1.) / (nf + 1.)).sqrt() - 1.) + cs;
        let chi_n = nf.sqrt() * (1. - 1. / (4. * nf) + 1. / (21. * nf * nf));

        let mut mean = init.to_owned();
        if bounded {
            clamp_unit(&mut mean);
        }
        let mut sigma = self.sigma0;
        let mut cov: Array2<f64> = Array2::eye(n);
        let mut ps: Array1<f64> = Array1::zeros(n);
        let mut pc: Array1<f64> = Array1::zeros(n);

        let mut best_x = mean.clone();
        let mut best_value = f(&mean.view(), false).0;
        let mut fevals = 1usize;
        let mut generation = 0usize;

        while fevals < self.max_fevals {
            // C = B diag(d^2) B^T
            let (eigvals, eig_b) = match cov.clone().eigh_into() {
                Ok(res) => res,
                Err(_) => break,
            };
            let d = eigvals.mapv(|v| v.max(1e-20).sqrt());

            let mut xs: Vec<Array1<f64>> = Vec::with_capacity(lambda);
            let mut ys: Vec<Array1<f64>> = Vec::with_capacity(lambda);
            let mut values: Vec<f64> = Vec::with_capacity(lambda);
            for _ in 0..lambda {
                let z: Array1<f64> = rng::with_rng(|rng| {
                    Array1::from_iter((0..n).map(|_| StandardNormal.sample(rng)))
                });
                let y = eig_b.dot(&(&d * &z));
                let mut x = &mean + &y.mapv(|v| sigma * v);
                if bounded {
                    clamp_unit(&mut x);
                }
                let y = (&x - &mean) / sigma;
                let (value, _) = f(&x.view(), false);
                fevals += 1;
                if value > best_value {
                    best_value = value;
                    best_x.assign(&x);
                }
                xs.push(x);
                ys.push(y);
                values.push(value);
                if fevals >= self.max_fevals {
                    break;
                }
            }
            if xs.len() < mu {
                break;
            }

            let mut order: Vec<usize> = (0..xs.len()).collect();
            order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

            let mut new_mean: Array1<f64> = Array1::zeros(n);
            for (i, &idx) in order.iter().take(mu).enumerate() {
                new_mean = new_mean + xs[idx].mapv(|v| weights[i] * v);
            }
            let y_w = (&new_mean - &mean) / sigma;
            mean = new_mean;

            // C^{-1/2} y_w = B diag(1/d) B^T y_w
            let c_inv_sqrt_y = eig_b.dot(&(eig_b.t().dot(&y_w) / &d));
            ps = ps.mapv(|v| (1. - cs) * v)
                + c_inv_sqrt_y.mapv(|v| (cs * (2. - cs) * mueff).sqrt() * v);

            let ps_norm = ps.mapv(|v| v * v).sum().sqrt();
            let denom = (1. - (1. - cs).powi(2 * (generation as i32 + 1))).sqrt();
            let hsig = ps_norm / denom / chi_n < 1.4 + 2. / (nf + 1.);
            let hsig_f = if hsig { 1.0 } else { 0.0 };

            pc = pc.mapv(|v| (1. - cc) * v)
                + y_w.mapv(|v| hsig_f * (cc * (2. - cc) * mueff).sqrt() * v);

            let pc_col = pc.view().insert_axis(Axis(1));
            let rank_one = pc_col.dot(&pc_col.t());
            let mut rank_mu: Array2<f64> = Array2::zeros((n, n));
            for (i, &idx) in order.iter().take(mu).enumerate() {
                let y_col = ys[idx].view().insert_axis(Axis(1));
                rank_mu = rank_mu + y_col.dot(&y_col.t()).mapv(|v| weights[i] * v);
            }
            cov = cov.mapv(|v| (1. - c1 - cmu) * v)
                + rank_one.mapv(|v| c1 * v)
                + cov.mapv(|v| c1 * (1. - hsig_f) * cc * (2. - cc) * v)
                + rank_mu.mapv(|v| cmu * v);

            sigma *= ((cs / damps) * (ps_norm / chi_n - 1.)).exp();
            if !sigma.is_finite() || sigma < 1e-12 {
                break;
            }
            generation += 1;
        }

        best_x
    }
}
