use crate::errors::{GpError, Result};
use crate::hyperparameters::{HyperParamsOptimizer, RpropRestarts};
use crate::kernels::CovarianceModel;
use crate::mean_models::{MeanContext, MeanModel};
use crate::utils::{cholesky_solve_mat, cholesky_solve_vec, cholesky_with_jitter, solve_lower_vec};

use linfa::Float;
use ndarray::{concatenate, s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};
use num_traits::ToPrimitive;
use opale_opt::Eval;

use log::debug;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar-output Gaussian process surrogate conditioned on noisy
/// observations and on blacklisted inputs.
///
/// The posterior at `x` is
///
/// `mu(x) = m(x) + k*_S^T alpha`, `sigma2(x) = k(x, x) - |L^-1 k*|^2`
///
/// where `k*` spans the training samples followed by the blacklisted
/// samples, `L` is the Cholesky factor of the Gram matrix over that
/// concatenation and `alpha` is solved on the leading training block only:
/// blacklisted inputs carry no observation, they contribute to the
/// variance alone (the posterior pretends they have been observed at the
/// current prediction).
///
/// The Gram factor is maintained incrementally: appending a sample or a
/// blacklisted sample is a rank-one extension of `L` in `O(n^2)`, much
/// faster than the `O(n^3)` full factorization.
///
/// # Implementation
///
/// * Based on [ndarray](https://github.com/rust-ndarray/ndarray) with the
///   pure-Rust [linfa-linalg](https://github.com/rust-ml/linfa-linalg)
///   backend for Cholesky and triangular solves.
/// * Kernel hyperparameters are fitted by log-marginal-likelihood
///   maximization through the pluggable `H` optimizer (resilient
///   backpropagation with parallel restarts by default). Likelihood
///   gradients are computed through triangular back-solves; the inverse
///   Gram matrix is never formed.
/// * Factorizations go through a jitter ladder before giving up with
///   [`GpError::NonPositiveDefinite`].
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Corr: Serialize, Mean: Serialize, H: Serialize",
        deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>, Mean: Deserialize<'de>, H: Deserialize<'de>"
    ))
)]
pub struct GaussianProcess<F: Float, Corr, Mean, H = RpropRestarts>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    corr: Corr,
    mean: Mean,
    hp_optimizer: H,
    /// Training inputs (n, d)
    xt: Array2<F>,
    /// Training outputs (n,)
    yt: Array1<F>,
    /// Per-sample observation noise variance (n,)
    noise: Array1<F>,
    /// Blacklisted inputs (nb, d)
    xt_bl: Array2<F>,
    /// Per-blacklisted-sample noise variance (nb,)
    noise_bl: Array1<F>,
    /// Gram matrix over training then blacklisted inputs (n+nb, n+nb)
    kernel_mx: Array2<F>,
    /// Lower Cholesky factor of the Gram matrix
    l_chol: Array2<F>,
    /// GP weights over the training block (n,)
    alpha: Array1<F>,
    computed: bool,
}

impl<F: Float, Corr, Mean, H> GaussianProcess<F, Corr, Mean, H>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    /// An uninitialised surrogate: queries return the prior
    /// `(m(x), k(x, x))` until the first fit.
    pub fn new(corr: Corr, mean: Mean) -> Self {
        GaussianProcess {
            corr,
            mean,
            hp_optimizer: H::default(),
            xt: Array2::zeros((0, 0)),
            yt: Array1::zeros(0),
            noise: Array1::zeros(0),
            xt_bl: Array2::zeros((0, 0)),
            noise_bl: Array1::zeros(0),
            kernel_mx: Array2::zeros((0, 0)),
            l_chol: Array2::zeros((0, 0)),
            alpha: Array1::zeros(0),
            computed: false,
        }
    }

    /// Replace the hyperparameter optimizer.
    pub fn with_hp_optimizer(mut self, hp_optimizer: H) -> Self {
        self.hp_optimizer = hp_optimizer;
        self
    }

    /// Fit the surrogate on `xt` samples and `yt` observations with the
    /// given per-sample noise variances.
    pub fn compute(
        &mut self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        let empty_bl = Array2::zeros((0, xt.ncols()));
        let empty_noise = Array1::zeros(0);
        self.compute_with_blacklist(xt, yt, noise, &empty_bl, &empty_noise)
    }

    /// Fit the surrogate, additionally conditioning the variance on
    /// blacklisted inputs `xt_bl`.
    pub fn compute_with_blacklist(
        &mut self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix1>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xt_bl: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise_bl: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if xt.nrows() == 0 {
            return Err(GpError::InvalidValue(
                "at least one training sample is required".to_string(),
            ));
        }
        if xt.nrows() != yt.len() {
            return Err(GpError::DimensionMismatch {
                expected: xt.nrows(),
                actual: yt.len(),
            });
        }
        if noise.len() != xt.nrows() {
            return Err(GpError::DimensionMismatch {
                expected: xt.nrows(),
                actual: noise.len(),
            });
        }
        if xt_bl.nrows() != noise_bl.len() {
            return Err(GpError::DimensionMismatch {
                expected: xt_bl.nrows(),
                actual: noise_bl.len(),
            });
        }
        if xt_bl.nrows() > 0 && xt_bl.ncols() != xt.ncols() {
            return Err(GpError::DimensionMismatch {
                expected: xt.ncols(),
                actual: xt_bl.ncols(),
            });
        }
        if noise.iter().chain(noise_bl.iter()).any(|v| *v < F::zero()) {
            return Err(GpError::InvalidValue(
                "noise variances must be non-negative".to_string(),
            ));
        }

        self.corr = self.corr.ard_resized(xt.ncols());
        self.xt = xt.to_owned();
        self.yt = yt.to_owned();
        self.noise = noise.to_owned();
        self.xt_bl = xt_bl.to_owned();
        self.noise_bl = noise_bl.to_owned();
        self.recompute(true)
    }

    /// Append one sample and extend the Cholesky factor by a rank-one
    /// update.
    ///
    /// On [`GpError::IncrementalUpdateFailed`] the sample is kept in the
    /// training set and the caller must [`recompute`](Self::recompute).
    /// With a non-empty blacklist the Gram ordering (samples first) rules
    /// out a trailing extension and the surrogate recomputes in full.
    pub fn add_sample(&mut self, x: &ArrayView1<F>, y: F, noise: F) -> Result<()> {
        if noise < F::zero() {
            return Err(GpError::InvalidValue(
                "noise variances must be non-negative".to_string(),
            ));
        }
        if self.xt.nrows() == 0 {
            if self.xt_bl.nrows() > 0 && x.len() != self.xt_bl.ncols() {
                return Err(GpError::DimensionMismatch {
                    expected: self.xt_bl.ncols(),
                    actual: x.len(),
                });
            }
            self.corr = self.corr.ard_resized(x.len());
            self.xt = x.to_owned().insert_axis(Axis(0));
            self.yt = Array1::from_elem(1, y);
            self.noise = Array1::from_elem(1, noise);
            return self.recompute(true);
        }
        let dim = self.xt.ncols();
        if x.len() != dim {
            return Err(GpError::DimensionMismatch {
                expected: dim,
                actual: x.len(),
            });
        }

        let n_old = self.xt.nrows();
        self.xt = concatenate![Axis(0), self.xt.view(), x.view().insert_axis(Axis(0))];
        let y_row = Array1::from_elem(1, y);
        self.yt = concatenate![Axis(0), self.yt.view(), y_row.view()];
        let noise_row = Array1::from_elem(1, noise);
        self.noise = concatenate![Axis(0), self.noise.view(), noise_row.view()];

        if !self.computed || self.xt_bl.nrows() > 0 {
            return self.recompute(true);
        }

        let mut k_new = Array1::zeros(n_old);
        for j in 0..n_old {
            k_new[j] = self.corr.value(x, &self.xt.row(j));
        }
        let diag = self.corr.value(x, x) + noise;
        self.extend_factor(&k_new, diag)?;
        self.compute_alpha()
    }

    /// Append one blacklisted input: the posterior variance collapses
    /// around it while the mean is untouched (no observation is added).
    pub fn add_blacklist_sample(&mut self, x: &ArrayView1<F>, noise: F) -> Result<()> {
        if noise < F::zero() {
            return Err(GpError::InvalidValue(
                "noise variances must be non-negative".to_string(),
            ));
        }
        if self.xt.nrows() > 0 && x.len() != self.xt.ncols() {
            return Err(GpError::DimensionMismatch {
                expected: self.xt.ncols(),
                actual: x.len(),
            });
        }

        let nt_old = self.nb_training_rows();
        if self.xt_bl.nrows() == 0 {
            self.xt_bl = x.to_owned().insert_axis(Axis(0));
            self.noise_bl = Array1::from_elem(1, noise);
        } else {
            self.xt_bl = concatenate![Axis(0), self.xt_bl.view(), x.view().insert_axis(Axis(0))];
            let noise_row = Array1::from_elem(1, noise);
            self.noise_bl = concatenate![Axis(0), self.noise_bl.view(), noise_row.view()];
        }

        if nt_old == 0 {
            self.corr = self.corr.ard_resized(x.len());
            return self.recompute(true);
        }
        if !self.computed {
            return self.recompute(true);
        }

        // blacklisted rows sit at the tail of the Gram matrix, the
        // rank-one extension always applies
        let mut k_new = Array1::zeros(nt_old);
        for j in 0..nt_old {
            k_new[j] = self.corr.value(x, &self.training_row(j));
        }
        let diag = self.corr.value(x, x) + noise;
        self.extend_factor(&k_new, diag)
    }

    /// Rebuild the factorization (and the Gram matrix itself when
    /// `recompute_kernel` is set) from the owned training data.
    pub fn recompute(&mut self, recompute_kernel: bool) -> Result<()> {
        let nt = self.nb_training_rows();
        if nt == 0 {
            self.computed = false;
            return Ok(());
        }
        if recompute_kernel || self.kernel_mx.nrows() != nt {
            self.build_kernel();
        }
        self.l_chol = cholesky_with_jitter(&self.kernel_mx)?;
        self.computed = true;
        self.compute_alpha()
    }

    /// Forget all samples and return to the uninitialised state.
    pub fn reset(&mut self) {
        self.xt = Array2::zeros((0, 0));
        self.yt = Array1::zeros(0);
        self.noise = Array1::zeros(0);
        self.xt_bl = Array2::zeros((0, 0));
        self.noise_bl = Array1::zeros(0);
        self.kernel_mx = Array2::zeros((0, 0));
        self.l_chol = Array2::zeros((0, 0));
        self.alpha = Array1::zeros(0);
        self.computed = false;
    }

    /// Posterior mean and variance at `x`; the prior `(m(x), k(x, x))`
    /// before the first fit.
    pub fn query(&self, x: &ArrayView1<F>) -> (F, F) {
        let mean = self.mean_at(x);
        let prior_var = self.corr.value(x, x);
        if !self.computed {
            return (mean, prior_var);
        }

        let n = self.xt.nrows();
        let nt = self.nb_training_rows();
        let mut k_star = Array1::zeros(nt);
        for j in 0..nt {
            k_star[j] = self.corr.value(x, &self.training_row(j));
        }

        let mu = mean + k_star.slice(s![..n]).dot(&self.alpha);
        let v = solve_lower_vec(&self.l_chol.view(), &k_star).unwrap();
        let sigma2 = prior_var - v.dot(&v);
        (mu, sigma2.max(F::zero()))
    }

    /// Posterior mean at `x`; equals `query(x).0`.
    pub fn mu(&self, x: &ArrayView1<F>) -> F {
        self.query(x).0
    }

    /// Posterior variance at `x`; equals `query(x).1`.
    pub fn sigma(&self, x: &ArrayView1<F>) -> F {
        self.query(x).1
    }

    /// Log marginal likelihood of the training observations under the
    /// candidate hyperparameters `theta` (natural scale). The stored
    /// hyperparameters are untouched.
    pub fn log_likelihood(&self, theta: &ArrayView1<F>) -> Result<F> {
        self.likelihood_parts(theta, false).map(|(value, _)| value)
    }

    /// Log marginal likelihood and its gradient with respect to `theta`.
    ///
    /// The gradient `1/2 tr((alpha alpha^T - K^-1) dK/dtheta)` is
    /// evaluated through triangular back-solves.
    pub fn log_likelihood_with_grad(&self, theta: &ArrayView1<F>) -> Result<(F, Array1<F>)> {
        self.likelihood_parts(theta, true)
            .map(|(value, grad)| (value, grad.expect("gradient requested")))
    }

    /// Maximize the log marginal likelihood over the kernel
    /// hyperparameters with the configured optimizer.
    ///
    /// On success the kernel is updated and the factorization rebuilt; on
    /// any failure the previous hyperparameters (and fitted state) are
    /// retained.
    pub fn optimize_hyperparams(&mut self) -> Result<()> {
        if self.corr.n_params() == 0 || self.xt.nrows() == 0 {
            return Ok(());
        }

        // the optimizer works on log10(theta), as the likelihood varies
        // over orders of magnitude of the lengthscales
        let bounds: Vec<(f64, f64)> = self
            .corr
            .param_bounds()
            .iter()
            .map(|(lo, up)| (to_f64(lo).log10(), to_f64(up).log10()))
            .collect();
        let theta0: Array1<f64> = self.corr.params().iter().map(|v| to_f64(v).log10()).collect();

        let objective = |u: &ArrayView1<f64>, eval_grad: bool| -> Eval {
            let theta: Array1<F> = u.mapv(|v| F::cast(10f64.powf(v)));
            if eval_grad {
                match self.log_likelihood_with_grad(&theta.view()) {
                    Ok((value, grad)) => {
                        let grad_log10: Array1<f64> = grad
                            .iter()
                            .zip(theta.iter())
                            .map(|(g, t)| to_f64(g) * to_f64(t) * std::f64::consts::LN_10)
                            .collect();
                        (to_f64(&value), Some(grad_log10))
                    }
                    Err(_) => (f64::NEG_INFINITY, None),
                }
            } else {
                match self.log_likelihood(&theta.view()) {
                    Ok(value) => (to_f64(&value), None),
                    Err(_) => (f64::NEG_INFINITY, None),
                }
            }
        };

        let Some(u_best) = self.hp_optimizer.optimize(&objective, &theta0, &bounds) else {
            return Ok(());
        };
        let theta_best: Array1<F> = u_best.mapv(|v| F::cast(10f64.powf(v)));

        let lml = match self.log_likelihood(&theta_best.view()) {
            Ok(value) if to_f64(&value).is_finite() => value,
            _ => {
                return Err(GpError::HyperparamOptimizationDiverged(
                    "non-finite log-likelihood at candidate".to_string(),
                ))
            }
        };

        let previous = self.corr.params();
        self.corr.set_params(&theta_best.view());
        if let Err(err) = self.recompute(true) {
            self.corr.set_params(&previous.view());
            self.recompute(true)?;
            return Err(err);
        }
        debug!(
            "GP hyperparameters updated: theta={theta_best} log-likelihood={lml}",
        );
        Ok(())
    }

    /// Number of training samples.
    pub fn nb_samples(&self) -> usize {
        self.xt.nrows()
    }

    /// Number of blacklisted samples.
    pub fn nb_blacklist_samples(&self) -> usize {
        self.xt_bl.nrows()
    }

    /// Training samples seen so far.
    pub fn samples(&self) -> &Array2<F> {
        &self.xt
    }

    /// Training observations seen so far.
    pub fn observations(&self) -> &Array1<F> {
        &self.yt
    }

    /// Per-sample observation noise variances.
    pub fn noise(&self) -> &Array1<F> {
        &self.noise
    }

    /// Blacklisted inputs seen so far.
    pub fn blacklist_samples(&self) -> &Array2<F> {
        &self.xt_bl
    }

    /// Per-blacklisted-sample noise variances.
    pub fn blacklist_noise(&self) -> &Array1<F> {
        &self.noise_bl
    }

    /// Lower Cholesky factor of the current Gram matrix.
    pub fn matrix_l(&self) -> &Array2<F> {
        &self.l_chol
    }

    /// Current Gram matrix over training then blacklisted inputs.
    pub fn gram_matrix(&self) -> &Array2<F> {
        &self.kernel_mx
    }

    /// The kernel, giving access to its hyperparameters.
    pub fn kernel(&self) -> &Corr {
        &self.corr
    }

    /// The mean model.
    pub fn mean_model(&self) -> &Mean {
        &self.mean
    }

    /// Whether the surrogate holds a fitted state.
    pub fn is_computed(&self) -> bool {
        self.computed
    }

    fn nb_training_rows(&self) -> usize {
        self.xt.nrows() + self.xt_bl.nrows()
    }

    fn training_row(&self, i: usize) -> ArrayView1<F> {
        let n = self.xt.nrows();
        if i < n {
            self.xt.row(i)
        } else {
            self.xt_bl.row(i - n)
        }
    }

    fn noise_at(&self, i: usize) -> F {
        let n = self.xt.nrows();
        if i < n {
            self.noise[i]
        } else {
            self.noise_bl[i - n]
        }
    }

    fn mean_at(&self, x: &ArrayView1<F>) -> F {
        let obs;
        let ctx = if self.xt.nrows() > 0 {
            obs = self.yt.view().insert_axis(Axis(1));
            MeanContext::new(obs)
        } else {
            MeanContext::empty()
        };
        self.mean.value(x, &ctx)[0]
    }

    fn build_kernel(&mut self) {
        let nt = self.nb_training_rows();
        let mut kernel = Array2::zeros((nt, nt));
        for i in 0..nt {
            let zi = self.training_row(i);
            for j in 0..i {
                let value = self.corr.value(&zi, &self.training_row(j));
                kernel[[i, j]] = value;
                kernel[[j, i]] = value;
            }
            kernel[[i, i]] = self.corr.value(&zi, &zi) + self.noise_at(i);
        }
        self.kernel_mx = kernel;
    }

    /// Extend `L` (and the Gram matrix) by the row `[k_new; diag]`.
    fn extend_factor(&mut self, k_new: &Array1<F>, diag: F) -> Result<()> {
        let nt = k_new.len();
        let ell = solve_lower_vec(&self.l_chol.view(), k_new)?;
        let lambda2 = diag - ell.dot(&ell);
        if lambda2 <= F::zero() {
            return Err(GpError::IncrementalUpdateFailed);
        }

        let mut l_ext = Array2::zeros((nt + 1, nt + 1));
        l_ext.slice_mut(s![..nt, ..nt]).assign(&self.l_chol);
        l_ext.slice_mut(s![nt, ..nt]).assign(&ell);
        l_ext[[nt, nt]] = lambda2.sqrt();
        self.l_chol = l_ext;

        let mut k_ext = Array2::zeros((nt + 1, nt + 1));
        k_ext.slice_mut(s![..nt, ..nt]).assign(&self.kernel_mx);
        k_ext.slice_mut(s![nt, ..nt]).assign(k_new);
        k_ext.slice_mut(s![..nt, nt]).assign(k_new);
        k_ext[[nt, nt]] = diag;
        self.kernel_mx = k_ext;
        Ok(())
    }

    fn residuals(&self) -> Array1<F> {
        let mut residual = self.yt.to_owned();
        for (i, r) in residual.iter_mut().enumerate() {
            *r = *r - self.mean_at(&self.xt.row(i));
        }
        residual
    }

    fn compute_alpha(&mut self) -> Result<()> {
        let n = self.xt.nrows();
        if n == 0 {
            self.alpha = Array1::zeros(0);
            return Ok(());
        }
        // blacklisted inputs carry no target: alpha lives on the leading
        // training block of the factor
        let residual = self.residuals();
        let l_ss = self.l_chol.slice(s![..n, ..n]);
        self.alpha = cholesky_solve_vec(&l_ss, &residual)?;
        Ok(())
    }

    fn likelihood_parts(
        &self,
        theta: &ArrayView1<F>,
        with_grad: bool,
    ) -> Result<(F, Option<Array1<F>>)> {
        let n = self.xt.nrows();
        if n == 0 {
            return Err(GpError::InvalidValue(
                "log-likelihood needs at least one training sample".to_string(),
            ));
        }
        let mut kernel = self.corr.clone();
        kernel.set_params(theta);

        let mut k_mx: Array2<F> = Array2::zeros((n, n));
        for i in 0..n {
            let zi = self.xt.row(i);
            for j in 0..i {
                let value = kernel.value(&zi, &self.xt.row(j));
                k_mx[[i, j]] = value;
                k_mx[[j, i]] = value;
            }
            k_mx[[i, i]] = kernel.value(&zi, &zi) + self.noise[i];
        }

        let l_chol = cholesky_with_jitter(&k_mx)?;
        let residual = self.residuals();
        let alpha = cholesky_solve_vec(&l_chol.view(), &residual)?;

        let half = F::cast(0.5);
        let log_det: F = l_chol.diag().mapv(|v| v.ln()).sum();
        let norm_cst = F::cast(n as f64 / 2. * (2. * std::f64::consts::PI).ln());
        let value = -half * residual.dot(&alpha) - log_det - norm_cst;

        if !with_grad {
            return Ok((value, None));
        }

        let n_params = kernel.n_params();
        let mut gradients: Vec<Array2<F>> = vec![Array2::zeros((n, n)); n_params];
        for i in 0..n {
            let zi = self.xt.row(i);
            for j in 0..=i {
                let g = kernel.param_gradient(&zi, &self.xt.row(j));
                for (p, gs) in gradients.iter_mut().enumerate() {
                    gs[[i, j]] = g[p];
                    gs[[j, i]] = g[p];
                }
            }
        }

        let mut grad = Array1::zeros(n_params);
        for (p, g_mx) in gradients.iter().enumerate() {
            let quad = alpha.dot(&g_mx.dot(&alpha));
            let trace = cholesky_solve_mat(&l_chol.view(), g_mx)?
                .diag()
                .sum();
            grad[p] = half * (quad - trace);
        }
        Ok((value, Some(grad)))
    }
}

impl<F: Float, Corr, Mean, H> fmt::Display for GaussianProcess<F, Corr, Mean, H>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, mean={}, theta={}, n={}, bl={})",
            self.corr,
            self.mean,
            self.corr.params(),
            self.xt.nrows(),
            self.xt_bl.nrows(),
        )
    }
}

#[inline(always)]
fn to_f64<F: Float>(v: &F) -> f64 {
    v.to_f64().unwrap()
}
