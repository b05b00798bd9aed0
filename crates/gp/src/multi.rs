use crate::algorithm::GaussianProcess;
use crate::errors::{GpError, Result};
use crate::hyperparameters::{HyperParamsOptimizer, RpropRestarts};
use crate::kernels::CovarianceModel;
use crate::mean_models::{MeanContext, MeanModel, NullMean};

use linfa::Float;
use ndarray::{concatenate, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};
use opale_opt::tools::par;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// The query surface every surrogate offers to acquisition functions.
pub trait SurrogateModel<F: Float>: Sync {
    /// Input dimension.
    fn dim_in(&self) -> usize;
    /// Output dimension.
    fn dim_out(&self) -> usize;
    /// Number of training samples.
    fn nb_samples(&self) -> usize;
    /// Posterior mean and per-output variance at `x`.
    fn query(&self, x: &ArrayView1<F>) -> (Array1<F>, Array1<F>);
    /// Posterior mean at `x`; equals `query(x).0`.
    fn mu(&self, x: &ArrayView1<F>) -> Array1<F> {
        self.query(x).0
    }
    /// Posterior per-output variance at `x`; equals `query(x).1`.
    fn sigma(&self, x: &ArrayView1<F>) -> Array1<F> {
        self.query(x).1
    }
}

/// A wrapper for vector-output surrogates: one scalar GP per output
/// component and a shared mean function.
///
/// Each scalar GP models the residual `y_i - m_i(x)` under a zero inner
/// baseline; the shared mean is added back at query time. Input and
/// output dimensions may be left unknown at construction, they are
/// inferred from the first data handed to
/// [`compute`](MultiGp::compute) or [`add_sample`](MultiGp::add_sample);
/// when the discovered output dimension disagrees with the current GP
/// set, the set is resized and a fresh mean is built.
///
/// Per-output operations are independent and fan out through the
/// process-wide parallel-for primitive.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, Corr: Serialize, Mean: Serialize, H: Serialize",
        deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>, Mean: Deserialize<'de>, H: Deserialize<'de>"
    ))
)]
pub struct MultiGp<F: Float, Corr, Mean, H = RpropRestarts>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    gps: Vec<GaussianProcess<F, Corr, NullMean, H>>,
    corr: Corr,
    mean: Mean,
    hp_optimizer: H,
    dim_in: Option<usize>,
    /// Raw observations (n, dim_out), kept for residual recomputation
    observations: Array2<F>,
}

impl<F: Float, Corr, Mean, H> MultiGp<F, Corr, Mean, H>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    /// A surrogate of yet-unknown dimensions; they are discovered from the
    /// first data.
    pub fn new(corr: Corr, mean: Mean) -> Self {
        MultiGp {
            gps: vec![],
            corr,
            mean,
            hp_optimizer: H::default(),
            dim_in: None,
            observations: Array2::zeros((0, 0)),
        }
    }

    /// Replace the hyperparameter optimizer handed to every output GP.
    pub fn with_hp_optimizer(mut self, hp_optimizer: H) -> Self {
        self.hp_optimizer = hp_optimizer;
        for gp in std::mem::take(&mut self.gps) {
            self.gps.push(gp.with_hp_optimizer(self.hp_optimizer.clone()));
        }
        self
    }

    /// A surrogate shaped for `dim_in` inputs and `dim_out` outputs,
    /// usable for prior queries before any data.
    pub fn with_dims(dim_in: usize, dim_out: usize, corr: Corr, mean: Mean) -> Self {
        let mut multi = MultiGp::new(corr, mean);
        multi.shape(dim_in, dim_out);
        multi.observations = Array2::zeros((0, dim_out));
        multi
    }

    fn shape(&mut self, dim_in: usize, dim_out: usize) {
        self.dim_in = Some(dim_in);
        if self.gps.len() != dim_out {
            self.gps = (0..dim_out)
                .map(|_| {
                    GaussianProcess::new(self.corr.ard_resized(dim_in), NullMean::new(1))
                        .with_hp_optimizer(self.hp_optimizer.clone())
                })
                .collect();
            self.mean = self.mean.resized(dim_out);
        }
    }

    /// Fit the surrogate on `xt` samples and vector observations `yt`.
    pub fn compute(
        &mut self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        let empty_bl = Array2::zeros((0, xt.ncols()));
        let empty_noise = Array1::zeros(0);
        self.compute_with_blacklist(xt, yt, noise, &empty_bl, &empty_noise)
    }

    /// Fit the surrogate, additionally conditioning the variances on
    /// blacklisted inputs.
    pub fn compute_with_blacklist(
        &mut self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xt_bl: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise_bl: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if xt.nrows() == 0 || xt.nrows() != yt.nrows() {
            return Err(GpError::DimensionMismatch {
                expected: xt.nrows(),
                actual: yt.nrows(),
            });
        }
        self.shape(xt.ncols(), yt.ncols());
        self.observations = yt.to_owned();

        let residuals = self.residuals(xt, yt);
        let xt_v = xt.view();
        let noise_v = noise.view();
        let xt_bl_v = xt_bl.view();
        let noise_bl_v = noise_bl.view();
        let first_err: Mutex<Option<GpError>> = Mutex::new(None);
        par::par_for_each_mut(&mut self.gps, |i, gp| {
            let target = residuals.column(i).to_owned();
            if let Err(err) =
                gp.compute_with_blacklist(&xt_v, &target, &noise_v, &xt_bl_v, &noise_bl_v)
            {
                first_err.lock().unwrap().get_or_insert(err);
            }
        });
        match first_err.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Append one sample to every output GP through a rank-one update.
    ///
    /// On [`GpError::IncrementalUpdateFailed`] the observation is kept and
    /// the caller must [`recompute`](MultiGp::recompute).
    pub fn add_sample(&mut self, x: &ArrayView1<F>, y: &ArrayView1<F>, noise: F) -> Result<()> {
        if self.gps.is_empty() {
            self.shape(x.len(), y.len());
        } else {
            if self.dim_in != Some(x.len()) {
                return Err(GpError::DimensionMismatch {
                    expected: self.dim_in.unwrap_or(x.len()),
                    actual: x.len(),
                });
            }
            if y.len() != self.gps.len() {
                return Err(GpError::DimensionMismatch {
                    expected: self.gps.len(),
                    actual: y.len(),
                });
            }
        }

        if self.observations.nrows() == 0 {
            self.observations = y.to_owned().insert_axis(Axis(0));
        } else {
            self.observations = concatenate![
                Axis(0),
                self.observations.view(),
                y.view().insert_axis(Axis(0))
            ];
        }

        let ctx = MeanContext::new(self.observations.view());
        let mean_vector = self.mean.value(x, &ctx);
        let first_err: Mutex<Option<GpError>> = Mutex::new(None);
        par::par_for_each_mut(&mut self.gps, |i, gp| {
            if let Err(err) = gp.add_sample(x, y[i] - mean_vector[i], noise) {
                first_err.lock().unwrap().get_or_insert(err);
            }
        });
        match first_err.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Append one blacklisted input to every output GP.
    pub fn add_blacklist_sample(&mut self, x: &ArrayView1<F>, noise: F) -> Result<()> {
        if self.gps.is_empty() {
            return Err(GpError::InvalidValue(
                "blacklist sample on a surrogate of unknown dimensions".to_string(),
            ));
        }
        let first_err: Mutex<Option<GpError>> = Mutex::new(None);
        par::par_for_each_mut(&mut self.gps, |_, gp| {
            if let Err(err) = gp.add_blacklist_sample(x, noise) {
                first_err.lock().unwrap().get_or_insert(err);
            }
        });
        match first_err.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rebuild every output GP from the owned data.
    ///
    /// With `update_mean` the shared mean is re-evaluated and the residual
    /// targets rebuilt (a full fit); otherwise each GP refactorizes its
    /// current state, rebuilding its Gram matrix when `recompute_kernel`
    /// is set.
    pub fn recompute(&mut self, update_mean: bool, recompute_kernel: bool) -> Result<()> {
        if self.gps.is_empty() || self.nb_samples() == 0 {
            return Ok(());
        }
        if update_mean {
            let xt = self.gps[0].samples().to_owned();
            let yt = self.observations.to_owned();
            let noise = self.gps[0].noise().to_owned();
            let xt_bl = self.gps[0].blacklist_samples().to_owned();
            let noise_bl = self.gps[0].blacklist_noise().to_owned();
            self.compute_with_blacklist(&xt, &yt, &noise, &xt_bl, &noise_bl)
        } else {
            let first_err: Mutex<Option<GpError>> = Mutex::new(None);
            par::par_for_each_mut(&mut self.gps, |_, gp| {
                if let Err(err) = gp.recompute(recompute_kernel) {
                    first_err.lock().unwrap().get_or_insert(err);
                }
            });
            match first_err.into_inner().unwrap() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    /// Optimize the kernel hyperparameters of every output GP.
    pub fn optimize_hyperparams(&mut self) -> Result<()> {
        let first_err: Mutex<Option<GpError>> = Mutex::new(None);
        par::par_for_each_mut(&mut self.gps, |_, gp| {
            if let Err(err) = gp.optimize_hyperparams() {
                first_err.lock().unwrap().get_or_insert(err);
            }
        });
        match first_err.into_inner().unwrap() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Forget all data and return to the unshaped state.
    pub fn reset(&mut self) {
        for gp in &mut self.gps {
            gp.reset();
        }
        self.observations = Array2::zeros((0, self.gps.len()));
    }

    /// Training samples seen so far.
    pub fn samples(&self) -> &Array2<F> {
        self.gps
            .first()
            .map(|gp| gp.samples())
            .expect("surrogate dimensions not discovered yet")
    }

    /// Raw vector observations seen so far.
    pub fn observations(&self) -> &Array2<F> {
        &self.observations
    }

    /// The shared mean model.
    pub fn mean_model(&self) -> &Mean {
        &self.mean
    }

    /// The per-output scalar GPs.
    pub fn gp_models(&self) -> &[GaussianProcess<F, Corr, NullMean, H>] {
        &self.gps
    }

    fn residuals(
        &self,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        yt: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let ctx = MeanContext::new(self.observations.view());
        let mut residuals = yt.to_owned();
        for (j, mut row) in residuals.rows_mut().into_iter().enumerate() {
            let mean_vector = self.mean.value(&xt.row(j), &ctx);
            row.zip_mut_with(&mean_vector, |r, m| *r = *r - *m);
        }
        residuals
    }
}

impl<F: Float, Corr, Mean, H> SurrogateModel<F> for MultiGp<F, Corr, Mean, H>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    fn dim_in(&self) -> usize {
        self.dim_in.expect("surrogate dimensions not discovered yet")
    }

    fn dim_out(&self) -> usize {
        self.gps.len()
    }

    fn nb_samples(&self) -> usize {
        self.gps.first().map(|gp| gp.nb_samples()).unwrap_or(0)
    }

    fn query(&self, x: &ArrayView1<F>) -> (Array1<F>, Array1<F>) {
        let ctx = if self.observations.nrows() > 0 {
            MeanContext::new(self.observations.view())
        } else {
            MeanContext::empty()
        };
        let mean_vector = self.mean.value(x, &ctx);

        let posteriors = par::par_map(self.gps.len(), |i| self.gps[i].query(x));
        let mut mu = Array1::zeros(self.gps.len());
        let mut sigma2 = Array1::zeros(self.gps.len());
        for (i, (m, s)) in posteriors.into_iter().enumerate() {
            mu[i] = m + mean_vector[i];
            sigma2[i] = s;
        }
        (mu, sigma2)
    }
}

impl<F: Float, Corr, Mean, H> fmt::Display for MultiGp<F, Corr, Mean, H>
where
    Corr: CovarianceModel<F>,
    Mean: MeanModel<F>,
    H: HyperParamsOptimizer,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MultiGp(kernel={}, mean={}, dim_out={}, n={})",
            self.corr,
            self.mean,
            self.gps.len(),
            self.nb_samples(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameters::NoOpt;
    use crate::kernels::Matern52;
    use crate::mean_models::ObservationMean;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2, array};

    type TestMulti = MultiGp<f64, Matern52<f64>, NullMean, NoOpt>;

    #[test]
    fn test_two_output_interpolation() {
        let mut gp = TestMulti::new(Matern52::new(1., 0.25), NullMean::new(2));
        let xt = arr2(&[[1.], [2.], [3.]]);
        let yt = arr2(&[[5., 5.], [10., 10.], [5., 5.]]);
        gp.compute(&xt, &yt, &Array1::zeros(3)).expect("fit");

        let (mu, sigma2) = gp.query(&array![1.].view());
        assert_eq!(mu.len(), 2);
        assert!((mu[0] - 5.).abs() < 1.);
        assert!((mu[1] - 5.).abs() < 1.);
        assert!(sigma2.iter().all(|&s| s < 1e-5));
    }

    #[test]
    fn test_dimension_discovery() {
        let mut gp = TestMulti::new(Matern52::new(1., 0.25), NullMean::new(1));
        let xt = arr2(&[[0.1, 0.2], [0.8, 0.9]]);
        let yt = arr2(&[[1., 2., 3.], [4., 5., 6.]]);
        gp.compute(&xt, &yt, &Array1::zeros(2)).expect("fit");

        assert_eq!(gp.dim_in(), 2);
        assert_eq!(gp.dim_out(), 3);
        assert_eq!(gp.gp_models().len(), 3);
        assert_eq!(gp.nb_samples(), 2);
    }

    #[test]
    fn test_add_sample_matches_compute() {
        let xt = arr2(&[[0.1], [0.5], [0.9]]);
        let yt = arr2(&[[1., -1.], [2., -2.], [1., -1.]]);

        let mut incremental = TestMulti::new(Matern52::new(1., 0.25), NullMean::new(2));
        incremental
            .compute(&xt, &yt, &Array1::from_elem(3, 1e-6))
            .unwrap();
        incremental
            .add_sample(&array![0.3].view(), &arr1(&[1.5, -1.5]).view(), 1e-6)
            .expect("incremental update");

        let mut full = TestMulti::new(Matern52::new(1., 0.25), NullMean::new(2));
        let xt_ext = arr2(&[[0.1], [0.5], [0.9], [0.3]]);
        let yt_ext = arr2(&[[1., -1.], [2., -2.], [1., -1.], [1.5, -1.5]]);
        full.compute(&xt_ext, &yt_ext, &Array1::from_elem(4, 1e-6))
            .unwrap();

        for x in [0.2, 0.4, 0.6, 0.8] {
            let (mu_inc, s_inc) = incremental.query(&array![x].view());
            let (mu_full, s_full) = full.query(&array![x].view());
            assert_abs_diff_eq!(mu_inc, mu_full, epsilon = 1e-5);
            assert_abs_diff_eq!(s_inc, s_full, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_shared_observation_mean() {
        let mut gp = MultiGp::<f64, Matern52<f64>, ObservationMean, NoOpt>::new(
            Matern52::new(1., 0.25),
            ObservationMean::new(1),
        );
        let xt = arr2(&[[0.1], [0.5], [0.9]]);
        let yt = arr2(&[[4.], [6.], [8.]]);
        gp.compute(&xt, &yt, &Array1::zeros(3)).expect("fit");

        // the shared mean absorbs the offset, the GP the residual shape
        let (mu, _) = gp.query(&array![0.5].view());
        assert_abs_diff_eq!(mu[0], 6., epsilon = 1e-4);

        // far from data the posterior falls back to the observation average
        let (mu, _) = gp.query(&array![100.].view());
        assert_abs_diff_eq!(mu[0], 6., epsilon = 1e-6);
    }

    #[test]
    fn test_prior_query_with_dims() {
        let gp = TestMulti::with_dims(2, 2, Matern52::new(1.5, 0.25), NullMean::new(2));
        let (mu, sigma2) = gp.query(&array![0.5, 0.5].view());
        assert_eq!(mu, array![0., 0.]);
        assert_abs_diff_eq!(sigma2, array![1.5, 1.5], epsilon = 1e-15);
    }
}
