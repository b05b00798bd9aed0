use crate::acqui::{AcquiFunction, ExpectedImprovement, ProbabilityOfImprovement, Ucb};
use crate::config::{AcquiStrategy, BoConfig};
use crate::errors::{BoError, Result};
use crate::init::{InitStrategy, RandomSampling};
use crate::observer::{NoObserver, Observer};
use crate::stop::{MaxIterations, StopCriterion};
use crate::types::{Aggregator, ObjectiveFunction, OptimResult, RunState};

use log::{debug, warn};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use opale_gp::{
    ConstantMean, CovarianceModel, GpError, HyperParamsOptimizer, MeanModel, MultiGp,
    RpropRestarts, SquaredExpARD, SurrogateModel,
};
use opale_opt::tools::rng;
use opale_opt::{no_grad, Cmaes, InnerOptimizer};
use std::time::Instant;

/// The Bayesian optimization loop: fit a surrogate on what has been seen,
/// maximize an acquisition function over the unit box to pick the next
/// input, evaluate the objective there, extend the surrogate
/// incrementally, re-optimize its hyperparameters periodically, and stop
/// when the configured criterion fires.
///
/// The optimizer owns the surrogate, the evaluation history (samples,
/// observations, blacklisted inputs) and the iteration counters. Policies
/// are composed at construction time: kernel and mean through generics,
/// the acquisition through [`BoConfig`], initialization / stop / observer
/// hooks through boxed traits.
///
/// Blacklisted evaluations (objective returning `None`) are routed to the
/// surrogate's blacklist store with the configured noise: they raise the
/// posterior uncertainty around forbidden inputs without anchoring the
/// mean. A failed rank-one update falls back to a full refit; if even
/// that fails the run ends and the best result accumulated so far is
/// returned.
pub struct BOptimizer<C = SquaredExpARD<f64>, M = ConstantMean<f64>, O = Cmaes, H = RpropRestarts>
where
    C: CovarianceModel<f64>,
    M: MeanModel<f64>,
    O: InnerOptimizer,
    H: HyperParamsOptimizer,
{
    config: BoConfig,
    corr: C,
    mean: M,
    hp: H,
    model: MultiGp<f64, C, M, H>,
    acqui_opt: O,
    init: Box<dyn InitStrategy>,
    stop: Box<dyn StopCriterion>,
    observer: Box<dyn Observer>,
    samples: Array2<f64>,
    observations: Array2<f64>,
    bl_samples: Array2<f64>,
    current_iteration: usize,
    total_iterations: usize,
}

impl BOptimizer {
    /// An optimizer with the stock policies: squared exponential ARD
    /// kernel, zero constant mean, CMA-ES acquisition maximizer, RPROP
    /// hyperparameter fitting, uniform random initialization and an
    /// iteration-budget stop.
    pub fn new(config: BoConfig) -> Self {
        let corr = SquaredExpARD::new(1.);
        let mean = ConstantMean::default();
        let hp = RpropRestarts::default();
        let init = Box::new(RandomSampling::new(config.n_init));
        let stop = Box::new(MaxIterations(config.max_iters));
        BOptimizer {
            model: MultiGp::new(corr.clone(), mean.clone()),
            corr,
            mean,
            hp,
            acqui_opt: Cmaes::default(),
            init,
            stop,
            observer: Box::new(NoObserver),
            samples: Array2::zeros((0, 0)),
            observations: Array2::zeros((0, 0)),
            bl_samples: Array2::zeros((0, 0)),
            current_iteration: 0,
            total_iterations: 0,
            config,
        }
    }
}

impl<C, M, O, H> BOptimizer<C, M, O, H>
where
    C: CovarianceModel<f64>,
    M: MeanModel<f64>,
    O: InnerOptimizer,
    H: HyperParamsOptimizer,
{
    /// Replace the covariance kernel.
    pub fn kernel<C2: CovarianceModel<f64>>(self, corr: C2) -> BOptimizer<C2, M, O, H> {
        let model = MultiGp::new(corr.clone(), self.mean.clone()).with_hp_optimizer(self.hp.clone());
        BOptimizer {
            config: self.config,
            corr,
            mean: self.mean,
            hp: self.hp,
            model,
            acqui_opt: self.acqui_opt,
            init: self.init,
            stop: self.stop,
            observer: self.observer,
            samples: self.samples,
            observations: self.observations,
            bl_samples: self.bl_samples,
            current_iteration: self.current_iteration,
            total_iterations: self.total_iterations,
        }
    }

    /// Replace the shared mean model.
    pub fn mean<M2: MeanModel<f64>>(self, mean: M2) -> BOptimizer<C, M2, O, H> {
        let model = MultiGp::new(self.corr.clone(), mean.clone()).with_hp_optimizer(self.hp.clone());
        BOptimizer {
            config: self.config,
            corr: self.corr,
            mean,
            hp: self.hp,
            model,
            acqui_opt: self.acqui_opt,
            init: self.init,
            stop: self.stop,
            observer: self.observer,
            samples: self.samples,
            observations: self.observations,
            bl_samples: self.bl_samples,
            current_iteration: self.current_iteration,
            total_iterations: self.total_iterations,
        }
    }

    /// Replace the acquisition maximizer.
    pub fn acqui_optimizer<O2: InnerOptimizer>(self, acqui_opt: O2) -> BOptimizer<C, M, O2, H> {
        BOptimizer {
            config: self.config,
            corr: self.corr,
            mean: self.mean,
            hp: self.hp,
            model: self.model,
            acqui_opt,
            init: self.init,
            stop: self.stop,
            observer: self.observer,
            samples: self.samples,
            observations: self.observations,
            bl_samples: self.bl_samples,
            current_iteration: self.current_iteration,
            total_iterations: self.total_iterations,
        }
    }

    /// Replace the hyperparameter optimizer.
    pub fn hp_optimizer<H2: HyperParamsOptimizer>(self, hp: H2) -> BOptimizer<C, M, O, H2> {
        let model = MultiGp::new(self.corr.clone(), self.mean.clone()).with_hp_optimizer(hp.clone());
        BOptimizer {
            config: self.config,
            corr: self.corr,
            mean: self.mean,
            hp,
            model,
            acqui_opt: self.acqui_opt,
            init: self.init,
            stop: self.stop,
            observer: self.observer,
            samples: self.samples,
            observations: self.observations,
            bl_samples: self.bl_samples,
            current_iteration: self.current_iteration,
            total_iterations: self.total_iterations,
        }
    }

    /// Replace the initialization strategy.
    pub fn init_strategy(mut self, init: impl InitStrategy + 'static) -> Self {
        self.init = Box::new(init);
        self
    }

    /// Replace the stop criterion.
    pub fn stop_criterion(mut self, stop: impl StopCriterion + 'static) -> Self {
        self.stop = Box::new(stop);
        self
    }

    /// Replace the per-iteration observer.
    pub fn observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Run the optimization until the stop criterion fires and return the
    /// best result accumulated.
    ///
    /// With `reset` the history and the current-run counter are cleared
    /// and the initialization strategy is evaluated first; otherwise the
    /// run resumes on the existing history (the hyperparameter cadence
    /// restarts with the current-run counter, while `total_iterations`
    /// keeps the lifetime count).
    pub fn optimize(
        &mut self,
        objective: &impl ObjectiveFunction,
        agg: &impl Aggregator,
        reset: bool,
    ) -> Result<OptimResult> {
        self.config.validate()?;
        let start = Instant::now();
        let dim_in = objective.dim_in();
        let dim_out = objective.dim_out();
        // the current-run counter (and with it the hyperparameter
        // cadence) restarts with every run; total_iterations is the
        // lifetime count
        self.current_iteration = 0;

        if reset {
            self.samples = Array2::zeros((0, dim_in));
            self.observations = Array2::zeros((0, dim_out));
            self.bl_samples = Array2::zeros((0, dim_in));

            let init_points = self.init.points(dim_in);
            debug!("evaluating {} initial samples", init_points.nrows());
            for x in init_points.rows() {
                match objective.eval(&x) {
                    Some(y) => {
                        if y.len() != dim_out {
                            return Err(GpError::DimensionMismatch {
                                expected: dim_out,
                                actual: y.len(),
                            }
                            .into());
                        }
                        self.samples =
                            concatenate![Axis(0), self.samples.view(), x.insert_axis(Axis(0))];
                        self.observations = concatenate![
                            Axis(0),
                            self.observations.view(),
                            y.view().insert_axis(Axis(0))
                        ];
                    }
                    None => {
                        self.bl_samples =
                            concatenate![Axis(0), self.bl_samples.view(), x.insert_axis(Axis(0))];
                    }
                }
            }
        } else if self.samples.ncols() != dim_in {
            self.samples = Array2::zeros((0, dim_in));
            self.observations = Array2::zeros((0, dim_out));
            self.bl_samples = Array2::zeros((0, dim_in));
        }

        // the surrogate is rebuilt from the whole history at the start of
        // every run
        self.model = MultiGp::with_dims(dim_in, dim_out, self.corr.clone(), self.mean.clone())
            .with_hp_optimizer(self.hp.clone());
        if self.observations.nrows() > 0 {
            let noise = Array1::from_elem(self.samples.nrows(), self.config.noise);
            let bl_noise = Array1::from_elem(self.bl_samples.nrows(), self.config.noise);
            self.model.compute_with_blacklist(
                &self.samples,
                &self.observations,
                &noise,
                &self.bl_samples,
                &bl_noise,
            )?;
        }

        loop {
            let state = self.run_state(agg, &start);
            if self.stop.is_met(&state) {
                debug!(
                    "stop criterion met at iteration {}",
                    state.current_iteration
                );
                break;
            }

            let x_new = self.maximize_acquisition(agg);
            let blacklisted = match objective.eval(&x_new.view()) {
                Some(y) => {
                    if y.len() != dim_out {
                        return Err(GpError::DimensionMismatch {
                            expected: dim_out,
                            actual: y.len(),
                        }
                        .into());
                    }
                    self.samples = concatenate![
                        Axis(0),
                        self.samples.view(),
                        x_new.view().insert_axis(Axis(0))
                    ];
                    self.observations = concatenate![
                        Axis(0),
                        self.observations.view(),
                        y.view().insert_axis(Axis(0))
                    ];
                    let update = self.model.add_sample(&x_new.view(), &y.view(), self.config.noise);
                    if !self.recover(update)? {
                        break;
                    }
                    false
                }
                None => {
                    debug!("objective blacklisted {x_new}");
                    self.bl_samples = concatenate![
                        Axis(0),
                        self.bl_samples.view(),
                        x_new.view().insert_axis(Axis(0))
                    ];
                    let update = self
                        .model
                        .add_blacklist_sample(&x_new.view(), self.config.noise);
                    if !self.recover(update)? {
                        break;
                    }
                    true
                }
            };

            if self.config.hp_period > 0
                && self.current_iteration % (self.config.hp_period as usize) == 0
            {
                match self.model.optimize_hyperparams() {
                    Ok(()) => {}
                    Err(GpError::HyperparamOptimizationDiverged(msg)) => {
                        warn!("hyperparameter optimization diverged ({msg}), keeping previous values");
                    }
                    Err(GpError::NonPositiveDefinite { .. }) => {
                        warn!("hyperparameter refit rejected, keeping previous values");
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            let state = self.run_state(agg, &start);
            self.observer.on_iteration(&state, blacklisted);

            self.current_iteration += 1;
            self.total_iterations += 1;
        }

        let index = self.best_index(agg).ok_or(BoError::NoObservation)?;
        Ok(OptimResult {
            x_opt: self.samples.row(index).to_owned(),
            y_opt: self.observations.row(index).to_owned(),
            x_hist: self.samples.clone(),
            y_hist: self.observations.clone(),
            state: self.run_state(agg, &start),
        })
    }

    /// Best observation so far under the aggregator (first occurrence
    /// wins on ties).
    pub fn best_observation(&self, agg: &impl Aggregator) -> Option<Array1<f64>> {
        self.best_index(agg)
            .map(|index| self.observations.row(index).to_owned())
    }

    /// Sample of the best observation so far (first occurrence wins on
    /// ties).
    pub fn best_sample(&self, agg: &impl Aggregator) -> Option<Array1<f64>> {
        self.best_index(agg)
            .map(|index| self.samples.row(index).to_owned())
    }

    /// The surrogate model.
    pub fn model(&self) -> &MultiGp<f64, C, M, H> {
        &self.model
    }

    /// Samples evaluated so far, one row each.
    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    /// Observations recorded so far, parallel to `samples`.
    pub fn observations(&self) -> &Array2<f64> {
        &self.observations
    }

    /// Blacklisted inputs recorded so far.
    pub fn blacklist_samples(&self) -> &Array2<f64> {
        &self.bl_samples
    }

    /// Iterations across every run of this optimizer.
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    fn best_index(&self, agg: &impl Aggregator) -> Option<usize> {
        argmax_first(self.observations.rows().into_iter().map(|y| agg.apply(&y)))
    }

    fn best_reward(&self, agg: &impl Aggregator) -> Option<f64> {
        self.best_index(agg)
            .map(|index| agg.apply(&self.observations.row(index)))
    }

    fn run_state(&self, agg: &impl Aggregator, start: &Instant) -> RunState {
        RunState {
            current_iteration: self.current_iteration,
            total_iterations: self.total_iterations,
            nb_samples: self.samples.nrows(),
            nb_blacklisted: self.bl_samples.nrows(),
            best_reward: self.best_reward(agg),
            elapsed: start.elapsed(),
        }
    }

    fn maximize_acquisition(&self, agg: &impl Aggregator) -> Array1<f64> {
        let x0 = rng::random_unit_vector(self.model.dim_in());
        match self.config.acqui {
            AcquiStrategy::Ucb => {
                let acqui = Ucb::new(
                    &self.model,
                    agg,
                    self.config.ucb_alpha,
                    self.current_iteration,
                );
                self.maximize(&acqui, &x0)
            }
            AcquiStrategy::Ei => {
                let best = self.best_reward(agg).unwrap_or(0.);
                let acqui = ExpectedImprovement::new(&self.model, agg, best, self.config.ei_xi);
                self.maximize(&acqui, &x0)
            }
            AcquiStrategy::Poi => {
                let best = self.best_reward(agg).unwrap_or(0.);
                let acqui = ProbabilityOfImprovement::new(&self.model, agg, best, self.config.ei_xi);
                self.maximize(&acqui, &x0)
            }
        }
    }

    fn maximize(&self, acqui: &impl AcquiFunction, x0: &Array1<f64>) -> Array1<f64> {
        // the stock acquisitions carry no gradient
        let scorer = |x: &ArrayView1<f64>, _eval_grad: bool| no_grad(acqui.value(x));
        self.acqui_opt.optimize(&scorer, &x0.view(), true)
    }

    /// Local recovery after a surrogate update: a failed rank-one update
    /// falls back to a full refit; an unfactorizable Gram matrix ends the
    /// run gracefully (`Ok(false)`).
    fn recover(&mut self, update: std::result::Result<(), GpError>) -> Result<bool> {
        match update {
            Ok(()) => Ok(true),
            Err(GpError::IncrementalUpdateFailed) => {
                debug!("incremental update failed, recomputing the surrogate");
                match self.model.recompute(true, true) {
                    Ok(()) => Ok(true),
                    Err(GpError::NonPositiveDefinite { .. }) => {
                        warn!("surrogate no longer factorizable, returning best so far");
                        Ok(false)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(GpError::NonPositiveDefinite { .. }) => {
                warn!("surrogate no longer factorizable, returning best so far");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn argmax_first(rewards: impl Iterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, reward) in rewards.enumerate() {
        match best {
            // strict comparison: the first occurrence wins ties
            Some((_, value)) if reward <= value => {}
            _ => best = Some((index, reward)),
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcquiStrategy;
    use crate::stop::{CompositeStop, TargetValue};
    use crate::types::{FirstElem, Objective};
    use ndarray::array;
    use opale_gp::Matern52;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_argmax_first_tie_break() {
        assert_eq!(argmax_first([1., 3., 3., 2.].into_iter()), Some(1));
        assert_eq!(argmax_first([5.].into_iter()), Some(0));
        assert_eq!(argmax_first(std::iter::empty()), None);
    }

    #[test]
    fn test_bo_concave_1d() {
        rng::seed(42);
        let objective = Objective::new(1, 1, |x: &ArrayView1<f64>| {
            Some(array![-(x[0] - 0.3) * (x[0] - 0.3)])
        });

        let config = BoConfig::default().n_init(5).max_iters(20).hp_period(10);
        let mut optimizer = BOptimizer::new(config).hp_optimizer(RpropRestarts::new(4, 40));
        let res = optimizer
            .optimize(&objective, &FirstElem, true)
            .expect("optimization");

        assert_eq!(res.x_hist.nrows(), 25);
        assert!((res.x_opt[0] - 0.3).abs() < 0.15, "x_opt={}", res.x_opt);
        assert!(res.y_opt[0] > -0.0225, "y_opt={}", res.y_opt);
        assert_eq!(res.state.current_iteration, 20);
        assert_eq!(optimizer.total_iterations(), 20);
    }

    #[test]
    fn test_bo_branin_2d() {
        let _ = env_logger::builder().is_test(true).try_init();
        rng::seed(7);
        // Branin rescaled to the unit box, negated for maximization;
        // global minimum ~0.397887
        let branin = |x: &ArrayView1<f64>| {
            let x1 = 15. * x[0] - 5.;
            let x2 = 15. * x[1];
            let a = 1.;
            let b = 5.1 / (4. * std::f64::consts::PI * std::f64::consts::PI);
            let c = 5. / std::f64::consts::PI;
            let r = 6.;
            let s = 10.;
            let t = 1. / (8. * std::f64::consts::PI);
            let value = a * (x2 - b * x1 * x1 + c * x1 - r).powi(2)
                + s * (1. - t) * x1.cos()
                + s;
            Some(array![-value])
        };
        let objective = Objective::new(2, 1, branin);

        let config = BoConfig::default()
            .n_init(10)
            .max_iters(60)
            .hp_period(20)
            .acqui(AcquiStrategy::Ucb);
        let mut optimizer = BOptimizer::new(config)
            .hp_optimizer(RpropRestarts::new(4, 40))
            .acqui_optimizer(Cmaes::new(400));
        let res = optimizer
            .optimize(&objective, &FirstElem, true)
            .expect("optimization");

        assert_eq!(res.x_hist.nrows(), 70);
        assert!(
            res.y_opt[0] > -2.5,
            "best Branin value {} too far from optimum",
            -res.y_opt[0]
        );
    }

    #[test]
    fn test_bo_blacklist_routing() {
        rng::seed(3);
        // the left half of the domain is forbidden
        let objective = Objective::new(1, 1, |x: &ArrayView1<f64>| {
            if x[0] < 0.5 {
                None
            } else {
                Some(array![-(x[0] - 0.7) * (x[0] - 0.7)])
            }
        });

        let config = BoConfig::default().n_init(8).max_iters(15).hp_period(0);
        let mut optimizer = BOptimizer::new(config)
            .kernel(Matern52::new(1., 0.25))
            .acqui_optimizer(Cmaes::new(300));
        let res = optimizer
            .optimize(&objective, &FirstElem, true)
            .expect("optimization");

        assert!(res.x_opt[0] >= 0.5);
        assert!(optimizer.blacklist_samples().nrows() > 0);
        assert_eq!(
            optimizer.samples().nrows() + optimizer.blacklist_samples().nrows(),
            8 + 15
        );
    }

    #[test]
    fn test_bo_target_stop() {
        rng::seed(11);
        let objective = Objective::new(1, 1, |x: &ArrayView1<f64>| Some(array![x[0]]));

        let config = BoConfig::default().n_init(3).max_iters(200).hp_period(0);
        let mut optimizer = BOptimizer::new(config)
            .acqui_optimizer(Cmaes::new(300))
            .stop_criterion(CompositeStop(vec![
                Box::new(MaxIterations(200)),
                Box::new(TargetValue(0.9)),
            ]));
        let res = optimizer
            .optimize(&objective, &FirstElem, true)
            .expect("optimization");

        assert!(res.state.best_reward.unwrap() >= 0.9);
        assert!(res.state.current_iteration < 200);
    }

    #[test]
    fn test_bo_observer_called_each_iteration() {
        rng::seed(1);
        struct Counting(Arc<AtomicUsize>);
        impl Observer for Counting {
            fn on_iteration(&mut self, _state: &RunState, _blacklisted: bool) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let objective =
            Objective::new(1, 1, |x: &ArrayView1<f64>| Some(array![-x[0] * x[0]]));
        let config = BoConfig::default().n_init(2).max_iters(5).hp_period(0);
        let mut optimizer = BOptimizer::new(config)
            .observer(Counting(calls.clone()))
            .acqui_optimizer(Cmaes::new(200));
        optimizer
            .optimize(&objective, &FirstElem, true)
            .expect("optimization");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_bo_resume_keeps_totals() {
        rng::seed(9);
        let objective =
            Objective::new(1, 1, |x: &ArrayView1<f64>| Some(array![-x[0] * x[0]]));
        let config = BoConfig::default().n_init(3).max_iters(4).hp_period(0);
        let mut optimizer = BOptimizer::new(config).acqui_optimizer(Cmaes::new(200));

        optimizer.optimize(&objective, &FirstElem, true).unwrap();
        assert_eq!(optimizer.total_iterations(), 4);
        assert_eq!(optimizer.samples().nrows(), 7);

        // a resumed run keeps the history and the lifetime counter
        let res = optimizer.optimize(&objective, &FirstElem, false).unwrap();
        assert_eq!(optimizer.total_iterations(), 8);
        assert_eq!(optimizer.samples().nrows(), 11);
        assert_eq!(res.state.current_iteration, 4);
    }
}
