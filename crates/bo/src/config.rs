use crate::errors::{BoError, Result};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Acquisition function used to score candidate inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum AcquiStrategy {
    /// Upper Confidence Bound
    Ucb,
    /// Expected Improvement
    Ei,
    /// Probability of Improvement
    Poi,
}

/// Configuration of the [`BOptimizer`](crate::BOptimizer) loop.
///
/// Kernel- and mean-specific settings (variance, lengthscales, bounds)
/// live on the kernel and mean constructors handed to the optimizer
/// builder.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct BoConfig {
    /// Number of random samples evaluated before the loop starts
    pub(crate) n_init: usize,
    /// Observation noise variance attached to every evaluation
    pub(crate) noise: f64,
    /// Hyperparameter re-optimization cadence, measured against the
    /// current-run iteration counter; `<= 0` disables it
    pub(crate) hp_period: i32,
    /// Iteration budget of one run
    pub(crate) max_iters: usize,
    /// UCB exploration weight
    pub(crate) ucb_alpha: f64,
    /// Improvement jitter of EI and POI
    pub(crate) ei_xi: f64,
    /// Acquisition function
    pub(crate) acqui: AcquiStrategy,
}

impl Default for BoConfig {
    fn default() -> Self {
        BoConfig {
            n_init: 10,
            noise: 1e-6,
            hp_period: 5,
            max_iters: 100,
            ucb_alpha: 0.5,
            ei_xi: 0.0,
            acqui: AcquiStrategy::Ucb,
        }
    }
}

impl BoConfig {
    /// Set the number of initial random samples (`>= 1`).
    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Set the observation noise variance (`>= 0`).
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Set the hyperparameter re-optimization cadence; `<= 0` disables.
    pub fn hp_period(mut self, hp_period: i32) -> Self {
        self.hp_period = hp_period;
        self
    }

    /// Set the iteration budget of one run.
    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Set the UCB exploration weight (`>= 0`).
    pub fn ucb_alpha(mut self, ucb_alpha: f64) -> Self {
        self.ucb_alpha = ucb_alpha;
        self
    }

    /// Set the improvement jitter of EI and POI.
    pub fn ei_xi(mut self, ei_xi: f64) -> Self {
        self.ei_xi = ei_xi;
        self
    }

    /// Set the acquisition function.
    pub fn acqui(mut self, acqui: AcquiStrategy) -> Self {
        self.acqui = acqui;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_init < 1 {
            return Err(BoError::InvalidConfig(
                "n_init must be at least 1".to_string(),
            ));
        }
        if self.noise < 0. {
            return Err(BoError::InvalidConfig(
                "noise must be non-negative".to_string(),
            ));
        }
        if self.ucb_alpha < 0. {
            return Err(BoError::InvalidConfig(
                "ucb_alpha must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(BoConfig::default().validate().is_ok());
        assert!(BoConfig::default().n_init(0).validate().is_err());
        assert!(BoConfig::default().noise(-1.).validate().is_err());
        assert!(BoConfig::default().ucb_alpha(-0.1).validate().is_err());
    }
}
