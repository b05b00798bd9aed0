use crate::types::RunState;

/// A predicate ending the optimization loop; it is polled once per outer
/// iteration with the current [`RunState`].
pub trait StopCriterion {
    /// Whether the run should stop now.
    fn is_met(&self, state: &RunState) -> bool;
}

/// Stops after a fixed number of iterations of the current run.
#[derive(Clone, Copy, Debug)]
pub struct MaxIterations(pub usize);

impl StopCriterion for MaxIterations {
    fn is_met(&self, state: &RunState) -> bool {
        state.current_iteration >= self.0
    }
}

/// Stops once the best scalarised reward reaches a target value.
#[derive(Clone, Copy, Debug)]
pub struct TargetValue(pub f64);

impl StopCriterion for TargetValue {
    fn is_met(&self, state: &RunState) -> bool {
        state.best_reward.is_some_and(|best| best >= self.0)
    }
}

/// Stops when any of the combined criteria fires.
pub struct CompositeStop(pub Vec<Box<dyn StopCriterion + Send + Sync>>);

impl StopCriterion for CompositeStop {
    fn is_met(&self, state: &RunState) -> bool {
        self.0.iter().any(|criterion| criterion.is_met(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state(iteration: usize, best: Option<f64>) -> RunState {
        RunState {
            current_iteration: iteration,
            total_iterations: iteration,
            nb_samples: iteration,
            nb_blacklisted: 0,
            best_reward: best,
            elapsed: Duration::from_secs(0),
        }
    }

    #[test]
    fn test_max_iterations() {
        let stop = MaxIterations(5);
        assert!(!stop.is_met(&state(4, None)));
        assert!(stop.is_met(&state(5, None)));
    }

    #[test]
    fn test_target_value() {
        let stop = TargetValue(1.0);
        assert!(!stop.is_met(&state(0, None)));
        assert!(!stop.is_met(&state(0, Some(0.5))));
        assert!(stop.is_met(&state(0, Some(1.0))));
    }

    #[test]
    fn test_composite_any_of() {
        let stop = CompositeStop(vec![Box::new(MaxIterations(10)), Box::new(TargetValue(1.0))]);
        assert!(!stop.is_met(&state(3, Some(0.2))));
        assert!(stop.is_met(&state(3, Some(2.0))));
        assert!(stop.is_met(&state(10, None)));
    }
}
