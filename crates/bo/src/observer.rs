use crate::types::RunState;
use log::info;

/// A side-effect-only hook invoked after each surrogate update, before
/// the next iteration begins.
pub trait Observer {
    /// Called once per iteration with the updated run state.
    fn on_iteration(&mut self, state: &RunState, blacklisted: bool);
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoObserver;

impl Observer for NoObserver {
    fn on_iteration(&mut self, _state: &RunState, _blacklisted: bool) {}
}

/// Reports each iteration through the `log` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_iteration(&mut self, state: &RunState, blacklisted: bool) {
        info!(
            "iteration {} (total {}): samples={} blacklisted={} best={:?}{}",
            state.current_iteration,
            state.total_iterations,
            state.nb_samples,
            state.nb_blacklisted,
            state.best_reward,
            if blacklisted { " [blacklisted]" } else { "" },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Counting(usize);

    impl Observer for Counting {
        fn on_iteration(&mut self, _state: &RunState, _blacklisted: bool) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_observer_counts() {
        let state = RunState {
            current_iteration: 0,
            total_iterations: 0,
            nb_samples: 0,
            nb_blacklisted: 0,
            best_reward: None,
            elapsed: Duration::from_secs(0),
        };
        let mut observer = Counting(0);
        observer.on_iteration(&state, false);
        observer.on_iteration(&state, true);
        assert_eq!(observer.0, 2);
    }
}
