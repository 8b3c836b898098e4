//! Guard layer: the circuit breaker and the loop detector.
//!
//! Both run before the oracle is consulted. The circuit breaker ends a run
//! whose iteration budget is spent; the loop detector breaks out of a run
//! that keeps choosing the same action by forcing the next logical step.

use lysai_config::OrchestratorConfig;
use lysai_core::{Action, HistoryEntry, OrchestratorEvent, RunState};
use tracing::warn;

/// Reason recorded when the budget runs out.
pub const MAX_STEPS_REACHED: &str = "max_steps_reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guards {
    /// History records the loop detector looks back over
    pub loop_window: usize,
    /// Identical trailing decisions that count as a loop
    pub loop_threshold: usize,
}

impl Default for Guards {
    fn default() -> Self {
        Self {
            loop_window: 5,
            loop_threshold: 3,
        }
    }
}

impl Guards {
    pub fn new(loop_window: usize, loop_threshold: usize) -> Self {
        Self {
            loop_window,
            loop_threshold: loop_threshold.max(1),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.loop_window, config.loop_threshold)
    }

    /// End the run once the step counter has passed the budget.
    ///
    /// Expects the step to have been advanced for this iteration already.
    pub fn circuit_breaker(&self, state: &mut RunState) -> Option<Action> {
        if !state.budget_exhausted() {
            return None;
        }

        warn!(
            step = state.step(),
            max_steps = state.max_steps,
            "Step budget exhausted, ending run"
        );
        state.record(HistoryEntry::Orchestrator(OrchestratorEvent::CircuitBreaker {
            reason: MAX_STEPS_REACHED.to_string(),
            step: state.step(),
        }));
        Some(Action::Done)
    }

    /// The action being repeated, if the trailing decisions form a loop.
    pub fn detect_loop(&self, state: &RunState) -> Option<Action> {
        let recent = state.recent_decisions(self.loop_window);
        if recent.len() < self.loop_threshold {
            return None;
        }

        let tail = &recent[recent.len() - self.loop_threshold..];
        let first = tail[0];
        tail.iter().all(|a| *a == first).then_some(first)
    }

    /// Break a detected loop: record the event and return the forced action.
    pub fn loop_breaker(&self, state: &mut RunState) -> Option<Action> {
        let repeated = self.detect_loop(state)?;
        let forced = force_progression(state, repeated);

        warn!(
            repeated = %repeated,
            forced = %forced,
            step = state.step(),
            "Loop detected, forcing progression"
        );
        state.record(HistoryEntry::Orchestrator(OrchestratorEvent::LoopBreaker {
            repeated_action: repeated,
            forced_action: forced,
            step: state.step(),
        }));
        Some(forced)
    }
}

/// The next logical step after `repeated`, given what the run already has.
///
/// Never returns `repeated` itself.
pub fn force_progression(state: &RunState, repeated: Action) -> Action {
    match repeated {
        Action::InspectTools if state.has_tools() => Action::Plan,
        Action::Plan if state.has_plan() => Action::Execute,
        Action::Execute if state.has_rows() => Action::Summarize,
        Action::Execute => Action::Reflect,
        _ => Action::Done,
    }
}
