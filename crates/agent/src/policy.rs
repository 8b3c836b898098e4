//! Policy engine: picks the next action once per iteration.
//!
//! Order of precedence:
//! 1. circuit breaker (budget spent → DONE)
//! 2. loop breaker (forced progression)
//! 3. the oracle, reading the rendered state plus learning context
//! 4. the fallback tree, when the oracle fails or its answer is unreadable
//!
//! Unless a real error is pending, two steps are never skipped: a pending
//! query is executed and fresh results are summarized.

use crate::context;
use crate::decision::{ParsedDecision, parse_decision};
use crate::fallback::{MAX_REFLECTIONS, fallback_decision_with};
use crate::guards::Guards;
use lysai_config::OrchestratorConfig;
use lysai_core::{
    Action, ContextUsed, DecisionSource, HistoryEntry, Oracle, OracleRequest, OrchestratorEvent,
    RunError, RunState, SimilarityIndex,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PolicyEngine {
    oracle: Arc<dyn Oracle>,
    index: Arc<dyn SimilarityIndex>,
    guards: Guards,
    temperature: f32,
    max_reflections: usize,
}

impl PolicyEngine {
    pub fn new(oracle: Arc<dyn Oracle>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            oracle,
            index,
            guards: Guards::default(),
            temperature: 0.1,
            max_reflections: MAX_REFLECTIONS,
        }
    }

    pub fn from_config(
        oracle: Arc<dyn Oracle>,
        index: Arc<dyn SimilarityIndex>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            oracle,
            index,
            guards: Guards::from_config(config),
            temperature: config.decision_temperature,
            max_reflections: config.max_reflections,
        }
    }

    pub fn with_guards(mut self, guards: Guards) -> Self {
        self.guards = guards;
        self
    }

    /// Decide the next action, record it, and store it as `next_action`.
    pub async fn decide(&self, state: &mut RunState) -> Action {
        let action = self.decide_inner(state).await;
        state.next_action = Some(action);
        action
    }

    async fn decide_inner(&self, state: &mut RunState) -> Action {
        let step = state.advance_step();

        if let Some(action) = self.guards.circuit_breaker(state) {
            return action;
        }
        if let Some(action) = self.guards.loop_breaker(state) {
            return action;
        }

        let learning = self.index.get_learning_context(state.question()).await;
        let context_used = ContextUsed {
            similar_patterns: learning.similar_patterns.len(),
            relevant_insights: learning.relevant_insights.len(),
        };
        if !learning.is_empty() {
            debug!(
                patterns = context_used.similar_patterns,
                insights = context_used.relevant_insights,
                "Learning context attached to decision"
            );
        }

        let request = OracleRequest::new(context::decision_prompt(state, &learning))
            .with_temperature(self.temperature);

        let response = match self.oracle.generate(request).await {
            Ok(response) => response,
            Err(e) => return self.error_fallback(state, step, e.to_string()),
        };

        let (action, reasoning, source) = match parse_decision(&response.text) {
            ParsedDecision::Parsed { action, reasoning } => {
                (action, reasoning, DecisionSource::Oracle)
            }
            ParsedDecision::Extracted { action, reasoning } => {
                (action, reasoning, DecisionSource::Extracted)
            }
            ParsedDecision::Failed { first_line } => {
                let action = fallback_decision_with(state, self.max_reflections);
                warn!(step, response = %first_line, fallback = %action, "Unreadable decision");
                (
                    action,
                    format!("Invalid action '{first_line}', using fallback: {action}"),
                    DecisionSource::Fallback,
                )
            }
        };

        let (action, reasoning) = match mandatory_step(state) {
            Some(required) if required != action => {
                info!(step, chosen = %action, required = %required, "Overriding decision");
                (
                    required,
                    format!("{reasoning} (overridden: {required} is required before {action})"),
                )
            }
            _ => (action, reasoning),
        };

        info!(
            step,
            action = %action,
            source = ?source,
            backend = %response.backend,
            "Decided next action"
        );
        state.record(HistoryEntry::Orchestrator(
            OrchestratorEvent::DecideNextAction {
                decision: action,
                reasoning,
                step,
                context_used,
                source,
            },
        ));
        action
    }

    fn error_fallback(&self, state: &mut RunState, step: u32, error: String) -> Action {
        let fallback = fallback_decision_with(state, self.max_reflections);
        let action = mandatory_step(state).unwrap_or(fallback);
        warn!(step, error = %error, action = %action, "Oracle failed, using fallback decision");

        state.record(HistoryEntry::Orchestrator(OrchestratorEvent::ErrorFallback {
            error: error.clone(),
            fallback_action: action,
            step,
        }));
        // A real failure stays in place for the reflector
        if state.real_error().is_none() {
            state.set_error(RunError::indicator(format!("orchestrator_failed: {error}")));
        }
        action
    }
}

/// A step the run must take next regardless of what was chosen.
///
/// A real error suspends both rules so the failure can be reflected on.
pub fn mandatory_step(state: &RunState) -> Option<Action> {
    if state.real_error().is_some() {
        None
    } else if state.has_sql() && state.rows.is_none() {
        Some(Action::Execute)
    } else if state.has_rows() && !state.has_insight() {
        Some(Action::Summarize)
    } else {
        None
    }
}
