//! Run state: the record threaded through every stage and every decision.
//!
//! One `RunState` exists per run and is owned by that run's loop. Stages
//! mutate it; the policy engine reads it to decide what happens next. The
//! history is append-only and is the only thing the guards inspect.

use crate::action::Action;
use crate::episode::EpisodeId;
use crate::tool::ToolDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Sentinel errors meaning "this step has not happened yet".
pub const STATE_INDICATORS: [&str; 4] = [
    "no_sql_to_execute",
    "no_data",
    "no_plan",
    "no_insight_available",
];

/// Normalize a plan payload to an ordered list of steps.
///
/// Arrays keep their order (non-string items are rendered as JSON); objects
/// contribute their values in key order; a bare string is a single step.
pub fn plan_from_value(value: &serde_json::Value) -> Vec<String> {
    use serde_json::Value;

    fn step(v: &Value) -> Option<String> {
        match v {
            Value::Null => None,
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            other => Some(other.to_string()),
        }
    }

    match value {
        Value::Array(items) => items.iter().filter_map(step).collect(),
        Value::Object(map) => map.values().filter_map(step).collect(),
        other => step(other).into_iter().collect(),
    }
}

/// The run's current error.
///
/// State indicators drive the priority rules only; they never count as a
/// failure and never trigger reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RunError {
    Indicator(String),
    Failure(String),
}

impl RunError {
    /// Classify a raw error string against the known indicators.
    #[cfg(test)]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if STATE_INDICATORS.contains(&message.as_str()) {
            RunError::Indicator(message)
        } else {
            RunError::Failure(message)
        }
    }

    pub fn indicator(message: impl Into<String>) -> Self {
        RunError::Indicator(message.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        RunError::Failure(message.into())
    }

    pub fn is_real(&self) -> bool {
        matches!(self, RunError::Failure(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RunError::Indicator(m) | RunError::Failure(m) => m,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// How a recorded decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// The oracle's first line was a valid action token
    Oracle,
    /// A token was found somewhere in the oracle's text
    Extracted,
    /// The deterministic fallback tree chose
    Fallback,
}

/// How much learning context fed a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUsed {
    pub similar_patterns: usize,
    pub relevant_insights: usize,
}

/// Records written by the policy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    DecideNextAction {
        decision: Action,
        reasoning: String,
        step: u32,
        context_used: ContextUsed,
        source: DecisionSource,
    },
    CircuitBreaker {
        reason: String,
        step: u32,
    },
    LoopBreaker {
        repeated_action: Action,
        forced_action: Action,
        step: u32,
    },
    ErrorFallback {
        error: String,
        fallback_action: Action,
        step: u32,
    },
}

impl OrchestratorEvent {
    /// The action this event committed the run to, if it is a decision.
    ///
    /// Circuit-breaker events end the run and are not counted.
    pub fn decided_action(&self) -> Option<Action> {
        match self {
            OrchestratorEvent::DecideNextAction { decision, .. } => Some(*decision),
            OrchestratorEvent::LoopBreaker { forced_action, .. } => Some(*forced_action),
            OrchestratorEvent::ErrorFallback {
                fallback_action, ..
            } => Some(*fallback_action),
            OrchestratorEvent::CircuitBreaker { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrchestratorEvent::DecideNextAction { .. } => "decide_next_action",
            OrchestratorEvent::CircuitBreaker { .. } => "circuit_breaker",
            OrchestratorEvent::LoopBreaker { .. } => "loop_breaker",
            OrchestratorEvent::ErrorFallback { .. } => "error_fallback",
        }
    }
}

/// One history record, tagged by its producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "agent", rename_all = "snake_case")]
pub enum HistoryEntry {
    ToolInspector {
        content: String,
        tools_count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Planner {
        content: String,
        plan: Vec<String>,
        sql: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
    },
    Executor {
        sql: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Reflector {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revised_sql: Option<String>,
        reason: String,
    },
    /// The summarizer's JSON payload, kept as produced.
    Summarizer { payload: serde_json::Value },
    Render {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pdf_path: Option<String>,
        content: String,
    },
    Orchestrator(OrchestratorEvent),
}

impl HistoryEntry {
    /// Producer tag, as serialized.
    pub fn agent(&self) -> &'static str {
        match self {
            HistoryEntry::ToolInspector { .. } => "tool_inspector",
            HistoryEntry::Planner { .. } => "planner",
            HistoryEntry::Executor { .. } => "executor",
            HistoryEntry::Reflector { .. } => "reflector",
            HistoryEntry::Summarizer { .. } => "summarizer",
            HistoryEntry::Render { .. } => "render",
            HistoryEntry::Orchestrator(_) => "orchestrator",
        }
    }

    /// Short `agent:action` label for recent-activity summaries.
    pub fn label(&self) -> String {
        match self {
            HistoryEntry::Orchestrator(event) => match event.decided_action() {
                Some(action) => format!("orchestrator:{action}"),
                None => format!("orchestrator:{}", event.label()),
            },
            other => other.agent().to_string(),
        }
    }

    /// Policy-engine decision carried by this record, if any.
    pub fn decision(&self) -> Option<Action> {
        match self {
            HistoryEntry::Orchestrator(event) => event.decided_action(),
            _ => None,
        }
    }

    /// Non-empty insight text of a summarizer record.
    ///
    /// Accepts a flat `{insight}` payload, a nested `{response: {insight}}`
    /// one, and a list whose first item has either shape.
    pub fn insight(&self) -> Option<&str> {
        let HistoryEntry::Summarizer { payload } = self else {
            return None;
        };
        let payload = match payload {
            serde_json::Value::Array(items) => items.first()?,
            other => other,
        };
        let body = payload.get("response").unwrap_or(payload);
        body.get("insight")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Path of a produced report, if this is a successful render record.
    pub fn report_path(&self) -> Option<&str> {
        match self {
            HistoryEntry::Render {
                pdf_path: Some(path),
                ..
            } if !path.trim().is_empty() => Some(path),
            _ => None,
        }
    }
}

/// The mutable record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    question: String,
    pub plan: Vec<String>,
    pub sql: Option<String>,
    pub rows: Option<Vec<Row>>,
    pub error: Option<RunError>,
    history: Vec<HistoryEntry>,
    pub available_tools: Option<Vec<ToolDescriptor>>,
    episode_id: Option<EpisodeId>,
    step: u32,
    pub max_steps: u32,
    pub next_action: Option<Action>,
}

impl RunState {
    pub fn new(question: impl Into<String>, max_steps: u32) -> Self {
        Self {
            question: question.into(),
            plan: Vec::new(),
            sql: None,
            rows: None,
            error: None,
            history: Vec::new(),
            available_tools: None,
            episode_id: None,
            step: 0,
            max_steps,
            next_action: None,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Append a record. History is never reordered or truncated.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Advance the iteration counter and return the new value.
    pub fn advance_step(&mut self) -> u32 {
        self.step += 1;
        self.step
    }

    pub fn budget_exhausted(&self) -> bool {
        self.step > self.max_steps
    }

    pub fn episode_id(&self) -> Option<EpisodeId> {
        self.episode_id
    }

    /// Assign the run's episode. Only the first assignment sticks; returns
    /// whether this call took effect.
    pub fn assign_episode(&mut self, id: EpisodeId) -> bool {
        match self.episode_id {
            Some(existing) => {
                if existing != id {
                    tracing::warn!(
                        existing = %existing,
                        ignored = %id,
                        "Episode already assigned for this run"
                    );
                }
                false
            }
            None => {
                self.episode_id = Some(id);
                true
            }
        }
    }

    /// Store successful query results and clear any error.
    pub fn set_rows(&mut self, rows: Vec<Row>) {
        self.rows = Some(rows);
        self.error = None;
    }

    pub fn set_error(&mut self, error: RunError) {
        self.error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Whether a tool-inspection record exists.
    pub fn tools_inspected(&self) -> bool {
        self.history
            .iter()
            .any(|e| matches!(e, HistoryEntry::ToolInspector { .. }))
    }

    pub fn has_tools(&self) -> bool {
        self.available_tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    pub fn has_plan(&self) -> bool {
        !self.plan.is_empty()
    }

    pub fn has_sql(&self) -> bool {
        self.sql.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_rows(&self) -> bool {
        self.rows.as_ref().is_some_and(|r| !r.is_empty())
    }

    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }

    /// The latest non-empty summarizer insight.
    pub fn insight(&self) -> Option<&str> {
        self.history.iter().rev().find_map(HistoryEntry::insight)
    }

    pub fn has_insight(&self) -> bool {
        self.insight().is_some()
    }

    /// Whether the question asks for a PDF report.
    pub fn report_requested(&self) -> bool {
        self.question.to_lowercase().contains("pdf")
    }

    pub fn report_path(&self) -> Option<&str> {
        self.history.iter().rev().find_map(HistoryEntry::report_path)
    }

    pub fn report_generated(&self) -> bool {
        self.report_path().is_some()
    }

    /// The current error, if it is a real failure.
    pub fn real_error(&self) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|e| e.is_real())
            .map(RunError::message)
    }

    pub fn reflection_attempts(&self) -> usize {
        self.history
            .iter()
            .filter(|e| matches!(e, HistoryEntry::Reflector { .. }))
            .count()
    }

    /// Decisions carried by the last `window` history records, oldest first.
    pub fn recent_decisions(&self, window: usize) -> Vec<Action> {
        let start = self.history.len().saturating_sub(window);
        self.history[start..]
            .iter()
            .filter_map(HistoryEntry::decision)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decision(action: Action, step: u32) -> HistoryEntry {
        HistoryEntry::Orchestrator(OrchestratorEvent::DecideNextAction {
            decision: action,
            reasoning: "test".into(),
            step,
            context_used: ContextUsed::default(),
            source: DecisionSource::Oracle,
        })
    }

    #[test]
    fn plan_normalization() {
        assert_eq!(
            plan_from_value(&json!(["join film_actor", "", "order by count"])),
            vec!["join film_actor".to_string(), "order by count".to_string()]
        );
        assert_eq!(
            plan_from_value(&json!({"step1": "find actors", "step2": "count films"})),
            vec!["find actors".to_string(), "count films".to_string()]
        );
        assert_eq!(plan_from_value(&json!("single step")), vec!["single step".to_string()]);
        assert!(plan_from_value(&json!(null)).is_empty());
    }

    #[test]
    fn new_state_is_empty() {
        let state = RunState::new("List top actors", 6);
        assert_eq!(state.question(), "List top actors");
        assert_eq!(state.step(), 0);
        assert!(!state.tools_inspected());
        assert!(!state.has_plan());
        assert!(!state.has_sql());
        assert!(!state.has_rows());
        assert!(state.history().is_empty());
        assert!(state.episode_id().is_none());
    }

    #[test]
    fn indicators_are_not_real_errors() {
        assert!(!RunError::from_message("no_sql_to_execute").is_real());
        assert!(!RunError::from_message("no_insight_available").is_real());
        assert!(RunError::from_message("relation \"actors\" does not exist").is_real());

        let mut state = RunState::new("q", 5);
        state.set_error(RunError::from_message("no_plan"));
        assert!(state.real_error().is_none());
        state.set_error(RunError::failure("syntax error"));
        assert_eq!(state.real_error(), Some("syntax error"));
    }

    #[test]
    fn step_strictly_increases() {
        let mut state = RunState::new("q", 2);
        assert_eq!(state.advance_step(), 1);
        assert_eq!(state.advance_step(), 2);
        assert!(!state.budget_exhausted());
        assert_eq!(state.advance_step(), 3);
        assert!(state.budget_exhausted());
    }

    #[test]
    fn episode_assigned_once() {
        let mut state = RunState::new("q", 5);
        assert!(state.assign_episode(EpisodeId(1)));
        assert!(!state.assign_episode(EpisodeId(2)));
        assert_eq!(state.episode_id(), Some(EpisodeId(1)));
    }

    #[test]
    fn set_rows_clears_error() {
        let mut state = RunState::new("q", 5);
        state.set_error(RunError::failure("timeout"));
        let mut row = Row::new();
        row.insert("actor_id".into(), json!(1));
        state.set_rows(vec![row]);
        assert!(state.has_rows());
        assert!(state.error.is_none());
    }

    #[test]
    fn insight_accepts_flat_nested_and_list_shapes() {
        for payload in [
            json!({"insight": "Top actor is GINA"}),
            json!({"response": {"insight": "Top actor is GINA"}}),
            json!([{"insight": "Top actor is GINA"}]),
        ] {
            let mut state = RunState::new("q", 5);
            state.record(HistoryEntry::Summarizer { payload });
            assert_eq!(state.insight(), Some("Top actor is GINA"));
        }

        let mut state = RunState::new("q", 5);
        state.record(HistoryEntry::Summarizer {
            payload: json!({"insight": "   "}),
        });
        assert!(!state.has_insight());
    }

    #[test]
    fn report_generated_requires_path() {
        let mut state = RunState::new("Give me a PDF of top actors", 5);
        assert!(state.report_requested());
        state.record(HistoryEntry::Render {
            pdf_path: None,
            content: "failed".into(),
        });
        assert!(!state.report_generated());
        state.record(HistoryEntry::Render {
            pdf_path: Some("/tmp/report.pdf".into()),
            content: "PDF generated successfully".into(),
        });
        assert_eq!(state.report_path(), Some("/tmp/report.pdf"));
    }

    #[test]
    fn recent_decisions_only_counts_orchestrator_records() {
        let mut state = RunState::new("q", 10);
        state.record(decision(Action::Plan, 1));
        state.record(HistoryEntry::Planner {
            content: "{}".into(),
            plan: vec![],
            sql: None,
            rationale: None,
        });
        state.record(decision(Action::Plan, 2));
        state.record(HistoryEntry::Orchestrator(OrchestratorEvent::ErrorFallback {
            error: "backend down".into(),
            fallback_action: Action::Plan,
            step: 3,
        }));
        state.record(HistoryEntry::Orchestrator(OrchestratorEvent::CircuitBreaker {
            reason: "max_steps_reached".into(),
            step: 4,
        }));
        assert_eq!(
            state.recent_decisions(5),
            vec![Action::Plan, Action::Plan, Action::Plan]
        );
        assert_eq!(state.recent_decisions(2), vec![Action::Plan]);
    }

    #[test]
    fn history_serializes_with_agent_tag() {
        let entry = decision(Action::Execute, 4);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["agent"], "orchestrator");
        assert_eq!(value["action"], "decide_next_action");
        assert_eq!(value["decision"], "EXECUTE");

        let back: HistoryEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
