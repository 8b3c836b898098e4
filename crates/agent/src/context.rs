//! Decision context: the run state and learning context rendered for the
//! oracle.
//!
//! State lines use the shared labels in `lysai_core::labels`, so the
//! heuristic responder can read the same flags back.

use lysai_core::labels::{self, line, yes_no};
use lysai_core::{Action, LearningContext, RunState};

/// Recent history records summarized in the prompt.
const RECENT_ACTIONS: usize = 5;
/// Learning-context entries rendered of each kind.
const PATTERNS_SHOWN: usize = 3;
const INSIGHTS_SHOWN: usize = 2;
const ERROR_PREVIEW: usize = 100;

const PRIORITY_RULES: &str = "\
DECISION PRIORITY (follow strictly, first match wins):
1. If tools have not been inspected, choose INSPECT_TOOLS.
2. If there is no plan, choose PLAN.
3. If a plan exists but there is no SQL query, choose PLAN again.
4. If a SQL query exists and there are no results, you MUST choose EXECUTE (unless Has Error is Yes).
5. If results exist and there are no insights, you MUST choose SUMMARIZE.
6. If a PDF was requested, insights exist and no PDF was generated, choose GENERATE_PDF.
7. If a PDF was generated, or the question is fully answered, choose DONE.
8. Choose REFLECT only for a real error (query failure), never for missing steps.";

/// The `Label: value` lines describing where the run stands.
pub fn state_lines(state: &RunState) -> Vec<String> {
    let mut lines = vec![
        line(labels::QUESTION, state.question()),
        line(labels::PDF_REQUESTED, yes_no(state.report_requested())),
        line(labels::PDF_GENERATED, yes_no(state.report_generated())),
        line(
            labels::CURRENT_STEP,
            format!("{}/{}", state.step(), state.max_steps),
        ),
    ];

    let tools = match &state.available_tools {
        Some(tools) if !tools.is_empty() => format!("Yes ({} tools)", tools.len()),
        _ => "No".to_string(),
    };
    lines.push(line(labels::TOOLS_AVAILABLE, tools));
    lines.push(line(labels::TOOLS_INSPECTED, yes_no(state.tools_inspected())));

    let plan = if state.has_plan() {
        format!("Yes ({} steps)", state.plan.len())
    } else {
        "No".to_string()
    };
    lines.push(line(labels::PLAN_EXISTS, plan));
    lines.push(line(
        labels::SQL_QUERY,
        if state.has_sql() { "Present" } else { "None" },
    ));

    let results = match &state.rows {
        Some(rows) => format!("Yes ({} rows)", rows.len()),
        None => "No".to_string(),
    };
    lines.push(line(labels::HAS_RESULTS, results));
    if state.has_sql() && state.rows.is_none() {
        lines.push(format!(
            "{}: a SQL query is ready but has not been executed",
            labels::EXECUTE_NEEDED
        ));
    }
    lines.push(line(labels::HAS_INSIGHTS, yes_no(state.has_insight())));
    lines.push(line(labels::HAS_ERROR, yes_no(state.real_error().is_some())));

    let start = state.history().len().saturating_sub(RECENT_ACTIONS);
    let recent: Vec<String> = state.history()[start..]
        .iter()
        .map(|entry| entry.label())
        .collect();
    let recent = if recent.is_empty() {
        "None".to_string()
    } else {
        recent.join(" -> ")
    };
    lines.push(line(labels::RECENT_ACTIONS, recent));

    if let Some(error) = state.real_error() {
        lines.push(line(
            labels::CURRENT_ERROR,
            error.chars().take(ERROR_PREVIEW).collect::<String>(),
        ));
    }

    lines
}

/// Lines describing similar past runs, empty when there are none.
pub fn learning_lines(learning: &LearningContext) -> Vec<String> {
    let mut lines = Vec::new();

    if !learning.similar_patterns.is_empty() {
        lines.push("SIMILAR SUCCESSFUL QUERIES:".to_string());
        for (i, pattern) in learning
            .similar_patterns
            .iter()
            .take(PATTERNS_SHOWN)
            .enumerate()
        {
            lines.push(format!(
                "{}. \"{}\" (similarity {:.2})",
                i + 1,
                pattern.question,
                pattern.similarity
            ));
            if let Some(sql) = &pattern.sql {
                lines.push(format!("   SQL: {sql}"));
            }
        }
    }

    if !learning.relevant_insights.is_empty() {
        lines.push("RELEVANT PAST INSIGHTS:".to_string());
        for (i, hint) in learning
            .relevant_insights
            .iter()
            .take(INSIGHTS_SHOWN)
            .enumerate()
        {
            lines.push(format!(
                "{}. {} (from \"{}\")",
                i + 1,
                hint.insight,
                hint.original_question
            ));
        }
    }

    lines
}

/// The full next-action prompt.
pub fn decision_prompt(state: &RunState, learning: &LearningContext) -> String {
    let mut prompt = String::from(
        "You are the orchestrator of a data analysis pipeline. Choose the single next action.\n\n",
    );

    prompt.push_str("CURRENT STATE ANALYSIS:\n");
    for l in state_lines(state) {
        prompt.push_str("- ");
        prompt.push_str(&l);
        prompt.push('\n');
    }

    let learning = learning_lines(learning);
    if !learning.is_empty() {
        prompt.push('\n');
        prompt.push_str(&learning.join("\n"));
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(labels::ACTIONS_HEADING);
    prompt.push('\n');
    for action in Action::ALL {
        prompt.push_str(&format!("- {action}: {}\n", action.description()));
    }

    prompt.push('\n');
    prompt.push_str(PRIORITY_RULES);
    prompt.push_str(
        "\n\nRespond with the action token alone on the first line, \
         followed by a one-sentence reason on the next line.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use lysai_core::{EpisodeId, InsightHint, Outcome, PatternHint, RunError};
    use serde_json::json;

    #[test]
    fn fresh_state_flags() {
        let state = RunState::new("List top actors", 6);
        let text = state_lines(&state).join("\n");
        assert!(!labels::read_flag(&text, labels::TOOLS_INSPECTED));
        assert!(!labels::read_flag(&text, labels::PLAN_EXISTS));
        assert!(!labels::read_flag(&text, labels::SQL_QUERY));
        assert!(text.contains("Recent Actions: None"));
        assert!(text.contains("Current Step: 0/6"));
    }

    #[test]
    fn pending_query_is_called_out() {
        let state = planned_state("q", "SELECT 1");
        let text = state_lines(&state).join("\n");
        assert!(labels::read_flag(&text, labels::SQL_QUERY));
        assert!(labels::read_flag(&text, labels::PLAN_EXISTS));
        assert!(text.contains("Plan Exists: Yes (2 steps)"));
        assert!(text.contains(labels::EXECUTE_NEEDED));
    }

    #[test]
    fn only_real_errors_are_shown() {
        let mut state = planned_state("q", "SELECT 1");
        state.set_error(RunError::indicator("no_sql_to_execute"));
        let text = state_lines(&state).join("\n");
        assert!(!labels::read_flag(&text, labels::HAS_ERROR));
        assert!(!text.contains(labels::CURRENT_ERROR));

        state.set_error(RunError::failure("no such table: actors"));
        let text = state_lines(&state).join("\n");
        assert!(labels::read_flag(&text, labels::HAS_ERROR));
        assert!(text.contains("Current Error: no such table: actors"));
    }

    #[test]
    fn recent_actions_use_history_labels() {
        let mut state = inspected_state("q");
        state.record(decision_record(Action::Plan, 1));
        let text = state_lines(&state).join("\n");
        assert!(text.contains("Recent Actions: tool_inspector -> orchestrator:PLAN"));
    }

    #[test]
    fn learning_context_rendered() {
        let learning = LearningContext {
            similar_patterns: vec![PatternHint {
                episode_id: EpisodeId(1),
                question: "Top actors by films".into(),
                sql: Some("SELECT actor_id FROM film_actor".into()),
                similarity: 0.82,
                outcome: Some(Outcome::Success),
            }],
            relevant_insights: vec![InsightHint {
                episode_id: EpisodeId(1),
                insight: "GINA DEGENERES appears most".into(),
                original_question: "Top actors by films".into(),
                similarity: 0.4,
            }],
        };
        let lines = learning_lines(&learning).join("\n");
        assert!(lines.contains("SELECT actor_id FROM film_actor"));
        assert!(lines.contains("similarity 0.82"));
        assert!(lines.contains("GINA DEGENERES appears most"));
        assert!(learning_lines(&LearningContext::default()).is_empty());
    }

    #[test]
    fn prompt_lists_every_action() {
        let mut state = planned_state("q", "SELECT 1");
        state.set_rows(vec![row(json!({"n": 1}))]);
        let prompt = decision_prompt(&state, &LearningContext::default());
        assert!(prompt.contains(labels::ACTIONS_HEADING));
        for action in Action::ALL {
            assert!(prompt.contains(&format!("- {action}: ")));
        }
        assert!(labels::read_flag(&prompt, labels::HAS_RESULTS));
    }
}
