//! Deterministic fallback tree.
//!
//! A pure, total function of the run state. Used whenever the oracle is
//! unusable or its answer cannot be read as an action. First match wins.

use lysai_core::{Action, RunState};

/// Reflection attempts allowed before a real error stops triggering REFLECT.
pub const MAX_REFLECTIONS: usize = 2;

/// Decide the next action from state alone.
pub fn fallback_decision(state: &RunState) -> Action {
    fallback_decision_with(state, MAX_REFLECTIONS)
}

/// [`fallback_decision`] with a custom reflection bound.
pub fn fallback_decision_with(state: &RunState, max_reflections: usize) -> Action {
    let report_ready = state.report_requested() && state.has_rows() && state.has_insight();

    if !state.has_tools() && !state.tools_inspected() {
        Action::InspectTools
    } else if state.real_error().is_some() && state.reflection_attempts() < max_reflections {
        Action::Reflect
    } else if !state.has_plan() {
        Action::Plan
    } else if state.has_sql() && state.rows.is_none() {
        Action::Execute
    } else if report_ready && state.report_generated() {
        Action::Done
    } else if report_ready {
        Action::GeneratePdf
    } else if state.has_rows() && !state.has_insight() {
        Action::Summarize
    } else {
        Action::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use lysai_core::{HistoryEntry, RunError, ToolDescriptor};
    use serde_json::json;

    #[test]
    fn fresh_run_inspects_tools() {
        let state = RunState::new("List top actors", 6);
        assert_eq!(fallback_decision(&state), Action::InspectTools);
    }

    #[test]
    fn known_tools_skip_inspection() {
        let mut state = RunState::new("q", 6);
        state.available_tools = Some(vec![ToolDescriptor::new("execute_sql", "")]);
        assert_eq!(fallback_decision(&state), Action::Plan);
    }

    #[test]
    fn failed_inspection_is_not_repeated() {
        let mut state = inspected_state("q");
        state.available_tools = Some(vec![]);
        assert_eq!(fallback_decision(&state), Action::Plan);
    }

    #[test]
    fn real_error_reflects_twice_then_stops() {
        let mut state = planned_state("q", "SELECT * FROM actors");
        state.set_error(RunError::failure("relation \"actors\" does not exist"));
        assert_eq!(fallback_decision(&state), Action::Reflect);

        state.record(reflector_record());
        assert_eq!(fallback_decision(&state), Action::Reflect);

        state.record(reflector_record());
        // Bound reached: falls through to EXECUTE (sql present, no rows)
        assert_eq!(fallback_decision(&state), Action::Execute);
    }

    #[test]
    fn indicator_error_never_reflects() {
        let mut state = planned_state("q", "SELECT 1");
        state.set_error(RunError::indicator("no_sql_to_execute"));
        assert_eq!(fallback_decision(&state), Action::Execute);
    }

    #[test]
    fn rows_without_insight_summarize() {
        let mut state = planned_state("q", "SELECT 1");
        state.set_rows(vec![row(json!({"actor": "GINA"}))]);
        assert_eq!(fallback_decision(&state), Action::Summarize);
    }

    #[test]
    fn report_flow() {
        let mut state = planned_state("Top actors as a PDF", "SELECT 1");
        state.set_rows(vec![row(json!({"actor": "GINA"}))]);
        state.record(summary_record("GINA leads"));
        assert_eq!(fallback_decision(&state), Action::GeneratePdf);

        state.record(HistoryEntry::Render {
            pdf_path: Some("/tmp/r.pdf".into()),
            content: "PDF generated successfully".into(),
        });
        assert_eq!(fallback_decision(&state), Action::Done);
    }

    #[test]
    fn complete_without_report_is_done() {
        let mut state = planned_state("Top actors", "SELECT 1");
        state.set_rows(vec![row(json!({"actor": "GINA"}))]);
        state.record(summary_record("GINA leads"));
        assert_eq!(fallback_decision(&state), Action::Done);
    }

    #[test]
    fn empty_result_set_is_done() {
        let mut state = planned_state("q", "SELECT 1 WHERE 0");
        state.set_rows(vec![]);
        assert_eq!(fallback_decision(&state), Action::Done);
    }

    #[test]
    fn total_over_state_combinations() {
        // Every combination of the flags the tree reads yields one of the seven actions.
        for mask in 0u32..256 {
            let question = if mask & 1 != 0 { "as pdf" } else { "plain" };
            let mut state = RunState::new(question, 10);
            if mask & 2 != 0 {
                state.record(inspection_record(1));
            }
            if mask & 4 != 0 {
                state.available_tools = Some(vec![ToolDescriptor::new("execute_sql", "")]);
            }
            if mask & 8 != 0 {
                state.plan = vec!["step".into()];
            }
            if mask & 16 != 0 {
                state.sql = Some("SELECT 1".into());
            }
            if mask & 32 != 0 {
                state.rows = Some(vec![row(json!({"n": 1}))]);
            }
            if mask & 64 != 0 {
                state.record(summary_record("insight"));
            }
            if mask & 128 != 0 {
                state.error = Some(RunError::failure("boom"));
            }
            assert!(Action::ALL.contains(&fallback_decision(&state)));
        }
    }
}
