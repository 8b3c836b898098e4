//! Produces a plan and a candidate SQL query.

use super::{extract_object, string_field, tool_lines};
use async_trait::async_trait;
use lysai_core::labels::PLANNER_KEY;
use lysai_core::{
    Action, HistoryEntry, Oracle, OracleRequest, RunError, RunState, SimilarityIndex, Stage,
    plan_from_value,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TEMPERATURE: f32 = 0.3;

fn instruction() -> String {
    format!(
        "You are a SQL analyst planning how to answer a question against a relational database.\n\
         Return ONLY a JSON object with these keys:\n\
         - \"plan\": an array of short steps\n\
         - \"{PLANNER_KEY}\": one read-only SQL SELECT query that answers the question\n\
         - \"rationale\": one sentence explaining the approach\n\
         Do not wrap the JSON in Markdown."
    )
}

pub struct PlannerStage {
    oracle: Arc<dyn Oracle>,
    index: Arc<dyn SimilarityIndex>,
}

impl PlannerStage {
    pub fn new(oracle: Arc<dyn Oracle>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { oracle, index }
    }

    async fn prompt(&self, state: &RunState) -> String {
        let mut prompt = format!(
            "Question: {}\n\nAvailable tools:\n{}\n",
            state.question(),
            tool_lines(state)
        );

        let learning = self.index.get_learning_context(state.question()).await;
        let examples: Vec<String> = learning
            .similar_patterns
            .iter()
            .filter_map(|p| {
                p.sql
                    .as_deref()
                    .map(|sql| format!("- \"{}\"\n  SQL: {sql}", p.question))
            })
            .collect();
        if !examples.is_empty() {
            debug!(count = examples.len(), "Planner reusing similar queries");
            prompt.push_str("\nQueries that answered similar questions before:\n");
            prompt.push_str(&examples.join("\n"));
            prompt.push('\n');
        }

        if let Some(error) = state.real_error() {
            prompt.push_str(&format!("\nThe previous attempt failed with: {error}\n"));
        }
        prompt
    }
}

#[async_trait]
impl Stage for PlannerStage {
    fn action(&self) -> Action {
        Action::Plan
    }

    async fn run(&self, state: &mut RunState) {
        let request = OracleRequest::new(self.prompt(state).await)
            .with_system(instruction())
            .with_json_mode(true)
            .with_temperature(TEMPERATURE);

        let text = match self.oracle.generate(request).await {
            Ok(response) => response.text,
            Err(e) => {
                warn!(error = %e, "Planner oracle call failed");
                let message = format!("Planner error: {e}");
                state.set_error(RunError::failure(message.clone()));
                state.record(HistoryEntry::Planner {
                    content: message,
                    plan: Vec::new(),
                    sql: None,
                    rationale: None,
                });
                return;
            }
        };

        let Some(payload) = extract_object(&text) else {
            warn!("Planner answer was not JSON");
            state.set_error(RunError::failure("Planner error: response was not valid JSON"));
            state.record(HistoryEntry::Planner {
                content: text,
                plan: Vec::new(),
                sql: None,
                rationale: None,
            });
            return;
        };

        let plan = payload.get("plan").map(plan_from_value).unwrap_or_default();
        let sql = string_field(&payload, PLANNER_KEY);
        let rationale = string_field(&payload, "rationale");

        info!(steps = plan.len(), has_sql = sql.is_some(), "Plan produced");

        if plan.is_empty() {
            state.set_error(RunError::indicator("no_plan"));
        } else if sql.is_none() {
            state.set_error(RunError::indicator("no_sql_to_execute"));
        } else {
            state.clear_error();
        }

        // A new query must be executed before its results count
        if sql.is_some() && sql != state.sql {
            state.rows = None;
        }
        state.plan = plan.clone();
        if sql.is_some() {
            state.sql = sql.clone();
        }

        state.record(HistoryEntry::Planner {
            content: text,
            plan,
            sql,
            rationale,
        });
    }
}
