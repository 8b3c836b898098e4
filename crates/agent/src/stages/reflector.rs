//! Revises a failing query.

use super::{extract_object, string_field, tool_lines};
use async_trait::async_trait;
use lysai_core::labels::REFLECTOR_KEY;
use lysai_core::{Action, HistoryEntry, Oracle, OracleRequest, RunError, RunState, Stage};
use std::sync::Arc;
use tracing::{info, warn};

const TEMPERATURE: f32 = 0.2;

fn instruction() -> String {
    format!(
        "You are a SQL expert fixing a query that failed.\n\
         Return ONLY a JSON object with these keys:\n\
         - \"{REFLECTOR_KEY}\": the corrected read-only SQL query, or null if it cannot be fixed\n\
         - \"reason\": what was wrong and what changed"
    )
}

pub struct ReflectorStage {
    oracle: Arc<dyn Oracle>,
}

impl ReflectorStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    fn prompt(state: &RunState) -> String {
        let plan = if state.plan.is_empty() {
            "(none)".to_string()
        } else {
            state.plan.join("; ")
        };
        format!(
            "Question: {}\nPlan: {plan}\nLast SQL: {}\nError: {}\n\nAvailable tools:\n{}",
            state.question(),
            state.sql.as_deref().unwrap_or("(none)"),
            state.error.as_ref().map_or("(none)", |e| e.message()),
            tool_lines(state),
        )
    }

    /// Leave the run's failure in place, or add one if there is none.
    fn keep_failure(state: &mut RunState, reason: &str) {
        if state.real_error().is_none() {
            state.set_error(RunError::failure(format!("Reflection failed: {reason}")));
        }
    }
}

#[async_trait]
impl Stage for ReflectorStage {
    fn action(&self) -> Action {
        Action::Reflect
    }

    async fn run(&self, state: &mut RunState) {
        let request = OracleRequest::new(Self::prompt(state))
            .with_system(instruction())
            .with_json_mode(true)
            .with_temperature(TEMPERATURE);

        let payload = match self.oracle.generate(request).await {
            Ok(response) => extract_object(&response.text),
            Err(e) => {
                warn!(error = %e, "Reflector oracle call failed");
                let reason = format!("Reflection failed: {e}");
                Self::keep_failure(state, &e.to_string());
                state.record(HistoryEntry::Reflector {
                    revised_sql: None,
                    reason,
                });
                return;
            }
        };

        let payload = payload.unwrap_or_default();
        let revised = string_field(&payload, REFLECTOR_KEY);
        let reason = string_field(&payload, "reason").unwrap_or_else(|| "No reason given".into());

        match &revised {
            Some(sql) => {
                info!(sql = %sql, "Query revised");
                state.sql = Some(sql.clone());
                state.rows = None;
                state.clear_error();
            }
            None => {
                warn!(reason = %reason, "No revision produced");
                Self::keep_failure(state, &reason);
            }
        }

        state.record(HistoryEntry::Reflector {
            revised_sql: revised,
            reason,
        });
    }
}
