//! Runs the current query through the tool server.

use async_trait::async_trait;
use lysai_core::{Action, HistoryEntry, RunError, RunState, Stage, ToolServer};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ExecutorStage {
    tools: Arc<dyn ToolServer>,
}

impl ExecutorStage {
    pub fn new(tools: Arc<dyn ToolServer>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Stage for ExecutorStage {
    fn action(&self) -> Action {
        Action::Execute
    }

    async fn run(&self, state: &mut RunState) {
        let Some(sql) = state.sql.clone().filter(|s| !s.trim().is_empty()) else {
            state.set_error(RunError::indicator("no_sql_to_execute"));
            return;
        };

        match self.tools.execute_sql(&sql).await {
            Ok(rows) => {
                info!(rows = rows.len(), "Query executed");
                state.record(HistoryEntry::Executor {
                    sql,
                    row_count: Some(rows.len()),
                    error: None,
                });
                state.set_rows(rows);
            }
            Err(e) => {
                warn!(error = %e, sql = %sql, "Query failed");
                state.rows = None;
                state.set_error(RunError::failure(e.to_string()));
                state.record(HistoryEntry::Executor {
                    sql,
                    row_count: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}
