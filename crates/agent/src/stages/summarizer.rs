//! Turns result rows into an insight.

use super::extract_object;
use async_trait::async_trait;
use lysai_core::labels::SUMMARIZER_KEY;
use lysai_core::{Action, HistoryEntry, Oracle, OracleRequest, RunError, RunState, Stage};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Rows shown to the oracle.
const SAMPLE_ROWS: usize = 5;
const TEMPERATURE: f32 = 0.3;

fn instruction() -> String {
    format!(
        "You are a data analyst writing up query results for a business reader.\n\
         Return ONLY a JSON object with these keys:\n\
         - \"{SUMMARIZER_KEY}\": two or three sentences answering the question from the data\n\
         - \"caveats\": limitations of the data, or an empty string"
    )
}

pub struct SummarizerStage {
    oracle: Arc<dyn Oracle>,
}

impl SummarizerStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    fn prompt(state: &RunState) -> String {
        let rows = state.rows.as_deref().unwrap_or_default();
        let sample: Vec<&lysai_core::Row> = rows.iter().take(SAMPLE_ROWS).collect();
        let sample = serde_json::to_string_pretty(&sample).unwrap_or_else(|_| "[]".into());
        format!(
            "Question: {}\nSQL: {}\nTotal rows: {}\nFirst {} rows:\n{sample}",
            state.question(),
            state.sql.as_deref().unwrap_or("(none)"),
            rows.len(),
            rows.len().min(SAMPLE_ROWS),
        )
    }

    fn failed(state: &mut RunState, reason: String) {
        warn!(reason = %reason, "Summary failed");
        state.set_error(RunError::failure(format!("Summarizer error: {reason}")));
        state.record(HistoryEntry::Summarizer {
            payload: json!({ SUMMARIZER_KEY: Value::Null, "error": reason }),
        });
    }
}

#[async_trait]
impl Stage for SummarizerStage {
    fn action(&self) -> Action {
        Action::Summarize
    }

    async fn run(&self, state: &mut RunState) {
        if state.rows.is_none() {
            state.set_error(RunError::indicator("no_data"));
            return;
        }

        let request = OracleRequest::new(Self::prompt(state))
            .with_system(instruction())
            .with_json_mode(true)
            .with_temperature(TEMPERATURE);

        let text = match self.oracle.generate(request).await {
            Ok(response) => response.text,
            Err(e) => return Self::failed(state, e.to_string()),
        };

        let Some(payload) = extract_object(&text) else {
            return Self::failed(state, "response was not valid JSON".into());
        };

        let entry = HistoryEntry::Summarizer {
            payload: Value::Object(payload),
        };
        if entry.insight().is_none() {
            return Self::failed(state, "response carried no insight".into());
        }

        info!("Insight produced");
        state.clear_error();
        state.record(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;

    #[tokio::test]
    async fn insight_recorded() {
        let oracle = Arc::new(ScriptedOracle::texts(&[
            r#"{"insight": "GINA DEGENERES appears in the most films (42).", "caveats": ""}"#,
        ]));
        let stage = SummarizerStage::new(oracle.clone());
        let mut state = planned_state("Which actors appear in the most films?", "SELECT 1");
        state.set_rows(actor_rows());

        stage.run(&mut state).await;

        assert_eq!(
            state.insight(),
            Some("GINA DEGENERES appears in the most films (42).")
        );
        let prompt = &oracle.requests()[0].prompt;
        assert!(prompt.contains("Total rows: 2"));
        assert!(prompt.contains("WALTER TORN"));
    }

    #[tokio::test]
    async fn only_first_rows_are_sampled() {
        let oracle = Arc::new(ScriptedOracle::texts(&[r#"{"insight": "many rows"}"#]));
        let stage = SummarizerStage::new(oracle.clone());
        let mut state = planned_state("q", "SELECT 1");
        state.set_rows((0..20).map(|n| row(json!({ "n": n }))).collect());

        stage.run(&mut state).await;

        let prompt = &oracle.requests()[0].prompt;
        assert!(prompt.contains("First 5 rows"));
        assert!(prompt.contains("\"n\": 4"));
        assert!(!prompt.contains("\"n\": 5"));
    }

    #[tokio::test]
    async fn missing_insight_is_an_error() {
        let stage = SummarizerStage::new(Arc::new(ScriptedOracle::texts(&[r#"{"caveats": "x"}"#])));
        let mut state = planned_state("q", "SELECT 1");
        state.set_rows(actor_rows());

        stage.run(&mut state).await;

        assert!(!state.has_insight());
        assert!(state.real_error().unwrap().starts_with("Summarizer error"));
    }

    #[tokio::test]
    async fn no_rows_is_an_indicator() {
        let oracle = Arc::new(ScriptedOracle::failing());
        let stage = SummarizerStage::new(oracle.clone());
        let mut state = planned_state("q", "SELECT 1");

        stage.run(&mut state).await;

        assert_eq!(state.error, Some(RunError::indicator("no_data")));
        assert_eq!(oracle.call_count(), 0);
    }
}
