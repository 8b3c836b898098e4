//! Renders a PDF report through the tool server.
//!
//! The oracle only picks presentation details (title, chart columns); the
//! tool server does the rendering and returns the file path.

use super::{extract_object, string_field};
use async_trait::async_trait;
use lysai_core::labels::REPORT_KEY;
use lysai_core::{
    Action, HistoryEntry, Oracle, OracleRequest, RunError, RunState, Stage, ToolServer,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the rendering tool on the server.
pub const GENERATE_PDF_TOOL: &str = "generate_pdf";

const DEFAULT_TITLE: &str = "Data Analysis Report";
const DEFAULT_CHART_TITLE: &str = "Data Visualization";
const DEFAULT_TOP_N: u64 = 10;
const SAMPLE_ROWS: usize = 3;

fn instruction() -> String {
    format!(
        "You are preparing a PDF report of query results.\n\
         Return ONLY a JSON object with these keys:\n\
         - \"title\": a short report title\n\
         - \"{REPORT_KEY}\": the column to use for chart labels, or null for no chart\n\
         - \"chart_y_key\": the numeric column to plot, or null\n\
         - \"chart_top_n\": how many rows to plot\n\
         - \"chart_title\": a short chart title"
    )
}

/// Presentation choices for one report.
#[derive(Debug, Clone, PartialEq)]
struct Layout {
    title: String,
    chart_x_key: Option<String>,
    chart_y_key: Option<String>,
    chart_top_n: u64,
    chart_title: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.into(),
            chart_x_key: None,
            chart_y_key: None,
            chart_top_n: DEFAULT_TOP_N,
            chart_title: DEFAULT_CHART_TITLE.into(),
        }
    }
}

impl Layout {
    /// Read the oracle's choices, dropping chart keys that are not columns.
    fn from_payload(payload: &Map<String, Value>, columns: &[&str]) -> Self {
        let defaults = Self::default();
        let column = |key: &str| {
            string_field(payload, key).filter(|c| columns.contains(&c.as_str()))
        };
        Self {
            title: string_field(payload, "title").unwrap_or(defaults.title),
            chart_x_key: column(REPORT_KEY),
            chart_y_key: column("chart_y_key"),
            chart_top_n: payload
                .get("chart_top_n")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.chart_top_n),
            chart_title: string_field(payload, "chart_title").unwrap_or(defaults.chart_title),
        }
    }
}

pub struct ReportStage {
    oracle: Arc<dyn Oracle>,
    tools: Arc<dyn ToolServer>,
}

impl ReportStage {
    pub fn new(oracle: Arc<dyn Oracle>, tools: Arc<dyn ToolServer>) -> Self {
        Self { oracle, tools }
    }

    async fn layout(&self, state: &RunState, insight: &str, columns: &[&str]) -> Layout {
        let rows = state.rows.as_deref().unwrap_or_default();
        let sample: Vec<_> = rows.iter().take(SAMPLE_ROWS).collect();
        let prompt = format!(
            "Question: {}\nInsight: {insight}\nColumns: {}\nSample rows:\n{}",
            state.question(),
            columns.join(", "),
            serde_json::to_string_pretty(&sample).unwrap_or_default(),
        );
        let request = OracleRequest::new(prompt)
            .with_system(instruction())
            .with_json_mode(true)
            .with_temperature(0.2);

        match self.oracle.generate(request).await {
            Ok(response) => extract_object(&response.text)
                .map(|payload| Layout::from_payload(&payload, columns))
                .unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Report layout unavailable, using defaults");
                Layout::default()
            }
        }
    }

    fn fail(state: &mut RunState, message: String) {
        warn!(error = %message, "Report generation failed");
        state.set_error(RunError::failure(message.clone()));
        state.record(HistoryEntry::Render {
            pdf_path: None,
            content: message,
        });
    }
}

/// The file path in a `generate_pdf` result.
fn report_path(result: &Value) -> Option<String> {
    match result {
        Value::String(path) => Some(path.clone()),
        Value::Object(map) => ["path", "pdf_path", "file"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
    .filter(|p| !p.trim().is_empty())
}

#[async_trait]
impl Stage for ReportStage {
    fn action(&self) -> Action {
        Action::GeneratePdf
    }

    async fn run(&self, state: &mut RunState) {
        let Some(insight) = state.insight().map(str::to_string) else {
            state.set_error(RunError::indicator("no_insight_available"));
            return;
        };

        let rows = state.rows.clone().unwrap_or_default();
        let columns: Vec<&str> = rows
            .first()
            .map(|r| r.keys().map(String::as_str).collect())
            .unwrap_or_default();
        let layout = self.layout(state, &insight, &columns).await;

        let arguments = json!({
            "title": layout.title,
            "question": state.question(),
            "insight": insight,
            "sql": state.sql,
            "rows": rows,
            "chart_x_key": layout.chart_x_key,
            "chart_y_key": layout.chart_y_key,
            "chart_top_n": layout.chart_top_n,
            "chart_title": layout.chart_title,
        });

        match self.tools.call_tool(GENERATE_PDF_TOOL, arguments).await {
            Ok(result) => match report_path(&result) {
                Some(path) => {
                    info!(path = %path, "Report generated");
                    state.clear_error();
                    state.record(HistoryEntry::Render {
                        content: format!("PDF generated successfully at: {path}"),
                        pdf_path: Some(path),
                    });
                }
                None => Self::fail(state, format!("PDF generation returned no path: {result}")),
            },
            Err(e) => Self::fail(state, format!("PDF generation failed: {e}")),
        }
    }
}
