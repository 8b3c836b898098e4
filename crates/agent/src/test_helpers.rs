//! Shared test helpers: scripted oracle, fake tool server, state builders.

use async_trait::async_trait;
use lysai_core::error::{OracleError, ProviderError, ToolError};
use lysai_core::{
    Action, ContextUsed, DecisionSource, HistoryEntry, Oracle, OracleRequest, OracleResponse,
    OrchestratorEvent, Row, RunState, ToolDescriptor, ToolServer,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

/// An oracle that answers from a script, one entry per call.
///
/// Once the script runs out every call fails with a terminal error, which
/// sends the policy engine down its fallback path.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<String, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call answers with the given texts in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(OracleResponse {
                text,
                raw: Value::Null,
                backend: "scripted".into(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(OracleError::Backend(ProviderError::NotConfigured(
                "script exhausted".into(),
            ))),
        }
    }
}

/// A tool server with canned answers.
pub struct FakeToolServer {
    pub tools: Result<Vec<ToolDescriptor>, ToolError>,
    sql_results: Mutex<VecDeque<Result<Vec<Row>, ToolError>>>,
    pub pdf_path: Option<String>,
    executed: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeToolServer {
    pub fn new() -> Self {
        Self {
            tools: Ok(vec![
                ToolDescriptor::new("execute_sql", "Run a read-only SQL query"),
                ToolDescriptor::new("generate_pdf", "Render a PDF report"),
            ]),
            sql_results: Mutex::new(VecDeque::new()),
            pdf_path: Some("/tmp/reports/report.pdf".into()),
            executed: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue the results of successive `execute_sql` calls. When the queue
    /// is empty, queries return the default actor rows.
    pub fn with_sql_results(self, results: Vec<Result<Vec<Row>, ToolError>>) -> Self {
        *self.sql_results.lock().unwrap() = results.into();
        self
    }

    pub fn unreachable() -> Self {
        Self {
            tools: Err(ToolError::Unreachable("connection refused".into())),
            ..Self::new()
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolServer for FakeToolServer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        self.tools.clone()
    }

    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>, ToolError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let next = self.sql_results.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(actor_rows()))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        match (name, &self.pdf_path) {
            ("generate_pdf", Some(path)) => Ok(json!({ "ok": true, "path": path })),
            ("generate_pdf", None) => Err(ToolError::ExecutionFailed {
                tool_name: name.into(),
                reason: "renderer crashed".into(),
            }),
            _ => Err(ToolError::NotFound(name.into())),
        }
    }
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

pub fn actor_rows() -> Vec<Row> {
    vec![
        row(json!({"actor": "GINA DEGENERES", "films": 42})),
        row(json!({"actor": "WALTER TORN", "films": 41})),
    ]
}

pub fn inspection_record(tools_count: usize) -> HistoryEntry {
    HistoryEntry::ToolInspector {
        content: "Available tools:\n- execute_sql: Run a read-only SQL query".into(),
        tools_count,
        error: None,
    }
}

pub fn reflector_record() -> HistoryEntry {
    HistoryEntry::Reflector {
        revised_sql: Some("SELECT 1".into()),
        reason: "fixed".into(),
    }
}

pub fn summary_record(insight: &str) -> HistoryEntry {
    HistoryEntry::Summarizer {
        payload: json!({ "insight": insight }),
    }
}

pub fn decision_record(action: Action, step: u32) -> HistoryEntry {
    HistoryEntry::Orchestrator(OrchestratorEvent::DecideNextAction {
        decision: action,
        reasoning: "test".into(),
        step,
        context_used: ContextUsed::default(),
        source: DecisionSource::Oracle,
    })
}

/// Tools listed and an inspection recorded.
pub fn inspected_state(question: &str) -> RunState {
    let mut state = RunState::new(question, 10);
    state.available_tools = Some(vec![
        ToolDescriptor::new("execute_sql", "Run a read-only SQL query"),
        ToolDescriptor::new("generate_pdf", "Render a PDF report"),
    ]);
    state.record(inspection_record(2));
    state
}

/// Inspected, with a plan and sql but no rows yet.
pub fn planned_state(question: &str, sql: &str) -> RunState {
    let mut state = inspected_state(question);
    state.plan = vec!["find the data".into(), "rank it".into()];
    state.sql = Some(sql.into());
    state
}
