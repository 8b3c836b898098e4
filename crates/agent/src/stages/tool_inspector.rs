//! Discovers what the tool server offers.

use async_trait::async_trait;
use lysai_core::{Action, HistoryEntry, RunError, RunState, Stage, ToolServer};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ToolInspectorStage {
    tools: Arc<dyn ToolServer>,
}

impl ToolInspectorStage {
    pub fn new(tools: Arc<dyn ToolServer>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Stage for ToolInspectorStage {
    fn action(&self) -> Action {
        Action::InspectTools
    }

    async fn run(&self, state: &mut RunState) {
        match self.tools.list_tools().await {
            Ok(tools) => {
                info!(server = self.tools.name(), count = tools.len(), "Tools inspected");
                let content = if tools.is_empty() {
                    "No tools available".to_string()
                } else {
                    let lines: Vec<String> = tools.iter().map(|t| t.summary_line()).collect();
                    format!("Available tools:\n{}", lines.join("\n"))
                };
                state.record(HistoryEntry::ToolInspector {
                    content,
                    tools_count: tools.len(),
                    error: None,
                });
                state.available_tools = Some(tools);
            }
            Err(e) => {
                let message = format!("Tool inspection error: {e}");
                warn!(server = self.tools.name(), error = %e, "Tool inspection failed");
                // Empty, not unknown: inspection is not retried
                state.available_tools = Some(Vec::new());
                state.set_error(RunError::failure(message.clone()));
                state.record(HistoryEntry::ToolInspector {
                    content: message.clone(),
                    tools_count: 0,
                    error: Some(message),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[tokio::test]
    async fn lists_tools_into_state() {
        let stage = ToolInspectorStage::new(Arc::new(FakeToolServer::new()));
        let mut state = RunState::new("List top actors", 6);

        stage.run(&mut state).await;

        assert!(state.has_tools());
        assert!(state.tools_inspected());
        assert_eq!(state.available_tools.as_ref().unwrap().len(), 2);
        match state.history().last() {
            Some(HistoryEntry::ToolInspector {
                content,
                tools_count,
                error,
            }) => {
                assert!(content.starts_with("Available tools:\n- execute_sql:"));
                assert_eq!(*tools_count, 2);
                assert!(error.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_real_error() {
        let stage = ToolInspectorStage::new(Arc::new(FakeToolServer::unreachable()));
        let mut state = RunState::new("q", 6);

        stage.run(&mut state).await;

        assert_eq!(state.available_tools, Some(vec![]));
        assert!(state.tools_inspected());
        assert!(state.real_error().unwrap().starts_with("Tool inspection error:"));
    }

    #[tokio::test]
    async fn empty_tool_list_recorded() {
        let mut server = FakeToolServer::new();
        server.tools = Ok(vec![]);
        let stage = ToolInspectorStage::new(Arc::new(server));
        let mut state = RunState::new("q", 6);

        stage.run(&mut state).await;

        assert!(!state.has_tools());
        assert!(matches!(
            state.history().last(),
            Some(HistoryEntry::ToolInspector { content, .. }) if content == "No tools available"
        ));
    }
}
