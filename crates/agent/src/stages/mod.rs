//! Pipeline stages, one per non-terminal action.

pub mod executor;
pub mod planner;
pub mod reflector;
pub mod report;
pub mod summarizer;
pub mod tool_inspector;

pub use executor::ExecutorStage;
pub use planner::PlannerStage;
pub use reflector::ReflectorStage;
pub use report::ReportStage;
pub use summarizer::SummarizerStage;
pub use tool_inspector::ToolInspectorStage;

use lysai_core::{Action, Oracle, SimilarityIndex, Stage, ToolServer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Stages keyed by the action that dispatches to them.
#[derive(Default, Clone)]
pub struct StageSet {
    stages: HashMap<Action, Arc<dyn Stage>>,
}

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The six standard stages wired to the given collaborators.
    pub fn standard(
        oracle: Arc<dyn Oracle>,
        tools: Arc<dyn ToolServer>,
        index: Arc<dyn SimilarityIndex>,
    ) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(ToolInspectorStage::new(tools.clone())));
        set.register(Arc::new(PlannerStage::new(oracle.clone(), index)));
        set.register(Arc::new(ExecutorStage::new(tools.clone())));
        set.register(Arc::new(ReflectorStage::new(oracle.clone())));
        set.register(Arc::new(SummarizerStage::new(oracle.clone())));
        set.register(Arc::new(ReportStage::new(oracle, tools)));
        set
    }

    /// Register a stage under its action, replacing any previous one.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.action(), stage);
    }

    pub fn get(&self, action: Action) -> Option<Arc<dyn Stage>> {
        self.stages.get(&action).cloned()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Pull a JSON value out of oracle text.
///
/// Tries the text as-is, then with Markdown code fences removed, then the
/// span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    let unfenced = text
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Like [`extract_json`], but a list payload yields its first object.
pub fn extract_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => Some(map),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        }),
        _ => None,
    }
}

/// A non-empty, trimmed string field.
pub(crate) fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Tool lines for prompts.
pub(crate) fn tool_lines(state: &lysai_core::RunState) -> String {
    match &state.available_tools {
        Some(tools) if !tools.is_empty() => tools
            .iter()
            .map(|t| t.summary_line())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "No tools available".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use serde_json::json;

    #[test]
    fn json_extracted_from_plain_fenced_and_prose() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            extract_json("```json\n{\"a\": 1}\n```"),
            Some(json!({"a": 1}))
        );
        assert_eq!(
            extract_json("Here you go: {\"a\": {\"b\": 2}} hope that helps"),
            Some(json!({"a": {"b": 2}}))
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn list_payload_yields_first_object() {
        let map = extract_object(r#"[{"insight": "x"}, {"insight": "y"}]"#).unwrap();
        assert_eq!(map["insight"], "x");
        assert!(extract_object("42").is_none());
    }

    #[test]
    fn standard_set_covers_every_stage_action() {
        let oracle = std::sync::Arc::new(ScriptedOracle::failing());
        let tools = std::sync::Arc::new(FakeToolServer::new());
        let index = std::sync::Arc::new(lysai_memory::NoopIndex);
        let set = StageSet::standard(oracle, tools, index);

        assert_eq!(set.len(), 6);
        for action in Action::ALL {
            assert_eq!(set.get(action).is_some(), !action.is_terminal(), "{action}");
        }
    }
}
