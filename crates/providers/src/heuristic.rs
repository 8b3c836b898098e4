//! Canned heuristic responder.
//!
//! Used by the failover oracle when every backend is rate limited. It
//! recognizes the prompt by shape and answers with something the caller can
//! always parse: an action token for decision prompts, a minimal JSON payload
//! for stage prompts. It never fails.

use async_trait::async_trait;
use lysai_core::action::Action;
use lysai_core::error::OracleError;
use lysai_core::labels;
use lysai_core::oracle::{Oracle, OracleRequest, OracleResponse};
use serde_json::json;
use tracing::info;

/// Backend name reported on canned responses.
pub const HEURISTIC_BACKEND: &str = "heuristic";

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicResponder;

/// What a prompt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    Decision,
    Report,
    Reflection,
    Plan,
    Summary,
    Other,
}

impl HeuristicResponder {
    pub fn new() -> Self {
        Self
    }

    fn classify(request: &OracleRequest) -> PromptKind {
        if request.prompt.contains(labels::ACTIONS_HEADING) {
            return PromptKind::Decision;
        }

        let instruction = request
            .system_instruction
            .as_deref()
            .unwrap_or(request.prompt.as_str());

        if instruction.contains(labels::REPORT_KEY) {
            PromptKind::Report
        } else if instruction.contains(labels::REFLECTOR_KEY) {
            PromptKind::Reflection
        } else if instruction.contains(labels::PLANNER_KEY) {
            PromptKind::Plan
        } else if instruction.contains(labels::SUMMARIZER_KEY) {
            PromptKind::Summary
        } else {
            PromptKind::Other
        }
    }

    /// Pick an action from the state flags rendered into a decision prompt.
    fn decide(prompt: &str) -> Action {
        let flag = |label| labels::read_flag(prompt, label);

        if !flag(labels::TOOLS_INSPECTED) {
            Action::InspectTools
        } else if !flag(labels::PLAN_EXISTS) || !flag(labels::SQL_QUERY) {
            Action::Plan
        } else if !flag(labels::HAS_RESULTS) {
            Action::Execute
        } else if !flag(labels::HAS_INSIGHTS) {
            Action::Summarize
        } else if flag(labels::PDF_REQUESTED) && !flag(labels::PDF_GENERATED) {
            Action::GeneratePdf
        } else {
            Action::Done
        }
    }

    /// Produce the canned answer for a request.
    pub fn respond(&self, request: &OracleRequest) -> OracleResponse {
        let kind = Self::classify(request);
        let text = match kind {
            PromptKind::Decision => {
                let action = Self::decide(&request.prompt);
                format!("{action}\nHeuristic decision: reasoning backends are unavailable")
            }
            PromptKind::Report => json!({
                "title": "Data Analysis Report",
                "chart_x_key": null,
                "chart_y_key": null,
                "chart_top_n": 10,
                "chart_title": "Data Visualization",
            })
            .to_string(),
            PromptKind::Reflection => json!({
                "revised_sql": null,
                "reason": "No revision available: reasoning backends are unavailable",
            })
            .to_string(),
            PromptKind::Plan => json!({
                "plan": ["Inspect the relevant tables", "Query the data needed to answer"],
                "sql_candidate": "",
                "rationale": "Heuristic plan: reasoning backends are unavailable",
            })
            .to_string(),
            PromptKind::Summary => json!({
                "insight": "Query results were retrieved; a narrative summary is unavailable because the reasoning backends are rate limited.",
                "caveats": "Generated without a reasoning backend",
            })
            .to_string(),
            PromptKind::Other if request.json_mode => "{}".to_string(),
            PromptKind::Other => Action::Done.to_string(),
        };

        info!(kind = ?kind, "Heuristic responder answered");

        OracleResponse {
            text,
            raw: json!({ "heuristic": true }),
            backend: HEURISTIC_BACKEND.to_string(),
        }
    }
}

#[async_trait]
impl Oracle for HeuristicResponder {
    fn name(&self) -> &str {
        HEURISTIC_BACKEND
    }

    async fn generate(
        &self,
        request: OracleRequest,
    ) -> std::result::Result<OracleResponse, OracleError> {
        Ok(self.respond(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision_prompt(flags: &[(&str, bool)]) -> String {
        let mut lines: Vec<String> = flags
            .iter()
            .map(|(label, value)| labels::line(label, labels::yes_no(*value)))
            .collect();
        lines.push(labels::ACTIONS_HEADING.to_string());
        lines.join("\n")
    }

    fn first_line(response: &OracleResponse) -> &str {
        response.text.lines().next().unwrap()
    }

    #[test]
    fn decision_follows_priority() {
        let responder = HeuristicResponder::new();

        let prompt = decision_prompt(&[(labels::TOOLS_INSPECTED, false)]);
        let r = responder.respond(&OracleRequest::new(prompt));
        assert_eq!(first_line(&r), "INSPECT_TOOLS");

        let prompt = decision_prompt(&[
            (labels::TOOLS_INSPECTED, true),
            (labels::PLAN_EXISTS, true),
            (labels::SQL_QUERY, true),
            (labels::HAS_RESULTS, false),
        ]);
        let r = responder.respond(&OracleRequest::new(prompt));
        assert_eq!(first_line(&r), "EXECUTE");

        let prompt = decision_prompt(&[
            (labels::TOOLS_INSPECTED, true),
            (labels::PLAN_EXISTS, true),
            (labels::SQL_QUERY, true),
            (labels::HAS_RESULTS, true),
            (labels::HAS_INSIGHTS, true),
            (labels::PDF_REQUESTED, true),
            (labels::PDF_GENERATED, false),
        ]);
        let r = responder.respond(&OracleRequest::new(prompt));
        assert_eq!(first_line(&r), "GENERATE_PDF");
        assert_eq!(r.backend, HEURISTIC_BACKEND);
    }

    #[test]
    fn decision_answers_are_always_valid_tokens() {
        let responder = HeuristicResponder::new();
        for bits in 0u8..128 {
            let flags: Vec<(&str, bool)> = [
                labels::TOOLS_INSPECTED,
                labels::PLAN_EXISTS,
                labels::SQL_QUERY,
                labels::HAS_RESULTS,
                labels::HAS_INSIGHTS,
                labels::PDF_REQUESTED,
                labels::PDF_GENERATED,
            ]
            .into_iter()
            .enumerate()
            .map(|(i, label)| (label, bits & (1 << i) != 0))
            .collect();
            let r = responder.respond(&OracleRequest::new(decision_prompt(&flags)));
            assert!(first_line(&r).parse::<Action>().is_ok());
        }
    }

    #[test]
    fn stage_prompts_get_valid_json() {
        let responder = HeuristicResponder::new();
        let cases = [
            ("Return ONLY JSON with keys: plan, sql_candidate, rationale", "sql_candidate"),
            ("Return ONLY JSON: revised_sql, reason", "reason"),
            ("Return ONLY JSON: insight, caveats", "insight"),
            ("Return ONLY JSON: title, chart_x_key, chart_y_key", "title"),
        ];
        for (system, key) in cases {
            let request = OracleRequest::new("rows...")
                .with_system(system)
                .with_json_mode(true);
            let r = responder.respond(&request);
            let value: serde_json::Value = serde_json::from_str(&r.text).unwrap();
            assert!(value.get(key).is_some(), "missing {key} for {system}");
        }
    }

    #[test]
    fn unknown_prompts_still_parse() {
        let responder = HeuristicResponder::new();
        let r = responder.respond(&OracleRequest::new("hello").with_json_mode(true));
        assert_eq!(r.text, "{}");
        let r = responder.respond(&OracleRequest::new("hello"));
        assert_eq!(r.text, "DONE");
    }
}
