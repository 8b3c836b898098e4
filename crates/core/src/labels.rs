//! Labels shared between the decision-context builder and the canned
//! heuristic responder.
//!
//! The policy engine renders run state as `Label: Yes|No` lines; the
//! heuristic responder reads the same lines back when every backend is
//! rate limited. Keeping the strings here stops the two from drifting.

pub const QUESTION: &str = "Question";
pub const PDF_REQUESTED: &str = "PDF Requested";
pub const PDF_GENERATED: &str = "PDF Generated";
pub const CURRENT_STEP: &str = "Current Step";
pub const TOOLS_AVAILABLE: &str = "Tools Available";
pub const TOOLS_INSPECTED: &str = "Tools Inspected";
pub const PLAN_EXISTS: &str = "Plan Exists";
pub const SQL_QUERY: &str = "SQL Query";
pub const HAS_RESULTS: &str = "Has Results";
pub const EXECUTE_NEEDED: &str = "**EXECUTE NEEDED**";
pub const HAS_INSIGHTS: &str = "Has Insights";
pub const HAS_ERROR: &str = "Has Error";
pub const RECENT_ACTIONS: &str = "Recent Actions";
pub const CURRENT_ERROR: &str = "Current Error";

/// Heading that marks a next-action decision prompt.
pub const ACTIONS_HEADING: &str = "AVAILABLE ACTIONS:";

/// JSON keys that identify each stage's expected payload.
pub const PLANNER_KEY: &str = "sql_candidate";
pub const REFLECTOR_KEY: &str = "revised_sql";
pub const SUMMARIZER_KEY: &str = "insight";
pub const REPORT_KEY: &str = "chart_x_key";

/// Render one `Label: value` line.
pub fn line(label: &str, value: impl std::fmt::Display) -> String {
    format!("{label}: {value}")
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

/// Read a `Label: Yes|No` flag back out of rendered text.
///
/// Leading list markers are ignored and the first matching line wins.
/// Values starting with "Yes" or "Present" count as set; a missing label
/// reads as unset.
pub fn read_flag(text: &str, label: &str) -> bool {
    let prefix = format!("{label}:");
    text.lines()
        .map(|l| l.trim_start().trim_start_matches("- ").trim_start())
        .find_map(|l| l.strip_prefix(prefix.as_str()))
        .map(|value| {
            let value = value.trim_start();
            value.starts_with("Yes") || value.starts_with("YES") || value.starts_with("Present")
        })
        .unwrap_or(false)
}
