//! The enumerated action vocabulary.
//!
//! These seven tokens are the wire-level contract with the oracle and with
//! stage dispatch: any oracle output must resolve to one of them before a
//! decision is accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The next step the policy engine can choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Discover the tools the remote tool server offers
    InspectTools,
    /// Produce a plan and a candidate SQL query
    Plan,
    /// Run the current SQL query
    Execute,
    /// Revise a failing query
    Reflect,
    /// Turn result rows into an insight
    Summarize,
    /// Render a PDF report
    GeneratePdf,
    /// Terminal: the run is over
    Done,
}

impl Action {
    /// Every action, in the order they are presented to the oracle.
    pub const ALL: [Action; 7] = [
        Action::InspectTools,
        Action::Plan,
        Action::Execute,
        Action::Reflect,
        Action::Summarize,
        Action::GeneratePdf,
        Action::Done,
    ];

    /// The wire token for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::InspectTools => "INSPECT_TOOLS",
            Action::Plan => "PLAN",
            Action::Execute => "EXECUTE",
            Action::Reflect => "REFLECT",
            Action::Summarize => "SUMMARIZE",
            Action::GeneratePdf => "GENERATE_PDF",
            Action::Done => "DONE",
        }
    }

    /// One-line description shown to the oracle.
    pub fn description(&self) -> &'static str {
        match self {
            Action::InspectTools => "Examine available database tools/tables (do this first if not done)",
            Action::Plan => "Create a step-by-step plan and a SQL query to answer the question",
            Action::Execute => "Execute the SQL query to get data",
            Action::Reflect => "Analyze errors and improve the approach",
            Action::Summarize => "Create a summary of results",
            Action::GeneratePdf => "Create a PDF report",
            Action::Done => "Task is complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Done)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the seven tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action token: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    /// Exact, case-sensitive token match. Callers normalize case first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
