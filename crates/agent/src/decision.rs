//! Reading an action out of oracle text.

use lysai_core::Action;

const WRAPPER_CHARS: &[char] = &['*', '"', '\'', '`', '.', ':', '#', '-'];
const NO_REASON: &str = "No reason provided";

/// Outcome of parsing an oracle's decision text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDecision {
    /// The first line was exactly an action token
    Parsed { action: Action, reasoning: String },
    /// A token was found elsewhere in the text
    Extracted { action: Action, reasoning: String },
    /// No token anywhere; carries the offending first line
    Failed { first_line: String },
}

impl ParsedDecision {
    pub fn action(&self) -> Option<Action> {
        match self {
            ParsedDecision::Parsed { action, .. } | ParsedDecision::Extracted { action, .. } => {
                Some(*action)
            }
            ParsedDecision::Failed { .. } => None,
        }
    }
}

/// Parse decision text: strict first-line match, then earliest token anywhere.
pub fn parse_decision(text: &str) -> ParsedDecision {
    let text = text.trim();
    let mut lines = text.lines();
    let first_line = lines.next().unwrap_or_default();

    let token = first_line
        .trim_matches(|c: char| c.is_whitespace() || WRAPPER_CHARS.contains(&c))
        .to_uppercase();

    if let Ok(action) = token.parse::<Action>() {
        let rest = lines.collect::<Vec<_>>().join("\n");
        let rest = rest.trim();
        let reasoning = if rest.is_empty() { NO_REASON } else { rest };
        return ParsedDecision::Parsed {
            action,
            reasoning: reasoning.to_string(),
        };
    }

    match extract_token(text) {
        Some(action) => ParsedDecision::Extracted {
            action,
            reasoning: format!(
                "Extracted '{action}' from: {}",
                text.chars().take(50).collect::<String>()
            ),
        },
        None => ParsedDecision::Failed {
            first_line: first_line.trim().to_string(),
        },
    }
}

/// The action token occurring earliest in the text, case-insensitively.
fn extract_token(text: &str) -> Option<Action> {
    let upper = text.to_uppercase();
    Action::ALL
        .iter()
        .filter_map(|action| upper.find(action.as_str()).map(|pos| (pos, *action)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, action)| action)
}
