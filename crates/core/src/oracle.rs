//! Oracle trait: what the policy engine and the stages talk to.
//!
//! An oracle turns a prompt (plus an optional system instruction) into free
//! text. Implementations wrap one or more `Provider`s and add retry,
//! failover and the canned heuristic responder; callers never see a raw
//! provider.

use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// The user-facing prompt
    pub prompt: String,

    /// Optional system instruction (role, output schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Ask the backend for a JSON object
    #[serde(default)]
    pub json_mode: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Attempts allowed for transient failures; `None` defers to the
    /// backend's configured limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

fn default_temperature() -> f32 {
    0.3
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            json_mode: false,
            temperature: default_temperature(),
            max_retries: None,
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// The text an oracle produced, plus the backend's raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    pub text: String,

    #[serde(default)]
    pub raw: serde_json::Value,

    /// Which backend answered ("heuristic" for the canned responder)
    pub backend: String,
}

/// The oracle adapter.
///
/// Must be safe to call repeatedly with identical arguments.
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: OracleRequest,
    ) -> std::result::Result<OracleResponse, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_defaults() {
        let req = OracleRequest::new("List top actors");
        assert_eq!(req.prompt, "List top actors");
        assert!(req.system_instruction.is_none());
        assert!(!req.json_mode);
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(req.max_retries, None);
    }

    #[test]
    fn request_builder_chain() {
        let req = OracleRequest::new("q")
            .with_system("Return ONLY JSON")
            .with_json_mode(true)
            .with_temperature(0.1)
            .with_max_retries(5);
        assert_eq!(req.system_instruction.as_deref(), Some("Return ONLY JSON"));
        assert!(req.json_mode);
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(req.max_retries, Some(5));
    }
}
