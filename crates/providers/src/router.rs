//! Provider router: builds backends and the oracle stack from config.
//!
//! `build_oracle` assembles: retrying primary → (optional) retrying
//! secondary → heuristic responder, wrapped in a `FailoverOracle`.

use crate::failover::FailoverOracle;
use crate::heuristic::HeuristicResponder;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryingOracle;
use lysai_config::{BackendConfig, OracleConfig};
use lysai_core::oracle::Oracle;
use lysai_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build one provider from its backend config.
pub fn build_provider(backend: &BackendConfig) -> Arc<dyn Provider> {
    let api_key = backend.api_key.clone().unwrap_or_default();
    let base_url = backend
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&backend.provider));

    Arc::new(OpenAiCompatProvider::new(
        &backend.provider,
        &base_url,
        &api_key,
    ))
}

fn build_retrying(backend: &BackendConfig, config: &OracleConfig) -> Arc<dyn Oracle> {
    Arc::new(
        RetryingOracle::new(build_provider(backend), &backend.model)
            .with_base_delay(Duration::from_millis(config.base_delay_ms))
            .with_max_retries(config.max_retries)
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs)),
    )
}

/// Build the full oracle stack from configuration.
pub fn build_oracle(config: &OracleConfig) -> Arc<dyn Oracle> {
    let mut oracle = FailoverOracle::new(build_retrying(&config.primary, config));

    if let Some(secondary) = &config.secondary {
        oracle = oracle.with_secondary(build_retrying(secondary, config));
    }

    if config.heuristic_on_exhaustion {
        oracle = oracle.with_heuristic(HeuristicResponder::new());
    }

    info!(
        primary = %config.primary.provider,
        model = %config.primary.model,
        secondary = config.secondary.as_ref().map(|s| s.provider.as_str()).unwrap_or("none"),
        "Oracle stack built"
    );

    Arc::new(oracle)
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "gemini" | "google" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
