//! `lysai config`: configuration management commands.

use crate::wiring::load_config;
use lysai_config::{AppConfig, BackendConfig};

const REDACTED: &str = "[REDACTED]";

fn redact_backend(backend: &mut BackendConfig) {
    if backend.api_key.is_some() {
        backend.api_key = Some(REDACTED.into());
    }
}

/// A copy of `config` safe to print.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    redact_backend(&mut config.oracle.primary);
    if let Some(secondary) = config.oracle.secondary.as_mut() {
        redact_backend(secondary);
    }
    config
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if !config.has_api_key() && config.oracle.primary.provider != "ollama" {
        warnings.push("No API key set (set LYSAI_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY)");
    }

    if config
        .oracle
        .secondary
        .as_ref()
        .is_some_and(|s| s.api_key.is_none() && s.provider != "ollama")
    {
        warnings.push("Secondary backend has no API key; failover will fail");
    }

    if !config.tool_server.url.starts_with("http://")
        && !config.tool_server.url.starts_with("https://")
    {
        warnings.push("tool_server.url is not an http(s) URL");
    }

    if config.memory.index == "none" {
        warnings.push("Similarity index disabled; runs will not learn from past episodes");
    }

    warnings
}

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!(
                "   Oracle:     {} / {}",
                config.oracle.primary.provider, config.oracle.primary.model
            );
            if let Some(secondary) = &config.oracle.secondary {
                println!("   Failover:   {} / {}", secondary.provider, secondary.model);
            }
            println!("   Max steps:  {}", config.orchestrator.max_steps);
            println!("   Memory:     {}", config.memory.resolved_db_path().display());
            println!("   Index:      {} ({})", config.memory.index, config.memory.embedder);
            println!("   Tools:      {}", config.tool_server.url);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let toml_str = toml::to_string_pretty(&redacted(&config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
