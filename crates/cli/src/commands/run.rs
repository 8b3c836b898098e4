//! `lysai run`: answer one question end to end.

use crate::wiring::{load_config, pipeline_memory};
use lysai_agent::{PipelineRunner, RunResult};
use lysai_config::AppConfig;
use lysai_core::ToolServer;
use lysai_tools::McpToolServer;
use std::sync::Arc;

/// Rows printed under the answer.
const PREVIEW_ROWS: usize = 10;

pub async fn run(
    question: &str,
    max_steps: Option<u32>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;

    if let Some(steps) = max_steps {
        if steps == 0 {
            return Err("--max-steps must be at least 1".into());
        }
        config.orchestrator.max_steps = steps;
    }

    if !config.has_api_key() && config.oracle.primary.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LYSAI_API_KEY=...        (generic)");
        eprintln!("    OPENROUTER_API_KEY=...   (OpenRouter)");
        eprintln!("    OPENAI_API_KEY=...       (OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let (store, index) = pipeline_memory(&config).await;
    let oracle = lysai_providers::build_oracle(&config.oracle);
    let tools: Arc<dyn ToolServer> = Arc::new(McpToolServer::from_config(&config.tool_server));

    let runner = PipelineRunner::from_config(&config, oracle, tools, store, index);

    if !json {
        eprintln!("  Thinking...");
    }
    let result = runner.run(question).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary(&result))?);
    } else {
        print_result(&result);
    }

    if result.is_success() {
        Ok(())
    } else {
        Err(result
            .state
            .real_error()
            .unwrap_or("run ended without an answer")
            .to_string()
            .into())
    }
}

/// Machine-readable view of a finished run.
fn summary(result: &RunResult) -> serde_json::Value {
    let state = &result.state;
    serde_json::json!({
        "question": state.question(),
        "outcome": result.outcome,
        "episode_id": result.episode_id(),
        "steps": state.step(),
        "plan": state.plan,
        "sql": state.sql,
        "row_count": state.rows.as_ref().map(Vec::len),
        "rows": state.rows,
        "insight": result.insight(),
        "report_path": result.report_path(),
        "error": state.real_error(),
        "decisions": state
            .history()
            .iter()
            .filter_map(|entry| entry.decision())
            .map(|action| action.to_string())
            .collect::<Vec<_>>(),
    })
}

fn print_result(result: &RunResult) {
    let state = &result.state;
    let decisions: Vec<String> = state
        .history()
        .iter()
        .filter_map(|entry| entry.decision())
        .map(|action| action.to_string())
        .collect();

    println!();
    println!("  Question:  {}", state.question());
    println!("  Outcome:   {}", result.outcome.as_str());
    println!("  Steps:     {} ({})", state.step(), decisions.join(" -> "));
    if let Some(id) = result.episode_id() {
        println!("  Episode:   #{id}");
    }

    if let Some(sql) = &state.sql {
        println!();
        println!("  SQL:");
        for line in sql.lines() {
            println!("    {line}");
        }
    }

    if let Some(rows) = &state.rows {
        println!();
        println!("  Rows: {}", rows.len());
        for row in rows.iter().take(PREVIEW_ROWS) {
            println!("    {}", serde_json::Value::Object(row.clone()));
        }
        if rows.len() > PREVIEW_ROWS {
            println!("    ... {} more", rows.len() - PREVIEW_ROWS);
        }
    }

    if let Some(insight) = result.insight() {
        println!();
        println!("  Insight:");
        println!("    {insight}");
    }

    if let Some(path) = result.report_path() {
        println!();
        println!("  Report:    {path}");
    }

    if let Some(error) = state.real_error() {
        println!();
        println!("  Error:     {error}");
    }
    println!();
}
