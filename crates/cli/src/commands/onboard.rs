//! `lysai onboard`: first-time setup.

use lysai_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();

    println!("🔎 LysAI: First-Time Setup");
    println!("==========================\n");

    let written = write_default_config(&config_dir)?;
    let config_path = config_dir.join("config.toml");

    if written {
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Edit {} and add your API key", config_path.display());
        println!("   2. Point [tool_server].url at your MCP database server");
        println!("   3. Run: lysai run \"How many customers do we have?\"\n");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    Ok(())
}

/// Write the default config into `dir`, creating it if needed.
/// Returns `false` when a config file is already there.
fn write_default_config(dir: &Path) -> std::io::Result<bool> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("config.toml");
    if path.exists() {
        return Ok(false);
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    Ok(true)
}
