//! `turnstone init` — Write a default configuration file.

use turnstone_config::AppConfig;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");

    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;

    println!("Wrote default config to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set an API key: export TURNSTONE_API_KEY=sk-...");
    println!("     (or add api_key to the config file)");
    println!("  2. Run: turnstone chat -m \"hello\"");
    Ok(())
}
