//! `turnstone status` — Show configuration and provider health.

use turnstone_config::AppConfig;
use turnstone_core::Provider;
use turnstone_providers::OpenAiCompatProvider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    println!("Turnstone status");
    println!("  config dir:      {}", AppConfig::config_dir().display());
    println!("  base url:        {}", config.base_url);
    println!(
        "  api key:         {}",
        if config.has_api_key() { "configured" } else { "MISSING" }
    );
    println!("  agent model:     {}", config.models.agent);
    println!("  router model:    {}", config.models.router);
    println!("  compressor:      {}", config.models.compressor);
    println!("  scratchpad:      {}", config.scratchpad.backend);
    println!(
        "  limits:          {} steps, {}/{} tool calls, {} token context",
        config.limits.max_steps,
        config.limits.max_tool_calls_per_step,
        config.limits.max_total_tool_calls,
        config.limits.context_limit_tokens
    );

    match config.api_key {
        Some(key) => {
            let provider = OpenAiCompatProvider::new("openai_compat", &config.base_url, key);
            match provider.health_check().await {
                Ok(true) => println!("  provider:        reachable"),
                Ok(false) => println!("  provider:        unreachable"),
                Err(e) => println!("  provider:        error ({e})"),
            }
        }
        None => println!("  provider:        skipped (no API key)"),
    }

    Ok(())
}
