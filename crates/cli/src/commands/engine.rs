//! Wires a configured [`TurnRunner`] from the app config.

use std::sync::Arc;
use std::time::Duration;
use turnstone_agent::{ContextCompressor, TurnLimits, TurnRunner};
use turnstone_config::AppConfig;
use turnstone_core::{EventBus, Provider, SessionId, ToolRegistry};
use turnstone_gateway::{ExecutionGateway, SchemaCatalog};
use turnstone_providers::{OpenAiCompatProvider, RetryProvider};
use turnstone_router::IntentRouter;
use turnstone_scratchpad::{FileScratchpad, InMemoryScratchpad, ScratchpadStore};
use turnstone_tools::{
    register_scratchpad_tools, SCRATCHPAD_DOMAIN, SCRATCHPAD_DOMAIN_DESCRIPTION,
};

pub fn build_runner(
    config: &AppConfig,
    session: &SessionId,
    event_bus: Arc<EventBus>,
) -> Result<TurnRunner, Box<dyn std::error::Error>> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        format!(
            "No API key configured. Set TURNSTONE_API_KEY (or OPENAI_API_KEY), or add \
             api_key to {}",
            AppConfig::config_dir().join("config.toml").display()
        )
    })?;

    let transport = Arc::new(OpenAiCompatProvider::with_timeout(
        "openai_compat",
        &config.base_url,
        api_key,
        Duration::from_secs(config.provider.request_timeout_secs),
    ));
    let provider: Arc<dyn Provider> = Arc::new(
        RetryProvider::new(transport)
            .with_max_retries(config.provider.max_retries)
            .with_base_delay(Duration::from_millis(config.provider.retry_base_delay_ms)),
    );

    let scratchpad: Arc<dyn ScratchpadStore> = match config.scratchpad.backend.as_str() {
        "file" => Arc::new(FileScratchpad::new(config.scratchpad_dir())),
        _ => Arc::new(InMemoryScratchpad::new()),
    };

    let mut registry = ToolRegistry::new()
        .with_timeout(Duration::from_secs(config.limits.tool_timeout_secs))
        .with_event_bus(event_bus.clone());
    register_scratchpad_tools(&mut registry, scratchpad.clone(), session.clone());
    let registry = Arc::new(registry);

    let gateway = Arc::new(ExecutionGateway::new(
        SchemaCatalog::from_definitions(&registry.definitions()),
        scratchpad.clone(),
    ));

    let router = Arc::new(
        IntentRouter::new(
            provider.clone(),
            &config.models.router,
            vec![(
                SCRATCHPAD_DOMAIN.to_string(),
                SCRATCHPAD_DOMAIN_DESCRIPTION.to_string(),
            )],
        )
        .with_calibration_threshold(config.router.calibration_threshold)
        .with_fast_path_max_chars(config.router.fast_path_max_chars)
        .with_classify_max_chars(config.router.classify_max_chars),
    );

    let compressor = Arc::new(
        ContextCompressor::new(provider.clone(), scratchpad.clone(), &config.models.compressor)
            .with_context_limit(config.limits.context_limit_tokens)
            .with_temperature(config.temperatures.compress),
    );

    let limits = TurnLimits {
        max_steps: config.limits.max_steps,
        max_tool_calls_per_step: config.limits.max_tool_calls_per_step,
        max_total_tool_calls: config.limits.max_total_tool_calls,
        context_limit_tokens: config.limits.context_limit_tokens,
        user_input_limit_tokens: config.limits.user_input_limit_tokens,
        tool_output_limit_tokens: config.limits.tool_output_limit_tokens,
    };

    let mut runner = TurnRunner::new(provider, router, compressor, registry, gateway, scratchpad)
        .with_model(&config.models.agent)
        .with_temperature(config.temperatures.agent)
        .with_limits(limits)
        .with_event_bus(event_bus);

    // Long-term memory stays off unless enabled; the durability policy
    // only matters when it is on.
    if !config.memory.enabled {
        runner = runner.with_durability_policy(Arc::new(turnstone_agent::NeverDurable));
    }

    Ok(runner)
}
