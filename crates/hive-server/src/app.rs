//! Wiring: config file to store, provider, runner and gateway.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{error, info, warn};

use hive_channels::ConversationRunner;
use hive_config::{Config, LlmConfig};
use hive_gateway::{Gateway, GatewaySettings};
use hive_llm::{
    providers::{anthropic, openrouter},
    AnthropicProvider, ChatOptions, EchoProvider, LLMProvider, OpenRouterProvider, ProviderConfig,
};
use hive_session::{SessionStore, SessionStoreConfig};

use crate::cli::ServeArgs;
use crate::logging::init_logging;

/// Load config, apply CLI overrides, and serve until Ctrl-C
pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config_path = args
        .config
        .as_deref()
        .map(hive_config::resolve_path)
        .transpose()?;
    let mut config = Config::load(config_path.as_deref())
        .await
        .context("Failed to load config")?;

    if let Some(host) = args.host {
        config.gateway.host = host;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let level = match args.log_level {
        Some(level) => level,
        None if args.debug => "debug".to_string(),
        None => config.logging.level.as_str().to_string(),
    };
    init_logging(&level, config.logging.json)?;

    let provider = build_provider(&config.llm)?;
    info!("Starting Hive Server v{}", hive_core::VERSION);
    info!("LLM Configuration:");
    info!("  Provider: {}", provider.provider_id());
    info!("  Model: {}", provider.metadata().default_model);
    if args.debug {
        tracing::debug!("  Gateway: {:?}", config.gateway);
        tracing::debug!("  Sessions: {:?}", config.sessions);
    }

    let store = Arc::new(SessionStore::with_config(SessionStoreConfig {
        max_sessions: config.sessions.max_sessions,
    }));
    let runner = ConversationRunner::new(store, provider).with_options(chat_options(&config.llm));
    let gateway = Gateway::new(gateway_settings(&config), runner);

    gateway.run(shutdown_signal()).await?;
    Ok(())
}

/// Write the default config file
pub async fn init(config: Option<String>, force: bool) -> anyhow::Result<PathBuf> {
    let path = match config {
        Some(path) => hive_config::resolve_path(&path)?,
        None => hive_config::default_config_path().context("Cannot determine home directory")?,
    };

    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }

    Config::default().save(&path).await?;
    Ok(path)
}

/// Pick the provider named in config. Without an API key the gateway still
/// runs, answering with the echo provider.
pub fn build_provider(llm: &LlmConfig) -> anyhow::Result<Arc<dyn LLMProvider>> {
    if llm.provider == "echo" {
        return Ok(Arc::new(EchoProvider::new()));
    }

    let Some(api_key) = llm.resolve_api_key() else {
        warn!(
            "No API key for provider '{}', falling back to echo",
            llm.provider
        );
        return Ok(Arc::new(EchoProvider::new()));
    };

    let provider: Arc<dyn LLMProvider> = match llm.provider.as_str() {
        "anthropic" => {
            let config = provider_config(llm, "anthropic", anthropic::DEFAULT_BASE_URL, api_key);
            Arc::new(AnthropicProvider::with_config(config)?)
        }
        "openrouter" => {
            let config = provider_config(llm, "openrouter", openrouter::DEFAULT_BASE_URL, api_key);
            Arc::new(OpenRouterProvider::with_config(config)?)
        }
        other => bail!("Unknown LLM provider: {other}"),
    };
    Ok(provider)
}

fn provider_config(llm: &LlmConfig, id: &str, default_base_url: &str, api_key: String) -> ProviderConfig {
    let base_url = llm
        .base_url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| default_base_url.to_string());

    ProviderConfig::new(id, base_url)
        .with_api_key(api_key)
        .with_model(llm.model.clone())
        .with_max_tokens(llm.max_tokens)
        .with_timeout(llm.timeout())
}

pub fn chat_options(llm: &LlmConfig) -> ChatOptions {
    let mut options = ChatOptions::default()
        .with_max_tokens(llm.max_tokens)
        .with_temperature(llm.temperature);
    if !llm.model.trim().is_empty() {
        options = options.with_model(llm.model.clone());
    }
    if !llm.system_prompt.trim().is_empty() {
        options = options.with_system_prompt(llm.system_prompt.clone());
    }
    options
}

pub fn gateway_settings(config: &Config) -> GatewaySettings {
    GatewaySettings {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
        token: config.gateway.token.clone().filter(|t| !t.is_empty()),
        queue_capacity: config.gateway.queue_capacity,
        max_connections: config.gateway.max_connections,
        idle_ttl: config.sessions.idle_ttl_secs.map(Duration::from_secs),
        sweep_interval: Duration::from_secs(config.sessions.sweep_interval_secs),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received");
}
