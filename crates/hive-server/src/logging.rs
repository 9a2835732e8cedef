//! 结构化日志初始化
//!
//! `RUST_LOG` wins over the configured level when set.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_line_number(true);
        registry.with(layer).try_init()?;
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true);
        registry.with(layer).try_init()?;
    }

    tracing::debug!("Log level set to: {}", level);
    Ok(())
}

fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {level}"))
}
