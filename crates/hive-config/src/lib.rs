//! Configuration for the hive gateway: model, discovery and persistence.

pub mod config;
pub mod loader;

pub use config::{
    AgentConfig, ChannelsConfig, Config, ConfigError, ConfigResult, DiscordConfig, GatewayConfig,
    LlmConfig, LogLevel, LoggingConfig, SessionsConfig, TelegramConfig, DEFAULT_SYSTEM_PROMPT,
};
pub use loader::{expand_env_vars, resolve_path};

use std::path::PathBuf;

/// 获取 HiveClaw 配置目录路径
pub fn hive_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hiveclaw"))
}

/// 获取默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    hive_dir().map(|dir| dir.join("config.json"))
}

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
