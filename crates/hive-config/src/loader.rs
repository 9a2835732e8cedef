use crate::config::{Config, ConfigError, ConfigResult};
use crate::{default_config_path, expand_tilde};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

impl Config {
    /// Load from `path`, or from the first existing default location.
    /// With nothing to read, returns the defaults.
    pub async fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let config = match path {
            Some(path) => {
                info!("Loading config from {:?}", path);
                let content = tokio::fs::read_to_string(&path).await?;
                Self::from_json(&content)?
            }
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a config document after expanding `${VAR}` references
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let content = expand_env_vars(content)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// First existing candidate: `~/.hiveclaw/config.json`, `./config.json`,
    /// `./hiveclaw.json`
    pub fn discover() -> Option<PathBuf> {
        candidate_paths().into_iter().find(|p| p.is_file())
    }

    /// Write pretty JSON, creating parent directories
    pub async fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, content).await?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.gateway.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        if self.gateway.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "Gateway queueCapacity must be at least 1".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "LLM temperature must be within [0, 2], got {}",
                self.llm.temperature
            )));
        }

        Ok(())
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(home) = default_config_path() {
        paths.push(home);
    }
    paths.push(PathBuf::from("./config.json"));
    paths.push(PathBuf::from("./hiveclaw.json"));
    paths
}

/// Resolve a user-supplied path, expanding a leading `~/`
pub fn resolve_path(path: &str) -> ConfigResult<PathBuf> {
    expand_tilde(path)
        .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
}

/// 展开环境变量 ${VAR} 或 ${VAR:-default}
pub fn expand_env_vars(content: &str) -> ConfigResult<String> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;

    let mut missing: Option<String> = None;
    let expanded = re.replace_all(content, |caps: &Captures| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            },
        }
    });

    if let Some(name) = missing {
        return Err(ConfigError::EnvVarNotFound(name));
    }
    debug!("Expanded environment references in config");
    Ok(expanded.into_owned())
}
