use crate::error::{LudusError, Result};
use crate::mcp::protocol::DEFAULT_SERVER_COMMAND;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Global configuration loaded from `~/.ludus-mcp/config.toml`, with
/// environment variables taking precedence over the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GlobalConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ludus: LudusConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file_enabled: bool,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Settings for the remote Ludus range API, used only by the informational
/// health probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LudusConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
}

/// Settings for the managed MCP tool-server subprocess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpConfig {
    #[serde(default = "default_server_command")]
    pub command: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_server_command() -> String {
    DEFAULT_SERVER_COMMAND.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: false,
            file_path: None,
        }
    }
}

impl Default for LudusConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: String::new(),
            verify_ssl: default_verify_ssl(),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            env: HashMap::new(),
        }
    }
}

impl GlobalConfig {
    pub async fn load() -> Result<Self> {
        let config_dir = get_config_dir()?;
        let config_path = config_dir.join("config.toml");
        let mut config = Self::load_from_path(&config_path).await?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub async fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LUDUS_API_URL") {
            self.ludus.api_url = url;
        }
        if let Ok(key) = std::env::var("LUDUS_API_KEY") {
            self.ludus.api_key = key;
        }
        if let Ok(command) = std::env::var("LUDUS_MCP_COMMAND") {
            self.mcp.command = command;
        }
        if let Ok(level) = std::env::var("LUDUS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(LudusError::ConfigError(format!(
                "Invalid logging level: {}",
                self.logging.level
            )));
        }

        if self.mcp.command.trim().is_empty() {
            return Err(LudusError::ConfigError(
                "MCP server command must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn get_log_dir(&self) -> PathBuf {
        match &self.logging.file_path {
            Some(path) => PathBuf::from(path),
            None => {
                let config_dir = get_config_dir().unwrap_or_else(|_| PathBuf::from(".ludus-mcp"));
                config_dir.join("logs")
            }
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| LudusError::ConfigError("Could not determine home directory".to_string()))?;

    Ok(PathBuf::from(home_dir).join(".ludus-mcp"))
}
