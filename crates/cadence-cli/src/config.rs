//! Configuration file support

use cadence_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for cadence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Realtime model to negotiate
    pub model: Option<String>,
    /// Negotiation endpoint
    pub base_url: Option<String>,
    /// Capture chunk duration in milliseconds
    pub chunk_duration_ms: Option<u64>,
    /// API key (alternative to OPENAI_API_KEY)
    pub api_key: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CADENCE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, falling back to defaults with a warning on
    /// stderr when it cannot be read or parsed
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let defaults = SessionConfig::default();
        let default_config = Config {
            model: Some(defaults.model),
            base_url: Some(defaults.base_url),
            chunk_duration_ms: Some(defaults.chunk_duration.as_millis() as u64),
            api_key: None,
        };

        default_config.save()?;
        Ok(path)
    }

    /// Get the API key, checking config then env
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    /// Build a session config, with CLI overrides taking precedence
    pub fn session_config(&self, model: Option<String>, base_url: Option<String>) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(model) = model.or_else(|| self.model.clone()) {
            config = config.with_model(model);
        }
        if let Some(base_url) = base_url.or_else(|| self.base_url.clone()) {
            config = config.with_base_url(base_url);
        }
        if let Some(ms) = self.chunk_duration_ms {
            config = config.with_chunk_duration(Duration::from_millis(ms));
        }
        config
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# cadence configuration file
# Place at ~/.config/cadence/config.toml (Linux/Mac) or %APPDATA%\cadence\config.toml (Windows)

# Realtime model to negotiate
model = "gpt-4o-realtime-preview-2024-12-17"

# Negotiation endpoint
base_url = "https://api.openai.com/v1/realtime"

# Time between captured audio chunks, in milliseconds
chunk_duration_ms = 1000

# API key (optional - OPENAI_API_KEY is used otherwise)
# api_key = "sk-..."
"#
}
