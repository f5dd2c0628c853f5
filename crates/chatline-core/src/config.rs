use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::stream::StreamProtocol;
use crate::theme::ThemeMode;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub endpoint: Option<String>,
    pub default_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub stream_protocol: Option<StreamProtocol>,
    pub mode: Option<ThemeMode>,
    /// Prefixed onto the first user message of every session.
    pub instructions: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            default_model: None,
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            stream_protocol: Some(StreamProtocol::default()),
            mode: Some(ThemeMode::default()),
            instructions: None,
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let mut config = Self::load().unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save()
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn stream_protocol(&self) -> StreamProtocol {
        self.stream_protocol.unwrap_or_default()
    }

    pub fn mode(&self) -> ThemeMode {
        self.mode.unwrap_or_default()
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("chatline"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}
