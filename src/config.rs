/// Pipeline configuration loaded from TOML
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration against a local backend.

use crate::compress::{ImageCompressionOptions, VideoCompressionOptions};
use crate::constants::{DEFAULT_API_BASE_URL, TOKEN_ENV_VAR};
use crate::engine::EngineSource;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub token: Option<String>,
    pub engine: EngineSource,
    pub image: ImageCompressionOptions,
    pub video: VideoCompressionOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            engine: EngineSource::default(),
            image: ImageCompressionOptions::default(),
            video: VideoCompressionOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads `path`, or returns the defaults when no path is given. The token
    /// falls back to the environment when the file does not set one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(PipelineError::FileNotFound(path.to_path_buf()));
                }
                let text = std::fs::read_to_string(path)?;
                debug!("Loaded configuration from {:?}", path);
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        if config.token.is_none() {
            config.token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(PipelineError::Config("api_base_url must not be empty".to_string()));
        }
        self.image.validate()?;
        self.video.validate()
    }
}
