//! Configuration loading
//!
//! Layered resolution, highest priority first:
//! 1. Environment variables
//! 2. TOML config file (`--config` path, else ./mailforge.toml if present)
//! 3. Compiled defaults
//!
//! Validation is separate from loading so startup can fail fast with a
//! complete picture of what is missing.

use crate::error::{Error, Result};
use crate::services::generator::{
    DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
};
use crate::services::mailer::{TlsMode, DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER, DEFAULT_SUBJECT};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Config file consulted when no --config path is given
const DEFAULT_CONFIG_PATH: &str = "mailforge.toml";

/// SMTP delivery settings (`[smtp]` table)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Relay hostname
    pub server: String,

    /// Relay port
    pub port: u16,

    /// Authentication username; empty disables authentication
    pub username: String,

    /// Authentication password
    pub password: String,

    /// Sender address; empty falls back to the username
    pub from: String,

    /// Session security
    pub tls: TlsMode,

    /// Subject line applied to every message
    pub subject: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SMTP_SERVER.to_string(),
            port: DEFAULT_SMTP_PORT,
            username: String::new(),
            password: String::new(),
            from: String::new(),
            tls: TlsMode::default(),
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

/// Content generation settings (`[generation]` table)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// API key for the generation service
    pub api_key: String,

    /// Chat-completions endpoint base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature for generation requests
    pub temperature: f64,

    /// Upper bound on tokens generated per message
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub generation: GenerationConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                parse_config(&content, &path.display().to_string())?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    let content = std::fs::read_to_string(default_path).map_err(|e| {
                        Error::Config(format!("Failed to read {}: {}", DEFAULT_CONFIG_PATH, e))
                    })?;
                    info!("Loaded config file: {}", DEFAULT_CONFIG_PATH);
                    parse_config(&content, DEFAULT_CONFIG_PATH)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env()?;

        Ok(config)
    }

    /// Overlay environment variables onto file/default values
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("GROQ_API_KEY") {
            self.generation.api_key = value;
        }
        if let Ok(value) = std::env::var("GROQ_BASE_URL") {
            self.generation.base_url = value;
        }
        if let Ok(value) = std::env::var("GROQ_MODEL") {
            self.generation.model = value;
        }

        if let Ok(value) = std::env::var("SMTP_SERVER") {
            self.smtp.server = value;
        }
        if let Ok(value) = std::env::var("SMTP_PORT") {
            self.smtp.port = value
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("Invalid SMTP_PORT: {}", value)))?;
        }
        if let Ok(value) = std::env::var("SMTP_USERNAME") {
            self.smtp.username = value;
        }
        if let Ok(value) = std::env::var("SMTP_PASSWORD") {
            self.smtp.password = value;
        }
        if let Ok(value) = std::env::var("SMTP_FROM") {
            self.smtp.from = value;
        }
        if let Ok(value) = std::env::var("SMTP_TLS") {
            self.smtp.tls = TlsMode::from_str(&value)
                .ok_or_else(|| Error::Config(format!("Invalid SMTP_TLS: {}", value)))?;
        }
        if let Ok(value) = std::env::var("SMTP_SUBJECT") {
            self.smtp.subject = value;
        }

        Ok(())
    }

    /// Check that everything dispatch needs is present
    pub fn validate(&self) -> Result<()> {
        if self.generation.api_key.is_empty() {
            return Err(Error::Config(
                "Generation API key is required: set GROQ_API_KEY or [generation] api_key"
                    .to_string(),
            ));
        }

        if self.smtp.username.is_empty() && self.smtp.from.is_empty() {
            return Err(Error::Config(
                "SMTP sender is required: set SMTP_USERNAME/SMTP_FROM or [smtp] username/from"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_config(content: &str, source: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse {}: {}", source, e)))
}
