//! Configuration module for the voice bridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use voice_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod env;
mod merge;
pub mod utils;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::engine::EngineConfig;
use crate::core::pipeline::PipelineSettings;
use crate::core::vad::VADConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_SERVICE_NAME: &str = "voice-bridge";
pub const DEFAULT_CLIENT_SAMPLE_RATE: u32 = 16000;
pub const DEFAULT_ENGINE_SAMPLE_RATE: u32 = crate::core::engine::REALTIME_SAMPLE_RATE;
pub const DEFAULT_ENGINE_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_ENGINE_VOICE: &str = "alloy";

/// Startup configuration problems.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Invalid VAD configuration: {0}")]
    Vad(String),
}

/// Server configuration
///
/// Contains everything needed to run the bridge: listener settings, the
/// client shared secret, audio rates, the engine connection, VAD thresholds
/// and CORS policy.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Reported by the health endpoint
    pub service_name: String,
    /// Shared secret clients must offer as a WebSocket subprotocol
    pub api_key: String,

    // Audio
    pub client_sample_rate: u32,

    // Engine
    pub engine: EngineConfig,
    pub system_instruction: String,

    // Turn taking
    pub vad: VADConfig,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    /// Bound of each per-session channel
    pub channel_capacity: usize,
}

/// Zeroize the client secret when the configuration is dropped. The engine
/// key is cleared by `EngineConfig` itself.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// `.env` values are loaded into the environment in `main` before this
    /// is called.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with the environment as base.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed CORS origins. `None` means CORS is disabled; an empty list
    /// never occurs.
    pub fn cors_origins(&self) -> Option<CorsOrigins> {
        let raw = self.cors_allowed_origins.as_deref()?.trim();
        if raw == "*" {
            return Some(CorsOrigins::Any);
        }
        let origins = utils::split_csv(raw);
        if origins.is_empty() {
            None
        } else {
            Some(CorsOrigins::List(origins))
        }
    }

    /// Settings for each session pipeline.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            client_sample_rate: self.client_sample_rate,
            engine_input_sample_rate: self.engine.input_sample_rate,
            engine_output_sample_rate: self.engine.output_sample_rate,
            vad: self.vad.clone(),
            system_instruction: self.system_instruction.clone(),
            channel_capacity: self.channel_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}
