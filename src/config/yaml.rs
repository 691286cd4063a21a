use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///   service_name: "voice-bridge"
///   api_key: "shared-secret"
///
/// audio:
///   client_sample_rate: 16000
///   engine_input_sample_rate: 24000
///   engine_output_sample_rate: 24000
///
/// engine:
///   provider: "realtime"
///   url: "wss://api.openai.com/v1/realtime"
///   api_key: "sk-..."
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   system_instruction: "You are a friendly AI assistant."
///
/// vad:
///   start_secs: 0.2
///   stop_secs: 0.5
///   min_volume: 0.4
///   speech_pad_ms: 300
///   smoothing: 0.2
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///
/// session:
///   channel_capacity: 256
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub audio: Option<AudioYaml>,
    pub engine: Option<EngineYaml>,
    pub vad: Option<VadYaml>,
    pub security: Option<SecurityYaml>,
    pub session: Option<SessionYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub service_name: Option<String>,
    /// Shared secret clients present as a WebSocket subprotocol
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub client_sample_rate: Option<u32>,
    pub engine_input_sample_rate: Option<u32>,
    pub engine_output_sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineYaml {
    pub provider: Option<String>,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VadYaml {
    pub start_secs: Option<f32>,
    pub stop_secs: Option<f32>,
    /// Normalized volume threshold (0.0 - 1.0)
    pub min_volume: Option<f32>,
    pub speech_pad_ms: Option<u32>,
    pub smoothing: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Comma-separated origins or "*"
    pub cors_allowed_origins: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub channel_capacity: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
