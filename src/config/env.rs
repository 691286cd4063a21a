//! Environment variable layer of the configuration.

use super::ConfigError;
use super::utils::{env_parse, env_string};

/// Every configuration value present in the process environment.
#[derive(Debug, Default)]
pub(super) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub service_name: Option<String>,
    pub api_key: Option<String>,

    pub client_sample_rate: Option<u32>,
    pub engine_input_sample_rate: Option<u32>,
    pub engine_output_sample_rate: Option<u32>,

    pub engine_provider: Option<String>,
    pub engine_url: Option<String>,
    pub engine_api_key: Option<String>,
    pub engine_model: Option<String>,
    pub engine_voice: Option<String>,
    pub system_instruction: Option<String>,

    pub vad_start_secs: Option<f32>,
    pub vad_stop_secs: Option<f32>,
    pub vad_min_volume: Option<f32>,
    pub vad_speech_pad_ms: Option<u32>,
    pub vad_smoothing: Option<f32>,

    pub cors_allowed_origins: Option<String>,
    pub channel_capacity: Option<usize>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_string("HOST"),
            port: env_parse("PORT")?,
            service_name: env_string("SERVICE_NAME"),
            api_key: env_string("API_KEY"),

            client_sample_rate: env_parse("CLIENT_SAMPLE_RATE")?,
            engine_input_sample_rate: env_parse("ENGINE_INPUT_SAMPLE_RATE")?,
            engine_output_sample_rate: env_parse("ENGINE_OUTPUT_SAMPLE_RATE")?,

            engine_provider: env_string("ENGINE_PROVIDER"),
            engine_url: env_string("ENGINE_URL"),
            engine_api_key: env_string("ENGINE_API_KEY"),
            engine_model: env_string("ENGINE_MODEL"),
            engine_voice: env_string("ENGINE_VOICE"),
            system_instruction: env_string("SYSTEM_INSTRUCTION"),

            vad_start_secs: env_parse("VAD_START_SECS")?,
            vad_stop_secs: env_parse("VAD_STOP_SECS")?,
            vad_min_volume: env_parse("VAD_MIN_VOLUME")?,
            vad_speech_pad_ms: env_parse("VAD_SPEECH_PAD_MS")?,
            vad_smoothing: env_parse("VAD_SMOOTHING")?,

            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            channel_capacity: env_parse("CHANNEL_CAPACITY")?,
        })
    }
}
