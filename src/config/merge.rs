//! Combines YAML, environment and defaults into a [`ServerConfig`].
//!
//! Priority (highest first): YAML, environment, defaults.

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{
    ConfigError, DEFAULT_CLIENT_SAMPLE_RATE, DEFAULT_ENGINE_SAMPLE_RATE, DEFAULT_ENGINE_URL,
    DEFAULT_ENGINE_VOICE, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SERVICE_NAME, ServerConfig,
};
use crate::core::engine::EngineConfig;
use crate::core::pipeline::DEFAULT_CHANNEL_CAPACITY;
use crate::core::tools::DEFAULT_SYSTEM_INSTRUCTION;
use crate::core::vad::VADConfig;

pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();

    let server = yaml.server.unwrap_or_default();
    let audio = yaml.audio.unwrap_or_default();
    let engine = yaml.engine.unwrap_or_default();
    let vad = yaml.vad.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();

    let api_key = server
        .api_key
        .or(env.api_key)
        .ok_or(ConfigError::MissingRequired("API_KEY"))?;
    let engine_api_key = engine
        .api_key
        .or(env.engine_api_key)
        .ok_or(ConfigError::MissingRequired("ENGINE_API_KEY"))?;

    let vad_defaults = VADConfig::default();
    let vad = VADConfig {
        start_secs: vad
            .start_secs
            .or(env.vad_start_secs)
            .unwrap_or(vad_defaults.start_secs),
        stop_secs: vad
            .stop_secs
            .or(env.vad_stop_secs)
            .unwrap_or(vad_defaults.stop_secs),
        min_volume: vad
            .min_volume
            .or(env.vad_min_volume)
            .unwrap_or(vad_defaults.min_volume),
        speech_pad_ms: vad
            .speech_pad_ms
            .or(env.vad_speech_pad_ms)
            .unwrap_or(vad_defaults.speech_pad_ms),
        smoothing: vad
            .smoothing
            .or(env.vad_smoothing)
            .unwrap_or(vad_defaults.smoothing),
    };

    let engine_config = EngineConfig {
        provider: engine
            .provider
            .or(env.engine_provider)
            .unwrap_or_else(|| "realtime".to_string()),
        url: engine
            .url
            .or(env.engine_url)
            .unwrap_or_else(|| DEFAULT_ENGINE_URL.to_string()),
        api_key: engine_api_key,
        model: engine.model.or(env.engine_model),
        voice: engine
            .voice
            .or(env.engine_voice)
            .unwrap_or_else(|| DEFAULT_ENGINE_VOICE.to_string()),
        input_sample_rate: audio
            .engine_input_sample_rate
            .or(env.engine_input_sample_rate)
            .unwrap_or(DEFAULT_ENGINE_SAMPLE_RATE),
        output_sample_rate: audio
            .engine_output_sample_rate
            .or(env.engine_output_sample_rate)
            .unwrap_or(DEFAULT_ENGINE_SAMPLE_RATE),
    };

    Ok(ServerConfig {
        host: server
            .host
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        service_name: server
            .service_name
            .or(env.service_name)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        api_key,
        client_sample_rate: audio
            .client_sample_rate
            .or(env.client_sample_rate)
            .unwrap_or(DEFAULT_CLIENT_SAMPLE_RATE),
        engine: engine_config,
        vad,
        system_instruction: engine
            .system_instruction
            .or(env.system_instruction)
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        cors_allowed_origins: security.cors_allowed_origins.or(env.cors_allowed_origins),
        channel_capacity: session
            .channel_capacity
            .or(env.channel_capacity)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
    })
}
