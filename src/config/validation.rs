use super::{ConfigError, ServerConfig};
use crate::core::engine::EngineProvider;
use crate::utils::{validate_engine_url, validate_origin};

/// Validate the merged configuration before the server starts.
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_secrets(config)?;
    validate_sample_rates(config)?;
    validate_engine(config)?;
    validate_cors(config.cors_allowed_origins.as_deref())?;

    config
        .vad
        .validate()
        .map_err(|e| ConfigError::Vad(e.to_string()))?;

    if config.channel_capacity == 0 {
        return Err(ConfigError::InvalidValue {
            key: "CHANNEL_CAPACITY",
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

fn validate_secrets(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::MissingRequired("API_KEY"));
    }
    if config.engine.api_key.trim().is_empty() {
        return Err(ConfigError::MissingRequired("ENGINE_API_KEY"));
    }
    // Used verbatim as a Sec-WebSocket-Protocol token.
    if !config
        .api_key
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b',')
    {
        return Err(ConfigError::InvalidValue {
            key: "API_KEY",
            reason: "must be printable ASCII without spaces or commas".to_string(),
        });
    }
    Ok(())
}

fn validate_sample_rates(config: &ServerConfig) -> Result<(), ConfigError> {
    let rates = [
        ("CLIENT_SAMPLE_RATE", config.client_sample_rate),
        ("ENGINE_INPUT_SAMPLE_RATE", config.engine.input_sample_rate),
        ("ENGINE_OUTPUT_SAMPLE_RATE", config.engine.output_sample_rate),
    ];
    for (key, rate) in rates {
        if rate == 0 {
            return Err(ConfigError::InvalidValue {
                key,
                reason: "sample rate must be greater than 0".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_engine(config: &ServerConfig) -> Result<(), ConfigError> {
    if EngineProvider::parse(&config.engine.provider).is_none() {
        return Err(ConfigError::InvalidValue {
            key: "ENGINE_PROVIDER",
            reason: format!("unsupported provider '{}'", config.engine.provider),
        });
    }
    validate_engine_url(&config.engine.url).map_err(|e| ConfigError::InvalidValue {
        key: "ENGINE_URL",
        reason: e.to_string(),
    })?;
    if config.engine.voice.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "ENGINE_VOICE",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

pub(super) fn validate_cors(origins: Option<&str>) -> Result<(), ConfigError> {
    let Some(origins) = origins else {
        return Ok(());
    };
    if origins.trim() == "*" {
        return Ok(());
    }
    for origin in super::utils::split_csv(origins) {
        validate_origin(&origin).map_err(|e| ConfigError::InvalidValue {
            key: "CORS_ALLOWED_ORIGINS",
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
