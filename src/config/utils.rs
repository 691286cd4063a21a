use std::env;
use std::str::FromStr;

use super::ConfigError;

/// Non-empty environment variable, trimmed.
pub(super) fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an environment variable, reporting the key on failure.
pub(super) fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                reason: format!("'{raw}': {e}"),
            }),
        None => Ok(None),
    }
}

/// Split a comma-separated list, dropping empty entries.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
