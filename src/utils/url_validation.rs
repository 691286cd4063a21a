//! URL validation for configured endpoints.
//!
//! Engine endpoints must be WebSocket URLs with a host. CORS origins must be
//! bare `http(s)://host[:port]` origins.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be ws or wss, got: {0}")]
    WebSocketRequired(String),

    #[error("URL scheme must be http or https, got: {0}")]
    HttpRequired(String),

    #[error("URL must have a host")]
    MissingHost,

    #[error("Origin must not contain a path, query or fragment: {0}")]
    NotAnOrigin(String),
}

/// Validate the engine WebSocket endpoint.
pub fn validate_engine_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(UrlValidationError::WebSocketRequired(other.to_string())),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }
    Ok(url)
}

/// Validate a CORS origin such as `https://app.example.com`.
pub fn validate_origin(origin: &str) -> Result<(), UrlValidationError> {
    let url = Url::parse(origin)?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlValidationError::HttpRequired(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(UrlValidationError::NotAnOrigin(origin.to_string()));
    }
    if origin.ends_with('/') {
        return Err(UrlValidationError::NotAnOrigin(origin.to_string()));
    }
    Ok(())
}
