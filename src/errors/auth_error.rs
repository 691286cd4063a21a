use thiserror::Error;

use super::pipeline_error::CLOSE_POLICY_VIOLATION;

/// Handshake authentication failures.
///
/// Any variant results in the connection being closed with code 1008 before a
/// session is created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The client did not offer any `Sec-WebSocket-Protocol` value.
    #[error("Missing subprotocol token")]
    MissingToken,

    /// None of the offered subprotocol values matched the shared secret.
    #[error("Invalid API key")]
    InvalidToken,

    /// The subprotocol header could not be read as text.
    #[error("Malformed subprotocol header: {0}")]
    MalformedHeader(String),
}

impl AuthError {
    /// WebSocket close code sent to the client.
    pub fn close_code(&self) -> u16 {
        CLOSE_POLICY_VIOLATION
    }

    /// Close reason sent to the client. Identical for every variant.
    pub fn close_reason(&self) -> &'static str {
        "Invalid API key"
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_close_code() {
        assert_eq!(AuthError::MissingToken.close_code(), 1008);
        assert_eq!(AuthError::InvalidToken.close_code(), 1008);
        assert_eq!(
            AuthError::MalformedHeader("x".to_string()).close_reason(),
            "Invalid API key"
        );
    }

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::InvalidToken.to_string(), "Invalid API key");
        assert_eq!(
            AuthError::MissingToken.to_string(),
            "Missing subprotocol token"
        );
    }
}
