//! Subprotocol token authentication for the client WebSocket.
//!
//! Browsers cannot set custom headers on a WebSocket handshake, so the shared
//! secret travels as one of the offered `Sec-WebSocket-Protocol` values.

use axum::http::HeaderMap;
use axum::http::header::SEC_WEBSOCKET_PROTOCOL;
use subtle::ConstantTimeEq;

use crate::errors::{AuthError, AuthResult};

/// Every subprotocol the client offered, in offer order.
///
/// The header may repeat and each value may hold a comma separated list.
pub fn offered_subprotocols(headers: &HeaderMap) -> AuthResult<Vec<String>> {
    let mut offered = Vec::new();
    for value in headers.get_all(SEC_WEBSOCKET_PROTOCOL) {
        let value = value
            .to_str()
            .map_err(|e| AuthError::MalformedHeader(e.to_string()))?;
        offered.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        );
    }
    Ok(offered)
}

/// Find the offered token equal to `api_key`.
///
/// Every offer is compared so timing does not reveal which position matched.
pub fn authorize_subprotocol(offered: &[String], api_key: &str) -> AuthResult<String> {
    if offered.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let mut matched = None;
    for token in offered {
        let equal: bool = token.as_bytes().ct_eq(api_key.as_bytes()).into();
        if equal && matched.is_none() {
            matched = Some(token.clone());
        }
    }
    matched.ok_or(AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_offered_subprotocols_splits_lists() {
        let offered = offered_subprotocols(&headers(&["chat, secret", "other"])).unwrap();
        assert_eq!(offered, vec!["chat", "secret", "other"]);
    }

    #[test]
    fn test_offered_subprotocols_empty() {
        assert!(offered_subprotocols(&HeaderMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_offered_subprotocols_rejects_non_text() {
        let mut headers = HeaderMap::new();
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_bytes(&[0xe2, 0x82]).unwrap(),
        );
        match offered_subprotocols(&headers) {
            Err(AuthError::MalformedHeader(_)) => {}
            other => panic!("Expected MalformedHeader, got {other:?}"),
        }
    }

    #[test]
    fn test_authorize_matching_token() {
        let offered = vec!["chat".to_string(), "secret".to_string()];
        assert_eq!(authorize_subprotocol(&offered, "secret").unwrap(), "secret");
    }

    #[test]
    fn test_authorize_wrong_token() {
        let offered = vec!["wrong".to_string()];
        assert_eq!(
            authorize_subprotocol(&offered, "secret"),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_authorize_prefix_is_not_a_match() {
        let offered = vec!["secre".to_string(), "secret-and-more".to_string()];
        assert_eq!(
            authorize_subprotocol(&offered, "secret"),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_authorize_no_offer() {
        assert_eq!(
            authorize_subprotocol(&[], "secret"),
            Err(AuthError::MissingToken)
        );
    }
}
