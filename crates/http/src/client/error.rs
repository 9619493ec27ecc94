//! Client error types

use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// True when the server answered (as opposed to a transport failure)
    pub fn is_status(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. }
                | Self::AuthenticationFailed(_)
                | Self::NotFound(_)
                | Self::BadRequest(_)
                | Self::Forbidden(_)
        )
    }

    /// Raw response body of a status error
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::ServerError { message, .. }
            | Self::AuthenticationFailed(message)
            | Self::NotFound(message)
            | Self::BadRequest(message)
            | Self::Forbidden(message) => Some(message),
            _ => None,
        }
    }

    /// Human-readable message the server put in its error body
    ///
    /// The API reports errors as `{"detail": ".."}` (auth) or `{"error": ".."}`
    /// (chat actions).
    pub fn server_detail(&self) -> Option<String> {
        let body = self.body()?;
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        ["detail", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(|v| v.as_str()))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        let err = ClientError::from_status(StatusCode::UNAUTHORIZED, "nope".into());
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        assert!(err.is_status());

        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "down".into());
        assert!(matches!(err, ClientError::ServerError { status: 502, .. }));
        assert!(err.is_status());

        let err = ClientError::Configuration("base_url is required".into());
        assert!(!err.is_status());
        assert_eq!(err.body(), None);
    }

    #[test]
    fn test_server_detail_extraction() {
        let err = ClientError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"detail":"No active account found with the given credentials"}"#.into(),
        );
        assert_eq!(
            err.server_detail().as_deref(),
            Some("No active account found with the given credentials")
        );

        let err = ClientError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"error":"User with username ghost not found"}"#.into(),
        );
        assert_eq!(
            err.server_detail().as_deref(),
            Some("User with username ghost not found")
        );

        let err = ClientError::from_status(StatusCode::BAD_REQUEST, "plain text".into());
        assert_eq!(err.server_detail(), None);
        assert_eq!(err.body(), Some("plain text"));
    }
}
