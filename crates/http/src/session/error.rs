//! Session error types

use super::store::StoreError;
use crate::client::error::ClientError;
use thiserror::Error;

/// Fallback message when login fails without a server explanation
pub const DEFAULT_LOGIN_ERROR: &str = "Invalid credentials";
/// Fallback message when registration fails without a server explanation
pub const DEFAULT_REGISTRATION_ERROR: &str = "Registration failed";

#[derive(Debug, Error)]
pub enum SessionError {
    /// Login rejected; the session was left untouched
    #[error("Login failed: {0}")]
    Credentials(String),

    /// The refresh token was rejected; the session has been cleared
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The access token could not be turned into a profile; the session has been cleared
    #[error("Failed to load user profile: {0}")]
    ProfileFetch(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    /// The server kept rejecting the request after a refresh; the session has been cleared
    #[error("Login required: {0}")]
    LoginRequired(String),

    /// No usable token is held
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token storage error: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Network(#[from] ClientError),
}

impl SessionError {
    /// Whether the caller should send the user back to the login entry point
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::RefreshFailed(_)
                | Self::ProfileFetch(_)
                | Self::LoginRequired(_)
                | Self::NotAuthenticated
        )
    }

    /// Message the server put in its error body, if it answered with one
    pub fn server_detail(&self) -> Option<String> {
        match self {
            Self::Network(err) => err.server_detail(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_requires_login() {
        assert!(SessionError::RefreshFailed("401".into()).requires_login());
        assert!(SessionError::NotAuthenticated.requires_login());
        assert!(!SessionError::Credentials("nope".into()).requires_login());
        assert!(!SessionError::Registration("taken".into()).requires_login());
    }

    #[test]
    fn test_server_detail_from_network_error() {
        let err = SessionError::from(ClientError::from_status(
            StatusCode::NOT_FOUND,
            r#"{"error": "User not found"}"#.into(),
        ));
        assert_eq!(err.server_detail().as_deref(), Some("User not found"));
        assert_eq!(SessionError::NotAuthenticated.server_detail(), None);
    }
}
