use super::token;
use chrono::{DateTime, Utc};
use distributech_core::UserProfile;

/// Client-held authentication state
///
/// `authenticated_user` is only ever set while `access_token` is set and the
/// profile endpoint accepted that token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry_epoch_seconds: Option<i64>,
    pub authenticated_user: Option<UserProfile>,
    /// User-facing message from the last failed login, registration or refresh
    pub last_error: Option<String>,
}

impl Session {
    /// Session holding a freshly issued or restored token pair
    pub(crate) fn with_tokens(access: Option<String>, refresh: Option<String>) -> Self {
        let expiry_epoch_seconds = access.as_deref().and_then(token::expiry_of);
        Self {
            access_token: access,
            refresh_token: refresh,
            expiry_epoch_seconds,
            authenticated_user: None,
            last_error: None,
        }
    }

    /// Empty session carrying only an error message
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            last_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.authenticated_user.is_some()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.authenticated_user.as_ref()
    }

    /// Whether the access token is past its `exp` claim at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_some() && token::is_expired(self.expiry_epoch_seconds, now)
    }
}

/// Lifecycle of the access token as seen by the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No access token held
    Absent,
    Valid,
    /// Past expiry, refresh not yet attempted
    Expired,
    /// A refresh call is in flight
    Refreshing,
    /// The last refresh failed and the session was cleared
    Failed,
}

/// Notifications for session consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    TokenRefreshed,
    LoggedOut,
    /// The session ended without the user asking; send them back to login
    LoginRequired { reason: String },
}
