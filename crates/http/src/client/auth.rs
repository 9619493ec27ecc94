//! Authentication API client methods

use super::{ApiClient, ClientError};
use distributech_core::UserProfile;
use distributech_core::types::{
    Credentials, RefreshRequest, RefreshResponse, RegistrationRequest, TokenPair,
};
use reqwest::Method;
use serde_json::Value;

/// Endpoint paths, relative to the API root
pub mod paths {
    pub const TOKEN: &str = "/auth/token/";
    pub const TOKEN_REFRESH: &str = "/auth/token/refresh/";
    pub const ME: &str = "/users/me/";
    pub const USERS: &str = "/users/";
}

impl ApiClient {
    /// Exchange credentials for an access/refresh pair
    pub async fn obtain_token(&self, credentials: &Credentials) -> Result<TokenPair, ClientError> {
        let request = self.request(Method::POST, paths::TOKEN).json(credentials);
        self.execute(request).await
    }

    /// Exchange a refresh token for a new access token
    ///
    /// Sent without an `Authorization` header.
    pub async fn refresh_access_token(
        &self,
        refresh: &str,
    ) -> Result<RefreshResponse, ClientError> {
        let request = self
            .request(Method::POST, paths::TOKEN_REFRESH)
            .json(&RefreshRequest {
                refresh: refresh.to_string(),
            });
        self.execute(request).await
    }

    /// Fetch the profile that owns `access`
    pub async fn fetch_profile(&self, access: &str) -> Result<UserProfile, ClientError> {
        let request = self.request(Method::GET, paths::ME).bearer_auth(access);
        self.execute(request).await
    }

    /// Create a new account
    pub async fn register(&self, registration: &RegistrationRequest) -> Result<Value, ClientError> {
        let request = self.request(Method::POST, paths::USERS).json(registration);
        self.execute(request).await
    }
}
