//! Authenticated request path
//!
//! Before dispatch the current access token is attached, refreshed first if
//! it has expired. After dispatch, the first `401` of a request triggers one
//! refresh and one replay; a second `401` ends the session.

use crate::client::decode_response;
use crate::client::error::ClientError;
use crate::session::{SESSION_EXPIRED_MESSAGE, SessionError, SessionManager};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// HTTP client bound to a [`SessionManager`]
#[derive(Clone)]
pub struct SessionClient {
    session: SessionManager,
}

impl SessionClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Request builder for `path` under the API root, without credentials
    ///
    /// Pass it to [`send`](Self::send) or [`execute`](Self::execute) to have
    /// the token attached.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.session.api().request(method, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.execute(self.request(Method::GET, path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body))
            .await
    }

    /// Send a request and decode a successful body as `T`
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SessionError> {
        let response = self.send(request).await?;
        Ok(decode_response(response).await?)
    }

    /// Send a request with session handling, returning the raw response
    ///
    /// Error statuses other than `401` are returned untouched. Requests whose
    /// body cannot be cloned (streams) are not replayed.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, SessionError> {
        let replay = request.try_clone();

        let token = self.session.fresh_access_token().await?;
        let response = dispatch(request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(replay) = replay else {
            warn!("Request rejected with 401 and cannot be replayed");
            return Err(self.reject(response, token.as_deref()).await);
        };

        debug!("Request rejected with 401, refreshing and retrying once");
        let token = match self.session.refresh(token.as_deref()).await {
            Ok(token) => token,
            Err(SessionError::NotAuthenticated) => {
                self.session.expire_if(SESSION_EXPIRED_MESSAGE, |session| {
                    session.access_token == token
                });
                return Err(SessionError::LoginRequired(
                    "no refresh token available".into(),
                ));
            }
            Err(err) => return Err(err),
        };

        let response = dispatch(replay, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(self.reject(response, Some(&token)).await);
        }
        Ok(response)
    }

    /// End the session after a request sent with `sent` was refused for good
    ///
    /// A session that no longer holds `sent` was replaced meanwhile and is kept.
    async fn reject(&self, response: Response, sent: Option<&str>) -> SessionError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let reason = ClientError::from_status(status, body)
            .server_detail()
            .unwrap_or_else(|| "request rejected after token refresh".into());

        self.session.expire_if(SESSION_EXPIRED_MESSAGE, |session| {
            session.access_token.as_deref() == sent
        });
        SessionError::LoginRequired(reason)
    }
}

async fn dispatch(request: RequestBuilder, token: Option<&str>) -> Result<Response, ClientError> {
    let request = match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    };
    Ok(request.send().await?)
}
