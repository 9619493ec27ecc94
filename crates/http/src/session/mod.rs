//! Session store and token refresh protocol
//!
//! A [`SessionManager`] is the single owner of the client's authentication
//! state. Clones share that state, so one manager can be built at start-up
//! and handed to every consumer.
//!
//! Only three operations mutate the token pair: [`SessionManager::login`],
//! the refresh path used by [`SessionClient`], and [`SessionManager::logout`]
//! (or its involuntary twin when a refresh fails). Refreshes are serialized:
//! requests that find the token expired while another refresh is in flight
//! wait for it and reuse its result.

pub mod error;
pub mod state;
pub mod store;
pub mod token;

pub use error::SessionError;
pub use state::{Session, SessionEvent, TokenState};

use crate::client::ApiClient;
use crate::client::auth::paths;
use crate::interceptor::SessionClient;
use arc_swap::ArcSwap;
use chrono::Utc;
use distributech_core::UserProfile;
use distributech_core::types::{Credentials, RegistrationRequest};
use error::{DEFAULT_LOGIN_ERROR, DEFAULT_REGISTRATION_ERROR};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use store::{MemoryTokenStore, StoredTokens, TokenStore};
use tokio::sync::{Mutex, broadcast};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 32;

/// Message shown after the session ended underneath the user
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Owner of the access/refresh token pair and the signed-in profile
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: ArcSwap<Session>,
    refresh_lock: Mutex<()>,
    refreshing: AtomicBool,
    refresh_failed: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create an empty session backed by `store`
    ///
    /// Nothing is read from the store until [`restore`](Self::restore).
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                state: ArcSwap::from_pointee(Session::default()),
                refresh_lock: Mutex::new(()),
                refreshing: AtomicBool::new(false),
                refresh_failed: AtomicBool::new(false),
                events,
            }),
        }
    }

    /// Create a session whose tokens are never persisted
    pub fn in_memory(api: ApiClient) -> Self {
        Self::new(api, Arc::new(MemoryTokenStore::new()))
    }

    /// The unauthenticated client this session talks through
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Build an HTTP client that authenticates with this session
    pub fn client(&self) -> SessionClient {
        SessionClient::new(self.clone())
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        Session::clone(&self.inner.state.load())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.load().is_authenticated()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.state.load().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.state.load().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.load().authenticated_user.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.load().last_error.clone()
    }

    /// Where the access token stands right now
    pub fn token_state(&self) -> TokenState {
        if self.inner.refreshing.load(Ordering::Acquire) {
            return TokenState::Refreshing;
        }

        let session = self.inner.state.load();
        if session.access_token.is_none() {
            if self.inner.refresh_failed.load(Ordering::Acquire) {
                TokenState::Failed
            } else {
                TokenState::Absent
            }
        } else if session.is_expired_at(Utc::now()) {
            TokenState::Expired
        } else {
            TokenState::Valid
        }
    }

    /// Load persisted tokens and validate them against the profile endpoint
    ///
    /// Returns `Ok(false)` when no access token was persisted. An expired
    /// token is refreshed before the profile is fetched. Any failure leaves
    /// the session empty.
    pub async fn restore(&self) -> Result<bool, SessionError> {
        let stored = self.inner.store.load()?;
        if stored.access.is_none() {
            debug!("No persisted access token");
            return Ok(false);
        }

        info!("Restoring persisted session");
        let restored_refresh = stored.refresh.clone();
        self.inner
            .state
            .store(Arc::new(Session::with_tokens(stored.access, stored.refresh)));

        match self.client().get::<UserProfile>(paths::ME).await {
            Ok(profile) => {
                if self.accept_profile(profile) {
                    Ok(true)
                } else {
                    Err(SessionError::NotAuthenticated)
                }
            }
            Err(err) if err.requires_login() => Err(err),
            Err(err) => {
                warn!(error = %err, "Persisted session could not be validated");
                self.expire_if(SESSION_EXPIRED_MESSAGE, |session| {
                    session.refresh_token == restored_refresh
                });
                Err(SessionError::ProfileFetch(err.to_string()))
            }
        }
    }

    /// Exchange credentials for a token pair and load the user's profile
    ///
    /// On failure the server's `detail` message (or a generic one) is kept in
    /// [`last_error`](Self::last_error). Rejected credentials leave the
    /// session as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.set_last_error(None);

        let credentials = Credentials::new(username, password);
        let pair = match self.inner.api.obtain_token(&credentials).await {
            Ok(pair) => pair,
            Err(err) => {
                let message = err
                    .server_detail()
                    .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string());
                warn!(username, error = %err, "Login failed");
                self.set_last_error(Some(message.clone()));
                return Err(if err.is_status() {
                    SessionError::Credentials(message)
                } else {
                    SessionError::Network(err)
                });
            }
        };

        self.persist(&StoredTokens::new(&pair.access, &pair.refresh));
        self.inner.refresh_failed.store(false, Ordering::Release);
        self.inner.state.store(Arc::new(Session::with_tokens(
            Some(pair.access.clone()),
            Some(pair.refresh),
        )));

        match self.inner.api.fetch_profile(&pair.access).await {
            Ok(profile) => {
                if self.accept_profile(profile.clone()) {
                    info!(username, "Logged in");
                    Ok(profile)
                } else {
                    Err(SessionError::NotAuthenticated)
                }
            }
            Err(err) => {
                warn!(username, error = %err, "Profile fetch failed after login");
                self.clear_if(Some(format!("Failed to load user profile: {err}")), |session| {
                    session.access_token.as_deref() == Some(pair.access.as_str())
                });
                Err(SessionError::ProfileFetch(err.to_string()))
            }
        }
    }

    /// Drop every token and the profile, in memory and in storage
    pub fn logout(&self) {
        let previous = self.clear_if(None, |_| true).unwrap_or_default();
        self.inner.refresh_failed.store(false, Ordering::Release);
        info!(had_session = previous.access_token.is_some(), "Logged out");
        let _ = self.inner.events.send(SessionEvent::LoggedOut);
    }

    /// Create an account; the current session is not affected
    pub async fn register(&self, registration: &RegistrationRequest) -> Result<Value, SessionError> {
        self.set_last_error(None);

        match self.inner.api.register(registration).await {
            Ok(created) => {
                info!(username = %registration.username, "Account registered");
                Ok(created)
            }
            Err(err) => {
                let message = err
                    .server_detail()
                    .or_else(|| {
                        err.body()
                            .filter(|body| !body.trim().is_empty())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| DEFAULT_REGISTRATION_ERROR.to_string());
                warn!(username = %registration.username, error = %err, "Registration failed");
                self.set_last_error(Some(message.clone()));
                Err(if err.is_status() {
                    SessionError::Registration(message)
                } else {
                    SessionError::Network(err)
                })
            }
        }
    }

    /// Token to attach to the next request, refreshed first if it has expired
    ///
    /// An expired token with no refresh token to trade is returned as is; the
    /// server's 401 then ends the session.
    pub(crate) async fn fresh_access_token(&self) -> Result<Option<String>, SessionError> {
        let session = self.inner.state.load_full();
        let Some(access) = session.access_token.clone() else {
            return Ok(None);
        };

        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(access));
        }

        if session.refresh_token.is_none() {
            debug!("Access token expired and no refresh token is held");
            return Ok(Some(access));
        }

        debug!("Access token expired, refreshing before dispatch");
        self.refresh(Some(&access)).await.map(Some)
    }

    /// Trade the refresh token for a new access token
    ///
    /// `stale` is the access token the caller found unusable. If another
    /// caller already replaced it while this one waited for the lock, the
    /// replacement is returned without a second refresh call.
    pub(crate) async fn refresh(&self, stale: Option<&str>) -> Result<String, SessionError> {
        let _guard = self.inner.refresh_lock.lock().await;

        let current = self.inner.state.load_full();
        if let Some(access) = current
            .access_token
            .as_deref()
            .filter(|access| Some(*access) != stale && !current.is_expired_at(Utc::now()))
        {
            debug!("Reusing access token refreshed by a concurrent request");
            return Ok(access.to_string());
        }

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(SessionError::NotAuthenticated);
        };

        self.inner.refreshing.store(true, Ordering::Release);
        let result = self.inner.api.refresh_access_token(&refresh_token).await;
        self.inner.refreshing.store(false, Ordering::Release);

        match result {
            Ok(response) => {
                let access = response.access;
                let expiry = token::expiry_of(&access);

                let mut applied = false;
                self.inner.state.rcu(|session| {
                    applied = session.refresh_token.as_deref() == Some(refresh_token.as_str());
                    if applied {
                        Arc::new(Session {
                            access_token: Some(access.clone()),
                            expiry_epoch_seconds: expiry,
                            ..Session::clone(session)
                        })
                    } else {
                        Arc::clone(session)
                    }
                });

                if !applied {
                    debug!("Session ended during refresh, discarding new access token");
                    return Err(SessionError::NotAuthenticated);
                }

                self.persist(&StoredTokens::new(access.clone(), refresh_token));
                self.inner.refresh_failed.store(false, Ordering::Release);
                info!(expires_at = ?expiry, "Access token refreshed");
                let _ = self.inner.events.send(SessionEvent::TokenRefreshed);
                Ok(access)
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed");
                let ended = self.expire_if(SESSION_EXPIRED_MESSAGE, |session| {
                    session.refresh_token.as_deref() == Some(refresh_token.as_str())
                });
                if ended {
                    self.inner.refresh_failed.store(true, Ordering::Release);
                }
                Err(SessionError::RefreshFailed(err.to_string()))
            }
        }
    }

    /// End the session involuntarily and tell consumers to go to login
    ///
    /// Only happens while `is_current` holds. Callers pass a check on the
    /// tokens they acted on, so a late failure never ends a session that was
    /// replaced in the meantime. Returns whether the session was ended.
    pub(crate) fn expire_if(&self, reason: &str, is_current: impl Fn(&Session) -> bool) -> bool {
        let Some(previous) = self.clear_if(Some(reason.to_string()), is_current) else {
            debug!(reason, "Session replaced meanwhile, keeping it");
            return false;
        };

        if previous.access_token.is_some() || previous.refresh_token.is_some() {
            warn!(reason, "Session ended, login required");
            let _ = self.inner.events.send(SessionEvent::LoginRequired {
                reason: reason.to_string(),
            });
        }
        true
    }

    /// Attach a profile to the session if it still holds a token
    fn accept_profile(&self, profile: UserProfile) -> bool {
        let username = profile.username.clone();
        let mut applied = false;
        self.inner.state.rcu(|session| {
            applied = session.access_token.is_some();
            if applied {
                Arc::new(Session {
                    authenticated_user: Some(profile.clone()),
                    last_error: None,
                    ..Session::clone(session)
                })
            } else {
                Arc::clone(session)
            }
        });

        if applied {
            let _ = self.inner.events.send(SessionEvent::LoggedIn { username });
        } else {
            debug!("Session ended before the profile arrived");
        }
        applied
    }

    /// Reset to an empty session if `is_current` holds, returning the one it replaced
    fn clear_if(
        &self,
        last_error: Option<String>,
        is_current: impl Fn(&Session) -> bool,
    ) -> Option<Arc<Session>> {
        let next = Arc::new(last_error.map_or_else(Session::default, Session::failed));
        let mut previous = None;
        self.inner.state.rcu(|session| {
            if is_current(session) {
                previous = Some(Arc::clone(session));
                Arc::clone(&next)
            } else {
                previous = None;
                Arc::clone(session)
            }
        });

        let previous = previous?;
        if let Err(e) = self.inner.store.clear() {
            error!(error = %e, "Failed to clear persisted tokens");
        }
        Some(previous)
    }

    fn set_last_error(&self, message: Option<String>) {
        self.inner.state.rcu(|session| {
            Arc::new(Session {
                last_error: message.clone(),
                ..Session::clone(session)
            })
        });
    }

    fn persist(&self, tokens: &StoredTokens) {
        if let Err(e) = self.inner.store.save(tokens) {
            warn!(error = %e, "Failed to persist tokens, session kept in memory only");
        }
    }
}
