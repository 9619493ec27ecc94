//! DistribuTech HTTP client with session management
//!
//! [`ApiClient`] talks to the REST API without credentials. A
//! [`SessionManager`] owns the access/refresh token pair and the signed-in
//! profile, and hands out [`SessionClient`]s that attach the bearer token,
//! refresh it when it has expired, and retry once on `401 Unauthorized`.

#[macro_use]
extern crate tracing;

pub mod chat;
pub mod client;
pub mod interceptor;
pub mod session;

pub use chat::{ChatError, ChatService, ChatState};
pub use client::{ApiClient, ApiClientBuilder, error::ClientError};
pub use interceptor::SessionClient;
pub use session::{
    Session, SessionError, SessionEvent, SessionManager, TokenState,
    store::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore},
};
