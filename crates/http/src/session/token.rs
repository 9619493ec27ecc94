//! Access token inspection
//!
//! The client never verifies token signatures; it only reads the `exp` claim
//! to decide whether a refresh is due before sending a request. The server
//! remains the authority and a stale decision is caught by the 401 fallback.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Expiration time (as UTC timestamp)
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
}

/// Decode the claims of a JWT without checking its signature
pub fn decode_claims(token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
}

/// Expiry of a token in epoch seconds, `None` when it cannot be decoded
pub fn expiry_of(token: &str) -> Option<i64> {
    match decode_claims(token) {
        Ok(claims) => Some(claims.exp),
        Err(e) => {
            debug!(error = %e, "Access token has no readable expiry");
            None
        }
    }
}

/// Whether an expiry lies at or before `now`
///
/// An unknown expiry counts as valid.
pub fn is_expired(expiry: Option<i64>, now: DateTime<Utc>) -> bool {
    expiry.is_some_and(|exp| exp <= now.timestamp())
}
