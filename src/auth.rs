// Identity-service contract shared by the blocking and async sessions.
//
// Only two things are needed from the identity service: exchange a
// long-lived credential (API key or refresh token) for a short-lived
// bearer token, and do it again when the storage service rejects the
// current one. Request construction and response parsing live here as
// plain functions; the sessions only decide when to call them.

use crate::error::{Result, UFilesError};
use crate::http::{HttpRequest, HttpResponse, Method};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::fmt;

/// Subdomain label of the identity service.
pub const IDENTITY_LABEL: &str = "sso";

/// Tokens this close to expiry are re-acquired before use.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Long-lived credential used to obtain bearer tokens.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    ApiKey(String),
    RefreshToken(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credentials::RefreshToken(_) => f.write_str("RefreshToken(<redacted>)"),
        }
    }
}

/// Where and how to obtain tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityConfig {
    pub base_url: String,
    pub refresh_url: String,
    pub credentials: Credentials,
}

impl IdentityConfig {
    /// Request that exchanges the configured credential for an access token.
    pub fn token_request(&self) -> HttpRequest {
        match &self.credentials {
            Credentials::ApiKey(key) => {
                HttpRequest::new(Method::Post, format!("{}/auth/api-key", self.base_url))
                    .header("x-api-key", key.as_str())
                    .json(json!({ "api_key": key }))
            }
            Credentials::RefreshToken(token) => {
                HttpRequest::new(Method::Post, self.refresh_url.as_str())
                    .json(json!({ "refresh_token": token }))
            }
        }
    }
}

/// Derive the identity-service base URL from the storage base URL by
/// swapping the first host label for [`IDENTITY_LABEL`].
///
/// `https://media.example.io/v1/f` becomes `https://sso.example.io`.
pub fn derive_identity_url(storage_url: &str) -> Result<String> {
    let url = Url::parse(storage_url).map_err(|e| {
        UFilesError::InvalidInput(format!("invalid storage URL {storage_url}: {e}"))
    })?;
    let host = url.domain().ok_or_else(|| {
        UFilesError::InvalidInput(format!(
            "cannot derive identity URL from {storage_url}: host is not a domain name"
        ))
    })?;

    let mut derived = format!("{}://{}", url.scheme(), identity_host(host));
    if let Some(port) = url.port() {
        derived.push_str(&format!(":{port}"));
    }
    Ok(derived)
}

/// `media.example.io` -> `sso.example.io`; `storage.io` -> `sso.storage.io`.
pub fn identity_host(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        format!("{IDENTITY_LABEL}.{host}")
    } else {
        format!("{IDENTITY_LABEL}.{}", labels[1..].join("."))
    }
}

/// A bearer token plus the end of its validity window, when known.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now > Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Turn an identity-service response into an [`AccessToken`].
///
/// The validity window comes from `expires_in` when present and representable,
/// otherwise from the `exp` claim of the token itself.
pub fn parse_token_response(response: &HttpResponse, now: DateTime<Utc>) -> Result<AccessToken> {
    if !response.is_success() {
        return Err(UFilesError::AuthenticationFailed {
            status: response.status,
            body: response.text(),
        });
    }
    let parsed: TokenResponse = response.json()?;
    let expires_at = parsed
        .expires_in
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .or_else(|| jwt_expiry(&parsed.access_token));
    Ok(AccessToken {
        token: parsed.access_token,
        expires_at,
    })
}

/// Read the `exp` claim of a JWT without verifying it. Opaque tokens yield `None`.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// The token slot of a session.
///
/// `generation` increases every time a token is installed, so a request
/// that got a 401 can tell whether someone else already refreshed.
#[derive(Debug, Default)]
pub(crate) struct TokenState {
    current: Option<AccessToken>,
    generation: u64,
}

impl TokenState {
    pub(crate) fn usable(&self, now: DateTime<Utc>) -> Option<(String, u64)> {
        self.current
            .as_ref()
            .filter(|t| t.is_fresh(now))
            .map(|t| (t.token.clone(), self.generation))
    }

    pub(crate) fn refreshed_since(&self, seen: u64) -> bool {
        self.generation != seen
    }

    pub(crate) fn install(&mut self, token: AccessToken) -> (String, u64) {
        self.generation += 1;
        let value = token.token.clone();
        self.current = Some(token);
        (value, self.generation)
    }
}
