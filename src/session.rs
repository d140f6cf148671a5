// Authenticated sessions.
//
// [`Session`] (blocking) and [`AsyncSession`] (tokio) own the transport and
// the token slot. Both follow the same protocol:
//
// 1. take the current token, acquiring one under the lock if unset or expired;
// 2. send the request with it;
// 3. on 401, refresh once (unless another caller already did) and retry once;
// 4. a second 401 becomes [`UFilesError::AuthenticationFailed`].
//
// Sessions hold no hidden global state: build one and share it through an
// `Arc` with every client that should reuse its token.

use crate::auth::{parse_token_response, IdentityConfig, TokenState};
use crate::error::{Result, UFilesError};
use crate::http::{AsyncTransport, HttpRequest, HttpResponse, Transport};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

fn rejected_twice(response: HttpResponse) -> UFilesError {
    UFilesError::AuthenticationFailed {
        status: response.status,
        body: response.text(),
    }
}

/// Blocking session.
pub struct Session<T: Transport = reqwest::blocking::Client> {
    identity: IdentityConfig,
    transport: T,
    state: Mutex<TokenState>,
}

impl Session {
    /// Session over a default reqwest blocking client.
    pub fn new(identity: IdentityConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().cookie_store(true).build()?;
        Ok(Self::with_transport(identity, client))
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(identity: IdentityConfig, transport: T) -> Self {
        Session {
            identity,
            transport,
            state: Mutex::new(TokenState::default()),
        }
    }

    pub fn identity(&self) -> &IdentityConfig {
        &self.identity
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        // A panic while holding the lock cannot leave the slot half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch(&self, state: &mut TokenState) -> Result<(String, u64)> {
        let response = self.transport.send(&self.identity.token_request())?;
        let token = parse_token_response(&response, Utc::now())?;
        info!(base_url = %self.identity.base_url, "acquired access token");
        Ok(state.install(token))
    }

    fn token(&self) -> Result<(String, u64)> {
        let mut state = self.lock();
        match state.usable(Utc::now()) {
            Some(current) => Ok(current),
            None => self.fetch(&mut state),
        }
    }

    fn refresh_after(&self, seen: u64) -> Result<(String, u64)> {
        let mut state = self.lock();
        if state.refreshed_since(seen) {
            if let Some(current) = state.usable(Utc::now()) {
                return Ok(current);
            }
        }
        self.fetch(&mut state)
    }

    /// Current bearer token, acquiring one if needed.
    pub fn access_token(&self) -> Result<String> {
        Ok(self.token()?.0)
    }

    /// Send `request` with the bearer token attached, refreshing and
    /// retrying once on 401. Other statuses are returned as-is.
    pub fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        let (token, generation) = self.token()?;
        request.bearer = Some(token);
        let response = self.transport.send(&request)?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        warn!(url = %request.url, "token rejected, refreshing");
        let (token, _) = self.refresh_after(generation)?;
        request.bearer = Some(token);
        let response = self.transport.send(&request)?;
        if response.is_unauthorized() {
            return Err(rejected_twice(response));
        }
        Ok(response)
    }
}

/// Non-blocking session. Refresh is single-flight: the token lock is held
/// across the identity round trip.
pub struct AsyncSession<T: AsyncTransport = reqwest::Client> {
    identity: IdentityConfig,
    transport: T,
    state: tokio::sync::Mutex<TokenState>,
}

impl AsyncSession {
    /// Session over a default reqwest async client.
    pub fn new(identity: IdentityConfig) -> Result<Self> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::with_transport(identity, client))
    }
}

impl<T: AsyncTransport> AsyncSession<T> {
    pub fn with_transport(identity: IdentityConfig, transport: T) -> Self {
        AsyncSession {
            identity,
            transport,
            state: tokio::sync::Mutex::new(TokenState::default()),
        }
    }

    pub fn identity(&self) -> &IdentityConfig {
        &self.identity
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn fetch(&self, state: &mut TokenState) -> Result<(String, u64)> {
        let response = self.transport.send(&self.identity.token_request()).await?;
        let token = parse_token_response(&response, Utc::now())?;
        info!(base_url = %self.identity.base_url, "acquired access token");
        Ok(state.install(token))
    }

    async fn token(&self) -> Result<(String, u64)> {
        let mut state = self.state.lock().await;
        match state.usable(Utc::now()) {
            Some(current) => Ok(current),
            None => self.fetch(&mut state).await,
        }
    }

    async fn refresh_after(&self, seen: u64) -> Result<(String, u64)> {
        let mut state = self.state.lock().await;
        if state.refreshed_since(seen) {
            if let Some(current) = state.usable(Utc::now()) {
                return Ok(current);
            }
        }
        self.fetch(&mut state).await
    }

    pub async fn access_token(&self) -> Result<String> {
        Ok(self.token().await?.0)
    }

    /// Async counterpart of [`Session::send`].
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        let (token, generation) = self.token().await?;
        request.bearer = Some(token);
        let response = self.transport.send(&request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        warn!(url = %request.url, "token rejected, refreshing");
        let (token, _) = self.refresh_after(generation).await?;
        request.bearer = Some(token);
        let response = self.transport.send(&request).await?;
        if response.is_unauthorized() {
            return Err(rejected_twice(response));
        }
        Ok(response)
    }
}
