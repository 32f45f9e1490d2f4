//! CSRF token cache
//!
//! State-changing requests carry the token in the `x-csrf-token` header.
//! The token lives in one of three states: empty, being fetched, or cached.
//! Concurrent callers during a fetch share the same in-flight request.

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::debug;
use serde::Deserialize;

use super::{ApiRequest, ApiResult, Transport, classify_response};
use crate::error::ApiError;

/// Header carrying the token on POST/PUT/PATCH/DELETE
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Endpoint issuing a fresh token
pub const CSRF_TOKEN_PATH: &str = "/api/csrf-token";

/// Cookies the backend may set with the token, in lookup order
pub const CSRF_COOKIE_NAMES: [&str; 2] = ["__Host-psifi.x-csrf-token", "psifi.x-csrf-token"];

type TokenFuture = Shared<BoxFuture<'static, ApiResult<String>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsrfTokenResponse {
    csrf_token: Option<String>,
    message: Option<String>,
    cookie_name: Option<String>,
}

/// Observable state of the cache
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Empty,
    Fetching,
    Cached,
}

enum State {
    Empty,
    Fetching(TokenFuture),
    Cached(String),
}

struct Inner {
    state: State,
    /// Bumped by `clear()`; a fetch started under an older generation does
    /// not write its result back.
    generation: u64,
}

/// Token cache shared by every state-changing request.
pub struct CsrfTokenCache {
    transport: Arc<dyn Transport>,
    enabled: bool,
    inner: Arc<Mutex<Inner>>,
}

impl CsrfTokenCache {
    /// Create a cache. Tokens are only attached when `enabled` (production).
    pub fn new(transport: Arc<dyn Transport>, enabled: bool) -> Self {
        Self {
            transport,
            enabled,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Empty,
                generation: 0,
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(test)]
    pub fn state(&self) -> TokenState {
        match self.lock().state {
            State::Empty => TokenState::Empty,
            State::Fetching(_) => TokenState::Fetching,
            State::Cached(_) => TokenState::Cached,
        }
    }

    /// Return the cached token, joining or starting a fetch when needed.
    ///
    /// At most one fetch is in flight at a time. A failed fetch leaves the
    /// cache empty so the next call tries again.
    pub async fn fetch_token(&self) -> ApiResult<String> {
        let shared = {
            let mut inner = self.lock();
            match &inner.state {
                State::Cached(token) => return Ok(token.clone()),
                State::Fetching(pending) => pending.clone(),
                State::Empty => {
                    let generation = inner.generation;
                    let transport = Arc::clone(&self.transport);
                    let registry = Arc::clone(&self.inner);

                    let pending = async move {
                        let result = request_token(transport.as_ref()).await;
                        let mut inner = registry.lock().unwrap_or_else(PoisonError::into_inner);
                        if inner.generation == generation {
                            inner.state = match &result {
                                Ok(token) => State::Cached(token.clone()),
                                Err(_) => State::Empty,
                            };
                        }
                        result
                    }
                    .boxed()
                    .shared();

                    inner.state = State::Fetching(pending.clone());
                    pending
                }
            }
        };

        shared.await
    }

    /// Forget the token. Any fetch still in flight will not repopulate it.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state = State::Empty;
        debug!("CSRF token cleared");
    }

    /// Token to put on a state-changing request.
    ///
    /// Outside production no header is sent. Otherwise the token cookie wins,
    /// then the cached token, then a fresh fetch.
    pub async fn header_token(&self) -> ApiResult<Option<String>> {
        if !self.enabled {
            return Ok(None);
        }
        if let Some(token) = self.cookie_token() {
            return Ok(Some(token));
        }
        self.fetch_token().await.map(Some)
    }

    fn cookie_token(&self) -> Option<String> {
        CSRF_COOKIE_NAMES
            .iter()
            .find_map(|name| self.transport.cookie(name))
            .filter(|token| !token.is_empty())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn request_token(transport: &dyn Transport) -> ApiResult<String> {
    debug!("Fetching CSRF token");
    let response = transport.send(ApiRequest::get(CSRF_TOKEN_PATH)).await?;
    let value = classify_response(response)?;
    let body: CsrfTokenResponse = serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("Malformed CSRF token response: {}", e)))?;

    if let Some(token) = body.csrf_token.filter(|t| !t.is_empty()) {
        return Ok(token);
    }

    // Some deployments only set the cookie and name it in the body.
    let names = body
        .cookie_name
        .into_iter()
        .chain(CSRF_COOKIE_NAMES.iter().map(|n| n.to_string()));
    for name in names {
        if let Some(token) = transport.cookie(&name).filter(|t| !t.is_empty()) {
            return Ok(token);
        }
    }

    Err(ApiError::InvalidResponse(format!(
        "CSRF token missing from response{}",
        body.message.map(|m| format!(": {}", m)).unwrap_or_default()
    )))
}
