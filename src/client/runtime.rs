//! Client runtime
//!
//! `ClientRuntime` owns every piece of shared client state: the transport,
//! query cache, pending-request map, CSRF cache, auth interceptor and rate
//! limiter. Commands receive it through the command context; nothing lives
//! in process-wide statics.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Method;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::auth::{AuthInterceptor, SESSION_CHECK_INTERVAL};
use super::csrf::{CSRF_HEADER, CsrfTokenCache};
use super::rate_limit::ReactiveLimiter;
use super::retry::{RetryProfiles, with_retry};
use super::session::{Location, SessionStore};
use super::single_flight::PendingRequests;
use super::{ApiRequest, ApiResponse, ApiResult, Transport, classify_response};
use crate::cache::{QueryCache, QueryParams, resolve_query_key};
use crate::config::Environment;
use crate::error::ApiError;

/// Session check endpoint
pub const AUTH_CHECK_PATH: &str = "/api/auth/check";
/// Session refresh
pub const AUTH_REFRESH_PATH: &str = "/api/auth/refresh";
/// Signed-in user profile
pub const AUTH_USER_PATH: &str = "/api/auth/user";

/// Outcome of a session check
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// The session is valid
    Active { user: Option<Value> },
    /// The check was rejected but a refresh restored the session
    Refreshed,
    /// The session could not be restored and has been expired
    Expired,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active { .. } => write!(f, "active"),
            SessionStatus::Refreshed => write!(f, "refreshed"),
            SessionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Builder for [`ClientRuntime`]
pub struct RuntimeBuilder {
    transport: Arc<dyn Transport>,
    environment: Environment,
    cache: QueryCache,
    session: SessionStore,
    retry: RetryProfiles,
    rate_limit_per_second: u32,
}

impl RuntimeBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn session(mut self, session: SessionStore) -> Self {
        self.session = session;
        self
    }

    pub fn retry(mut self, retry: RetryProfiles) -> Self {
        self.retry = retry;
        self
    }

    pub fn rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit_per_second = per_second;
        self
    }

    pub fn build(self) -> ClientRuntime {
        let cache = Arc::new(self.cache);
        let auth = Arc::new(AuthInterceptor::new(
            Arc::clone(&cache),
            Arc::new(self.session),
            Arc::new(Location::default()),
        ));
        let csrf = CsrfTokenCache::new(Arc::clone(&self.transport), self.environment.is_production());

        ClientRuntime {
            transport: self.transport,
            cache,
            auth,
            csrf,
            limiter: Arc::new(ReactiveLimiter::new(self.rate_limit_per_second)),
            pending: PendingRequests::new(),
            retry: self.retry,
        }
    }
}

/// Resilient client for the GRC backend.
pub struct ClientRuntime {
    transport: Arc<dyn Transport>,
    cache: Arc<QueryCache>,
    auth: Arc<AuthInterceptor>,
    csrf: CsrfTokenCache,
    limiter: Arc<ReactiveLimiter>,
    pending: PendingRequests<Value>,
    retry: RetryProfiles,
}

impl ClientRuntime {
    /// Start building a runtime over `transport`. Defaults: production,
    /// memory-only cache and session store, default retry profiles.
    pub fn builder(transport: Arc<dyn Transport>) -> RuntimeBuilder {
        RuntimeBuilder {
            transport,
            environment: Environment::default(),
            cache: QueryCache::default(),
            session: SessionStore::in_memory(),
            retry: RetryProfiles::default(),
            rate_limit_per_second: 10,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn auth(&self) -> &AuthInterceptor {
        &self.auth
    }

    #[cfg(test)]
    pub fn csrf(&self) -> &CsrfTokenCache {
        &self.csrf
    }

    #[cfg(test)]
    pub fn limiter(&self) -> &ReactiveLimiter {
        &self.limiter
    }

    /// Number of GETs currently in flight
    #[cfg(test)]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Record the page the user is working with
    pub fn navigate(&self, path: &str) {
        self.auth.location().navigate(path);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// One network GET, shared with any identical GET already in flight.
    pub async fn get_json(&self, path: &str, params: &QueryParams) -> ApiResult<Value> {
        let key = resolve_query_key(path, params);
        let transport = Arc::clone(&self.transport);
        let auth = Arc::clone(&self.auth);
        let limiter = Arc::clone(&self.limiter);
        let request_path = key.clone();

        self.pending
            .run(&key, move || async move {
                limiter.wait_if_active().await;
                let response = transport.send(ApiRequest::get(request_path)).await?;
                interpret(response, Some(&auth), &limiter)
            })
            .await
    }

    /// GET with the `fetch` retry profile
    pub async fn fetch(&self, path: &str, params: &QueryParams) -> ApiResult<Value> {
        with_retry(&self.retry.fetch, || self.get_json(path, params)).await
    }

    /// Cached read: fresh data is served from the cache, anything else is
    /// refetched and stored.
    pub async fn query(&self, path: &str, params: &QueryParams) -> ApiResult<Value> {
        let key = resolve_query_key(path, params);
        if let Some(cached) = self.cache.get(&key)
            && cached.is_fresh()
        {
            debug!("Cache hit: {}", key);
            return Ok(cached.data);
        }
        self.fetch_and_store(&key, path, params).await
    }

    /// Cached read with mount semantics: any cached entry that has not been
    /// invalidated is served, however old.
    pub async fn query_cached(&self, path: &str, params: &QueryParams) -> ApiResult<Value> {
        let key = resolve_query_key(path, params);
        if let Some(cached) = self.cache.get(&key)
            && !cached.is_invalidated
        {
            debug!("Cache hit (age {:?}): {}", cached.age, key);
            return Ok(cached.data);
        }
        self.fetch_and_store(&key, path, params).await
    }

    async fn fetch_and_store(&self, key: &str, path: &str, params: &QueryParams) -> ApiResult<Value> {
        debug!("Cache miss: {}", key);
        let data = self.fetch(path, params).await?;
        self.cache.set(key, data.clone());
        Ok(data)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// State-changing request with the `critical` retry profile.
    ///
    /// In production the request carries a CSRF token. The first CSRF
    /// rejection clears the token and resends once with a fresh one; any
    /// later rejection, on any retry attempt, is returned as is.
    pub async fn mutate(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<Value> {
        let csrf_retried = AtomicBool::new(false);
        with_retry(&self.retry.critical, || {
            self.send_mutation(method.clone(), path, body.clone(), true, &csrf_retried)
        })
        .await
    }

    pub async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        self.mutate(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> ApiResult<Value> {
        self.mutate(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<Value> {
        self.mutate(Method::DELETE, path, None).await
    }

    async fn send_mutation(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        track_auth: bool,
        csrf_retried: &AtomicBool,
    ) -> ApiResult<Value> {
        let token = self.csrf.header_token().await?;
        let first = self
            .send_with_token(method.clone(), path, body.clone(), token, track_auth)
            .await;

        match first {
            Err(ApiError::CsrfRejected(_))
                if self.csrf.is_enabled() && !csrf_retried.swap(true, Ordering::SeqCst) =>
            {
                warn!("CSRF token rejected for {} {}, retrying with a fresh token", method, path);
                self.csrf.clear();
                let token = self.csrf.fetch_token().await?;
                self.send_with_token(method, path, body, Some(token), track_auth)
                    .await
            }
            other => other,
        }
    }

    async fn send_with_token(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        token: Option<String>,
        track_auth: bool,
    ) -> ApiResult<Value> {
        let mut request = ApiRequest::new(method, path).json(body);
        if let Some(token) = token {
            request = request.header(CSRF_HEADER, token);
        }

        self.limiter.wait_if_active().await;
        let response = self.transport.send(request).await?;
        let auth = track_auth.then_some(&self.auth);
        interpret(response, auth, &self.limiter)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Verify the session, refreshing it once if the check is rejected.
    ///
    /// A failed refresh expires the session. Network and server errors are
    /// returned to the caller and leave the session alone.
    pub async fn check_session(&self) -> ApiResult<SessionStatus> {
        let check = with_retry(&self.retry.auth, || self.request_session_status()).await;

        let rejected = match check {
            Ok(body) if body.get("authenticated").and_then(Value::as_bool) != Some(false) => {
                self.auth.reset();
                self.auth.set_authenticated(true);
                return Ok(SessionStatus::Active {
                    user: body.get("user").cloned(),
                });
            }
            Ok(_) => None,
            Err(err) if matches!(err.status(), Some(401 | 403)) => Some(err),
            Err(err) => return Err(err),
        };

        info!(
            "Session check rejected{}, attempting refresh",
            rejected.map(|e| format!(" ({})", e)).unwrap_or_default()
        );
        match self.refresh_session().await {
            Ok(_) => {
                self.auth.reset();
                self.auth.set_authenticated(true);
                Ok(SessionStatus::Refreshed)
            }
            Err(err) => {
                warn!("Session refresh failed: {}", err);
                self.auth.expire_session();
                Ok(SessionStatus::Expired)
            }
        }
    }

    /// `POST /api/auth/refresh` with the `auth` retry profile
    pub async fn refresh_session(&self) -> ApiResult<Value> {
        let csrf_retried = AtomicBool::new(false);
        with_retry(&self.retry.auth, || {
            self.send_mutation(Method::POST, AUTH_REFRESH_PATH, None, false, &csrf_retried)
        })
        .await
    }

    /// Profile of the signed-in user
    pub async fn current_user(&self) -> ApiResult<Value> {
        self.fetch(AUTH_USER_PATH, &QueryParams::new()).await
    }

    // 401s from the session check are answered by a refresh, not counted.
    async fn request_session_status(&self) -> ApiResult<Value> {
        self.limiter.wait_if_active().await;
        let response = self.transport.send(ApiRequest::get(AUTH_CHECK_PATH)).await?;
        interpret(response, None, &self.limiter)
    }

    /// Check the session every `period` in the background.
    ///
    /// The first check runs one period after the call. The task ends when
    /// the session expires or the returned handle is dropped.
    pub fn spawn_session_monitor(self: &Arc<Self>, period: Duration) -> SessionMonitor {
        let runtime = Arc::clone(self);
        let period = if period.is_zero() { SESSION_CHECK_INTERVAL } else { period };

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                match runtime.check_session().await {
                    Ok(SessionStatus::Expired) => {
                        info!("Session expired, stopping session monitor");
                        break;
                    }
                    Ok(status) => debug!("Session check: {}", status),
                    Err(err) => warn!("Session check failed: {}", err),
                }
            }
        });

        SessionMonitor {
            handle: Some(handle),
        }
    }
}

/// Handle to the background session check. Dropping it stops the task.
pub struct SessionMonitor {
    handle: Option<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Wait until the monitor stops on its own
    pub async fn wait(mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
            && !err.is_cancelled()
        {
            warn!("Session monitor task failed: {}", err);
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Classify a response and feed the 401 and 429 hooks.
fn interpret(
    response: ApiResponse,
    auth: Option<&Arc<AuthInterceptor>>,
    limiter: &ReactiveLimiter,
) -> ApiResult<Value> {
    let result = classify_response(response);
    match &result {
        Err(ApiError::Unauthorized(_)) => {
            if let Some(auth) = auth {
                auth.handle_auth_error();
            }
        }
        Err(ApiError::RateLimit(_)) => limiter.activate(),
        _ => {}
    }
    result
}
