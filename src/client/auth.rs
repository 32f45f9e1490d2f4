//! Authentication failure tracking and session expiry
//!
//! A single 401 can be a race with a cookie refresh, so the interceptor only
//! treats the session as expired after repeated 401s inside a short window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use super::session::{Location, SessionStore};
use crate::cache::QueryCache;

/// Rolling window in which 401s are counted
pub const AUTH_ERROR_WINDOW: Duration = Duration::from_secs(5);

/// Number of 401s inside the window that expires the session
pub const AUTH_ERROR_THRESHOLD: u32 = 3;

/// Default period of the background session check
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Where the user is sent when the session expires
pub const LOGIN_PATH: &str = "/login";

type Listener = dyn Fn(bool) + Send + Sync;

#[derive(Debug, Default)]
struct AuthErrorWindow {
    count: u32,
    last_error: Option<Instant>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: HashMap<u64, Arc<Listener>>,
}

/// Handle returned by [`AuthInterceptor::subscribe`].
///
/// The listener stays registered until the handle is dropped.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Listeners>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .remove(&self.id);
        }
    }
}

/// Tracks 401 responses and runs the session-expired action.
pub struct AuthInterceptor {
    cache: Arc<QueryCache>,
    session: Arc<SessionStore>,
    location: Arc<Location>,
    window: Mutex<AuthErrorWindow>,
    authenticated: Mutex<Option<bool>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl AuthInterceptor {
    pub fn new(cache: Arc<QueryCache>, session: Arc<SessionStore>, location: Arc<Location>) -> Self {
        Self {
            cache,
            session,
            location,
            window: Mutex::new(AuthErrorWindow::default()),
            authenticated: Mutex::new(None),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Record a 401. Returns `true` when this error expired the session.
    ///
    /// The counter restarts when the previous 401 is older than the window.
    /// Expiry fires once, on the error that brings the count to the
    /// threshold; later errors in the same burst do not fire again.
    pub fn handle_auth_error(&self) -> bool {
        let now = Instant::now();
        let fire = {
            let mut window = self.window();
            if let Some(last) = window.last_error
                && now.duration_since(last) > AUTH_ERROR_WINDOW
            {
                window.count = 0;
            }
            window.count += 1;
            window.last_error = Some(now);
            debug!("Authentication error {} within window", window.count);
            window.count == AUTH_ERROR_THRESHOLD
        };

        if fire {
            self.expire_session();
        }
        fire
    }

    /// Clear cached data, tell listeners, remember where the user was and
    /// send them to the login page.
    pub fn expire_session(&self) {
        warn!("Session expired, signing out");
        self.cache.clear();

        *self.authenticated() = Some(false);
        self.notify(false);

        let current = self.location.current_path();
        if current != LOGIN_PATH && current != "/" {
            self.session.set_redirect_after_login(&current);
        }
        self.location.navigate(LOGIN_PATH);
    }

    /// Forget recent 401s
    pub fn reset(&self) {
        *self.window() = AuthErrorWindow::default();
    }

    /// Number of 401s in the current window
    #[cfg(test)]
    pub fn error_count(&self) -> u32 {
        self.window().count
    }

    /// Last known authentication state, `None` before the first check
    #[cfg(test)]
    pub fn is_authenticated(&self) -> Option<bool> {
        *self.authenticated()
    }

    /// Update the authentication state, notifying listeners on change
    pub fn set_authenticated(&self, authenticated: bool) {
        let changed = {
            let mut state = self.authenticated();
            let changed = *state != Some(authenticated);
            *state = Some(authenticated);
            changed
        };
        if changed {
            info!("Authentication state changed: authenticated={}", authenticated);
            self.notify(authenticated);
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.insert(id, Arc::new(listener));

        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn notify(&self, authenticated: bool) {
        // Call outside the lock so listeners may unsubscribe themselves.
        let listeners: Vec<Arc<Listener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(authenticated);
        }
    }

    fn window(&self) -> MutexGuard<'_, AuthErrorWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authenticated(&self) -> MutexGuard<'_, Option<bool>> {
        self.authenticated.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn interceptor() -> AuthInterceptor {
        AuthInterceptor::new(
            Arc::new(QueryCache::default()),
            Arc::new(SessionStore::in_memory()),
            Arc::new(Location::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_fires_once_per_burst() {
        let auth = interceptor();

        assert!(!auth.handle_auth_error());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!auth.handle_auth_error());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(auth.handle_auth_error());
        assert!(!auth.handle_auth_error());
        assert_eq!(auth.error_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_quiet_period() {
        let auth = interceptor();

        auth.handle_auth_error();
        auth.handle_auth_error();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(!auth.handle_auth_error());
        assert_eq!(auth.error_count(), 1);
        assert!(!auth.handle_auth_error());
        assert!(auth.handle_auth_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_again_after_new_burst() {
        let auth = interceptor();
        for _ in 0..3 {
            auth.handle_auth_error();
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        let fired: Vec<bool> = (0..3).map(|_| auth.handle_auth_error()).collect();
        assert_eq!(fired, vec![false, false, true]);
    }

    #[test]
    fn test_expiry_clears_cache_and_redirects() {
        let cache = Arc::new(QueryCache::default());
        let session = Arc::new(SessionStore::in_memory());
        let location = Arc::new(Location::new("/risks/7"));
        let auth = AuthInterceptor::new(cache.clone(), session.clone(), location.clone());
        cache.set("/api/risks", json!([{"id": 7}]));

        auth.expire_session();

        assert!(cache.is_empty());
        assert_eq!(location.current_path(), LOGIN_PATH);
        assert_eq!(session.redirect_after_login().as_deref(), Some("/risks/7"));
        assert_eq!(auth.is_authenticated(), Some(false));
    }

    #[test]
    fn test_expiry_does_not_remember_login_or_root() {
        for path in [LOGIN_PATH, "/"] {
            let session = Arc::new(SessionStore::in_memory());
            let auth = AuthInterceptor::new(
                Arc::new(QueryCache::default()),
                session.clone(),
                Arc::new(Location::new(path)),
            );
            auth.expire_session();
            assert_eq!(session.redirect_after_login(), None);
        }
    }

    #[test]
    fn test_reset_clears_window() {
        let auth = interceptor();
        auth.handle_auth_error();
        auth.handle_auth_error();
        auth.reset();
        assert_eq!(auth.error_count(), 0);
    }

    #[test]
    fn test_listeners_notified_on_change_only() {
        let auth = interceptor();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let _subscription = auth.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        auth.set_authenticated(true);
        auth.set_authenticated(true);
        auth.set_authenticated(false);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expiry_notifies_false() {
        let auth = interceptor();
        let last = Arc::new(Mutex::new(None));
        let sink = last.clone();
        let _subscription = auth.subscribe(move |value| {
            *sink.lock().unwrap() = Some(value);
        });

        auth.expire_session();
        assert_eq!(*last.lock().unwrap(), Some(false));
    }

    #[test]
    fn test_dropping_subscription_removes_listener() {
        let auth = interceptor();
        let first = auth.subscribe(|_| {});
        let second = auth.subscribe(|_| {});
        assert_eq!(auth.listener_count(), 2);

        drop(first);
        assert_eq!(auth.listener_count(), 1);
        drop(second);
        assert_eq!(auth.listener_count(), 0);
    }
}
