//! Single-flight de-duplication of in-flight requests
//!
//! Concurrent callers asking for the same key share one underlying future
//! instead of each issuing a network call. The entry is removed as soon as
//! that future settles, so a later call starts a fresh request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::debug;

use super::ApiResult;

type SharedRequest<T> = Shared<BoxFuture<'static, ApiResult<T>>>;

/// Map from request key to the in-flight request serving it.
pub struct PendingRequests<T: Clone + Send + Sync + 'static> {
    inflight: Arc<Mutex<HashMap<String, SharedRequest<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for PendingRequests<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> PendingRequests<T> {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `start()` for `key`, or join the request already in flight for it.
    ///
    /// `start` is only invoked when no request for `key` is pending.
    pub async fn run<F, Fut>(&self, key: &str, start: F) -> ApiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let request = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(key) {
                Some(existing) => {
                    debug!("Joining in-flight request: {}", key);
                    existing.clone()
                }
                None => {
                    let registry = Arc::clone(&self.inflight);
                    let owned_key = key.to_string();
                    let fut = start();
                    let request = async move {
                        let result = fut.await;
                        registry
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key.to_string(), request.clone());
                    request
                }
            }
        };

        request.await
    }

    /// Number of requests currently in flight
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a request for `key` is in flight
    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_request() {
        let pending = PendingRequests::<String>::new();
        let starts = Arc::new(AtomicUsize::new(0));

        let make = || {
            let starts = Arc::clone(&starts);
            move || {
                starts.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok("controls".to_string())
                }
            }
        };

        let (a, b) = tokio::join!(
            pending.run("/api/controls", make()),
            pending.run("/api/controls", make())
        );

        assert_eq!(a.unwrap(), "controls");
        assert_eq!(b.unwrap(), "controls");
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let pending = PendingRequests::<u32>::new();
        let (a, b) = tokio::join!(
            pending.run("/api/risks", || async { Ok(1) }),
            pending.run("/api/audits", || async { Ok(2) })
        );
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_entry_removed_after_failure() {
        let pending = PendingRequests::<u32>::new();
        let result = pending
            .run("/api/risks", || async {
                Err(ApiError::Network("Failed to fetch".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(!pending.contains("/api/risks"));

        // A later call starts a fresh request
        let result = pending.run("/api/risks", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_entry_visible_while_in_flight() {
        let pending = Arc::new(PendingRequests::<u32>::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let runner = {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move {
                pending
                    .run("/api/audits", || async move {
                        let _ = rx.await;
                        Ok(3)
                    })
                    .await
            })
        };

        while !pending.contains("/api/audits") {
            tokio::task::yield_now().await;
        }
        assert_eq!(pending.len(), 1);

        tx.send(()).unwrap();
        assert_eq!(runner.await.unwrap().unwrap(), 3);
        assert!(pending.is_empty());
    }
}
