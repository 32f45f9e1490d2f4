//! Scripted transport for runtime tests
//!
//! Replies are queued per `(method, path)`; the last queued reply for a
//! route repeats once the queue is down to one. Every request is recorded
//! for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};

use super::{ApiRequest, ApiResponse, ApiResult, Transport};
use crate::error::ApiError;

#[derive(Debug, Clone)]
enum MockReply {
    Response(ApiResponse),
    NetworkError(String),
}

/// Mock transport for unit tests.
///
/// # Example
/// ```ignore
/// let mock = MockTransport::new();
/// mock.on(Method::GET, "/api/risks", 200, r#"[{"id":1}]"#);
/// let runtime = ClientRuntime::builder(Arc::new(mock))
///     .environment(Environment::Development)
///     .build();
/// ```
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<MockReply>>>,
    cookies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response for `method path`
    pub fn on(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        let response = ApiResponse::new(StatusCode::from_u16(status).unwrap(), body);
        self.push(method, path, MockReply::Response(response))
    }

    /// Queue a network failure for `method path`
    pub fn on_network_error(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(method, path, MockReply::NetworkError(message.to_string()))
    }

    /// Pretend the server set a cookie
    pub fn set_cookie(&self, name: &str, value: &str) {
        self.cookies
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    /// All requests sent so far
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests sent to `method path`
    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn push(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    fn next_reply(&self, method: &Method, path: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method.clone(), path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(&request.method, &request.path) {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::NetworkError(message)) => Err(ApiError::Network(message)),
            None => Ok(ApiResponse::new(
                StatusCode::NOT_FOUND,
                format!(r#"{{"message":"no mock for {} {}"}}"#, request.method, request.path),
            )),
        }
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }
}
