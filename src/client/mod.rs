//! GRC backend client runtime
//!
//! The runtime wraps every call to the REST backend with the resilience
//! layer: retry with backoff, single-flight GET de-duplication, CSRF token
//! handling for state-changing requests, 401 tracking for session expiry,
//! and a query cache patched by optimistic updates.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::{ApiError, ErrorBody};

pub mod auth;
pub mod csrf;
#[cfg(test)]
pub mod mock;
pub mod optimistic;
pub mod rate_limit;
pub mod retry;
pub mod runtime;
pub mod session;
pub mod single_flight;
pub mod transport;

#[cfg(test)]
pub use mock::MockTransport;
pub use runtime::{ClientRuntime, SessionStatus};
pub use transport::ReqwestTransport;

/// Result type for runtime operations.
///
/// Runtime errors stay `ApiError` so they can be cloned into every caller
/// sharing an in-flight request.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A request to the backend, relative to the configured API host.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path plus query string, e.g. `/api/risks?status=open`
    pub path: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Attach a JSON body. State-changing requests always declare JSON.
    pub fn json(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self.header("content-type", "application/json")
    }

    /// Value of a header previously set on the request.
    #[cfg(test)]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response as seen by the runtime.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// `Retry-After` header in seconds, when present
    pub retry_after: Option<u64>,
    pub body: String,
}

#[cfg(test)]
impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// Translate a raw response into a JSON value or a typed error.
///
/// 2xx bodies are parsed as JSON (empty bodies become `null`, non-JSON text
/// becomes a string). Anything else becomes an `ApiError` carrying the
/// status and the parsed body. A 403 whose body mentions CSRF is reported
/// as `CsrfRejected` so callers can refresh the token.
pub fn classify_response(response: ApiResponse) -> ApiResult<Value> {
    let status = response.status;

    if status.is_success() {
        let text = response.body.trim();
        if text.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())));
    }

    let body = ErrorBody::parse(&response.body);
    let err = match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(body),
        StatusCode::FORBIDDEN if body.mentions_csrf() => ApiError::CsrfRejected(body),
        StatusCode::FORBIDDEN => ApiError::Forbidden(body),
        StatusCode::NOT_FOUND => ApiError::NotFound(body),
        StatusCode::TOO_MANY_REQUESTS => {
            ApiError::RateLimit(std::time::Duration::from_secs(response.retry_after.unwrap_or(60)))
        }
        s if s.is_server_error() => ApiError::Server {
            status: s.as_u16(),
            body,
        },
        s if s.is_client_error() => ApiError::Client {
            status: s.as_u16(),
            body,
        },
        s => ApiError::InvalidResponse(format!("Unexpected status code: {}", s)),
    };
    Err(err)
}

/// HTTP seam between the runtime and the network.
///
/// Implementations only fail with `ApiError::Network`; status handling is
/// the runtime's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the raw response
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse>;

    /// Value of a cookie the server has set for the API host
    fn cookie(&self, name: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_request_sets_content_type() {
        let request = ApiRequest::new(Method::POST, "/api/risks").json(Some(json!({"title": "x"})));
        assert_eq!(request.header_value("Content-Type"), Some("application/json"));
        assert_eq!(request.body, Some(json!({"title": "x"})));
    }

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse::new(StatusCode::from_u16(status).unwrap(), body)
    }

    #[test]
    fn test_classify_success_bodies() {
        assert_eq!(
            classify_response(response(200, r#"[{"id":1}]"#)).unwrap(),
            json!([{"id": 1}])
        );
        assert_eq!(classify_response(response(204, "")).unwrap(), Value::Null);
        assert_eq!(
            classify_response(response(200, "ok")).unwrap(),
            Value::String("ok".to_string())
        );
    }

    #[test]
    fn test_classify_error_statuses() {
        assert!(matches!(
            classify_response(response(401, r#"{"message":"Not authenticated"}"#)),
            Err(ApiError::Unauthorized(ErrorBody::Json(_)))
        ));
        assert!(matches!(
            classify_response(response(403, r#"{"message":"invalid csrf token"}"#)),
            Err(ApiError::CsrfRejected(_))
        ));
        assert!(matches!(
            classify_response(response(403, r#"{"message":"Insufficient role"}"#)),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            classify_response(response(404, "")),
            Err(ApiError::NotFound(ErrorBody::Empty))
        ));
        assert!(matches!(
            classify_response(response(422, r#"{"message":"Title is required"}"#)),
            Err(ApiError::Client { status: 422, .. })
        ));
        assert!(matches!(
            classify_response(response(503, "upstream down")),
            Err(ApiError::Server { status: 503, body: ErrorBody::Text(_) })
        ));
    }

    #[test]
    fn test_classify_rate_limit_uses_retry_after() {
        let mut limited = response(429, "");
        limited.retry_after = Some(12);
        match classify_response(limited) {
            Err(ApiError::RateLimit(wait)) => assert_eq!(wait.as_secs(), 12),
            other => panic!("Expected RateLimit, got {:?}", other),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = ApiRequest::get("/api/risks").header("x-csrf-token", "tok");
        assert_eq!(request.header_value("X-CSRF-Token"), Some("tok"));
        assert_eq!(request.header_value("authorization"), None);
    }
}
