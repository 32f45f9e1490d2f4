//! Error types for grcctl

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type alias for grcctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Body of a non-2xx response: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Json(Value),
    Text(String),
    Empty,
}

impl ErrorBody {
    /// Parse a response body, falling back to raw text when it is not JSON.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ErrorBody::Empty;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => ErrorBody::Json(value),
            Err(_) => ErrorBody::Text(trimmed.to_string()),
        }
    }

    /// The server-provided `message` field, or the raw text.
    pub fn message(&self) -> Option<String> {
        match self {
            ErrorBody::Json(value) => value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string),
            ErrorBody::Text(text) => Some(text.clone()),
            ErrorBody::Empty => None,
        }
    }

    /// Whether the body marks the failure as a CSRF rejection.
    pub fn mentions_csrf(&self) -> bool {
        match self {
            ErrorBody::Json(value) => value.to_string().to_ascii_lowercase().contains("csrf"),
            ErrorBody::Text(text) => text.to_ascii_lowercase().contains("csrf"),
            ErrorBody::Empty => false,
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBody::Json(value) => match self.message() {
                Some(message) => write!(f, "{}", message),
                None => write!(f, "{}", value),
            },
            ErrorBody::Text(text) => write!(f, "{}", text),
            ErrorBody::Empty => write!(f, "(empty response)"),
        }
    }
}

/// API-related errors
///
/// Cloneable so a single failed request can be handed to every caller that
/// joined it.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Authentication required: {0}. Run `grcctl init` to sign in again.")]
    Unauthorized(ErrorBody),

    #[error("Access denied: {0}")]
    Forbidden(ErrorBody),

    #[error("CSRF token rejected: {0}")]
    CsrfRejected(ErrorBody),

    #[error("Resource not found: {0}")]
    NotFound(ErrorBody),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Request rejected ({status}): {body}")]
    Client { status: u16, body: ErrorBody },

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: ErrorBody },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// HTTP status code behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::Forbidden(_) | ApiError::CsrfRejected(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::RateLimit(_) => Some(429),
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(_) | ApiError::InvalidResponse(_) => None,
        }
    }

    /// Parsed response body, if the error came from a response.
    pub fn body(&self) -> Option<&ErrorBody> {
        match self {
            ApiError::Unauthorized(body)
            | ApiError::Forbidden(body)
            | ApiError::CsrfRejected(body)
            | ApiError::NotFound(body)
            | ApiError::Client { body, .. }
            | ApiError::Server { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Server { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to API".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found. Run `grcctl init` to set up.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Response cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not determine cache directory")]
    NoHome,

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_body_parses_json() {
        let body = ErrorBody::parse(r#"{"message": "Title is required"}"#);
        assert_eq!(body, ErrorBody::Json(json!({"message": "Title is required"})));
        assert_eq!(body.to_string(), "Title is required");
    }

    #[test]
    fn test_error_body_falls_back_to_text() {
        let body = ErrorBody::parse("<html>Bad Gateway</html>");
        assert_eq!(body, ErrorBody::Text("<html>Bad Gateway</html>".to_string()));
    }

    #[test]
    fn test_error_body_empty() {
        assert_eq!(ErrorBody::parse("   "), ErrorBody::Empty);
        assert!(ErrorBody::Empty.message().is_none());
    }

    #[test]
    fn test_error_body_json_without_message_displays_raw() {
        let body = ErrorBody::parse(r#"{"code": 7}"#);
        assert_eq!(body.to_string(), r#"{"code":7}"#);
    }

    #[test]
    fn test_mentions_csrf() {
        assert!(ErrorBody::parse(r#"{"message": "invalid csrf token"}"#).mentions_csrf());
        assert!(ErrorBody::parse("CSRF validation failed").mentions_csrf());
        assert!(!ErrorBody::parse(r#"{"message": "forbidden"}"#).mentions_csrf());
    }

    #[test]
    fn test_api_error_status() {
        assert_eq!(ApiError::Unauthorized(ErrorBody::Empty).status(), Some(401));
        assert_eq!(ApiError::CsrfRejected(ErrorBody::Empty).status(), Some(403));
        assert_eq!(
            ApiError::Server {
                status: 503,
                body: ErrorBody::Empty
            }
            .status(),
            Some(503)
        );
        assert_eq!(ApiError::Network("down".to_string()).status(), None);
    }

    #[test]
    fn test_api_error_unauthorized_message() {
        let err = ApiError::Unauthorized(ErrorBody::parse(r#"{"message":"Not authenticated"}"#));
        let msg = err.to_string();
        assert!(msg.contains("Not authenticated"));
        assert!(msg.contains("grcctl init"));
    }

    #[test]
    fn test_api_error_rate_limit() {
        let msg = ApiError::RateLimit(Duration::from_secs(30)).to_string();
        assert!(msg.contains("Rate limit"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_api_error_body_accessor() {
        let err = ApiError::Client {
            status: 422,
            body: ErrorBody::Text("bad".to_string()),
        };
        assert_eq!(err.body(), Some(&ErrorBody::Text("bad".to_string())));
        assert!(ApiError::RateLimit(Duration::ZERO).body().is_none());
    }

    #[test]
    fn test_config_error_not_found() {
        assert!(ConfigError::NotFound.to_string().contains("grcctl init"));
    }

    #[test]
    fn test_error_from_api_error() {
        let err: Error = ApiError::Network("refused".to_string()).into();
        match err {
            Error::Api(ApiError::Network(msg)) => assert_eq!(msg, "refused"),
            _ => panic!("Expected Error::Api(ApiError::Network)"),
        }
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [b: c").unwrap_err();
        let config_err: ConfigError = yaml_err.into();
        assert!(matches!(config_err, ConfigError::ParseError(_)));
    }
}
