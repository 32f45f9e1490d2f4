//! reqwest-backed transport with a shared cookie jar

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use super::{ApiRequest, ApiResponse, ApiResult, Transport};
use crate::error::{ApiError, ConfigError, Result};

/// Request timeout for every backend call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport talking to the GRC backend.
///
/// Cookies set by the server (session, CSRF) are kept in a jar shared with
/// the runtime so the CSRF cache can read them back.
pub struct ReqwestTransport {
    http: HttpClient,
    base_url: Url,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    /// Create a transport for `api_host`, optionally seeding a session cookie.
    pub fn new(api_host: &str, session_cookie: Option<&str>) -> Result<Self> {
        let base_url = Url::parse(api_host)
            .map_err(|e| ConfigError::Invalid(format!("Invalid API host {}: {}", api_host, e)))?;

        let jar = Arc::new(Jar::default());
        if let Some(cookie) = session_cookie {
            jar.add_cookie_str(cookie, &base_url);
        }

        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("grcctl/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            jar,
        })
    }

    /// The API host this transport sends to
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let url = self.url_for(&request.path);
        log::debug!("{} {}", request.method, url);

        let mut builder = self.http.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ApiError::from)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.map_err(ApiError::from)?;

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let cookies = header.to_str().ok()?;
        find_cookie(cookies, name)
    }
}

/// Extract one cookie value from a `Cookie` header string.
fn find_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_cookie() {
        let header = "connect.sid=s%3Aabc; psifi.x-csrf-token=tok-1; theme=dark";
        assert_eq!(find_cookie(header, "psifi.x-csrf-token").as_deref(), Some("tok-1"));
        assert_eq!(find_cookie(header, "connect.sid").as_deref(), Some("s%3Aabc"));
        assert_eq!(find_cookie(header, "missing"), None);
    }

    #[test]
    fn test_find_cookie_ignores_empty_value() {
        assert_eq!(find_cookie("psifi.x-csrf-token=", "psifi.x-csrf-token"), None);
    }

    #[test]
    fn test_transport_rejects_invalid_host() {
        assert!(ReqwestTransport::new("::nope::", None).is_err());
    }

    #[test]
    fn test_seeded_session_cookie_is_readable() {
        let transport =
            ReqwestTransport::new("http://localhost:5000", Some("connect.sid=abc123")).unwrap();
        assert_eq!(transport.cookie("connect.sid").as_deref(), Some("abc123"));
    }

    #[test]
    fn test_url_for_joins_without_double_slash() {
        let transport = ReqwestTransport::new("http://localhost:5000/", None).unwrap();
        assert_eq!(
            transport.url_for("/api/risks?status=open"),
            "http://localhost:5000/api/risks?status=open"
        );
    }
}
