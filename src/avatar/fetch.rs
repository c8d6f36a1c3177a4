//! Outbound HTTP for avatar sources.
//!
//! All upstream traffic goes through one process-wide `reqwest::Client`
//! (keep-alive pool, redirect following, fixed user agent). Every request is
//! bounded by [`bounded`]: when the deadline passes the in-flight future is
//! dropped, which aborts the underlying connection.

use std::future::Future;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, warn};

use crate::server::metrics::STD_METRICS;

/// Identity presented to every upstream.
pub const USER_AGENT: &str = "sentient-race-avatar/1.0";

/// Default deadline for a single upstream request.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 6_000;

/// Largest upstream body (image or JSON) we are willing to buffer.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

const MAX_REDIRECTS: usize = 10;

/// Why an upstream request produced nothing usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("upstream timed out after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("unexpected content type {content_type:?} from {url}")]
    UnexpectedContentType { url: String, content_type: String },

    #[error("malformed payload from {url}: {message}")]
    MalformedPayload { url: String, message: String },

    #[error("upstream body from {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },
}

impl FetchError {
    /// Non-2xx, timeout or transport failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::Timeout { .. } | Self::Network { .. }
        )
    }
}

/// Image bytes as returned by an upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    /// Content type to serve; SVG variants are normalized to `image/svg+xml`.
    pub content_type: String,
    /// Final URL after redirects.
    pub url: String,
}

static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(build_client);

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build tuned HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// Run `fut` with a hard deadline. The future is dropped on expiry.
pub async fn bounded<T, F>(timeout: Duration, url: &str, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Whether an upstream content type is something we can serve as an avatar.
pub fn is_image_content_type(content_type: &str) -> bool {
    let lower = content_type.trim_start().to_ascii_lowercase();
    lower.starts_with("image/") || lower.starts_with("application/svg")
}

/// Content type to send downstream for an accepted upstream type.
pub fn served_content_type(content_type: &str) -> String {
    if content_type.to_ascii_lowercase().contains("svg") {
        "image/svg+xml".to_string()
    } else {
        content_type.to_string()
    }
}

/// Deadline-bounded HTTP client for avatar sources.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl UpstreamClient {
    /// Client backed by the process-wide connection pool.
    pub fn shared(timeout: Duration) -> Self {
        Self::with_client(SHARED_CLIENT.clone(), timeout)
    }

    pub fn with_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body if it is an image.
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let started = Instant::now();
        let result = bounded(self.timeout, url, async {
            let response = self
                .http
                .get(url)
                .header(ACCEPT, "image/*")
                .send()
                .await
                .map_err(|e| network_error(url, &e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            if !is_image_content_type(&content_type) {
                return Err(FetchError::UnexpectedContentType {
                    url: url.to_string(),
                    content_type,
                });
            }

            let final_url = response.url().to_string();
            let bytes = read_capped(response, url, self.max_body_bytes).await?;

            Ok(FetchedImage {
                bytes,
                content_type: served_content_type(&content_type),
                url: final_url,
            })
        })
        .await;

        STD_METRICS
            .upstream_fetch_seconds
            .observe(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            debug!(error = %e, "image fetch failed");
        }
        result
    }

    /// GET `url` as JSON, optionally with a bearer credential.
    pub async fn fetch_json(
        &self,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<serde_json::Value, FetchError> {
        let started = Instant::now();
        let result = bounded(self.timeout, url, async {
            let mut request = self.http.get(url).header(ACCEPT, "application/json");
            if let Some(token) = bearer {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }
            let response = request.send().await.map_err(|e| network_error(url, &e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let body = read_capped(response, url, self.max_body_bytes).await?;
            serde_json::from_slice(&body).map_err(|e| FetchError::MalformedPayload {
                url: url.to_string(),
                message: e.to_string(),
            })
        })
        .await;

        STD_METRICS
            .upstream_fetch_seconds
            .observe(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            debug!(error = %e, "JSON fetch failed");
        }
        result
    }
}

/// Buffer the body, giving up as soon as it passes `limit` bytes.
async fn read_capped(
    mut response: reqwest::Response,
    url: &str,
    limit: usize,
) -> Result<Bytes, FetchError> {
    let too_large = || FetchError::BodyTooLarge {
        url: url.to_string(),
        limit,
    };
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| network_error(url, &e))? {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

fn network_error(url: &str, e: &reqwest::Error) -> FetchError {
    FetchError::Network {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn client() -> UpstreamClient {
        UpstreamClient::shared(Duration::from_secs(2))
    }

    #[test]
    fn test_is_image_content_type() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("IMAGE/JPEG; charset=binary"));
        assert!(is_image_content_type("image/svg+xml"));
        assert!(is_image_content_type("application/svg+xml"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
        assert!(!is_image_content_type("application/json"));
        assert!(!is_image_content_type(""));
    }

    #[test]
    fn test_served_content_type() {
        assert_eq!(served_content_type("application/svg+xml"), "image/svg+xml");
        assert_eq!(served_content_type("image/svg+xml; charset=utf-8"), "image/svg+xml");
        assert_eq!(served_content_type("image/png"), "image/png");
    }

    #[test]
    fn test_unavailable_classification() {
        let status = FetchError::Status {
            url: "u".into(),
            status: 404,
        };
        let ct = FetchError::UnexpectedContentType {
            url: "u".into(),
            content_type: "text/html".into(),
        };
        assert!(status.is_unavailable());
        assert!(!ct.is_unavailable());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), FetchError> = bounded(Duration::from_millis(20), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(FetchError::Timeout {
                url: "slow".into(),
                timeout_ms: 20
            })
        );
    }

    #[tokio::test]
    async fn test_fetch_image_accepts_image() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.png")
            .match_header("user-agent", USER_AGENT)
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(b"\x89PNG")
            .create_async()
            .await;

        let image = client()
            .fetch_image(&format!("{}/a.png", server.url()))
            .await
            .unwrap();
        assert_eq!(&image.bytes[..], b"\x89PNG");
        assert_eq!(image.content_type, "image/png");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_image_rejects_html() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/err")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>rate limited</html>")
            .create_async()
            .await;

        let err = client()
            .fetch_image(&format!("{}/err", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedContentType { .. }));
    }

    #[tokio::test]
    async fn test_fetch_image_rejects_non_2xx() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.png")
            .with_status(404)
            .with_header("content-type", "image/png")
            .create_async()
            .await;

        let err = client()
            .fetch_image(&format!("{}/missing.png", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_image_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let target = format!("{}/final.jpg", server.url());
        server
            .mock("GET", "/start")
            .with_status(302)
            .with_header("location", &target)
            .create_async()
            .await;
        server
            .mock("GET", "/final.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("jpeg")
            .create_async()
            .await;

        let image = client()
            .fetch_image(&format!("{}/start", server.url()))
            .await
            .unwrap();
        assert_eq!(image.url, target);
        assert_eq!(image.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_fetch_image_rejects_oversized_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/huge.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(vec![0u8; 64])
            .create_async()
            .await;

        let err = client()
            .with_max_body_bytes(16)
            .fetch_image(&format!("{}/huge.png", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BodyTooLarge { limit: 16, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_json_rejects_oversized_chunked_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big.json")
            .with_status(200)
            .with_chunked_body(|w| {
                for _ in 0..8 {
                    w.write_all(b"[1,2,3,4,5,6,7,8]")?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let err = client()
            .with_max_body_bytes(32)
            .fetch_json(&format!("{}/big.json", server.url()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BodyTooLarge { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_json_sends_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/lookup")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let value = client()
            .fetch_json(&format!("{}/lookup", server.url()), Some("secret"))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_json_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bad")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client()
            .fetch_json(&format!("{}/bad", server.url()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedPayload { .. }));
    }
}
