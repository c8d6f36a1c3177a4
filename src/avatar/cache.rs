//! HTTP caching for avatar responses.
//!
//! Attaches a content fingerprint (`ETag`), a tier-dependent shared-cache
//! lifetime and a stale-while-revalidate window, and answers conditional
//! requests with `304 Not Modified`.

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use super::image::AvatarImage;

/// How long shared caches may serve a stale copy while refetching.
pub const STALE_WHILE_REVALIDATE_SECS: u32 = 604_800;

/// `Cache-Control` value for an image.
pub fn cache_control(image: &AvatarImage) -> String {
    format!(
        "public, s-maxage={}, stale-while-revalidate={}",
        image.cache_seconds, STALE_WHILE_REVALIDATE_SECS
    )
}

/// Whether an `If-None-Match` header value matches `fingerprint`.
///
/// Accepts `*`, comma-separated lists, weak validators and unquoted tags.
pub fn if_none_match_matches(header: &str, fingerprint: &str) -> bool {
    header.split(',').map(str::trim).any(|tag| {
        if tag == "*" {
            return true;
        }
        let tag = tag.strip_prefix("W/").unwrap_or(tag);
        tag.trim_matches('"') == fingerprint
    })
}

/// Build the HTTP response for `image`, honoring `If-None-Match` in `request_headers`.
pub fn avatar_response(image: &AvatarImage, request_headers: &HeaderMap) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    if let Ok(value) = HeaderValue::from_str(&cache_control(image)) {
        headers.insert(CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&image.etag()) {
        headers.insert(ETAG, value);
    }

    let not_modified = request_headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| if_none_match_matches(v, &image.fingerprint));
    if not_modified {
        return (StatusCode::NOT_MODIFIED, headers, Body::empty()).into_response();
    }

    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_TYPE, content_type);
    (StatusCode::OK, headers, Body::from(image.bytes.clone())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::image::SourceTier;

    fn image() -> AvatarImage {
        AvatarImage::new(&b"pixels"[..], "image/png", SourceTier::Official, "official", 86_400)
    }

    #[test]
    fn test_cache_control() {
        assert_eq!(
            cache_control(&image()),
            "public, s-maxage=86400, stale-while-revalidate=604800"
        );
    }

    #[test]
    fn test_if_none_match_forms() {
        let fp = image().fingerprint;
        assert!(if_none_match_matches(&format!("\"{fp}\""), &fp));
        assert!(if_none_match_matches(&format!("W/\"{fp}\""), &fp));
        assert!(if_none_match_matches(&format!("\"other\", \"{fp}\""), &fp));
        assert!(if_none_match_matches(&fp, &fp));
        assert!(if_none_match_matches("*", &fp));
        assert!(!if_none_match_matches("\"other\"", &fp));
        assert!(!if_none_match_matches("", &fp));
    }

    #[tokio::test]
    async fn test_full_response_headers() {
        let img = image();
        let response = avatar_response(&img, &HeaderMap::new());
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "image/png");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ETAG], img.etag().as_str());
        assert_eq!(
            headers[CACHE_CONTROL],
            "public, s-maxage=86400, stale-while-revalidate=604800"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"pixels");
    }

    #[tokio::test]
    async fn test_not_modified() {
        let img = image();
        let mut request_headers = HeaderMap::new();
        request_headers.insert(IF_NONE_MATCH, HeaderValue::from_str(&img.etag()).unwrap());

        let response = avatar_response(&img, &request_headers);
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[ETAG], img.etag().as_str());
        assert!(response.headers().get(CONTENT_TYPE).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_stale_tag_gets_full_body() {
        let img = image();
        let mut request_headers = HeaderMap::new();
        request_headers.insert(IF_NONE_MATCH, HeaderValue::from_static("\"stale\""));

        let response = avatar_response(&img, &request_headers);
        assert_eq!(response.status(), StatusCode::OK);
    }
}
