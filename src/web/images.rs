use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, ETAG, IF_NONE_MATCH};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;

use crate::error::StudioError;

/// Cache headers for an in-memory image.
#[derive(Clone, Debug)]
pub(crate) struct ImageCacheHeaders {
    etag: Option<HeaderValue>,
    cache_control: &'static str,
}

impl ImageCacheHeaders {
    /// Weak ETag from a stable identity, e.g. an upload id or a result timestamp.
    pub(crate) fn for_identity(identity: &str, cache_control: &'static str) -> Self {
        Self {
            etag: HeaderValue::from_str(&format!("W/\"{}\"", identity)).ok(),
            cache_control,
        }
    }

    /// Returns the ETag header value, if available.
    pub(crate) fn etag(&self) -> Option<&HeaderValue> {
        self.etag.as_ref()
    }
}

/// Applies image cache headers to a response builder.
pub(crate) fn apply_cache_headers(mut builder: Builder, cache: &ImageCacheHeaders) -> Builder {
    builder = builder.header(CACHE_CONTROL, cache.cache_control);
    if let Some(etag) = cache.etag() {
        builder = builder.header(ETAG, etag.clone());
    }
    builder
}

/// Returns true when the request already holds this version.
pub(crate) fn is_not_modified(headers: &HeaderMap, cache: &ImageCacheHeaders) -> bool {
    let Some(if_none_match) = headers.get(IF_NONE_MATCH) else {
        return false;
    };
    let Ok(value) = if_none_match.to_str() else {
        return false;
    };
    let value = value.trim();
    if value == "*" {
        return true;
    }
    cache
        .etag()
        .and_then(|etag| etag.to_str().ok())
        .is_some_and(|etag| value.split(',').any(|candidate| candidate.trim() == etag))
}

/// Builds a 304 response that preserves cache headers.
pub(crate) fn not_modified_response(cache: &ImageCacheHeaders) -> Result<Response, StudioError> {
    let builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    let builder = apply_cache_headers(builder, cache);
    builder.body(Body::empty()).map_err(StudioError::from)
}

/// Builds a 200 image response, optionally as a download.
pub(crate) fn image_response(
    bytes: Vec<u8>,
    mime_type: &str,
    cache: &ImageCacheHeaders,
    download_name: Option<&str>,
) -> Result<Response, StudioError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(axum::http::header::CONTENT_TYPE, mime_type);
    builder = apply_cache_headers(builder, cache);
    if let Some(name) = download_name {
        builder = builder.header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", name),
        );
    }
    builder.body(Body::from(bytes)).map_err(StudioError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_listed_etags() {
        let cache = ImageCacheHeaders::for_identity("abc", "private");
        let mut headers = HeaderMap::new();
        assert!(!is_not_modified(&headers, &cache));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("W/\"zzz\", W/\"abc\""));
        assert!(is_not_modified(&headers, &cache));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("W/\"zzz\""));
        assert!(!is_not_modified(&headers, &cache));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(is_not_modified(&headers, &cache));
    }
}
