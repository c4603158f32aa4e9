//! Post-processing of terminal upstream responses before they reach the caller.

use super::rewrite::file_name;
use crate::client::UpstreamResponse;
use axum::response::Response;
use http::{header, HeaderMap, HeaderName, HeaderValue};
use url::Url;

pub const PROXY_HEADER: HeaderName = HeaderName::from_static("x-proxy-by");
pub const PROXY_HEADER_VALUE: &str = "SourceForge-Proxy";

/// Upstream headers that never reach the caller.
const STRIPPED_HEADERS: [HeaderName; 3] = [header::SET_COOKIE, header::SERVER, header::LOCATION];

pub const CORS_ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";
pub const CORS_MAX_AGE: &str = "86400";

/// Rewrites headers of `upstream` for download delivery. Status and body pass through untouched.
pub fn process(upstream: UpstreamResponse, target_url: &str, cache_ttl: u64) -> Response {
    let UpstreamResponse {
        status,
        mut headers,
        body,
        ..
    } = upstream;

    if let Some(disposition) = content_disposition(target_url) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&format!("public, max-age={}", cache_ttl))
            .unwrap_or_else(|_| HeaderValue::from_static("public")),
    );
    headers.insert(PROXY_HEADER, HeaderValue::from_static(PROXY_HEADER_VALUE));

    for name in STRIPPED_HEADERS {
        headers.remove(name);
    }

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// `attachment; filename="..."` for targets whose last segment looks like a file.
fn content_disposition(target_url: &str) -> Option<HeaderValue> {
    let url = Url::parse(target_url).ok()?;
    let name = file_name(&url)?;
    if !name.contains('.') {
        return None;
    }
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)).ok()
}

/// Headers carried by every proxied response.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}
