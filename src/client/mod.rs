mod builder;
pub mod redirect;

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use axum::body::Body;
pub use builder::ClientBuilder;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use hyper::ext::ReasonPhrase;
pub use redirect::RedirectFetcher;
use reqwest::Client as ReqwestClient;
use url::Url;

const STANDARD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Header set sent on every outbound attempt, including redirect hops.
pub fn standard_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(STANDARD_USER_AGENT));
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    /// A GET for `url` carrying only the standard header set.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: standard_headers(),
        }
    }
}

/// Response as handed back by a [`Transport`]; the body is still streaming.
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// Reason phrase from the status line, when it differs from the canonical one.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl UpstreamResponse {
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Status text as sent by the upstream, falling back to the canonical reason.
    pub fn status_text(&self) -> &str {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("Unknown Status")
    }
}

/// Single-shot outbound HTTP. Implementations must not follow redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse>;
}

pub struct Client {
    inner: ReqwestClient,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

#[async_trait]
impl Transport for Client {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        let response = self
            .inner
            .request(request.method, request.url.as_str())
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned());
        let headers = response.headers().clone();
        let body = Body::from_stream(response.bytes_stream());

        Ok(UpstreamResponse {
            status,
            reason,
            headers,
            body,
        })
    }
}
