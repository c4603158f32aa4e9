//! Bounded, manual redirect following on top of a [`Transport`].
//!
//! Every attempt is individually bounded by the configured timeout, so a full
//! chain may take up to `timeout * (max_redirects + 1)`.

use super::{OutboundRequest, Transport, UpstreamResponse};
use crate::error::{ClientError, Result};
use crate::log_debug;
use http::header;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use url::{ParseError, Url};

/// Where the loop stands after inspecting one upstream response.
enum Step {
    Terminal(UpstreamResponse),
    Redirected(Url),
}

pub struct RedirectFetcher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    max_redirects: usize,
}

impl RedirectFetcher {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration, max_redirects: usize) -> Self {
        Self {
            transport,
            timeout,
            max_redirects,
        }
    }

    /// Sends `request`, following up to `max_redirects` hops, and returns the
    /// first terminal response.
    pub async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        let mut current = request;
        let mut redirects = 0;

        loop {
            let current_url = current.url.clone();
            let response = self.attempt(current).await?;

            match classify(response, &current_url)? {
                Step::Terminal(response) => return Ok(response),
                Step::Redirected(next) => {
                    if redirects == self.max_redirects {
                        return Err(ClientError::TooManyRedirects(self.max_redirects).into());
                    }
                    redirects += 1;
                    log_debug!(
                        "[redirect] hop {}/{}: {} -> {}",
                        redirects,
                        self.max_redirects,
                        current_url,
                        next
                    );
                    current = OutboundRequest::get(next);
                }
            }
        }
    }

    async fn attempt(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        match timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::RequestTimeout {
                timeout_ms: self.timeout.as_millis(),
            }
            .into()),
        }
    }
}

fn classify(response: UpstreamResponse, current: &Url) -> Result<Step> {
    if !response.is_redirect() {
        return Ok(Step::Terminal(response));
    }

    // A 3xx without a usable Location is handed back as-is.
    let location = match response.header_str(header::LOCATION.as_str()) {
        Some(location) if !location.is_empty() => location.to_string(),
        _ => return Ok(Step::Terminal(response)),
    };

    Ok(Step::Redirected(resolve_location(&location, current)?))
}

/// Absolute locations are used directly; anything else is resolved against
/// the origin of the request that produced it.
pub fn resolve_location(location: &str, current: &Url) -> Result<Url> {
    match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(ParseError::RelativeUrlWithoutBase) => {
            let origin = Url::parse(&current.origin().ascii_serialization())
                .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", current, e)))?;
            origin
                .join(location)
                .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", location, e)).into())
        }
        Err(e) => Err(ClientError::InvalidUrl(format!("{}: {}", location, e)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use async_trait::async_trait;
    use axum::body::Body;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays scripted responses and records every request it sees.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<(StatusCode, Option<&'static str>)>>,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<(StatusCode, Option<&'static str>)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
            self.seen.lock().await.push(request);
            let (status, location) = self
                .responses
                .lock()
                .await
                .pop_front()
                .unwrap_or((StatusCode::OK, None));
            let mut headers = HeaderMap::new();
            if let Some(location) = location {
                headers.insert(header::LOCATION, HeaderValue::from_static(location));
            }
            Ok(UpstreamResponse {
                status,
                reason: None,
                headers,
                body: Body::empty(),
            })
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(&self, _request: OutboundRequest) -> Result<UpstreamResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ClientError::RequestFailed("unreachable".to_string()).into())
        }
    }

    fn fetcher(transport: Arc<dyn Transport>) -> RedirectFetcher {
        RedirectFetcher::new(transport, Duration::from_secs(5), 5)
    }

    fn start(url: &str) -> OutboundRequest {
        let mut request = OutboundRequest::get(Url::parse(url).unwrap());
        request.method = Method::HEAD;
        request
            .headers
            .insert("x-client", HeaderValue::from_static("original"));
        request
    }

    #[tokio::test]
    async fn returns_first_non_redirect_response() {
        let transport = ScriptedTransport::new(vec![(StatusCode::NOT_FOUND, None)]);
        let response = fetcher(transport.clone())
            .fetch(start("https://mirror.example/a.zip"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(transport.seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn relative_location_resolves_against_origin() {
        let transport = ScriptedTransport::new(vec![
            (StatusCode::FOUND, Some("/other/path")),
            (StatusCode::OK, None),
        ]);
        let response = fetcher(transport.clone())
            .fetch(start("https://mirror.example/project/foo/a.zip?viasf=1"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let seen = transport.seen.lock().await;
        assert_eq!(seen[1].url.as_str(), "https://mirror.example/other/path");
    }

    #[tokio::test]
    async fn redirect_hops_are_fresh_standard_gets() {
        let transport = ScriptedTransport::new(vec![
            (StatusCode::MOVED_PERMANENTLY, Some("https://cdn.example/file.zip")),
            (StatusCode::OK, None),
        ]);
        fetcher(transport.clone())
            .fetch(start("https://mirror.example/file.zip"))
            .await
            .unwrap();

        let seen = transport.seen.lock().await;
        assert_eq!(seen[0].method, Method::HEAD);
        assert_eq!(seen[1].method, Method::GET);
        assert_eq!(seen[1].url.as_str(), "https://cdn.example/file.zip");
        assert!(seen[1].headers.get("x-client").is_none());
        assert_eq!(seen[1].headers.get(header::ACCEPT).unwrap(), "*/*");
        assert!(seen[1].headers.contains_key(header::USER_AGENT));
    }

    #[tokio::test]
    async fn redirect_without_location_is_terminal() {
        let transport = ScriptedTransport::new(vec![(StatusCode::FOUND, None)]);
        let response = fetcher(transport)
            .fetch(start("https://mirror.example/a.zip"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::FOUND);
    }

    #[tokio::test]
    async fn follows_up_to_the_bound() {
        let mut script = vec![(StatusCode::FOUND, Some("/next")); 5];
        script.push((StatusCode::OK, None));
        let transport = ScriptedTransport::new(script);
        let response = fetcher(transport.clone())
            .fetch(start("https://mirror.example/a.zip"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(transport.seen.lock().await.len(), 6);
    }

    #[tokio::test]
    async fn fails_past_the_bound() {
        let transport = ScriptedTransport::new(vec![(StatusCode::FOUND, Some("/loop")); 6]);
        let err = fetcher(transport.clone())
            .fetch(start("https://mirror.example/a.zip"))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AppError::Client(ClientError::TooManyRedirects(5))
        ));
        assert_eq!(transport.seen.lock().await.len(), 6);
    }

    #[tokio::test]
    async fn stalled_attempt_times_out() {
        let fetcher =
            RedirectFetcher::new(Arc::new(StalledTransport), Duration::from_millis(20), 5);
        let err = fetcher
            .fetch(start("https://mirror.example/a.zip"))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AppError::Client(ClientError::RequestTimeout { timeout_ms: 20 })
        ));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn absolute_location_is_used_directly() {
        let current = Url::parse("https://mirror.example/a/b").unwrap();
        let url = resolve_location("http://other.example/x?y=1", &current).unwrap();
        assert_eq!(url.as_str(), "http://other.example/x?y=1");
    }

    #[test]
    fn path_relative_location_uses_origin_root() {
        let current = Url::parse("https://mirror.example:8443/a/b/c.zip").unwrap();
        let url = resolve_location("d.zip", &current).unwrap();
        assert_eq!(url.as_str(), "https://mirror.example:8443/d.zip");
    }
}
