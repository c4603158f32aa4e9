use super::response::{apply_cors, process};
use super::rewrite::{file_name, ProxyTarget};
use crate::client::{OutboundRequest, RedirectFetcher};
use crate::config::ProxyConfig;
use crate::error::{AppError, ClientError, ProxyError, Result};
use crate::stats::SharedStats;
use crate::log_info;
use axum::response::Response;
use http::header;
use url::Url;

/// Rewrites, fetches and post-processes one download request, keeping the
/// shared counters up to date along the way.
pub struct DownloadProxy {
    fetcher: RedirectFetcher,
    stats: SharedStats,
    mirror_host: String,
    cache_ttl: u64,
    cache_status_header: String,
}

impl DownloadProxy {
    pub fn new(fetcher: RedirectFetcher, stats: SharedStats, config: &ProxyConfig) -> Self {
        Self {
            fetcher,
            stats,
            mirror_host: config.mirror_host.clone(),
            cache_ttl: config.cache_ttl,
            cache_status_header: config.cache_status_header.clone(),
        }
    }

    /// Failures come back as [`AppError::Proxy`]; the caller owns error counting.
    pub async fn handle(&self, path: &str) -> Result<Response> {
        // Counted before validation: rejected paths are still requests.
        self.stats.record_attempt().await;

        let target = ProxyTarget::from_path(path).ok_or(ProxyError::InvalidTarget)?;
        let target_url = target.url(&self.mirror_host);
        let url = Url::parse(&target_url)
            .map_err(|e| ProxyError::Fetch(ClientError::InvalidUrl(e.to_string())))?;

        if let Some(name) = file_name(&url) {
            self.stats.record_download(name).await;
        }

        log_info!("[proxy] {} -> {}", path, target_url);
        let upstream = self
            .fetcher
            .fetch(OutboundRequest::get(url))
            .await
            .map_err(fetch_failure)?;

        if !upstream.status.is_success() {
            return Err(ProxyError::Upstream {
                status: upstream.status,
                reason: upstream.status_text().to_string(),
            }
            .into());
        }

        let cache_hit = upstream.header_str(&self.cache_status_header) == Some("HIT");
        let content_length = upstream
            .header_str(header::CONTENT_LENGTH.as_str())
            .and_then(|len| len.trim().parse::<u64>().ok());
        self.stats.record_delivery(cache_hit, content_length).await;

        let mut response = process(upstream, &target_url, self.cache_ttl);
        apply_cors(response.headers_mut());
        Ok(response)
    }
}

/// Transport-level failures become 502s; anything else stays unhandled.
fn fetch_failure(err: AppError) -> AppError {
    match err {
        AppError::Client(e) => ProxyError::Fetch(e).into(),
        other => other,
    }
}
