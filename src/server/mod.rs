mod handlers;

use crate::config::Config;
use crate::error::Result;
use crate::proxy::DownloadProxy;
use crate::stats::SharedStats;
use crate::{log_info, log_warn};
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub use handlers::dispatch;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stats: SharedStats,
    pub proxy: Arc<DownloadProxy>,
    pub started: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, stats: SharedStats, proxy: DownloadProxy) -> Self {
        Self {
            config,
            stats,
            proxy: Arc::new(proxy),
            started: Instant::now(),
        }
    }
}

/// Every path goes through the single dispatcher, which owns the routing table.
/// Panics below it are caught and answered like any other unhandled failure.
pub fn router(state: AppState) -> Router {
    let stats = state.stats.clone();
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(CatchPanicLayer::custom(
            move |panic: Box<dyn Any + Send + 'static>| handlers::panic_response(&stats, panic),
        ))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log_info!("[server] listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_info!("[server] stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log_warn!("[server] failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log_info!("[server] shutdown requested");
}
