mod client;
mod config;
mod error;
mod logging;
mod proxy;
mod server;
mod stats;
mod utils;

use crate::client::{Client, RedirectFetcher};
use crate::config::{Config, ConfigSource};
use crate::error::Result;
use crate::logging::{init_logging, LoggerConfig};
use crate::proxy::DownloadProxy;
use crate::server::AppState;
use crate::stats::{FileStore, KvStore, Stats};
use std::sync::Arc;

const CONFIG_PATH_ENV: &str = "SF_PROXY_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    let (config, source) = Config::load(&config_path)?;

    init_logging(LoggerConfig::from_config(&config.logging)?)?;
    match source {
        ConfigSource::File => log_info!("[main] Configuration loaded from {}", config_path),
        ConfigSource::Defaults => log_warn!(
            "[main] {} not found, using default configuration",
            config_path
        ),
    }
    log_info!(
        "[main] Starting sourceforge-proxy v{} (mirror: {})",
        env!("CARGO_PKG_VERSION"),
        config.proxy.mirror_host
    );

    let store: Option<Arc<dyn KvStore>> = match &config.stats.storage_dir {
        Some(dir) => {
            log_info!("[main] Persisting statistics under {}", dir);
            Some(Arc::new(FileStore::new(dir)?))
        }
        None => {
            log_warn!("[main] stats.storage_dir not set, statistics will not be persisted");
            None
        }
    };
    let stats = Arc::new(Stats::new(&config.stats, store));

    let mut builder = Client::builder().connect_timeout(config.proxy.request_timeout());
    if let Some(upstream_proxy) = &config.proxy.upstream_proxy {
        log_info!("[main] Routing outbound traffic through {}", upstream_proxy);
        builder = builder.proxy(upstream_proxy.clone());
    }
    let client = builder.build()?;

    let fetcher = RedirectFetcher::new(
        Arc::new(client),
        config.proxy.request_timeout(),
        config.proxy.max_redirects,
    );
    let proxy = DownloadProxy::new(fetcher, stats.clone(), &config.proxy);
    let state = AppState::new(Arc::new(config), stats, proxy);

    server::serve(state).await
}
