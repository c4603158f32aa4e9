//! Process-wide usage statistics.
//!
//! A single [`Stats`] instance is shared by every request handler. Counter
//! updates take a short async lock and never wait on storage; the lifecycle
//! around external persistence lives in [`persistence`].

pub mod persistence;
pub mod store;

use crate::config::StatsConfig;
use crate::utils::{format_bytes, format_duration};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
#[cfg(test)]
pub use store::MemoryStore;
pub use store::{FileStore, KvStore};
use tokio::sync::{Mutex, OnceCell};

pub const NO_DOWNLOADS_PLACEHOLDER: &str = "No downloads yet";
const TOP_DOWNLOADS: usize = 5;

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub requests_today: u64,
    pub total_requests: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub response_times_ms: Vec<u64>,
    pub data_transferred: u64,
    pub active_users: HashSet<String>,
    pub downloads: HashMap<String, u64>,
    pub start_time: DateTime<Utc>,
    pub last_reset: NaiveDate,
    /// `None` until the first hydration or flush.
    pub last_sync: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            requests_today: 0,
            total_requests: 0,
            cache_hits: 0,
            errors: 0,
            response_times_ms: Vec::new(),
            data_transferred: 0,
            active_users: HashSet::new(),
            downloads: HashMap::new(),
            start_time: now,
            last_reset: now.date_naive(),
            last_sync: None,
        }
    }

    /// Appends a sample; past `cap` entries only the newest `keep` survive.
    pub fn push_response_time(&mut self, ms: u64, cap: usize, keep: usize) {
        self.response_times_ms.push(ms);
        if self.response_times_ms.len() > cap {
            let excess = self.response_times_ms.len() - keep;
            self.response_times_ms.drain(..excess);
        }
    }

    /// Resets the per-day counters when `today` differs from the last reset day.
    pub fn rollover(&mut self, today: NaiveDate) -> bool {
        if self.last_reset == today {
            return false;
        }
        self.requests_today = 0;
        self.active_users.clear();
        self.last_reset = today;
        true
    }

    pub fn cache_hit_rate(&self) -> String {
        if self.total_requests == 0 {
            return "0.0".to_string();
        }
        format!(
            "{:.1}",
            self.cache_hits as f64 / self.total_requests as f64 * 100.0
        )
    }

    pub fn average_response_time(&self) -> u64 {
        if self.response_times_ms.is_empty() {
            return 0;
        }
        let sum: u64 = self.response_times_ms.iter().sum();
        (sum as f64 / self.response_times_ms.len() as f64).round() as u64
    }

    /// Up to five `name (count)` entries, busiest first.
    pub fn top_downloads(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &u64)> = self.downloads.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut top: Vec<String> = entries
            .into_iter()
            .take(TOP_DOWNLOADS)
            .map(|(name, count)| format!("{} ({})", name, count))
            .collect();

        if top.is_empty() {
            top.push(NO_DOWNLOADS_PLACEHOLDER.to_string());
        }
        top
    }

    pub fn report(&self, now: DateTime<Utc>) -> StatsReport {
        let uptime = (now - self.start_time).to_std().unwrap_or_default();
        StatsReport {
            requests_today: self.requests_today,
            total_requests: self.total_requests,
            cache_hit_rate: format!("{}%", self.cache_hit_rate()),
            avg_response_time: format!("{}ms", self.average_response_time()),
            uptime: format_duration(uptime),
            data_transferred: format_bytes(self.data_transferred),
            active_users: self.active_users.len(),
            top_downloads: self.top_downloads(),
            errors: self.errors,
        }
    }
}

/// Body of the `/stats` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub requests_today: u64,
    pub total_requests: u64,
    pub cache_hit_rate: String,
    pub avg_response_time: String,
    pub uptime: String,
    pub data_transferred: String,
    pub active_users: usize,
    pub top_downloads: Vec<String>,
    pub errors: u64,
}

pub struct Stats {
    snapshot: Mutex<StatsSnapshot>,
    store: Option<Arc<dyn KvStore>>,
    hydrated: OnceCell<()>,
    sync_interval: Duration,
    response_time_cap: usize,
    response_time_keep: usize,
}

impl Stats {
    pub fn new(config: &StatsConfig, store: Option<Arc<dyn KvStore>>) -> Self {
        Self::with_start(config, store, Utc::now())
    }

    pub fn with_start(
        config: &StatsConfig,
        store: Option<Arc<dyn KvStore>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            snapshot: Mutex::new(StatsSnapshot::new(now)),
            store,
            hydrated: OnceCell::new(),
            sync_interval: config.sync_interval(),
            response_time_cap: config.response_time_cap,
            response_time_keep: config.response_time_keep,
        }
    }

    pub async fn record_client(&self, client_id: &str) {
        let mut snapshot = self.snapshot.lock().await;
        if !snapshot.active_users.contains(client_id) {
            snapshot.active_users.insert(client_id.to_string());
        }
    }

    /// Counts a request entering the proxy pipeline.
    pub async fn record_attempt(&self) {
        let mut snapshot = self.snapshot.lock().await;
        snapshot.total_requests += 1;
        snapshot.requests_today += 1;
    }

    pub async fn record_error(&self) {
        self.snapshot.lock().await.errors += 1;
    }

    pub async fn record_download(&self, file_name: &str) {
        let mut snapshot = self.snapshot.lock().await;
        *snapshot.downloads.entry(file_name.to_string()).or_default() += 1;
    }

    /// Accounts a successfully delivered upstream response.
    pub async fn record_delivery(&self, cache_hit: bool, content_length: Option<u64>) {
        let mut snapshot = self.snapshot.lock().await;
        if cache_hit {
            snapshot.cache_hits += 1;
        }
        if let Some(len) = content_length {
            snapshot.data_transferred = snapshot.data_transferred.saturating_add(len);
        }
    }

    pub async fn record_response_time(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.snapshot.lock().await.push_response_time(
            ms,
            self.response_time_cap,
            self.response_time_keep,
        );
    }

    pub async fn report(&self, now: DateTime<Utc>) -> StatsReport {
        self.snapshot.lock().await.report(now)
    }

    /// Copy of the current counters.
    #[cfg(test)]
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.snapshot.lock().await.clone()
    }
}

pub type SharedStats = Arc<Stats>;
