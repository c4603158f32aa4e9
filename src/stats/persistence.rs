//! Hydration, periodic flush and daily rollover of [`Stats`].
//!
//! Storage is best effort throughout: read and write failures are logged and
//! otherwise ignored, and never reach a client response.

use super::{KvStore, Stats, StatsSnapshot};
use crate::{log_debug, log_info, log_warn};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const DAILY_STATS_KEY: &str = "daily_stats";
pub const TOTAL_STATS_KEY: &str = "total_stats";
pub const DOWNLOADS_KEY: &str = "downloads_data";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub requests_today: u64,
    #[serde(default)]
    pub active_users: Vec<String>,
    #[serde(default)]
    pub last_updated: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalRecord {
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub data_transferred: u64,
    #[serde(default)]
    pub errors: u64,
    /// Epoch milliseconds.
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub last_updated: i64,
}

pub type DownloadsRecord = HashMap<String, u64>;

impl StatsSnapshot {
    fn daily_record(&self, now: DateTime<Utc>) -> DailyRecord {
        DailyRecord {
            date: now.date_naive(),
            requests_today: self.requests_today,
            active_users: self.active_users.iter().cloned().collect(),
            last_updated: now.timestamp_millis(),
        }
    }

    fn total_record(&self, now: DateTime<Utc>) -> TotalRecord {
        TotalRecord {
            total_requests: self.total_requests,
            cache_hits: self.cache_hits,
            data_transferred: self.data_transferred,
            errors: self.errors,
            start_time: Some(self.start_time.timestamp_millis()),
            last_updated: now.timestamp_millis(),
        }
    }

    /// Stale daily records (from another day) are ignored. A current one also
    /// marks today as already reset, so the following rollover keeps it.
    fn apply_daily(&mut self, record: DailyRecord, today: NaiveDate) {
        if record.date != today {
            log_debug!(
                "[stats] discarding daily record from {} (today is {})",
                record.date,
                today
            );
            return;
        }
        self.requests_today = record.requests_today;
        self.active_users = record.active_users.into_iter().collect();
        self.last_reset = today;
    }

    fn apply_total(&mut self, record: TotalRecord, now: DateTime<Utc>) {
        self.total_requests = record.total_requests;
        self.cache_hits = record.cache_hits;
        self.data_transferred = record.data_transferred;
        self.errors = record.errors;
        self.start_time = record
            .start_time
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(now);
    }
}

impl Stats {
    /// Runs the per-request lifecycle: hydrate once, roll the day over, and
    /// start a background flush when one is due. The returned handle belongs
    /// to the detached flush; callers are free to drop it.
    pub async fn prepare(self: &Arc<Self>, now: DateTime<Utc>) -> Option<JoinHandle<()>> {
        self.hydrate_once(now).await;
        self.rollover_if_needed(now.date_naive()).await;
        self.flush_if_due(now).await
    }

    pub async fn hydrate_once(&self, now: DateTime<Utc>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        self.hydrated
            .get_or_init(|| self.hydrate(store.as_ref(), now))
            .await;
    }

    async fn hydrate(&self, store: &dyn KvStore, now: DateTime<Utc>) {
        let daily: Option<DailyRecord> = load(store, DAILY_STATS_KEY).await;
        let total: Option<TotalRecord> = load(store, TOTAL_STATS_KEY).await;
        let downloads: Option<DownloadsRecord> = load(store, DOWNLOADS_KEY).await;

        let mut snapshot = self.snapshot.lock().await;
        if let Some(daily) = daily {
            snapshot.apply_daily(daily, now.date_naive());
        }
        if let Some(total) = total {
            snapshot.apply_total(total, now);
        }
        if let Some(downloads) = downloads {
            snapshot.downloads = downloads;
        }
        // Marked even when every read failed so hydration is never retried.
        snapshot.last_sync = Some(now);

        log_info!(
            "[stats] hydrated from storage: total_requests={}, requests_today={}, downloads={}",
            snapshot.total_requests,
            snapshot.requests_today,
            snapshot.downloads.len()
        );
    }

    pub async fn rollover_if_needed(&self, today: NaiveDate) {
        if self.snapshot.lock().await.rollover(today) {
            log_info!("[stats] daily counters reset for {}", today);
        }
    }

    /// Spawns a detached write of all three records when the sync interval has
    /// elapsed. `last_sync` moves forward as soon as the writes are issued.
    pub async fn flush_if_due(self: &Arc<Self>, now: DateTime<Utc>) -> Option<JoinHandle<()>> {
        let store = Arc::clone(self.store.as_ref()?);

        let (daily, total, downloads) = {
            let mut snapshot = self.snapshot.lock().await;
            let since_sync = snapshot
                .last_sync
                .map(|last| (now - last).to_std().unwrap_or_default());
            if let Some(elapsed) = since_sync {
                if elapsed < self.sync_interval {
                    return None;
                }
            }
            snapshot.last_sync = Some(now);
            (
                snapshot.daily_record(now),
                snapshot.total_record(now),
                snapshot.downloads.clone(),
            )
        };

        Some(tokio::spawn(async move {
            let (daily, total, downloads) = futures::join!(
                save(store.as_ref(), DAILY_STATS_KEY, &daily),
                save(store.as_ref(), TOTAL_STATS_KEY, &total),
                save(store.as_ref(), DOWNLOADS_KEY, &downloads)
            );
            if daily && total && downloads {
                log_debug!("[stats] flushed statistics to storage");
            }
        }))
    }
}

async fn load<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    let value = match store.get(key).await {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(e) => {
            log_warn!("[stats] failed to read {}: {}", key, e);
            return None;
        }
    };

    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            log_warn!("[stats] ignoring malformed {} record: {}", key, e);
            None
        }
    }
}

async fn save<T: Serialize>(store: &dyn KvStore, key: &str, record: &T) -> bool {
    let body = match serde_json::to_string(record) {
        Ok(body) => body,
        Err(e) => {
            log_warn!("[stats] failed to encode {}: {}", key, e);
            return false;
        }
    };

    match store.put(key, body).await {
        Ok(()) => true,
        Err(e) => {
            log_warn!("[stats] failed to write {}: {}", key, e);
            false
        }
    }
}
