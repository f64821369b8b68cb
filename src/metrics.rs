use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for the lifecycle and serving paths. One instance is built in main
/// and injected everywhere as an `Arc` rather than living in a global.
#[derive(Debug)]
pub struct Metrics {
    pub sessions_created_total: AtomicU64,
    pub sessions_removed_total: AtomicU64,
    pub transcoders_spawned_total: AtomicU64,
    pub spawn_failures_total: AtomicU64,
    pub http_requests_total: AtomicU64,
    pub playlist_requests_total: AtomicU64,
    pub segment_requests_total: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_created_total: AtomicU64::new(0),
            sessions_removed_total: AtomicU64::new(0),
            transcoders_spawned_total: AtomicU64::new(0),
            spawn_failures_total: AtomicU64::new(0),
            http_requests_total: AtomicU64::new(0),
            playlist_requests_total: AtomicU64::new(0),
            segment_requests_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_session_created(&self) {
        self.sessions_created_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_removed(&self) {
        self.sessions_removed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transcoder_spawned(&self) {
        self.transcoders_spawned_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spawn_failure(&self) {
        self.spawn_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_playlist_request(&self) {
        self.playlist_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_request(&self) {
        self.segment_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_created_total: self.sessions_created_total.load(Ordering::Relaxed),
            sessions_removed_total: self.sessions_removed_total.load(Ordering::Relaxed),
            transcoders_spawned_total: self.transcoders_spawned_total.load(Ordering::Relaxed),
            spawn_failures_total: self.spawn_failures_total.load(Ordering::Relaxed),
            http_requests_total: self.http_requests_total.load(Ordering::Relaxed),
            playlist_requests_total: self.playlist_requests_total.load(Ordering::Relaxed),
            segment_requests_total: self.segment_requests_total.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_created_total: u64,
    pub sessions_removed_total: u64,
    pub transcoders_spawned_total: u64,
    pub spawn_failures_total: u64,
    pub http_requests_total: u64,
    pub playlist_requests_total: u64,
    pub segment_requests_total: u64,
    pub uptime_seconds: u64,
}
