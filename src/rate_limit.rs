use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::clock::Clock;
use crate::metrics::TRACKED_CLIENTS;

// Fixed window state for one client
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub window_start: Instant,
    pub count: u32, // requests attempted since window_start, admitted or not
}

/// Per-client fixed window counter.
///
/// Each key's check-and-update runs while holding that key's shard lock, so two
/// concurrent requests can never both observe the same count. Bursts straddling a
/// window boundary may see up to twice `limit` admissions; that is inherent to a
/// fixed window and kept as-is.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    // Admit or reject one request from `client` arriving at `now`
    pub fn admit(&self, client: &str, now: Instant) -> bool {
        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert(RateWindow {
                window_start: now,
                count: 0,
            });

        // window expired..? start a new one with this request in it
        if now.saturating_duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 1;
            return true;
        }

        entry.count = entry.count.saturating_add(1);
        entry.count <= self.limit
    }

    /// Snapshot of a client's window, if it has ever been seen.
    pub fn window_of(&self, client: &str) -> Option<RateWindow> {
        self.windows.get(client).map(|w| *w)
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Evict clients whose window started at least `retention` before `now`.
    /// Returns how many were removed.
    pub fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let mut evicted = 0;
        self.windows.retain(|_, w| {
            let keep = now.saturating_duration_since(w.window_start) < retention;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }
}

// Background eviction of idle clients, runs every `every`
pub async fn window_sweeper(
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    every: Duration,
    retention: Duration,
) {
    let mut ticker = interval(every);
    tracing::info!(?every, ?retention, "rate window sweeper started");

    loop {
        ticker.tick().await;

        let evicted = limiter.sweep(clock.now(), retention);
        let remaining = limiter.tracked_clients();
        TRACKED_CLIENTS.set(remaining as f64);

        if evicted > 0 {
            tracing::debug!(evicted, remaining, "evicted idle rate windows");
        }
    }
}
