//! Connection-pool lifecycle tracking and health classification.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

use crate::events::{Event, EventType};

use super::MAX_CONNECTION_TARGETS;

/// Pool id used when an event carries no target.
const DEFAULT_POOL_ID: &str = "default";

#[derive(Debug, Default, Clone)]
struct PoolInfo {
    acquire_count: u64,
    release_count: u64,
    current_conns: u64,
    peak_conns: u64,
    exhausted_count: u64,
    total_wait: Duration,
    max_wait: Duration,
    last_acquire_ns: Option<u64>,
    last_release_ns: Option<u64>,
    last_exhausted_ns: Option<u64>,
}

/// Summary row for one pool, in descending acquire-count order.
#[derive(Debug, Clone)]
pub struct PoolSummary {
    pub pool_id: String,
    pub acquire_count: u64,
    pub release_count: u64,
    pub current_conns: u64,
    pub peak_conns: u64,
    pub exhausted_count: u64,
    pub reuse_rate: f64,
    pub avg_wait: Duration,
    pub max_wait: Duration,
    pub last_acquire_ns: Option<u64>,
    pub last_release_ns: Option<u64>,
    pub last_exhausted_ns: Option<u64>,
}

/// Reconstructs per-pool state from acquire/release/exhausted events.
///
/// A release without a matching acquire is counted but never drives the
/// outstanding count negative; a pool observed mid-flight therefore
/// under-counts its standing connections.
pub struct PoolTracker {
    pools: Mutex<HashMap<String, PoolInfo>>,
}

impl PoolTracker {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn process_event(&self, event: &Event) {
        if !matches!(
            event.event_type,
            EventType::PoolAcquire | EventType::PoolRelease | EventType::PoolExhausted
        ) {
            return;
        }

        let pool_id = if event.target.is_empty() {
            DEFAULT_POOL_ID
        } else {
            event.target.as_str()
        };

        let mut pools = self.lock();
        let pool = pools.entry(pool_id.to_string()).or_default();

        match event.event_type {
            EventType::PoolAcquire => {
                pool.acquire_count += 1;
                pool.current_conns += 1;
                pool.last_acquire_ns = Some(event.timestamp_ns);
                if pool.current_conns > pool.peak_conns {
                    pool.peak_conns = pool.current_conns;
                }
            }
            EventType::PoolRelease => {
                pool.release_count += 1;
                pool.current_conns = pool.current_conns.saturating_sub(1);
                pool.last_release_ns = Some(event.timestamp_ns);
            }
            EventType::PoolExhausted => {
                pool.exhausted_count += 1;
                let wait = event.latency();
                pool.total_wait += wait;
                if wait > pool.max_wait {
                    pool.max_wait = wait;
                }
                pool.last_exhausted_ns = Some(event.timestamp_ns);
            }
            _ => {}
        }
    }

    /// Summaries sorted by acquire count descending.
    pub fn pool_summary(&self) -> Vec<PoolSummary> {
        let pools = self.lock();

        let mut summaries: Vec<PoolSummary> = pools
            .iter()
            .map(|(pool_id, pool)| {
                let reuse_rate = if pool.acquire_count > 0 {
                    pool.release_count as f64 / pool.acquire_count as f64
                } else {
                    0.0
                };
                let avg_wait = if pool.exhausted_count > 0 {
                    pool.total_wait / pool.exhausted_count as u32
                } else {
                    Duration::ZERO
                };

                PoolSummary {
                    pool_id: pool_id.clone(),
                    acquire_count: pool.acquire_count,
                    release_count: pool.release_count,
                    current_conns: pool.current_conns,
                    peak_conns: pool.peak_conns,
                    exhausted_count: pool.exhausted_count,
                    reuse_rate,
                    avg_wait,
                    max_wait: pool.max_wait,
                    last_acquire_ns: pool.last_acquire_ns,
                    last_release_ns: pool.last_release_ns,
                    last_exhausted_ns: pool.last_exhausted_ns,
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.acquire_count.cmp(&a.acquire_count));
        summaries
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PoolInfo>> {
        self.pools.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PoolTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Replay pre-filtered event groups through a fresh tracker.
pub fn pool_summary_from_events(
    acquire_events: &[Event],
    release_events: &[Event],
    exhausted_events: &[Event],
) -> Vec<PoolSummary> {
    let tracker = PoolTracker::new();
    for event in acquire_events
        .iter()
        .chain(release_events)
        .chain(exhausted_events)
    {
        tracker.process_event(event);
    }
    tracker.pool_summary()
}

/// Health classification for a pool; first matching rule wins.
pub fn pool_health(summary: &PoolSummary) -> &'static str {
    if summary.exhausted_count > 0 {
        let exhaustion_rate = summary.exhausted_count as f64 / summary.acquire_count as f64;
        if exhaustion_rate > 0.10 {
            return "CRITICAL - High pool exhaustion rate (>10%)";
        } else if exhaustion_rate > 0.05 {
            return "WARNING - Moderate pool exhaustion rate (>5%)";
        }
    }

    if summary.reuse_rate < 0.5 {
        return "WARNING - Low connection reuse rate (<50%)";
    }

    if summary.max_wait > Duration::from_millis(1000) {
        return "WARNING - High wait times detected";
    }

    "OK - Pool operating normally"
}

/// Text block correlating pool lifecycle activity; empty when the event
/// list produced no pool state.
pub fn pool_correlation(events: &[Event]) -> String {
    if events.is_empty() {
        return String::new();
    }

    let tracker = PoolTracker::new();
    let mut saw_pool_event = false;
    for event in events {
        if matches!(
            event.event_type,
            EventType::PoolAcquire | EventType::PoolRelease | EventType::PoolExhausted
        ) {
            saw_pool_event = true;
            tracker.process_event(event);
        }
    }
    if !saw_pool_event {
        return String::new();
    }

    let summaries = tracker.pool_summary();
    let mut report = String::from("Connection Pool Tracking:\n");
    let _ = writeln!(report, "  Active pools: {}", summaries.len());
    report.push_str("  Pool statistics:\n");

    for summary in summaries.iter().take(MAX_CONNECTION_TARGETS) {
        let _ = writeln!(report, "    - {}:", summary.pool_id);
        let _ = writeln!(
            report,
            "        Acquires: {}, Releases: {}",
            summary.acquire_count, summary.release_count
        );
        let _ = writeln!(report, "        Reuse rate: {:.2}%", summary.reuse_rate * 100.0);
        let _ = writeln!(
            report,
            "        Current connections: {} (peak: {})",
            summary.current_conns, summary.peak_conns
        );
        let _ = writeln!(report, "        Status: {}", pool_health(summary));

        if summary.exhausted_count > 0 {
            let _ = writeln!(report, "        Exhaustion events: {}", summary.exhausted_count);
            let _ = writeln!(
                report,
                "        Avg wait time: {:.2}ms",
                summary.avg_wait.as_secs_f64() * 1000.0
            );
            let _ = writeln!(
                report,
                "        Max wait time: {:.2}ms",
                summary.max_wait.as_secs_f64() * 1000.0
            );
        }
        if let Some(ns) = summary.last_acquire_ns {
            let _ = writeln!(report, "        Last acquire: +{:.3}s", ns as f64 / 1e9);
        }
    }
    report.push('\n');
    report
}
