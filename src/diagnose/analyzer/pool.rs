//! Connection-pool statistics over pre-filtered event groups.

use std::collections::HashMap;
use std::time::Duration;

use crate::events::Event;

use super::{percentile, sort_latencies};

/// Result record for the pool classes.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub total_acquires: u64,
    pub total_releases: u64,
    pub exhausted_count: u64,
    pub reuse_rate: f64,
    pub avg_wait: Duration,
    pub max_wait: Duration,
    pub p50_wait_ms: f64,
    pub p95_wait_ms: f64,
    pub p99_wait_ms: f64,
    pub peak_connections: u64,
    pub avg_connections: f64,
}

/// Analyze pool lifecycle events. Peak and standing connection counts come
/// from replaying acquires and releases per pool id; releases never drive a
/// pool's count negative.
pub fn analyze_pool(
    acquire_events: &[&Event],
    release_events: &[&Event],
    exhausted_events: &[&Event],
) -> PoolStats {
    let mut stats = PoolStats {
        total_acquires: acquire_events.len() as u64,
        total_releases: release_events.len() as u64,
        exhausted_count: exhausted_events.len() as u64,
        ..PoolStats::default()
    };

    if stats.total_acquires > 0 {
        stats.reuse_rate = stats.total_releases as f64 / stats.total_acquires as f64;
    }

    let mut wait_times = Vec::with_capacity(exhausted_events.len());
    let mut total_wait = Duration::ZERO;
    for event in exhausted_events {
        let wait = event.latency();
        wait_times.push(event.latency_ms());
        total_wait += wait;
        if wait > stats.max_wait {
            stats.max_wait = wait;
        }
    }

    if stats.exhausted_count > 0 {
        stats.avg_wait = total_wait / stats.exhausted_count as u32;
        let sorted = sort_latencies(wait_times);
        stats.p50_wait_ms = percentile(&sorted, 50.0);
        stats.p95_wait_ms = percentile(&sorted, 95.0);
        stats.p99_wait_ms = percentile(&sorted, 99.0);
    }

    // Replay per pool id for peak / standing counts.
    let mut per_pool: HashMap<&str, (u64, u64)> = HashMap::new();
    for event in acquire_events {
        let id = pool_id(event);
        let entry = per_pool.entry(id).or_default();
        entry.0 += 1;
        if entry.0 > entry.1 {
            entry.1 = entry.0;
        }
    }
    for event in release_events {
        let id = pool_id(event);
        let entry = per_pool.entry(id).or_default();
        entry.0 = entry.0.saturating_sub(1);
    }

    let mut total_current = 0u64;
    for (current, peak) in per_pool.values() {
        if *peak > stats.peak_connections {
            stats.peak_connections = *peak;
        }
        total_current += current;
    }
    if !per_pool.is_empty() {
        stats.avg_connections = total_current as f64 / per_pool.len() as f64;
    }

    stats
}

fn pool_id(event: &Event) -> &str {
    if event.target.is_empty() {
        "default"
    } else {
        &event.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn pool_event(event_type: EventType, target: &str, latency_ms: u64) -> Event {
        Event {
            target: target.to_string(),
            latency_ns: latency_ms * 1_000_000,
            ..Event::of(event_type)
        }
    }

    #[test]
    fn test_analyze_pool_balanced() {
        let acquires = vec![
            pool_event(EventType::PoolAcquire, "pool1", 0),
            pool_event(EventType::PoolAcquire, "pool1", 0),
        ];
        let releases = vec![
            pool_event(EventType::PoolRelease, "pool1", 0),
            pool_event(EventType::PoolRelease, "pool1", 0),
        ];
        let acquire_refs: Vec<&Event> = acquires.iter().collect();
        let release_refs: Vec<&Event> = releases.iter().collect();

        let stats = analyze_pool(&acquire_refs, &release_refs, &[]);
        assert_eq!(stats.total_acquires, 2);
        assert_eq!(stats.total_releases, 2);
        assert_eq!(stats.reuse_rate, 1.0);
        assert_eq!(stats.peak_connections, 2);
        assert_eq!(stats.avg_connections, 0.0);
    }

    #[test]
    fn test_analyze_pool_exhaustion_waits() {
        let exhausted = vec![
            pool_event(EventType::PoolExhausted, "p", 10),
            pool_event(EventType::PoolExhausted, "p", 30),
        ];
        let refs: Vec<&Event> = exhausted.iter().collect();

        let stats = analyze_pool(&[], &[], &refs);
        assert_eq!(stats.exhausted_count, 2);
        assert_eq!(stats.avg_wait, Duration::from_millis(20));
        assert_eq!(stats.max_wait, Duration::from_millis(30));
        assert_eq!(stats.p50_wait_ms, 10.0);
    }

    #[test]
    fn test_analyze_pool_empty() {
        let stats = analyze_pool(&[], &[], &[]);
        assert_eq!(stats.total_acquires, 0);
        assert_eq!(stats.reuse_rate, 0.0);
        assert_eq!(stats.avg_wait, Duration::ZERO);
        assert_eq!(stats.peak_connections, 0);
    }

    #[test]
    fn test_analyze_pool_default_id_grouping() {
        let acquires = vec![
            pool_event(EventType::PoolAcquire, "", 0),
            pool_event(EventType::PoolAcquire, "", 0),
        ];
        let refs: Vec<&Event> = acquires.iter().collect();

        let stats = analyze_pool(&refs, &[], &[]);
        assert_eq!(stats.peak_connections, 2);
        assert_eq!(stats.avg_connections, 2.0);
    }
}
