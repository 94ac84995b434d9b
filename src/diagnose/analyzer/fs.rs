//! Filesystem (VFS read/write/fsync) statistics.

use crate::events::Event;

use super::{percentile, sort_latencies};

/// Result record for the filesystem classes.
#[derive(Debug, Clone, Default)]
pub struct FsStats {
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub slow_ops: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub total_bytes: u64,
    pub avg_bytes: u64,
}

/// Analyze filesystem operations; an op slower than `slow_threshold_ms`
/// counts as slow.
pub fn analyze_fs(events: &[&Event], slow_threshold_ms: f64) -> FsStats {
    let mut stats = FsStats::default();
    let mut latencies = Vec::with_capacity(events.len());
    let mut total_latency = 0.0;

    for event in events {
        let latency_ms = event.latency_ms();
        latencies.push(latency_ms);
        total_latency += latency_ms;
        if latency_ms > stats.max_latency_ms {
            stats.max_latency_ms = latency_ms;
        }
        if latency_ms > slow_threshold_ms {
            stats.slow_ops += 1;
        }
        stats.total_bytes += event.bytes;
    }

    if !events.is_empty() {
        stats.avg_latency_ms = total_latency / events.len() as f64;
        stats.avg_bytes = stats.total_bytes / events.len() as u64;
        let sorted = sort_latencies(latencies);
        stats.p50_ms = percentile(&sorted, 50.0);
        stats.p95_ms = percentile(&sorted, 95.0);
        stats.p99_ms = percentile(&sorted, 99.0);
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn fs_op(latency_ms: u64, bytes: u64) -> Event {
        Event {
            latency_ns: latency_ms * 1_000_000,
            bytes,
            ..Event::of(EventType::Write)
        }
    }

    #[test]
    fn test_analyze_fs() {
        let events = vec![
            fs_op(5, 1024),
            fs_op(10, 2048),
            fs_op(15, 4096),
            fs_op(2, 512),
            fs_op(8, 0),
        ];
        let refs: Vec<&Event> = events.iter().collect();

        let stats = analyze_fs(&refs, 10.0);
        assert_eq!(stats.avg_latency_ms, 8.0);
        assert_eq!(stats.max_latency_ms, 15.0);
        assert_eq!(stats.slow_ops, 1);
        assert_eq!(stats.total_bytes, 7680);
        assert_eq!(stats.avg_bytes, 1536);
    }

    #[test]
    fn test_analyze_fs_empty() {
        let stats = analyze_fs(&[], 10.0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.max_latency_ms, 0.0);
        assert_eq!(stats.slow_ops, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.avg_bytes, 0);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let events = vec![fs_op(10, 0)];
        let refs: Vec<&Event> = events.iter().collect();
        // Exactly at the threshold is not slow.
        assert_eq!(analyze_fs(&refs, 10.0).slow_ops, 0);
    }
}
