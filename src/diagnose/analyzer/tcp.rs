//! TCP send/receive statistics.

use crate::events::Event;

use super::{percentile, sort_latencies};

/// Result record for the TCP send/recv classes.
#[derive(Debug, Clone, Default)]
pub struct TcpStats {
    pub avg_rtt_ms: f64,
    pub max_rtt_ms: f64,
    pub spikes: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub errors: u64,
    pub total_bytes: u64,
    pub avg_bytes: u64,
    pub peak_bytes: u64,
}

/// Analyze TCP operations; an event whose latency exceeds
/// `spike_threshold_ms` counts as an RTT spike.
pub fn analyze_tcp(events: &[&Event], spike_threshold_ms: f64) -> TcpStats {
    let mut stats = TcpStats::default();
    let mut latencies = Vec::with_capacity(events.len());
    let mut total_latency = 0.0;

    for event in events {
        let latency_ms = event.latency_ms();
        latencies.push(latency_ms);
        total_latency += latency_ms;
        if latency_ms > stats.max_rtt_ms {
            stats.max_rtt_ms = latency_ms;
        }
        if latency_ms > spike_threshold_ms {
            stats.spikes += 1;
        }
        if event.error != 0 {
            stats.errors += 1;
        }
        stats.total_bytes += event.bytes;
        if event.bytes > stats.peak_bytes {
            stats.peak_bytes = event.bytes;
        }
    }

    if !events.is_empty() {
        stats.avg_rtt_ms = total_latency / events.len() as f64;
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

    fn tcp(latency_ms: u64, error: i32, bytes: u64) -> Event {
        Event {
            latency_ns: latency_ms * 1_000_000,
            error,
            bytes,
            ..Event::of(EventType::TcpSend)
        }
    }

    #[test]
    fn test_analyze_tcp() {
        let events = vec![
            tcp(10, 0, 1024),
            tcp(20, 0, 2048),
            tcp(150, 0, 4096),
            tcp(30, -1, 0),
            tcp(5, 0, 512),
        ];
        let refs: Vec<&Event> = events.iter().collect();

        let stats = analyze_tcp(&refs, 100.0);
        assert_eq!(stats.avg_rtt_ms, 43.0);
        assert_eq!(stats.max_rtt_ms, 150.0);
        assert_eq!(stats.spikes, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_bytes, 7680);
        assert_eq!(stats.peak_bytes, 4096);
    }

    #[test]
    fn test_analyze_tcp_no_spikes() {
        let events = vec![tcp(10, 0, 0), tcp(20, 0, 0), tcp(30, 0, 0)];
        let refs: Vec<&Event> = events.iter().collect();

        let stats = analyze_tcp(&refs, 100.0);
        assert_eq!(stats.spikes, 0);
    }

    #[test]
    fn test_analyze_tcp_empty() {
        let stats = analyze_tcp(&[], 100.0);
        assert_eq!(stats.avg_rtt_ms, 0.0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.avg_bytes, 0);
        assert_eq!(stats.p99_ms, 0.0);
    }
}
