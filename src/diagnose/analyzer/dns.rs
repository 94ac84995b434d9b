//! DNS lookup statistics.

use std::collections::HashMap;

use crate::events::Event;

use super::{percentile, sort_latencies, top_targets, TargetCount};

/// Result record for the DNS event class.
#[derive(Debug, Clone, Default)]
pub struct DnsStats {
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub errors: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub top_targets: Vec<TargetCount>,
}

/// Analyze DNS lookups. Targets that are empty or the probe's "?"
/// placeholder are excluded from the top-targets list.
pub fn analyze_dns(events: &[&Event]) -> DnsStats {
    let mut stats = DnsStats::default();
    let mut latencies = Vec::with_capacity(events.len());
    let mut total_latency = 0.0;
    let mut target_counts: HashMap<String, u64> = HashMap::new();

    for event in events {
        let latency_ms = event.latency_ms();
        latencies.push(latency_ms);
        total_latency += latency_ms;
        if latency_ms > stats.max_latency_ms {
            stats.max_latency_ms = latency_ms;
        }
        if event.error != 0 {
            stats.errors += 1;
        }
        if !event.target.is_empty() && event.target != "?" {
            *target_counts.entry(event.target.clone()).or_default() += 1;
        }
    }

    if !events.is_empty() {
        stats.avg_latency_ms = total_latency / events.len() as f64;
        let sorted = sort_latencies(latencies);
        stats.p50_ms = percentile(&sorted, 50.0);
        stats.p95_ms = percentile(&sorted, 95.0);
        stats.p99_ms = percentile(&sorted, 99.0);
    }

    stats.top_targets = top_targets(target_counts);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn dns(latency_ms: u64, error: i32, target: &str) -> Event {
        Event {
            latency_ns: latency_ms * 1_000_000,
            error,
            target: target.to_string(),
            ..Event::of(EventType::Dns)
        }
    }

    #[test]
    fn test_analyze_dns() {
        let events = vec![
            dns(1, 0, "example.com"),
            dns(2, 0, "example.com"),
            dns(3, 0, "google.com"),
            dns(4, 1, "invalid.com"),
            dns(5, 0, "example.com"),
        ];
        let refs: Vec<&Event> = events.iter().collect();

        let stats = analyze_dns(&refs);
        assert_eq!(stats.avg_latency_ms, 3.0);
        assert_eq!(stats.max_latency_ms, 5.0);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.p50_ms, 3.0);
        assert_eq!(stats.top_targets[0].target, "example.com");
        assert_eq!(stats.top_targets[0].count, 3);
    }

    #[test]
    fn test_analyze_dns_empty() {
        let stats = analyze_dns(&[]);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.max_latency_ms, 0.0);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.p50_ms, 0.0);
        assert_eq!(stats.p95_ms, 0.0);
        assert_eq!(stats.p99_ms, 0.0);
        assert!(stats.top_targets.is_empty());
    }

    #[test]
    fn test_analyze_dns_excludes_placeholder_targets() {
        let events = vec![dns(1, 0, ""), dns(2, 0, "?"), dns(3, 0, "real.com")];
        let refs: Vec<&Event> = events.iter().collect();

        let stats = analyze_dns(&refs);
        assert_eq!(stats.top_targets.len(), 1);
        assert_eq!(stats.top_targets[0].target, "real.com");
    }
}
