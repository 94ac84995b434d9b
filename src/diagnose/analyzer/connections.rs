//! Socket connect statistics.

use std::collections::HashMap;

use crate::events::Event;

use super::{percentile, sort_latencies, top_targets, TargetCount};

/// Result record for the connect class.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub errors: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub top_targets: Vec<TargetCount>,
    /// Error code -> occurrence count for failed connects.
    pub error_breakdown: HashMap<i32, u64>,
}

/// Analyze connect operations. Failed connects stay in the latency
/// distribution (a slow failure is still a slow connect) and additionally
/// feed the error breakdown.
pub fn analyze_connections(events: &[&Event]) -> ConnectionStats {
    let mut stats = ConnectionStats::default();
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
            *stats.error_breakdown.entry(event.error).or_default() += 1;
        }
        if !event.target.is_empty() {
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
