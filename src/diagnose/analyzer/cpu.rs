//! Scheduler block-time statistics.

use crate::events::Event;

use super::{percentile, sort_latencies};

/// Result record for scheduler context switches: block time only.
#[derive(Debug, Clone, Default)]
pub struct CpuStats {
    pub avg_block_ms: f64,
    pub max_block_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

pub fn analyze_cpu(events: &[&Event]) -> CpuStats {
    let mut stats = CpuStats::default();
    let mut blocks = Vec::with_capacity(events.len());
    let mut total_block = 0.0;

    for event in events {
        let block_ms = event.latency_ms();
        blocks.push(block_ms);
        total_block += block_ms;
        if block_ms > stats.max_block_ms {
            stats.max_block_ms = block_ms;
        }
    }

    if !events.is_empty() {
        stats.avg_block_ms = total_block / events.len() as f64;
        let sorted = sort_latencies(blocks);
        stats.p50_ms = percentile(&sorted, 50.0);
        stats.p95_ms = percentile(&sorted, 95.0);
        stats.p99_ms = percentile(&sorted, 99.0);
    }

    stats
}
