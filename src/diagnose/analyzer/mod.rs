//! Per-event-class statistical analyzers.
//!
//! Each analyzer reduces its class's events to a structured result record;
//! callers name the fields they need instead of unpacking tuples.

pub mod connections;
pub mod cpu;
pub mod dns;
pub mod fs;
pub mod pool;
pub mod tcp;

use std::collections::HashMap;

use serde::Serialize;

/// Targets listed per top-targets block.
pub const DEFAULT_TOP_TARGETS: usize = 5;

/// Nearest-rank percentile with truncation: index `floor((n-1) * p / 100)`.
/// No interpolation; an empty input yields 0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() - 1) as f64 * p / 100.0) as usize;
    sorted[index]
}

/// Human byte formatting: plain bytes under 1 KiB, then two-decimal binary
/// KB/MB/GB.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// A target with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetCount {
    pub target: String,
    pub count: u64,
}

/// Flatten a target histogram into a descending-count list.
pub(crate) fn top_targets(map: HashMap<String, u64>) -> Vec<TargetCount> {
    let mut targets: Vec<TargetCount> = map
        .into_iter()
        .map(|(target, count)| TargetCount { target, count })
        .collect();
    targets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.target.cmp(&b.target)));
    targets
}

/// Sort a latency distribution; NaN cannot occur (inputs come from u64 ns).
pub(crate) fn sort_latencies(mut latencies: Vec<f64>) -> Vec<f64> {
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    latencies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_empty() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[], 99.0), 0.0);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[10.0], 50.0), 10.0);
        assert_eq!(percentile(&[10.0], 95.0), 10.0);
    }

    #[test]
    fn test_percentile_two_values() {
        assert_eq!(percentile(&[10.0, 20.0], 50.0), 10.0);
        assert_eq!(percentile(&[10.0, 20.0], 95.0), 10.0);
    }

    #[test]
    fn test_percentile_ten_values() {
        let data: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&data, 50.0), 5.0);
        assert_eq!(percentile(&data, 95.0), 9.0);
        assert_eq!(percentile(&data, 99.0), 9.0);
        assert_eq!(percentile(&data, 100.0), 10.0);
    }

    #[test]
    fn test_percentile_monotone() {
        let data: Vec<f64> = (1..=37).map(f64::from).collect();
        let p50 = percentile(&data, 50.0);
        let p95 = percentile(&data, 95.0);
        let p99 = percentile(&data, 99.0);
        assert!(p50 <= p95);
        assert!(p95 <= p99);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_top_targets_order() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 5);
        map.insert("c".to_string(), 2);

        let targets = top_targets(map);
        assert_eq!(targets[0].target, "a");
        assert_eq!(targets[0].count, 5);
        // Ties break by name for deterministic output.
        assert_eq!(targets[1].target, "b");
        assert_eq!(targets[2].target, "c");
    }
}
