//! Composable report fragments.
//!
//! Every fragment renders a self-contained piece of the textual report and
//! returns an empty string when its inputs are empty, so sections compose
//! by plain concatenation.

use std::collections::HashMap;
use std::fmt::Write as _;

use super::analyzer::{format_bytes, TargetCount};

pub fn section_header(title: &str) -> String {
    format!("{title} Statistics:\n")
}

pub fn total_with_rate(label: &str, count: usize, rate: f64) -> String {
    format!("  Total {label}: {count} ({rate:.1}/sec)\n")
}

pub fn latency_metrics(avg_ms: f64, max_ms: f64) -> String {
    format!("  Average latency: {avg_ms:.2}ms\n  Max latency: {max_ms:.2}ms\n")
}

pub fn percentiles(p50: f64, p95: f64, p99: f64) -> String {
    format!("  Percentiles: P50={p50:.2}ms, P95={p95:.2}ms, P99={p99:.2}ms\n")
}

pub fn error_rate(errors: u64, total: usize) -> String {
    if total == 0 {
        return format!("  Errors: {errors} (0.0%)\n");
    }
    format!(
        "  Errors: {errors} ({:.1}%)\n",
        errors as f64 * 100.0 / total as f64
    )
}

pub fn top_targets(targets: &[TargetCount], limit: usize, header_label: &str, count_label: &str) -> String {
    if targets.is_empty() {
        return String::new();
    }

    let mut out = format!("  Top {header_label}:\n");
    for target in targets.iter().take(limit) {
        let _ = writeln!(out, "    - {} ({} {})", target.target, target.count, count_label);
    }
    out
}

pub fn bytes_section(total_bytes: u64, avg_bytes: u64, throughput: u64) -> String {
    if total_bytes == 0 {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "  Total bytes transferred: {}", format_bytes(total_bytes));
    let _ = writeln!(out, "  Average bytes per operation: {}", format_bytes(avg_bytes));
    if throughput > 0 {
        let _ = writeln!(out, "  Average throughput: {}/sec", format_bytes(throughput));
    }
    out
}

/// Parenthesized per-second suffix; empty for a zero-length window.
pub fn rate_suffix(count: usize, duration_secs: f64) -> String {
    if duration_secs > 0.0 {
        format!(" ({:.1}/sec)", count as f64 / duration_secs)
    } else {
        String::new()
    }
}

pub fn top_items(items: &HashMap<String, u64>, limit: usize, header_label: &str, item_label: &str) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<(&String, &u64)> = items.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = format!("  Top {header_label}:\n");
    for (name, count) in sorted.into_iter().take(limit) {
        let _ = writeln!(out, "    - {name} ({count} {item_label})");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_header() {
        assert_eq!(section_header("DNS"), "DNS Statistics:\n");
    }

    #[test]
    fn test_total_with_rate() {
        assert_eq!(
            total_with_rate("lookups", 100, 10.5),
            "  Total lookups: 100 (10.5/sec)\n"
        );
    }

    #[test]
    fn test_latency_metrics() {
        let out = latency_metrics(5.5, 10.2);
        assert!(out.contains("5.50"));
        assert!(out.contains("10.20"));
    }

    #[test]
    fn test_percentiles() {
        let out = percentiles(1.0, 2.0, 3.0);
        assert!(out.contains("P50=1.00"));
        assert!(out.contains("P95=2.00"));
        assert!(out.contains("P99=3.00"));
    }

    #[test]
    fn test_error_rate_zero_total() {
        assert!(error_rate(5, 0).contains("0.0%"));
    }

    #[test]
    fn test_error_rate() {
        assert!(error_rate(5, 100).contains("5.0%"));
    }

    #[test]
    fn test_top_targets_empty() {
        assert_eq!(top_targets(&[], 5, "targets", "hits"), "");
    }

    #[test]
    fn test_top_targets_limit() {
        let targets: Vec<TargetCount> = (0..6)
            .map(|i| TargetCount {
                target: format!("target{i}"),
                count: 10 * (6 - i),
            })
            .collect();

        let out = top_targets(&targets, 3, "targets", "hits");
        assert_eq!(out.matches("    - ").count(), 3);
        assert!(out.contains("target0 (60 hits)"));
    }

    #[test]
    fn test_bytes_section_empty() {
        assert_eq!(bytes_section(0, 0, 0), "");
    }

    #[test]
    fn test_bytes_section() {
        let out = bytes_section(1024, 512, 256);
        assert!(out.contains("1.00 KB"));
        assert!(out.contains("512 B"));
        assert!(out.contains("256 B/sec"));
    }

    #[test]
    fn test_bytes_section_without_throughput() {
        let out = bytes_section(2048, 1024, 0);
        assert!(!out.contains("throughput"));
    }

    #[test]
    fn test_rate_suffix() {
        assert_eq!(rate_suffix(100, 0.0), "");
        assert_eq!(rate_suffix(100, 10.0), " (10.0/sec)");
    }

    #[test]
    fn test_top_items() {
        let mut items = HashMap::new();
        items.insert("nginx".to_string(), 30u64);
        items.insert("redis".to_string(), 10u64);

        let out = top_items(&items, 5, "processes", "events");
        assert!(out.starts_with("  Top processes:\n"));
        let nginx_pos = out.find("nginx").expect("nginx listed");
        let redis_pos = out.find("redis").expect("redis listed");
        assert!(nginx_pos < redis_pos);
    }

    #[test]
    fn test_top_items_empty() {
        assert_eq!(top_items(&HashMap::new(), 5, "x", "y"), "");
    }
}
