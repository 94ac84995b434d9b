//! Threshold-based issue detection.
//!
//! Each rule inspects the event list independently and yields at most one
//! human-readable line.

use crate::events::{Event, EventType};

/// Detection thresholds; latencies in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct DetectorThresholds {
    pub error_rate_pct: f64,
    pub rtt_spike_ms: f64,
    pub fs_slow_ms: f64,
    pub fs_slow_issue_count: usize,
}

/// Run every rule and collect the lines of those that fired.
pub fn detect_issues(events: &[Event], thresholds: &DetectorThresholds) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(issue) = dns_error_rate(events, thresholds.error_rate_pct) {
        issues.push(issue);
    }
    if let Some(issue) = tcp_latency_spikes(events, thresholds.rtt_spike_ms) {
        issues.push(issue);
    }
    if let Some(issue) = oom_kills(events) {
        issues.push(issue);
    }
    if let Some(issue) = connection_failures(events) {
        issues.push(issue);
    }
    if let Some(issue) = slow_fs_operations(events, thresholds.fs_slow_ms, thresholds.fs_slow_issue_count)
    {
        issues.push(issue);
    }

    issues
}

fn dns_error_rate(events: &[Event], threshold_pct: f64) -> Option<String> {
    let total = events
        .iter()
        .filter(|e| e.event_type == EventType::Dns)
        .count();
    if total == 0 {
        return None;
    }

    let errors = events
        .iter()
        .filter(|e| e.event_type == EventType::Dns && e.error != 0)
        .count();
    let rate = errors as f64 * 100.0 / total as f64;
    if rate <= threshold_pct {
        return None;
    }

    Some(format!(
        "High DNS error rate: {rate:.1}% ({errors}/{total} lookups failed)"
    ))
}

fn tcp_latency_spikes(events: &[Event], spike_ms: f64) -> Option<String> {
    let spikes = events
        .iter()
        .filter(|e| {
            matches!(e.event_type, EventType::TcpSend | EventType::TcpRecv)
                && e.latency_ms() > spike_ms
        })
        .count();
    if spikes == 0 {
        return None;
    }

    Some(format!(
        "TCP latency spikes detected: {spikes} operation(s) exceeded {spike_ms:.0}ms"
    ))
}

fn oom_kills(events: &[Event]) -> Option<String> {
    let kills = events
        .iter()
        .filter(|e| e.event_type == EventType::OomKill)
        .count();
    if kills == 0 {
        return None;
    }

    Some(format!(
        "OOM kills detected: {kills} process(es) killed by the kernel"
    ))
}

fn connection_failures(events: &[Event]) -> Option<String> {
    let failures = events
        .iter()
        .filter(|e| e.event_type == EventType::Connect && e.error != 0)
        .count();
    if failures == 0 {
        return None;
    }

    Some(format!(
        "Connection failures detected: {failures} failed connection attempt(s)"
    ))
}

fn slow_fs_operations(events: &[Event], slow_ms: f64, bound: usize) -> Option<String> {
    let slow = events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                EventType::Write | EventType::Read | EventType::Fsync
            ) && e.latency_ms() > slow_ms
        })
        .count();
    if slow <= bound {
        return None;
    }

    Some(format!(
        "Slow filesystem operations: {slow} operation(s) exceeded {slow_ms:.0}ms"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> DetectorThresholds {
        DetectorThresholds {
            error_rate_pct: 10.0,
            rtt_spike_ms: 100.0,
            fs_slow_ms: 10.0,
            fs_slow_issue_count: 10,
        }
    }

    fn typed(event_type: EventType, latency_ms: u64, error: i32) -> Event {
        Event {
            latency_ns: latency_ms * 1_000_000,
            error,
            ..Event::of(event_type)
        }
    }

    #[test]
    fn test_no_events_no_issues() {
        assert!(detect_issues(&[], &thresholds()).is_empty());
    }

    #[test]
    fn test_dns_error_rate_fires_over_threshold() {
        let mut events = vec![typed(EventType::Dns, 1, 1); 3];
        events.extend(vec![typed(EventType::Dns, 1, 0); 7]);

        let issues = detect_issues(&events, &thresholds());
        assert!(issues.iter().any(|i| i.contains("High DNS error rate")));
        assert!(issues.iter().any(|i| i.contains("30.0%")));
    }

    #[test]
    fn test_dns_error_rate_quiet_at_threshold() {
        let mut events = vec![typed(EventType::Dns, 1, 1)];
        events.extend(vec![typed(EventType::Dns, 1, 0); 9]);

        // Exactly 10% does not exceed the threshold.
        let issues = detect_issues(&events, &thresholds());
        assert!(!issues.iter().any(|i| i.contains("DNS")));
    }

    #[test]
    fn test_tcp_spike_rule() {
        let events = vec![
            typed(EventType::TcpSend, 150, 0),
            typed(EventType::TcpRecv, 20, 0),
        ];

        let issues = detect_issues(&events, &thresholds());
        assert!(issues.iter().any(|i| i.contains("TCP latency spikes")));
    }

    #[test]
    fn test_oom_kill_rule() {
        let events = vec![typed(EventType::OomKill, 0, 0)];
        let issues = detect_issues(&events, &thresholds());
        assert!(issues.iter().any(|i| i.contains("OOM kills detected: 1")));
    }

    #[test]
    fn test_connection_failure_rule() {
        let events = vec![
            typed(EventType::Connect, 1, -111),
            typed(EventType::Connect, 1, 0),
        ];
        let issues = detect_issues(&events, &thresholds());
        assert!(issues
            .iter()
            .any(|i| i.contains("Connection failures detected: 1")));
    }

    #[test]
    fn test_slow_fs_rule_requires_exceeding_bound() {
        let slow = vec![typed(EventType::Write, 50, 0); 10];
        // Ten slow ops do not exceed the bound of ten.
        assert!(detect_issues(&slow, &thresholds()).is_empty());

        let slower = vec![typed(EventType::Write, 50, 0); 11];
        let issues = detect_issues(&slower, &thresholds());
        assert!(issues.iter().any(|i| i.contains("Slow filesystem operations")));
    }

    #[test]
    fn test_rules_are_independent() {
        let events = vec![
            typed(EventType::OomKill, 0, 0),
            typed(EventType::Connect, 1, -1),
            typed(EventType::TcpSend, 500, 0),
        ];
        let issues = detect_issues(&events, &thresholds());
        assert_eq!(issues.len(), 3);
    }
}
