//! Per-target connection lifecycle tracking.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

use crate::events::{Event, EventType};

use super::MAX_CONNECTION_TARGETS;

#[derive(Debug, Default, Clone)]
struct ConnectionInfo {
    first_seen_ns: u64,
    send_count: u64,
    recv_count: u64,
    total_latency_ns: u64,
    op_count: u64,
}

/// Summary row for one target, in descending total-ops order.
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub target: String,
    pub first_seen_ns: u64,
    pub send_count: u64,
    pub recv_count: u64,
    pub total_ops: u64,
    pub avg_latency: Duration,
}

/// Reconstructs per-target connection state from an unordered event stream.
/// Records are created on the first observed event for a target and never
/// destroyed within a session.
pub struct ConnectionTracker {
    state: Mutex<HashMap<String, ConnectionInfo>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one connect/tcp-send/tcp-recv event. Anything else is
    /// ignored, as are events with an empty target and failed connects.
    pub fn process_event(&self, event: &Event) {
        if event.target.is_empty() {
            return;
        }

        match event.event_type {
            EventType::Connect => {
                if event.error != 0 {
                    return;
                }
                let mut state = self.lock();
                state
                    .entry(event.target.clone())
                    .or_insert_with(|| ConnectionInfo {
                        first_seen_ns: event.timestamp_ns,
                        ..ConnectionInfo::default()
                    });
            }
            EventType::TcpSend | EventType::TcpRecv => {
                let mut state = self.lock();
                let info = state
                    .entry(event.target.clone())
                    .or_insert_with(|| ConnectionInfo {
                        first_seen_ns: event.timestamp_ns,
                        ..ConnectionInfo::default()
                    });

                if event.event_type == EventType::TcpSend {
                    info.send_count += 1;
                } else {
                    info.recv_count += 1;
                }
                info.total_latency_ns += event.latency_ns;
                info.op_count += 1;
            }
            _ => {}
        }
    }

    /// Summaries sorted by total ops descending. Average latency is
    /// total/ops, zero when no ops were recorded.
    pub fn connection_summary(&self) -> Vec<ConnectionSummary> {
        let state = self.lock();

        let mut summaries: Vec<ConnectionSummary> = state
            .iter()
            .map(|(target, info)| {
                let avg = if info.op_count > 0 {
                    Duration::from_nanos(info.total_latency_ns / info.op_count)
                } else {
                    Duration::ZERO
                };
                ConnectionSummary {
                    target: target.clone(),
                    first_seen_ns: info.first_seen_ns,
                    send_count: info.send_count,
                    recv_count: info.recv_count,
                    total_ops: info.op_count,
                    avg_latency: avg,
                }
            })
            .collect();

        summaries.sort_by(|a, b| b.total_ops.cmp(&a.total_ops));
        summaries
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConnectionInfo>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Text block correlating connection activity per target; empty when the
/// event list holds nothing trackable.
pub fn connection_correlation(events: &[Event]) -> String {
    if events.is_empty() {
        return String::new();
    }

    let tracker = ConnectionTracker::new();
    for event in events {
        tracker.process_event(event);
    }

    let summaries = tracker.connection_summary();
    if summaries.is_empty() {
        return String::new();
    }

    let mut report = String::from("Connection Correlation:\n");
    let _ = writeln!(report, "  Active connections: {}", summaries.len());
    report.push_str("  Connection statistics:\n");
    for summary in summaries.iter().take(MAX_CONNECTION_TARGETS) {
        let _ = writeln!(report, "    - {}:", summary.target);
        let _ = writeln!(
            report,
            "        Sends: {}, Recvs: {}",
            summary.send_count, summary.recv_count
        );
        let _ = writeln!(
            report,
            "        Avg latency: {:.2}ms",
            summary.avg_latency.as_secs_f64() * 1000.0
        );
    }
    report.push('\n');
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(target: &str, error: i32, ts: u64) -> Event {
        Event {
            target: target.to_string(),
            error,
            timestamp_ns: ts,
            ..Event::of(EventType::Connect)
        }
    }

    fn tcp(event_type: EventType, target: &str, latency_ns: u64, ts: u64) -> Event {
        Event {
            target: target.to_string(),
            latency_ns,
            timestamp_ns: ts,
            ..Event::of(event_type)
        }
    }

    #[test]
    fn test_connect_send_recv_sequence() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&connect("example.com", 0, 1));
        tracker.process_event(&tcp(EventType::TcpSend, "example.com", 10_000_000, 2));
        tracker.process_event(&tcp(EventType::TcpRecv, "example.com", 5_000_000, 3));

        let summaries = tracker.connection_summary();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_ops, 2);
        assert_eq!(summaries[0].send_count, 1);
        assert_eq!(summaries[0].recv_count, 1);
    }

    #[test]
    fn test_connect_with_error_skipped() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&connect("example.com:80", 1, 1));
        assert!(tracker.connection_summary().is_empty());
    }

    #[test]
    fn test_empty_target_skipped() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&connect("", 0, 1));
        tracker.process_event(&tcp(EventType::TcpSend, "", 1_000_000, 2));
        assert!(tracker.connection_summary().is_empty());
    }

    #[test]
    fn test_send_without_prior_connect_tolerated() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&tcp(EventType::TcpSend, "example.com:80", 1_000_000, 1));

        let summaries = tracker.connection_summary();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].send_count, 1);
    }

    #[test]
    fn test_recv_without_prior_connect_tolerated() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&tcp(EventType::TcpRecv, "example.com:80", 1_000_000, 1));

        let summaries = tracker.connection_summary();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].recv_count, 1);
    }

    #[test]
    fn test_unrelated_events_ignored() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&Event {
            target: "example.com".to_string(),
            ..Event::of(EventType::Dns)
        });
        assert!(tracker.connection_summary().is_empty());
    }

    #[test]
    fn test_connect_only_has_zero_ops_and_latency() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&connect("example.com:80", 0, 1));

        let summaries = tracker.connection_summary();
        assert_eq!(summaries[0].total_ops, 0);
        assert_eq!(summaries[0].avg_latency, Duration::ZERO);
    }

    #[test]
    fn test_avg_latency() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&tcp(EventType::TcpSend, "example.com:80", 10_000_000, 1));
        tracker.process_event(&tcp(EventType::TcpRecv, "example.com:80", 20_000_000, 2));

        let summaries = tracker.connection_summary();
        assert_eq!(summaries[0].avg_latency, Duration::from_millis(15));
    }

    #[test]
    fn test_summary_sorted_by_total_ops() {
        let tracker = ConnectionTracker::new();
        tracker.process_event(&tcp(EventType::TcpSend, "light.com:80", 1_000_000, 1));
        for i in 0..3 {
            tracker.process_event(&tcp(EventType::TcpSend, "busy.com:443", 2_000_000, i));
        }

        let summaries = tracker.connection_summary();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].target, "busy.com:443");
        assert!(summaries[0].total_ops >= summaries[1].total_ops);
    }

    #[test]
    fn test_correlation_report() {
        let events = vec![
            connect("example.com", 0, 1),
            tcp(EventType::TcpSend, "example.com", 10_000_000, 2),
        ];

        let report = connection_correlation(&events);
        assert!(report.contains("Connection Correlation"));
        assert!(report.contains("example.com"));
        assert!(report.contains("Sends: 1"));
    }

    #[test]
    fn test_correlation_empty() {
        assert_eq!(connection_correlation(&[]), "");
    }

    #[test]
    fn test_correlation_caps_targets() {
        let mut events = Vec::new();
        for i in 0..20 {
            events.push(tcp(
                EventType::TcpSend,
                &format!("host{i}.example:80"),
                1_000_000,
                i,
            ));
        }

        let report = connection_correlation(&events);
        let listed = report.matches("    - ").count();
        assert_eq!(listed, MAX_CONNECTION_TARGETS);
    }
}
