//! Diagnostic session: event collection, analysis, and report synthesis.

pub mod analyzer;
pub mod detector;
pub mod export;
pub mod formatter;
pub mod sampling;

use chrono::{DateTime, Utc};

use crate::config::ThresholdConfig;
use crate::events::{Event, EventType};
use crate::tracker::connection::connection_correlation;
use crate::tracker::pool::pool_correlation;
use crate::tracker::process::analyze_process_activity;

use self::analyzer::DEFAULT_TOP_TARGETS;
use self::detector::{detect_issues, DetectorThresholds};

/// A capture session: the ordered event list, its time window, and the
/// thresholds every analyzer and detector judges against.
///
/// The collector owns the events; analyzers and the report builder only
/// borrow them.
pub struct Diagnostician {
    events: Vec<Event>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    error_rate_threshold: f64,
    rtt_spike_threshold: f64,
    fs_slow_threshold: f64,
    fs_slow_issue_count: usize,
}

impl Diagnostician {
    pub fn new() -> Self {
        Self::with_thresholds(&ThresholdConfig::default())
    }

    pub fn with_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self {
            events: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            error_rate_threshold: thresholds.error_rate_pct,
            rtt_spike_threshold: thresholds.rtt_spike_ms,
            fs_slow_threshold: thresholds.fs_slow_ms,
            fs_slow_issue_count: thresholds.fs_slow_issue_count,
        }
    }

    /// Append an event in arrival order.
    pub fn add_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Freeze intake; analyzers run against the list as it stands now.
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events of one class, in ingestion order.
    pub fn filter_events(&self, event_type: EventType) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.start_time)
    }

    /// Session length in seconds; zero until finished.
    pub fn duration_secs(&self) -> f64 {
        (self.end_time() - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Per-second rate over the session window; zero for an empty window.
    pub fn calculate_rate(&self, count: usize) -> f64 {
        let secs = self.duration_secs();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    }

    pub fn thresholds(&self) -> DetectorThresholds {
        DetectorThresholds {
            error_rate_pct: self.error_rate_threshold,
            rtt_spike_ms: self.rtt_spike_threshold,
            fs_slow_ms: self.fs_slow_threshold,
            fs_slow_issue_count: self.fs_slow_issue_count,
        }
    }

    pub fn rtt_spike_threshold(&self) -> f64 {
        self.rtt_spike_threshold
    }

    pub fn fs_slow_threshold(&self) -> f64 {
        self.fs_slow_threshold
    }

    /// Render the human-readable report.
    pub fn generate_report(&self) -> String {
        let mut report = String::from("=== Diagnostic Report ===\n");
        report.push_str(&format!(
            "Capture window: {} - {} ({:.1}s)\n\n",
            self.start_time().to_rfc3339(),
            self.end_time().to_rfc3339(),
            self.duration_secs(),
        ));

        if self.events.is_empty() {
            report.push_str("No events collected.\n");
            return report;
        }

        report.push_str(&self.dns_section());
        report.push_str(&self.tcp_section());
        report.push_str(&self.connection_section());
        report.push_str(&self.fs_section());
        report.push_str(&self.cpu_section());
        report.push_str(&self.process_activity_section());
        report.push_str(&pool_correlation(&self.events));
        report.push_str(&connection_correlation(&self.events));
        report.push_str(&self.issues_section());

        report
    }

    fn dns_section(&self) -> String {
        let events = self.filter_events(EventType::Dns);
        if events.is_empty() {
            return String::new();
        }

        let stats = analyzer::dns::analyze_dns(&events);
        let mut out = formatter::section_header("DNS");
        out.push_str(&formatter::total_with_rate(
            "lookups",
            events.len(),
            self.calculate_rate(events.len()),
        ));
        out.push_str(&formatter::latency_metrics(
            stats.avg_latency_ms,
            stats.max_latency_ms,
        ));
        out.push_str(&formatter::percentiles(stats.p50_ms, stats.p95_ms, stats.p99_ms));
        out.push_str(&formatter::error_rate(stats.errors, events.len()));
        out.push_str(&formatter::top_targets(
            &stats.top_targets,
            DEFAULT_TOP_TARGETS,
            "targets",
            "lookups",
        ));
        out.push('\n');
        out
    }

    fn tcp_section(&self) -> String {
        let sends = self.filter_events(EventType::TcpSend);
        let recvs = self.filter_events(EventType::TcpRecv);
        if sends.is_empty() && recvs.is_empty() {
            return String::new();
        }

        let all: Vec<&Event> = sends.iter().chain(recvs.iter()).copied().collect();
        let stats = analyzer::tcp::analyze_tcp(&all, self.rtt_spike_threshold);

        let mut out = formatter::section_header("TCP");
        out.push_str(&formatter::total_with_rate(
            "operations",
            all.len(),
            self.calculate_rate(all.len()),
        ));
        out.push_str(&format!("  Send operations: {}\n", sends.len()));
        out.push_str(&format!("  Receive operations: {}\n", recvs.len()));
        out.push_str(&formatter::latency_metrics(stats.avg_rtt_ms, stats.max_rtt_ms));
        out.push_str(&formatter::percentiles(stats.p50_ms, stats.p95_ms, stats.p99_ms));
        out.push_str(&formatter::error_rate(stats.errors, all.len()));
        out.push_str(&format!("  RTT spikes: {}\n", stats.spikes));

        let throughput = if self.duration_secs() > 0.0 {
            (stats.total_bytes as f64 / self.duration_secs()) as u64
        } else {
            0
        };
        out.push_str(&formatter::bytes_section(
            stats.total_bytes,
            stats.avg_bytes,
            throughput,
        ));
        out.push('\n');
        out
    }

    fn connection_section(&self) -> String {
        let events = self.filter_events(EventType::Connect);
        if events.is_empty() {
            return String::new();
        }

        let stats = analyzer::connections::analyze_connections(&events);
        let mut out = formatter::section_header("Connection");
        out.push_str(&formatter::total_with_rate(
            "connections",
            events.len(),
            self.calculate_rate(events.len()),
        ));
        out.push_str(&formatter::latency_metrics(
            stats.avg_latency_ms,
            stats.max_latency_ms,
        ));
        out.push_str(&formatter::percentiles(stats.p50_ms, stats.p95_ms, stats.p99_ms));
        out.push_str(&formatter::error_rate(stats.errors, events.len()));
        out.push_str(&formatter::top_targets(
            &stats.top_targets,
            DEFAULT_TOP_TARGETS,
            "targets",
            "connections",
        ));
        out.push('\n');
        out
    }

    fn fs_section(&self) -> String {
        let writes = self.filter_events(EventType::Write);
        let reads = self.filter_events(EventType::Read);
        let fsyncs = self.filter_events(EventType::Fsync);
        if writes.is_empty() && reads.is_empty() && fsyncs.is_empty() {
            return String::new();
        }

        let all: Vec<&Event> = writes
            .iter()
            .chain(reads.iter())
            .chain(fsyncs.iter())
            .copied()
            .collect();
        let stats = analyzer::fs::analyze_fs(&all, self.fs_slow_threshold);

        let mut out = formatter::section_header("Filesystem");
        out.push_str(&formatter::total_with_rate(
            "operations",
            all.len(),
            self.calculate_rate(all.len()),
        ));
        out.push_str(&format!("  Write operations: {}\n", writes.len()));
        out.push_str(&format!("  Read operations: {}\n", reads.len()));
        out.push_str(&format!("  Fsync operations: {}\n", fsyncs.len()));
        out.push_str(&formatter::latency_metrics(
            stats.avg_latency_ms,
            stats.max_latency_ms,
        ));
        out.push_str(&formatter::percentiles(stats.p50_ms, stats.p95_ms, stats.p99_ms));
        out.push_str(&format!("  Slow operations: {}\n", stats.slow_ops));
        out.push_str(&formatter::bytes_section(stats.total_bytes, stats.avg_bytes, 0));
        out.push('\n');
        out
    }

    fn cpu_section(&self) -> String {
        let events = self.filter_events(EventType::SchedSwitch);
        if events.is_empty() {
            return String::new();
        }

        let stats = analyzer::cpu::analyze_cpu(&events);
        let mut out = formatter::section_header("CPU");
        out.push_str(&formatter::total_with_rate(
            "context switches",
            events.len(),
            self.calculate_rate(events.len()),
        ));
        out.push_str(&format!(
            "  Average block time: {:.2}ms\n  Max block time: {:.2}ms\n",
            stats.avg_block_ms, stats.max_block_ms
        ));
        out.push_str(&formatter::percentiles(stats.p50_ms, stats.p95_ms, stats.p99_ms));
        out.push('\n');
        out
    }

    fn process_activity_section(&self) -> String {
        let activity = analyze_process_activity(&self.events);
        if activity.is_empty() {
            return String::new();
        }

        let mut out = String::from("Process Activity:\n");
        for info in activity.iter().take(DEFAULT_TOP_TARGETS) {
            out.push_str(&format!(
                "  - {} (pid {}): {} events ({:.1}%)\n",
                info.name, info.pid, info.count, info.percentage
            ));
        }
        out.push('\n');
        out
    }

    fn issues_section(&self) -> String {
        let issues = detect_issues(&self.events, &self.thresholds());

        let mut out = String::from("Potential Issues:\n");
        if issues.is_empty() {
            out.push_str("  None detected\n");
        } else {
            for issue in &issues {
                out.push_str(&format!("  - {issue}\n"));
            }
        }
        out
    }
}

impl Default for Diagnostician {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dns_event(latency_ms: u64, target: &str, error: i32) -> Event {
        Event {
            latency_ns: latency_ms * 1_000_000,
            target: target.to_string(),
            error,
            ..Event::of(EventType::Dns)
        }
    }

    #[test]
    fn test_new_has_default_thresholds() {
        let d = Diagnostician::new();
        assert!(d.events().is_empty());
        assert_eq!(d.error_rate_threshold, 10.0);
        assert_eq!(d.rtt_spike_threshold, 100.0);
        assert_eq!(d.fs_slow_threshold, 10.0);
    }

    #[test]
    fn test_with_thresholds() {
        let cfg = ThresholdConfig {
            error_rate_pct: 5.0,
            rtt_spike_ms: 50.0,
            fs_slow_ms: 5.0,
            fs_slow_issue_count: 3,
        };
        let d = Diagnostician::with_thresholds(&cfg);
        assert_eq!(d.error_rate_threshold, 5.0);
        assert_eq!(d.rtt_spike_threshold, 50.0);
        assert_eq!(d.fs_slow_threshold, 5.0);
    }

    #[test]
    fn test_add_event_preserves_order() {
        let mut d = Diagnostician::new();
        d.add_event(dns_event(1, "a", 0));
        d.add_event(dns_event(2, "b", 0));
        assert_eq!(d.events().len(), 2);
        assert_eq!(d.events()[0].target, "a");
        assert_eq!(d.events()[1].target, "b");
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut d = Diagnostician::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        d.finish();
        assert!(d.end_time() > d.start_time());
        assert!(d.duration_secs() > 0.0);
    }

    #[test]
    fn test_filter_events() {
        let mut d = Diagnostician::new();
        d.add_event(dns_event(1, "a", 0));
        d.add_event(Event::of(EventType::Connect));
        d.add_event(dns_event(2, "b", 0));
        d.add_event(Event::of(EventType::TcpSend));

        assert_eq!(d.filter_events(EventType::Dns).len(), 2);
        assert_eq!(d.filter_events(EventType::Connect).len(), 1);
        assert_eq!(d.filter_events(EventType::OomKill).len(), 0);
    }

    #[test]
    fn test_report_no_events() {
        let mut d = Diagnostician::new();
        d.finish();

        let report = d.generate_report();
        assert!(report.contains("Diagnostic Report"));
        assert!(report.contains("No events collected"));
    }

    #[test]
    fn test_report_with_events() {
        let mut d = Diagnostician::new();
        d.add_event(dns_event(5, "example.com", 0));
        d.add_event(Event {
            latency_ns: 10_000_000,
            target: "example.com:80".to_string(),
            ..Event::of(EventType::Connect)
        });
        d.finish();

        let report = d.generate_report();
        assert!(report.contains("Diagnostic Report"));
        assert!(report.contains("DNS Statistics:"));
        assert!(report.contains("Connection Statistics:"));
        assert!(report.contains("Process Activity:"));
        assert!(report.contains("Potential Issues:"));
        assert!(!report.contains("TCP Statistics:"));
    }

    #[test]
    fn test_report_flags_issues() {
        let mut d = Diagnostician::new();
        d.add_event(Event::of(EventType::OomKill));
        d.finish();

        let report = d.generate_report();
        assert!(report.contains("OOM kills detected"));
    }

    #[test]
    fn test_report_includes_pool_tracking() {
        let mut d = Diagnostician::new();
        d.add_event(Event {
            target: "pool1".to_string(),
            ..Event::of(EventType::PoolAcquire)
        });
        d.finish();

        let report = d.generate_report();
        assert!(report.contains("Connection Pool Tracking"));
        assert!(report.contains("pool1"));
    }

    #[test]
    fn test_rate_zero_before_finish() {
        let d = Diagnostician::new();
        assert_eq!(d.calculate_rate(100), 0.0);
    }
}
