//! Structured and tabular export of a diagnostic session.

use std::collections::HashMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::config::NS_PER_MS;
use crate::events::{Event, EventType};
use crate::tracker::process::analyze_process_activity;
use crate::validation::sanitize_csv_field;

use super::analyzer::{self, TargetCount};
use super::detector::detect_issues;
use super::Diagnostician;

/// Tabular export header.
pub const CSV_HEADER: &str = "timestamp,pid,process_name,type,latency_ms,error,target";

/// Structured dump of a session. Class sections appear only when that class
/// produced at least one event.
#[derive(Debug, Serialize)]
pub struct ExportData {
    pub summary: SummaryExport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<ConnectionsExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuExport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub process_activity: Vec<ProcessActivityExport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub potential_issues: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryExport {
    pub total_events: usize,
    pub events_per_second: f64,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct DnsExport {
    pub total_lookups: usize,
    pub rate_per_second: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub errors: u64,
    pub error_rate: f64,
    pub top_targets: Vec<TargetCount>,
}

#[derive(Debug, Serialize)]
pub struct TcpExport {
    pub send_operations: usize,
    pub receive_operations: usize,
    pub avg_rtt_ms: f64,
    pub max_rtt_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub rtt_spikes: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub total_bytes: u64,
    pub avg_bytes: u64,
    pub peak_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsExport {
    pub total_connections: usize,
    pub rate_per_second: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub failed: u64,
    pub failure_rate: f64,
    pub error_breakdown: HashMap<i32, u64>,
    pub top_targets: Vec<TargetCount>,
}

#[derive(Debug, Serialize)]
pub struct FilesystemExport {
    pub write_operations: usize,
    pub read_operations: usize,
    pub fsync_operations: usize,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub slow_operations: u64,
    pub total_bytes: u64,
    pub avg_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct CpuExport {
    pub thread_switches: usize,
    pub avg_block_time_ms: f64,
    pub max_block_time_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ProcessActivityExport {
    pub pid: u32,
    pub name: String,
    pub event_count: u64,
    pub percentage: f64,
}

/// Build the structured dump from a finished session.
pub fn export_structured(d: &Diagnostician) -> ExportData {
    let all_events = d.events();

    let mut data = ExportData {
        summary: SummaryExport {
            total_events: all_events.len(),
            events_per_second: d.calculate_rate(all_events.len()),
            start_time: d.start_time().to_rfc3339(),
            end_time: d.end_time().to_rfc3339(),
            duration_seconds: d.duration_secs(),
        },
        dns: None,
        tcp: None,
        connections: None,
        filesystem: None,
        cpu: None,
        process_activity: Vec::new(),
        potential_issues: Vec::new(),
    };

    let dns_events = d.filter_events(EventType::Dns);
    if !dns_events.is_empty() {
        let stats = analyzer::dns::analyze_dns(&dns_events);
        data.dns = Some(DnsExport {
            total_lookups: dns_events.len(),
            rate_per_second: d.calculate_rate(dns_events.len()),
            avg_latency_ms: stats.avg_latency_ms,
            max_latency_ms: stats.max_latency_ms,
            p50_ms: stats.p50_ms,
            p95_ms: stats.p95_ms,
            p99_ms: stats.p99_ms,
            errors: stats.errors,
            error_rate: stats.errors as f64 * 100.0 / dns_events.len() as f64,
            top_targets: stats.top_targets,
        });
    }

    let sends = d.filter_events(EventType::TcpSend);
    let recvs = d.filter_events(EventType::TcpRecv);
    if !sends.is_empty() || !recvs.is_empty() {
        let all: Vec<&Event> = sends.iter().chain(recvs.iter()).copied().collect();
        let stats = analyzer::tcp::analyze_tcp(&all, d.rtt_spike_threshold());
        data.tcp = Some(TcpExport {
            send_operations: sends.len(),
            receive_operations: recvs.len(),
            avg_rtt_ms: stats.avg_rtt_ms,
            max_rtt_ms: stats.max_rtt_ms,
            p50_ms: stats.p50_ms,
            p95_ms: stats.p95_ms,
            p99_ms: stats.p99_ms,
            rtt_spikes: stats.spikes,
            errors: stats.errors,
            error_rate: stats.errors as f64 * 100.0 / all.len() as f64,
            total_bytes: stats.total_bytes,
            avg_bytes: stats.avg_bytes,
            peak_bytes: stats.peak_bytes,
        });
    }

    let connects = d.filter_events(EventType::Connect);
    if !connects.is_empty() {
        let stats = analyzer::connections::analyze_connections(&connects);
        data.connections = Some(ConnectionsExport {
            total_connections: connects.len(),
            rate_per_second: d.calculate_rate(connects.len()),
            avg_latency_ms: stats.avg_latency_ms,
            max_latency_ms: stats.max_latency_ms,
            p50_ms: stats.p50_ms,
            p95_ms: stats.p95_ms,
            p99_ms: stats.p99_ms,
            failed: stats.errors,
            failure_rate: stats.errors as f64 * 100.0 / connects.len() as f64,
            error_breakdown: stats.error_breakdown,
            top_targets: stats.top_targets,
        });
    }

    let writes = d.filter_events(EventType::Write);
    let reads = d.filter_events(EventType::Read);
    let fsyncs = d.filter_events(EventType::Fsync);
    if !writes.is_empty() || !reads.is_empty() || !fsyncs.is_empty() {
        let all: Vec<&Event> = writes
            .iter()
            .chain(reads.iter())
            .chain(fsyncs.iter())
            .copied()
            .collect();
        let stats = analyzer::fs::analyze_fs(&all, d.fs_slow_threshold());
        data.filesystem = Some(FilesystemExport {
            write_operations: writes.len(),
            read_operations: reads.len(),
            fsync_operations: fsyncs.len(),
            avg_latency_ms: stats.avg_latency_ms,
            max_latency_ms: stats.max_latency_ms,
            p50_ms: stats.p50_ms,
            p95_ms: stats.p95_ms,
            p99_ms: stats.p99_ms,
            slow_operations: stats.slow_ops,
            total_bytes: stats.total_bytes,
            avg_bytes: stats.avg_bytes,
        });
    }

    let sched = d.filter_events(EventType::SchedSwitch);
    if !sched.is_empty() {
        let stats = analyzer::cpu::analyze_cpu(&sched);
        data.cpu = Some(CpuExport {
            thread_switches: sched.len(),
            avg_block_time_ms: stats.avg_block_ms,
            max_block_time_ms: stats.max_block_ms,
            p50_ms: stats.p50_ms,
            p95_ms: stats.p95_ms,
            p99_ms: stats.p99_ms,
        });
    }

    data.process_activity = analyze_process_activity(all_events)
        .into_iter()
        .map(|info| ProcessActivityExport {
            pid: info.pid,
            name: info.name,
            event_count: info.count,
            percentage: info.percentage,
        })
        .collect();

    data.potential_issues = detect_issues(all_events, &d.thresholds());

    data
}

/// Write the tabular dump: one row per event in ingestion order.
pub fn export_csv<W: Write>(d: &Diagnostician, w: &mut W) -> io::Result<()> {
    writeln!(w, "{CSV_HEADER}")?;

    for event in d.events() {
        writeln!(
            w,
            "{},{},{},{},{:.2},{},{}",
            event.timestamp_ns,
            event.pid,
            sanitize_csv_field(&event.process_name),
            sanitize_csv_field(event.event_type.name()),
            event.latency_ns as f64 / NS_PER_MS,
            event.error,
            sanitize_csv_field(&event.target),
        )?;
    }

    Ok(())
}

/// Parse a tabular dump back into events. Rows with an unknown class or a
/// malformed numeric field are skipped; latency below the export's 0.01 ms
/// resolution does not survive the round trip.
pub fn import_csv(content: &str) -> Vec<Event> {
    let mut events = Vec::new();

    for (i, line) in content.lines().enumerate() {
        if i == 0 || line.is_empty() {
            continue;
        }

        let fields = parse_csv_line(line);
        if fields.len() != 7 {
            continue;
        }

        let Ok(timestamp_ns) = fields[0].parse::<u64>() else {
            continue;
        };
        let Ok(pid) = fields[1].parse::<u32>() else {
            continue;
        };
        let Some(event_type) = EventType::from_name(&fields[3]) else {
            continue;
        };
        let Ok(latency_ms) = fields[4].parse::<f64>() else {
            continue;
        };
        let Ok(error) = fields[5].parse::<i32>() else {
            continue;
        };

        events.push(Event {
            timestamp_ns,
            pid,
            process_name: strip_formula_guard(&fields[2]),
            event_type,
            target: strip_formula_guard(&fields[6]),
            latency_ns: (latency_ms * NS_PER_MS).round() as u64,
            error,
            ..Event::of(event_type)
        });
    }

    events
}

/// Undo the spreadsheet-injection prefix added on export.
fn strip_formula_guard(field: &str) -> String {
    let mut chars = field.chars();
    if chars.next() == Some('\'') {
        if let Some(second) = chars.next() {
            if matches!(second, '=' | '+' | '-' | '@' | '\t' | '\r') {
                return field[1..].to_string();
            }
        }
    }
    field.to_string()
}

/// Split one CSV line into fields, honoring quotes and doubled-quote
/// escapes.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
