//! Event model shared by the ingestion and diagnosis layers.
//!
//! Values of [`EventType`] must match the class identifiers emitted by the
//! probe object; the decoder rejects anything it does not recognize.

use std::fmt;
use std::time::Duration;

/// Spike threshold used by one-line message rendering, in milliseconds.
const MESSAGE_SPIKE_MS: f64 = 100.0;

/// Longest target rendered into a one-line message before truncation.
const MESSAGE_TARGET_MAX: usize = 256;

/// EventType identifies the kind of captured kernel or user-probe event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventType {
    Dns = 1,
    Connect = 2,
    TcpSend = 3,
    TcpRecv = 4,
    UdpSend = 5,
    UdpRecv = 6,
    Write = 7,
    Read = 8,
    Fsync = 9,
    SchedSwitch = 10,
    PageFault = 11,
    OomKill = 12,
    TcpRetransmit = 13,
    TcpState = 14,
    LockContention = 15,
    Fork = 16,
    Exec = 17,
    Open = 18,
    Close = 19,
    HttpRequest = 20,
    HttpResponse = 21,
    NetDevError = 22,
    DbQuery = 23,
    PoolAcquire = 24,
    PoolRelease = 25,
    PoolExhausted = 26,
}

impl EventType {
    /// Canonical class name, used in the tabular export and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::TcpSend => "tcp_send",
            Self::TcpRecv => "tcp_recv",
            Self::UdpSend => "udp_send",
            Self::UdpRecv => "udp_recv",
            Self::Write => "write",
            Self::Read => "read",
            Self::Fsync => "fsync",
            Self::SchedSwitch => "sched_switch",
            Self::PageFault => "page_fault",
            Self::OomKill => "oom_kill",
            Self::TcpRetransmit => "tcp_retransmit",
            Self::TcpState => "tcp_state",
            Self::LockContention => "lock_contention",
            Self::Fork => "fork",
            Self::Exec => "exec",
            Self::Open => "open",
            Self::Close => "close",
            Self::HttpRequest => "http_request",
            Self::HttpResponse => "http_response",
            Self::NetDevError => "net_dev_error",
            Self::DbQuery => "db_query",
            Self::PoolAcquire => "pool_acquire",
            Self::PoolRelease => "pool_release",
            Self::PoolExhausted => "pool_exhausted",
        }
    }

    /// Coarse subsystem label used for report sections and message prefixes.
    pub const fn group_str(self) -> &'static str {
        match self {
            Self::Dns => "DNS",
            Self::Connect
            | Self::TcpSend
            | Self::TcpRecv
            | Self::UdpSend
            | Self::UdpRecv
            | Self::TcpRetransmit
            | Self::TcpState
            | Self::NetDevError => "NET",
            Self::Write | Self::Read | Self::Fsync => "FS",
            Self::SchedSwitch => "CPU",
            Self::PageFault | Self::OomKill => "MEM",
            Self::HttpRequest | Self::HttpResponse => "HTTP",
            Self::LockContention => "LOCK",
            Self::DbQuery => "DB",
            Self::Fork | Self::Exec | Self::Open | Self::Close => "PROC",
            Self::PoolAcquire | Self::PoolRelease | Self::PoolExhausted => "POOL",
        }
    }

    /// Convert from a raw record class value.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Dns),
            2 => Some(Self::Connect),
            3 => Some(Self::TcpSend),
            4 => Some(Self::TcpRecv),
            5 => Some(Self::UdpSend),
            6 => Some(Self::UdpRecv),
            7 => Some(Self::Write),
            8 => Some(Self::Read),
            9 => Some(Self::Fsync),
            10 => Some(Self::SchedSwitch),
            11 => Some(Self::PageFault),
            12 => Some(Self::OomKill),
            13 => Some(Self::TcpRetransmit),
            14 => Some(Self::TcpState),
            15 => Some(Self::LockContention),
            16 => Some(Self::Fork),
            17 => Some(Self::Exec),
            18 => Some(Self::Open),
            19 => Some(Self::Close),
            20 => Some(Self::HttpRequest),
            21 => Some(Self::HttpResponse),
            22 => Some(Self::NetDevError),
            23 => Some(Self::DbQuery),
            24 => Some(Self::PoolAcquire),
            25 => Some(Self::PoolRelease),
            26 => Some(Self::PoolExhausted),
            _ => None,
        }
    }

    /// Convert from the canonical class name (inverse of [`Self::name`]).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.name() == name)
    }

    /// All event types in numeric order.
    pub fn all() -> &'static [Self] {
        &[
            Self::Dns,
            Self::Connect,
            Self::TcpSend,
            Self::TcpRecv,
            Self::UdpSend,
            Self::UdpRecv,
            Self::Write,
            Self::Read,
            Self::Fsync,
            Self::SchedSwitch,
            Self::PageFault,
            Self::OomKill,
            Self::TcpRetransmit,
            Self::TcpState,
            Self::LockContention,
            Self::Fork,
            Self::Exec,
            Self::Open,
            Self::Close,
            Self::HttpRequest,
            Self::HttpResponse,
            Self::NetDevError,
            Self::DbQuery,
            Self::PoolAcquire,
            Self::PoolRelease,
            Self::PoolExhausted,
        ]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kernel TCP state name for tcp_state transition events.
pub fn tcp_state_str(state: u32) -> String {
    match state {
        1 => "ESTABLISHED".to_string(),
        2 => "SYN_SENT".to_string(),
        3 => "SYN_RECV".to_string(),
        4 => "FIN_WAIT1".to_string(),
        5 => "FIN_WAIT2".to_string(),
        6 => "TIME_WAIT".to_string(),
        7 => "CLOSE".to_string(),
        8 => "CLOSE_WAIT".to_string(),
        9 => "LAST_ACK".to_string(),
        10 => "LISTEN".to_string(),
        11 => "CLOSING".to_string(),
        12 => "NEW_SYN_RECV".to_string(),
        other => format!("UNKNOWN({other})"),
    }
}

/// A fully decoded, enriched event. Immutable once emitted by the ingester;
/// the collector owns events, trackers keep only derived state.
#[derive(Debug, Clone)]
pub struct Event {
    /// Monotonic nanoseconds since boot.
    pub timestamp_ns: u64,
    pub pid: u32,
    /// Thread id; 0 when the probe did not record one.
    pub tid: u32,
    /// Sanitized short process name; may be empty.
    pub process_name: String,
    pub event_type: EventType,
    /// Hostname, "host:port", file path, pool id, or `ino:<ino>/<dev>`.
    pub target: String,
    /// Measured operation duration; 0 for events without one.
    pub latency_ns: u64,
    /// 0 = success; negative values preserve the kernel's sign.
    pub error: i32,
    /// Byte count for I/O events.
    pub bytes: u64,
    /// Kernel stack instruction pointers, possibly empty.
    pub stack: Vec<u64>,
    /// TCP state for state-transition events.
    pub tcp_state: u32,
    /// File descriptor for open/close events.
    pub fd: u32,
}

impl Event {
    /// A zeroed event of the given type, for construction via struct update.
    pub fn of(event_type: EventType) -> Self {
        Self {
            timestamp_ns: 0,
            pid: 0,
            tid: 0,
            process_name: String::new(),
            event_type,
            target: String::new(),
            latency_ns: 0,
            error: 0,
            bytes: 0,
            stack: Vec::new(),
            tcp_state: 0,
            fd: 0,
        }
    }

    /// Measured latency as a Duration.
    pub fn latency(&self) -> Duration {
        Duration::from_nanos(self.latency_ns)
    }

    /// Measured latency in milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.latency_ns as f64 / 1e6
    }

    /// One-line human rendering, empty for events below interest thresholds.
    pub fn format_message(&self) -> String {
        let group = self.event_type.group_str();
        let target = truncate_string(&escape_percent(&self.target), MESSAGE_TARGET_MAX);
        let lat = self.latency_ms();

        match self.event_type {
            EventType::Dns => {
                if self.error != 0 {
                    format!("[{group}] lookup {target} failed: error {}", self.error)
                } else {
                    format!("[{group}] lookup {target} took {lat:.2}ms")
                }
            }
            EventType::Connect => {
                if self.error != 0 {
                    format!("[{group}] connect to {target} failed: error {}", self.error)
                } else if lat >= 1.0 {
                    format!("[{group}] connect to {target} took {lat:.2}ms")
                } else {
                    String::new()
                }
            }
            EventType::TcpSend | EventType::TcpRecv | EventType::UdpSend | EventType::UdpRecv => {
                let op = match self.event_type {
                    EventType::TcpSend => "TCP send",
                    EventType::TcpRecv => "TCP recv",
                    EventType::UdpSend => "UDP send",
                    _ => "UDP recv",
                };
                if self.error != 0 {
                    format!("[{group}] {op} error: {}", self.error)
                } else if lat > MESSAGE_SPIKE_MS {
                    format!("[{group}] {op} latency spike: {lat:.2}ms ({} bytes)", self.bytes)
                } else {
                    String::new()
                }
            }
            EventType::Read => {
                format!("[{group}] read() from {target} took {lat:.2}ms ({} bytes)", self.bytes)
            }
            EventType::Write => {
                format!("[{group}] write() to {target} took {lat:.2}ms ({} bytes)", self.bytes)
            }
            EventType::Fsync => {
                format!("[{group}] fsync() to {target} took {lat:.2}ms")
            }
            EventType::SchedSwitch => {
                format!("[{group}] thread blocked for {lat:.2}ms")
            }
            EventType::PageFault => format!("[{group}] page fault ({lat:.2}ms)"),
            EventType::OomKill => format!("[{group}] OOM kill: {target}"),
            EventType::TcpRetransmit => format!("[{group}] TCP retransmit to {target}"),
            EventType::TcpState => {
                format!("[{group}] TCP state -> {}", tcp_state_str(self.tcp_state))
            }
            EventType::LockContention => {
                format!("[{group}] mutex contention for {lat:.2}ms")
            }
            EventType::DbQuery => format!("[{group}] query took {lat:.2}ms"),
            EventType::PoolExhausted => {
                format!("[{group}] pool {target} exhausted (waited {lat:.2}ms)")
            }
            _ => String::new(),
        }
    }
}

/// Escape `%` so downstream format-string sinks render the text verbatim.
fn escape_percent(s: &str) -> String {
    s.replace('%', "%%")
}

/// Truncate to `max` bytes, appending `...` when there is room for it.
/// A non-positive `max` disables truncation.
fn truncate_string(s: &str, max: usize) -> String {
    if max == 0 || s.len() <= max {
        return s.to_string();
    }
    if max <= 3 {
        return s[..max].to_string();
    }
    format!("{}...", &s[..max - 3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_roundtrip() {
        for t in EventType::all() {
            assert_eq!(EventType::from_u32(*t as u32), Some(*t));
            assert_eq!(EventType::from_name(t.name()), Some(*t));
        }
        assert!(EventType::from_u32(0).is_none());
        assert!(EventType::from_u32(27).is_none());
        assert!(EventType::from_name("not_an_event").is_none());
    }

    #[test]
    fn test_group_str() {
        assert_eq!(EventType::Dns.group_str(), "DNS");
        assert_eq!(EventType::Connect.group_str(), "NET");
        assert_eq!(EventType::TcpRetransmit.group_str(), "NET");
        assert_eq!(EventType::NetDevError.group_str(), "NET");
        assert_eq!(EventType::Write.group_str(), "FS");
        assert_eq!(EventType::SchedSwitch.group_str(), "CPU");
        assert_eq!(EventType::PageFault.group_str(), "MEM");
        assert_eq!(EventType::OomKill.group_str(), "MEM");
        assert_eq!(EventType::HttpRequest.group_str(), "HTTP");
        assert_eq!(EventType::LockContention.group_str(), "LOCK");
        assert_eq!(EventType::DbQuery.group_str(), "DB");
        assert_eq!(EventType::Exec.group_str(), "PROC");
        assert_eq!(EventType::PoolAcquire.group_str(), "POOL");
    }

    #[test]
    fn test_tcp_state_str() {
        assert_eq!(tcp_state_str(1), "ESTABLISHED");
        assert_eq!(tcp_state_str(2), "SYN_SENT");
        assert_eq!(tcp_state_str(6), "TIME_WAIT");
        assert_eq!(tcp_state_str(12), "NEW_SYN_RECV");
        assert_eq!(tcp_state_str(99), "UNKNOWN(99)");
    }

    #[test]
    fn test_latency_conversions() {
        let e = Event {
            latency_ns: 5_000_000,
            ..Event::of(EventType::Dns)
        };
        assert_eq!(e.latency(), Duration::from_millis(5));
        assert_eq!(e.latency_ms(), 5.0);
    }

    #[test]
    fn test_format_message_dns() {
        let ok = Event {
            latency_ns: 5_000_000,
            target: "example.com".to_string(),
            ..Event::of(EventType::Dns)
        };
        assert_eq!(ok.format_message(), "[DNS] lookup example.com took 5.00ms");

        let failed = Event {
            latency_ns: 1_000_000,
            target: "invalid.com".to_string(),
            error: 1,
            ..Event::of(EventType::Dns)
        };
        assert_eq!(failed.format_message(), "[DNS] lookup invalid.com failed: error 1");
    }

    #[test]
    fn test_format_message_connect_thresholds() {
        let fast = Event {
            latency_ns: 500_000,
            target: "example.com:80".to_string(),
            ..Event::of(EventType::Connect)
        };
        assert_eq!(fast.format_message(), "");

        let slow = Event {
            latency_ns: 2_000_000,
            target: "example.com:80".to_string(),
            ..Event::of(EventType::Connect)
        };
        assert_eq!(slow.format_message(), "[NET] connect to example.com:80 took 2.00ms");

        let failed = Event {
            latency_ns: 1_000_000,
            target: "invalid.com:80".to_string(),
            error: 111,
            ..Event::of(EventType::Connect)
        };
        assert_eq!(
            failed.format_message(),
            "[NET] connect to invalid.com:80 failed: error 111"
        );
    }

    #[test]
    fn test_format_message_tcp() {
        let quiet = Event {
            latency_ns: 5_000_000,
            ..Event::of(EventType::TcpSend)
        };
        assert_eq!(quiet.format_message(), "");

        let spike = Event {
            latency_ns: 150_000_000,
            bytes: 1024,
            ..Event::of(EventType::TcpSend)
        };
        assert_eq!(
            spike.format_message(),
            "[NET] TCP send latency spike: 150.00ms (1024 bytes)"
        );

        let err = Event {
            latency_ns: 1_000_000,
            error: -1,
            ..Event::of(EventType::TcpSend)
        };
        assert_eq!(err.format_message(), "[NET] TCP send error: -1");
    }

    #[test]
    fn test_format_message_filesystem() {
        let read = Event {
            latency_ns: 2_000_000,
            target: "/tmp/file".to_string(),
            bytes: 4096,
            ..Event::of(EventType::Read)
        };
        assert_eq!(
            read.format_message(),
            "[FS] read() from /tmp/file took 2.00ms (4096 bytes)"
        );

        let write = Event {
            latency_ns: 3_000_000,
            target: "/tmp/file".to_string(),
            bytes: 2048,
            ..Event::of(EventType::Write)
        };
        assert_eq!(
            write.format_message(),
            "[FS] write() to /tmp/file took 3.00ms (2048 bytes)"
        );

        let fsync = Event {
            latency_ns: 1_000_000,
            target: "/tmp/file".to_string(),
            ..Event::of(EventType::Fsync)
        };
        assert_eq!(fsync.format_message(), "[FS] fsync() to /tmp/file took 1.00ms");
    }

    #[test]
    fn test_format_message_truncates_long_target() {
        let e = Event {
            latency_ns: 5_000_000,
            target: "a".repeat(300),
            ..Event::of(EventType::Dns)
        };
        let msg = e.format_message();
        assert!(msg.starts_with("[DNS] lookup "));
        assert!(msg.contains("..."));
        assert!(msg.len() < 300);
    }

    #[test]
    fn test_escape_percent() {
        assert_eq!(escape_percent("normal"), "normal");
        assert_eq!(escape_percent("with%percent"), "with%%percent");
        assert_eq!(escape_percent("multiple%%percent"), "multiple%%%%percent");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("exact", 5), "exact");
        assert_eq!(truncate_string("very long string", 10), "very lo...");
        assert_eq!(truncate_string("long", 3), "lon");
        assert_eq!(truncate_string("long", 1), "l");
        assert_eq!(truncate_string("long", 0), "long");
    }
}
