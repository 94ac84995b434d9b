//! Priority-based event sampling.
//!
//! Under load the ingester cannot keep every event; each class gets a
//! 1-in-N keep policy, while anything critical (errors, OOM kills, page
//! faults, device errors) is always kept.
//!
//! The modulo check runs against a single event counter shared by all
//! classes, so classes interleave against one sequence rather than each
//! keeping exactly every Nth of their own. Per-class counters would be more
//! faithful to "1-in-N per class"; the shared counter is retained for
//! deterministic, well-understood behavior.

use crate::events::{Event, EventType};

/// Event priority for sampling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Classify an event for sampling.
pub fn event_priority(event: &Event) -> Priority {
    if event.error != 0 {
        return Priority::Critical;
    }

    match event.event_type {
        EventType::OomKill | EventType::PageFault | EventType::NetDevError => Priority::Critical,
        EventType::TcpRetransmit | EventType::LockContention => Priority::High,
        EventType::Dns | EventType::Connect | EventType::HttpRequest | EventType::HttpResponse => {
            Priority::Normal
        }
        _ => Priority::Low,
    }
}

/// Fixed 1-in-N keep rate for a class; None for classes that fall back to
/// the configured default.
pub fn sampling_rate_for(event_type: EventType) -> Option<u64> {
    match event_type {
        EventType::OomKill | EventType::PageFault | EventType::NetDevError => Some(1),
        EventType::TcpRetransmit => Some(5),
        EventType::Dns => Some(10),
        EventType::Connect => Some(20),
        EventType::HttpRequest | EventType::HttpResponse => Some(30),
        EventType::TcpSend | EventType::TcpRecv | EventType::UdpSend | EventType::UdpRecv => {
            Some(50)
        }
        EventType::Write | EventType::Read | EventType::Fsync => Some(100),
        EventType::SchedSwitch => Some(200),
        EventType::LockContention => Some(50),
        EventType::DbQuery => Some(20),
        EventType::Exec | EventType::Fork => Some(10),
        EventType::Open => Some(100),
        EventType::Close => Some(200),
        EventType::TcpState => Some(100),
        _ => None,
    }
}

/// Keep decision for an event at the given position in the event sequence.
pub fn should_sample(event: &Event, event_count: u64, default_rate: u64) -> bool {
    if event_priority(event) == Priority::Critical {
        return true;
    }

    let rate = sampling_rate_for(event.event_type).unwrap_or(default_rate.max(1));
    event_count % rate == 0
}
