//! Decoding of raw ring-buffer records.
//!
//! The probe object writes fixed-layout records in native byte order; the
//! length check happens once up front, then fixed-width reads use unaligned
//! loads. The variable-length stack tail is validated separately.

use thiserror::Error;

use crate::events::{Event, EventType};
use crate::validation::sanitize_process_name;

/// Bytes in the fixed part of a record, up to the stack length field.
pub const FIXED_RECORD_SIZE: usize = 192;

/// Size of the NUL-terminated comm field.
pub const COMM_LEN: usize = 16;

/// Size of the NUL-terminated target field.
pub const TARGET_LEN: usize = 128;

/// Deepest kernel stack the probe object captures.
pub const MAX_STACK_DEPTH: usize = 32;

const OFF_TIMESTAMP: usize = 0;
const OFF_PID: usize = 8;
const OFF_TGID: usize = 12;
const OFF_COMM: usize = 16;
const OFF_EVENT_CLASS: usize = 32;
const OFF_ERROR: usize = 36;
const OFF_BYTES: usize = 40;
const OFF_LATENCY: usize = 48;
const OFF_FD: usize = 56;
const OFF_TARGET: usize = 60;
const OFF_STACK_LEN: usize = 188;

/// Errors produced while decoding a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record too short: {size} bytes")]
    Truncated { size: usize },

    #[error("unknown event class: {raw}")]
    UnknownEventClass { raw: u32 },

    #[error("stack truncated: record holds {have} of {want} frames")]
    StackTruncated { have: usize, want: usize },
}

impl DecodeError {
    /// Event class carried by the failing record, when it was readable.
    /// Lets the ingester keep per-class failure counters.
    pub fn event_class(&self) -> Option<u32> {
        match self {
            Self::UnknownEventClass { raw } => Some(*raw),
            _ => None,
        }
    }
}

/// Decode one raw ring-buffer record into an [`Event`].
pub fn decode_record(data: &[u8]) -> Result<Event, DecodeError> {
    if data.len() < FIXED_RECORD_SIZE {
        return Err(DecodeError::Truncated { size: data.len() });
    }

    let class_raw = read_u32(data, OFF_EVENT_CLASS);
    let event_type =
        EventType::from_u32(class_raw).ok_or(DecodeError::UnknownEventClass { raw: class_raw })?;

    let stack = decode_stack(data)?;

    Ok(Event {
        timestamp_ns: read_u64(data, OFF_TIMESTAMP),
        pid: read_u32(data, OFF_PID),
        tid: read_u32(data, OFF_TGID),
        process_name: sanitize_process_name(&read_cstr(data, OFF_COMM, COMM_LEN)),
        event_type,
        target: read_cstr(data, OFF_TARGET, TARGET_LEN),
        latency_ns: read_u64(data, OFF_LATENCY),
        error: read_u32(data, OFF_ERROR) as i32,
        bytes: read_u64(data, OFF_BYTES),
        stack,
        tcp_state: if event_type == EventType::TcpState {
            read_u32(data, OFF_FD)
        } else {
            0
        },
        fd: read_u32(data, OFF_FD),
    })
}

fn decode_stack(data: &[u8]) -> Result<Vec<u64>, DecodeError> {
    let claimed = read_u32(data, OFF_STACK_LEN) as usize;
    let depth = claimed.min(MAX_STACK_DEPTH);

    let available = (data.len() - FIXED_RECORD_SIZE) / 8;
    if available < depth {
        return Err(DecodeError::StackTruncated {
            have: available,
            want: depth,
        });
    }

    let mut stack = Vec::with_capacity(depth);
    for i in 0..depth {
        stack.push(read_u64(data, FIXED_RECORD_SIZE + i * 8));
    }
    Ok(stack)
}

// ---------------------------------------------------------------------------
// Byte-reading helpers (native byte order, bounds checked by the caller)
// ---------------------------------------------------------------------------

#[inline(always)]
fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(read_fixed::<4>(data, offset))
}

#[inline(always)]
fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_ne_bytes(read_fixed::<8>(data, offset))
}

#[inline(always)]
fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    debug_assert!(offset + N <= data.len());
    // Safety: every caller sits behind the FIXED_RECORD_SIZE / stack-depth
    // length checks at decode entry.
    unsafe { (data.as_ptr().add(offset) as *const [u8; N]).read_unaligned() }
}

/// Read a NUL-terminated string from a fixed-size field, lossily converting
/// invalid UTF-8.
fn read_cstr(data: &[u8], offset: usize, len: usize) -> String {
    let field = &data[offset..offset + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&field[..end]).into_owned()
}
