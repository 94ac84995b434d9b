//! Adaptive error reporting for the ingestion path.
//!
//! Three cooperating pieces keep a flood of ingestion failures from
//! overwhelming the agent: a rate limiter with exponential backoff decides
//! when an error is worth logging, a sliding window measures the recent
//! failure rate, and a circuit breaker stops enrichment work when the rate
//! stays pathological. Each failure domain owns its own instances.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Backoff factor ceiling.
const MAX_BACKOFF_FACTOR: u32 = 64;

/// Default floor between logged errors.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default ceiling between logged errors.
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Successes required to close a half-open breaker.
const HALF_OPEN_SUCCESSES: u64 = 3;

/// Coarse failure classification driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retry immediately with backoff.
    Transient,
    /// Retry under circuit-breaker supervision.
    Recoverable,
    /// Stop; retrying cannot help.
    Permanent,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Recoverable => "recoverable",
            Self::Permanent => "permanent",
        }
    }
}

/// Classify an error that crossed an opaque boundary by its text.
/// The absence of an error classifies as transient.
pub fn classify_error(err: Option<&anyhow::Error>) -> ErrorCategory {
    let Some(err) = err else {
        return ErrorCategory::Transient;
    };

    let text = format!("{err:#}");
    if text.contains("EAGAIN") || text.contains("temporary") {
        return ErrorCategory::Transient;
    }
    if text.contains("permission") || text.contains("denied") {
        return ErrorCategory::Permanent;
    }
    if text.contains("closed") || text.contains("EOF") {
        return ErrorCategory::Transient;
    }

    ErrorCategory::Recoverable
}

struct LimiterState {
    error_count: u64,
    last_log: Instant,
    backoff_factor: u32,
}

/// Log rate limiter with exponential backoff.
///
/// Every second permitted log doubles the backoff factor (capped), so a
/// persistent failure quickly settles at the maximum interval.
pub struct ErrorRateLimiter {
    state: Mutex<LimiterState>,
    min_interval: Duration,
    max_interval: Duration,
}

impl ErrorRateLimiter {
    pub fn new() -> Self {
        Self::with_intervals(DEFAULT_MIN_INTERVAL, DEFAULT_MAX_INTERVAL)
    }

    pub fn with_intervals(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                error_count: 0,
                last_log: Instant::now(),
                backoff_factor: 1,
            }),
            min_interval,
            max_interval,
        }
    }

    /// True when enough time has passed since the last permitted log.
    /// Advancing the clock and growing the backoff happen here.
    pub fn should_log(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let interval = (self.min_interval * state.backoff_factor).min(self.max_interval);
        let now = Instant::now();
        if now.duration_since(state.last_log) < interval {
            return false;
        }

        state.last_log = now;
        state.error_count += 1;
        if state.error_count % 2 == 0 {
            state.backoff_factor = (state.backoff_factor * 2).min(MAX_BACKOFF_FACTOR);
        }
        true
    }

    /// Reset the backoff after a recovery.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.backoff_factor = 1;
    }

    #[cfg(test)]
    fn rewind_last_log(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_log = Instant::now() - by;
    }

    #[cfg(test)]
    fn backoff_factor(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .backoff_factor
    }
}

impl Default for ErrorRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct TimeBucket {
    count: u64,
    opened_at: Instant,
}

/// Error counter over a fixed trailing window.
///
/// Errors coalesce into the newest bucket while it is younger than one
/// bucket width (window / capacity), bounding memory; stale buckets are
/// discarded on every add and query.
pub struct SlidingWindow {
    state: Mutex<Vec<TimeBucket>>,
    window: Duration,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(Vec::with_capacity(capacity)),
            window,
            capacity: capacity.max(1),
        }
    }

    pub fn add_error(&self) {
        let now = Instant::now();
        let bucket_width = self.window / self.capacity as u32;
        let mut buckets = self.state.lock().unwrap_or_else(|e| e.into_inner());

        buckets.retain(|b| now.duration_since(b.opened_at) < self.window);

        match buckets.last_mut() {
            Some(last) if now.duration_since(last.opened_at) < bucket_width => {
                last.count += 1;
            }
            _ => buckets.push(TimeBucket {
                count: 1,
                opened_at: now,
            }),
        }
    }

    /// Total errors within the window.
    pub fn error_rate(&self) -> u64 {
        let now = Instant::now();
        let mut buckets = self.state.lock().unwrap_or_else(|e| e.into_inner());
        buckets.retain(|b| now.duration_since(b.opened_at) < self.window);
        buckets.iter().map(|b| b.count).sum()
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u64,
    success_count: u64,
    last_failure: Option<Instant>,
}

/// Circuit breaker over a failure domain.
///
/// Closed counts failures and opens at the threshold. Open admits nothing
/// until the timeout has elapsed since the last failure; the open →
/// half-open transition happens lazily inside [`Self::can_proceed`].
/// Half-open admits probes and closes after three consecutive successes.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u64,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u64, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
            }),
            threshold,
            timeout,
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        if inner.failure_count >= self.threshold {
            inner.state = BreakerState::Open;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.success_count += 1;
        if inner.state == BreakerState::HalfOpen && inner.success_count >= HALF_OPEN_SUCCESSES {
            inner.state = BreakerState::Closed;
            inner.failure_count = 0;
            inner.success_count = 0;
        }
    }

    pub fn can_proceed(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let timed_out = inner
                    .last_failure
                    .is_some_and(|at| at.elapsed() >= self.timeout);
                if timed_out {
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count = 0;
                    return true;
                }
                false
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }
}
