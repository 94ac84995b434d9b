//! Ring-buffer ingestion: decode, filter, enrich, sample, emit.
//!
//! The pipeline itself is synchronous and platform-independent; the async
//! ring-buffer reader that feeds it is gated behind the `bpf` feature. The
//! ingester never panics and never blocks on the destination channel: when
//! the collector cannot keep up, events are dropped and counted, because
//! kernel-side back-pressure risks stalling probed syscalls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cache::ProcessNameCache;
use crate::cgroup::filter::CgroupFilter;
use crate::diagnose::sampling::should_sample;
use crate::events::Event;
use crate::resolver::PathResolver;
use crate::tracer::error_handler::{CircuitBreaker, ErrorRateLimiter, SlidingWindow};
use crate::tracer::parse::{decode_record, DecodeError};

/// Decode failures within the sliding window that trip the breaker.
const BREAKER_ESCALATION_ERRORS: u64 = 100;

/// Sliding window geometry for decode failures.
const ERROR_WINDOW: Duration = Duration::from_secs(10);
const ERROR_WINDOW_BUCKETS: usize = 10;

/// Breaker tuning: failures to open, cool-down before half-open.
const BREAKER_THRESHOLD: u64 = 5;
const BREAKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Lock-free ingestion counters, flushed into logs at shutdown.
#[derive(Default)]
pub struct IngestStats {
    pub received: AtomicU64,
    pub emitted: AtomicU64,
    pub dropped_filter: AtomicU64,
    pub dropped_sampling: AtomicU64,
    pub dropped_backpressure: AtomicU64,
    pub decode_truncated: AtomicU64,
    pub decode_unknown_class: AtomicU64,
    pub decode_stack_truncated: AtomicU64,
}

impl IngestStats {
    fn record_decode_failure(&self, err: &DecodeError) {
        let counter = match err {
            DecodeError::Truncated { .. } => &self.decode_truncated,
            DecodeError::UnknownEventClass { .. } => &self.decode_unknown_class,
            DecodeError::StackTruncated { .. } => &self.decode_stack_truncated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_truncated.load(Ordering::Relaxed)
            + self.decode_unknown_class.load(Ordering::Relaxed)
            + self.decode_stack_truncated.load(Ordering::Relaxed)
    }
}

/// The per-record processing pipeline shared by the reader task.
pub struct EventPipeline {
    filter: Arc<CgroupFilter>,
    cache: Arc<ProcessNameCache>,
    resolver: Arc<PathResolver>,
    limiter: ErrorRateLimiter,
    window: SlidingWindow,
    breaker: CircuitBreaker,
    stats: IngestStats,
    event_count: AtomicU64,
    default_sampling_rate: u64,
}

impl EventPipeline {
    pub fn new(
        filter: Arc<CgroupFilter>,
        cache: Arc<ProcessNameCache>,
        resolver: Arc<PathResolver>,
        default_sampling_rate: u64,
    ) -> Self {
        Self {
            filter,
            cache,
            resolver,
            limiter: ErrorRateLimiter::new(),
            window: SlidingWindow::new(ERROR_WINDOW, ERROR_WINDOW_BUCKETS),
            breaker: CircuitBreaker::new(BREAKER_THRESHOLD, BREAKER_TIMEOUT),
            stats: IngestStats::default(),
            event_count: AtomicU64::new(0),
            default_sampling_rate,
        }
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Process one raw record: decode, filter to the target cgroup, enrich,
    /// sample, and emit. Failures are counted, never propagated.
    pub fn process(&self, data: &[u8], tx: &mpsc::Sender<Event>) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let mut event = match decode_record(data) {
            Ok(event) => event,
            Err(e) => {
                self.on_decode_failure(&e);
                return;
            }
        };
        self.breaker.record_success();

        if !self.filter.is_pid_in_cgroup(event.pid) {
            self.stats.dropped_filter.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Enrichment touches /proc; skip it while the breaker is open so a
        // failure storm cannot amplify itself. Draining continues either way.
        if self.breaker.can_proceed() {
            self.enrich(&mut event);
        }

        let count = self.event_count.fetch_add(1, Ordering::Relaxed) + 1;
        if !should_sample(&event, count, self.default_sampling_rate) {
            self.stats.dropped_sampling.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match tx.try_send(event) {
            Ok(()) => {
                self.stats.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self
                    .stats
                    .dropped_backpressure
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if self.limiter.should_log() {
                    tracing::warn!(dropped, "event channel full, dropping events");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Collector is gone; nothing useful left to do with events.
            }
        }
    }

    /// Best-effort enrichment: a missing process name is resolved through
    /// the cache, an inode-encoded target through the path resolver. The
    /// event is emitted regardless of how much of this succeeds.
    fn enrich(&self, event: &mut Event) {
        if event.process_name.is_empty() {
            event.process_name = self.cache.name_quick(event.pid);
        }

        if event.target.starts_with("ino:") {
            event.target = self.resolver.resolve_path(event.pid, &event.target);
        }
    }

    fn on_decode_failure(&self, err: &DecodeError) {
        self.stats.record_decode_failure(err);
        self.window.add_error();

        if self.window.error_rate() >= BREAKER_ESCALATION_ERRORS {
            self.breaker.record_failure();
        }

        if self.limiter.should_log() {
            tracing::warn!(
                error = %err,
                failures = self.stats.decode_failures(),
                "record decode failed"
            );
        }
    }
}

#[cfg(feature = "bpf")]
pub use reader::Ingester;

#[cfg(feature = "bpf")]
mod reader {
    use aya::maps::{MapData, RingBuf};
    use tokio::io::unix::AsyncFd;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::EventPipeline;
    use crate::events::Event;
    use crate::tracer::error_handler::{classify_error, ErrorCategory};

    /// Single-task ring-buffer reader. Runs until cancelled, then drains
    /// whatever the kernel already committed before returning.
    pub struct Ingester {
        ring: RingBuf<MapData>,
        pipeline: EventPipeline,
    }

    impl Ingester {
        pub fn new(ring: RingBuf<MapData>, pipeline: EventPipeline) -> Self {
            Self { ring, pipeline }
        }

        pub async fn run(self, cancel: CancellationToken, tx: mpsc::Sender<Event>) {
            let Self { ring, pipeline } = self;

            let mut async_fd = match AsyncFd::new(ring) {
                Ok(fd) => fd,
                Err(e) => {
                    tracing::error!(error = %e, "failed to register ring buffer fd");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = async_fd.readable_mut() => {
                        let mut guard = match result {
                            Ok(g) => g,
                            Err(e) => {
                                let err = anyhow::Error::from(e);
                                let category = classify_error(Some(&err));
                                tracing::warn!(
                                    error = %err,
                                    category = category.as_str(),
                                    "ring buffer poll error"
                                );
                                if category == ErrorCategory::Permanent {
                                    break;
                                }
                                continue;
                            }
                        };

                        let ring = guard.get_inner_mut();
                        while let Some(item) = ring.next() {
                            pipeline.process(&item, &tx);
                        }
                        guard.clear_ready();
                    }
                }
            }

            // Drain records committed before cancellation.
            let ring = async_fd.get_mut();
            while let Some(item) = ring.next() {
                pipeline.process(&item, &tx);
            }

            let stats = pipeline.stats();
            tracing::info!(
                received = stats.received.load(std::sync::atomic::Ordering::Relaxed),
                emitted = stats.emitted.load(std::sync::atomic::Ordering::Relaxed),
                dropped_filter = stats.dropped_filter.load(std::sync::atomic::Ordering::Relaxed),
                dropped_sampling = stats.dropped_sampling.load(std::sync::atomic::Ordering::Relaxed),
                dropped_backpressure =
                    stats.dropped_backpressure.load(std::sync::atomic::Ordering::Relaxed),
                decode_failures = stats.decode_failures(),
                "ingester stopped"
            );
        }
    }
}
