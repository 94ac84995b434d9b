//! Agent configuration.
//!
//! Loaded from an optional YAML file; every field has a default so a bare
//! `podscope --container-id ...` run needs no file at all. CLI flags
//! override file values in `main`.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Nanoseconds per millisecond, for latency conversions.
pub const NS_PER_MS: f64 = 1e6;

/// Default name of the pre-built probe object, looked up next to the binary.
pub const PROBE_OBJECT_NAME: &str = "podscope.bpf.o";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root of the cgroup filesystem. Default: /sys/fs/cgroup.
    #[serde(default = "default_cgroup_base")]
    pub cgroup_base: String,

    /// Root of the proc filesystem. Default: /proc. Overridable for tests.
    #[serde(default = "default_proc_base")]
    pub proc_base: String,

    /// Process-name cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Diagnosis thresholds.
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Event sampling fallback for classes without a fixed rate.
    #[serde(default = "default_sampling_rate")]
    pub default_sampling_rate: u64,

    /// Capacity of the ingester -> collector channel. Default: 8192.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Capture duration; 0 means run until interrupted. Default: 30s.
    #[serde(default = "default_capture_duration", with = "humantime_serde")]
    pub capture_duration: Duration,

    /// Bound on probe detach at shutdown. Default: 1s.
    #[serde(default = "default_detach_deadline", with = "humantime_serde")]
    pub detach_deadline: Duration,
}

/// Process-name cache tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached entries. Default: 1024.
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Entry time-to-live. Default: 60s.
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

/// Fraction of max the cache is evicted down to when full.
pub const CACHE_EVICTION_THRESHOLD: f64 = 0.9;

/// Diagnosis thresholds; all latencies in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// DNS error rate (percent) above which an issue is reported.
    #[serde(default = "default_error_rate")]
    pub error_rate_pct: f64,

    /// TCP latency above which an event counts as an RTT spike.
    #[serde(default = "default_rtt_spike")]
    pub rtt_spike_ms: f64,

    /// Filesystem latency above which an op counts as slow.
    #[serde(default = "default_fs_slow")]
    pub fs_slow_ms: f64,

    /// Slow filesystem ops above which an issue is reported.
    #[serde(default = "default_fs_slow_issue_count")]
    pub fs_slow_issue_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl: default_cache_ttl(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            error_rate_pct: default_error_rate(),
            rtt_spike_ms: default_rtt_spike(),
            fs_slow_ms: default_fs_slow(),
            fs_slow_issue_count: default_fs_slow_issue_count(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            cgroup_base: default_cgroup_base(),
            proc_base: default_proc_base(),
            cache: CacheConfig::default(),
            thresholds: ThresholdConfig::default(),
            default_sampling_rate: default_sampling_rate(),
            channel_capacity: default_channel_capacity(),
            capture_duration: default_capture_duration(),
            detach_deadline: default_detach_deadline(),
        }
    }
}

impl Config {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size == 0 {
            bail!("cache.max_size must be positive");
        }
        if self.cache.ttl.is_zero() {
            bail!("cache.ttl must be positive");
        }
        if self.channel_capacity == 0 {
            bail!("channel_capacity must be positive");
        }
        if self.default_sampling_rate == 0 {
            bail!("default_sampling_rate must be positive");
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cgroup_base() -> String {
    "/sys/fs/cgroup".to_string()
}

fn default_proc_base() -> String {
    "/proc".to_string()
}

fn default_cache_max_size() -> usize {
    1024
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_sampling_rate() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    8192
}

fn default_capture_duration() -> Duration {
    Duration::from_secs(30)
}

fn default_detach_deadline() -> Duration {
    Duration::from_secs(1)
}

fn default_error_rate() -> f64 {
    10.0
}

fn default_rtt_spike() -> f64 {
    100.0
}

fn default_fs_slow() -> f64 {
    10.0
}

fn default_fs_slow_issue_count() -> usize {
    10
}
