//! Bounded process-name cache with TTL and LRU eviction.
//!
//! PID-to-name lookups hit /proc on a miss, which is too slow for the
//! per-event enrichment path; this cache bounds both staleness (TTL) and
//! population (LRU eviction down to an eviction threshold).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::{CacheConfig, CACHE_EVICTION_THRESHOLD};
use crate::validation::{sanitize_process_name, validate_pid};

const NIL: usize = usize::MAX;

struct Entry {
    pid: u32,
    name: String,
    expires_at: Instant,
    prev: usize,
    next: usize,
}

/// Map + intrusive doubly linked recency list. The map and list always have
/// identical membership; `head` is most recently used, `tail` least.
struct CacheInner {
    map: HashMap<u32, usize>,
    slots: Vec<Entry>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl CacheInner {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn remove(&mut self, idx: usize) {
        self.unlink(idx);
        let pid = self.slots[idx].pid;
        self.map.remove(&pid);
        self.slots[idx].name = String::new();
        self.free.push(idx);
    }

    fn insert_front(&mut self, pid: u32, name: String, expires_at: Instant) {
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Entry {
                    pid,
                    name,
                    expires_at,
                    prev: NIL,
                    next: NIL,
                };
                idx
            }
            None => {
                self.slots.push(Entry {
                    pid,
                    name,
                    expires_at,
                    prev: NIL,
                    next: NIL,
                });
                self.slots.len() - 1
            }
        };
        self.push_front(idx);
        self.map.insert(pid, idx);
    }
}

/// TTL + LRU process-name cache.
///
/// All operations take the single internal mutex; the recency list is not
/// safe for traversal under shared access. PID validation stays lock-free.
pub struct ProcessNameCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
    ttl: Duration,
    proc_base: PathBuf,
    cancel: CancellationToken,
}

impl ProcessNameCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_proc_base(max_size, ttl, "/proc")
    }

    pub fn with_proc_base(max_size: usize, ttl: Duration, proc_base: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(CacheInner::new()),
            max_size,
            ttl,
            proc_base: proc_base.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Cached name for the PID. A hit moves the entry to the recency front;
    /// an expired entry is deleted and reported as a miss.
    pub fn get(&self, pid: u32) -> Option<String> {
        if !validate_pid(pid) {
            return None;
        }

        let mut inner = self.lock();
        let idx = *inner.map.get(&pid)?;
        if Instant::now() >= inner.slots[idx].expires_at {
            inner.remove(idx);
            return None;
        }

        inner.move_to_front(idx);
        Some(inner.slots[idx].name.clone())
    }

    /// Insert or refresh a name. Inserting at capacity evicts from the LRU
    /// tail until population drops below the eviction threshold.
    pub fn set(&self, pid: u32, name: &str) {
        if !validate_pid(pid) {
            return;
        }

        let expires_at = Instant::now() + self.ttl;
        let mut inner = self.lock();

        if let Some(&idx) = inner.map.get(&pid) {
            inner.slots[idx].name = name.to_string();
            inner.slots[idx].expires_at = expires_at;
            inner.move_to_front(idx);
            return;
        }

        if inner.len() >= self.max_size {
            let target = (self.max_size as f64 * CACHE_EVICTION_THRESHOLD) as usize;
            while inner.len() >= target {
                let tail = inner.tail;
                if tail == NIL {
                    break;
                }
                inner.remove(tail);
            }
        }

        inner.insert_front(pid, name.to_string(), expires_at);
    }

    /// Remove every expired entry.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired: Vec<usize> = inner
            .map
            .values()
            .copied()
            .filter(|&idx| now >= inner.slots[idx].expires_at)
            .collect();

        for idx in expired {
            inner.remove(idx);
        }
    }

    /// Spawn the periodic cleanup task (every TTL/2) on the current runtime.
    /// The task exits when [`Self::close`] is called.
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let cancel = self.cancel.clone();
        let period = (self.ttl / 2).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => cache.cleanup_expired(),
                }
            }
        })
    }

    /// Stop the cleanup task.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Current population.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached name for the PID, falling back to /proc and caching the
    /// sanitized result. Invalid PIDs yield an empty string.
    pub fn name_quick(&self, pid: u32) -> String {
        if !validate_pid(pid) {
            return String::new();
        }

        if let Some(name) = self.get(pid) {
            return name;
        }

        let name = lookup_process_name(&self.proc_base, pid);
        let sanitized = sanitize_process_name(&name);
        self.set(pid, &sanitized);
        sanitized
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolve a process name from /proc, trying in order: cmdline argv[0]
/// basename, stat comm (between the first `(` and last `)`), comm, exe
/// symlink basename, status `Name:` line. Best-effort; returns "" when
/// nothing matches.
pub fn lookup_process_name(proc_base: &Path, pid: u32) -> String {
    let pid_dir = proc_base.join(pid.to_string());

    if let Ok(raw) = std::fs::read(pid_dir.join("cmdline")) {
        if let Some(first) = raw.split(|&b| b == 0).next() {
            if !first.is_empty() {
                let arg0 = String::from_utf8_lossy(first);
                let base = arg0.rsplit('/').next().unwrap_or(&arg0);
                if !base.is_empty() {
                    return base.to_string();
                }
            }
        }
    }

    if let Ok(stat) = std::fs::read_to_string(pid_dir.join("stat")) {
        if let (Some(start), Some(end)) = (stat.find('('), stat.rfind(')')) {
            if end > start {
                return stat[start + 1..end].to_string();
            }
        }
    }

    if let Ok(comm) = std::fs::read_to_string(pid_dir.join("comm")) {
        let trimmed = comm.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Ok(link) = std::fs::read_link(pid_dir.join("exe")) {
        if let Some(base) = link.file_name() {
            return base.to_string_lossy().into_owned();
        }
    }

    if let Ok(status) = std::fs::read_to_string(pid_dir.join("status")) {
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("Name:") {
                let name = rest.trim();
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }

    String::new()
}

// ---------------------------------------------------------------------------
// Process-wide cache with explicit lifecycle
// ---------------------------------------------------------------------------

static GLOBAL_CACHE: OnceLock<Mutex<Option<Arc<ProcessNameCache>>>> = OnceLock::new();

fn global_cell() -> &'static Mutex<Option<Arc<ProcessNameCache>>> {
    GLOBAL_CACHE.get_or_init(|| Mutex::new(None))
}

/// Install the process-wide cache. Closes any previous instance.
pub fn init_global_cache(cfg: &CacheConfig, proc_base: &str) -> Arc<ProcessNameCache> {
    let cache = Arc::new(ProcessNameCache::with_proc_base(
        cfg.max_size,
        cfg.ttl,
        proc_base,
    ));
    set_global_cache(Arc::clone(&cache));
    cache
}

/// Replace the process-wide cache, e.g. with a test instance.
pub fn set_global_cache(cache: Arc<ProcessNameCache>) {
    let mut cell = global_cell().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(old) = cell.take() {
        old.close();
    }
    *cell = Some(cache);
}

/// Close and rebuild the process-wide cache with the given settings.
pub fn reset_global_cache(cfg: &CacheConfig, proc_base: &str) -> Arc<ProcessNameCache> {
    init_global_cache(cfg, proc_base)
}

/// The process-wide cache; installs a default-configured one on first use.
pub fn global_cache() -> Arc<ProcessNameCache> {
    let mut cell = global_cell().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(cache) = cell.as_ref() {
        return Arc::clone(cache);
    }
    let cache = Arc::new(ProcessNameCache::new(
        CacheConfig::default().max_size,
        CacheConfig::default().ttl,
    ));
    *cell = Some(Arc::clone(&cache));
    cache
}

/// Quick PID-to-name lookup through the process-wide cache.
pub fn process_name_quick(pid: u32) -> String {
    global_cache().name_quick(pid)
}
