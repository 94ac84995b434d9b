//! Cgroup membership filtering for captured events.
//!
//! The probe object reports events for the whole host; this filter keeps
//! only PIDs that belong to the target cgroup, with a bounded membership
//! cache so the /proc read happens once per PID.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::validation::validate_pid;

/// Prefix stripped during normalization.
const CGROUP_MOUNT_PREFIX: &str = "/sys/fs/cgroup";

/// Maximum PID-membership cache population.
const PID_CACHE_MAX: usize = 10_000;

/// Fraction of entries removed when the cache is full.
const PID_CACHE_EVICT_FRACTION: usize = 10;

/// Normalize a cgroup path for comparison: strip the mount prefix and any
/// trailing slash. The root path and the empty path both normalize to "".
/// Idempotent.
pub fn normalize_cgroup_path(path: &str) -> String {
    let stripped = path.strip_prefix(CGROUP_MOUNT_PREFIX).unwrap_or(path);
    let trimmed = stripped.trim_end_matches('/');
    if trimmed == "/" {
        return String::new();
    }
    trimmed.to_string()
}

/// Extract the cgroup path from `/proc/<pid>/cgroup` content.
///
/// Handles both v2 (`0::/path`) and v1 (`N:controllers:/path`) line shapes.
/// Lines naming a kubepods scope win over other hierarchies.
pub fn extract_cgroup_path_from_proc(content: &str) -> String {
    let mut first = String::new();

    for line in content.lines() {
        let mut parts = line.splitn(3, ':');
        let (Some(_), Some(_), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if !path.starts_with('/') {
            continue;
        }

        if path.contains("kubepods") {
            return path.to_string();
        }
        if first.is_empty() {
            first = path.to_string();
        }
    }

    first
}

#[derive(Debug, Clone, Copy)]
struct CachedMembership {
    member: bool,
    last_used: u64,
}

/// PID-to-cgroup membership filter with a bounded LRU cache.
pub struct CgroupFilter {
    proc_base: PathBuf,
    /// Normalized target path; empty accepts all PIDs.
    target: String,
    state: Mutex<FilterCache>,
}

struct FilterCache {
    entries: HashMap<u32, CachedMembership>,
    clock: u64,
}

impl CgroupFilter {
    /// Create a filter for the given target cgroup path (raw, pre-normalization).
    pub fn new(proc_base: impl Into<PathBuf>, cgroup_path: &str) -> Self {
        Self {
            proc_base: proc_base.into(),
            target: normalize_cgroup_path(cgroup_path),
            state: Mutex::new(FilterCache {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// True if the PID belongs to the target cgroup.
    ///
    /// An empty target accepts everything. Invalid PIDs are rejected without
    /// a /proc read and cached as negative like any other miss.
    pub fn is_pid_in_cgroup(&self, pid: u32) -> bool {
        if self.target.is_empty() {
            return true;
        }

        if !validate_pid(pid) {
            self.remember(pid, false);
            return false;
        }

        if let Some(member) = self.lookup(pid) {
            return member;
        }

        let member = self.check_proc(pid);
        self.remember(pid, member);
        member
    }

    fn check_proc(&self, pid: u32) -> bool {
        let path = self.proc_base.join(pid.to_string()).join("cgroup");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return false;
        };

        let extracted = normalize_cgroup_path(&extract_cgroup_path_from_proc(&content));
        if extracted.is_empty() {
            return false;
        }

        extracted == self.target
            || (extracted.starts_with("/kubepods") && extracted.starts_with(&self.target))
    }

    fn lookup(&self, pid: u32) -> Option<bool> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clock += 1;
        let clock = state.clock;
        let entry = state.entries.get_mut(&pid)?;
        entry.last_used = clock;
        Some(entry.member)
    }

    fn remember(&self, pid: u32, member: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clock += 1;
        let clock = state.clock;

        if state.entries.len() >= PID_CACHE_MAX && !state.entries.contains_key(&pid) {
            evict_least_recent(&mut state.entries);
        }

        state.entries.insert(
            pid,
            CachedMembership {
                member,
                last_used: clock,
            },
        );
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }
}

/// Remove the least-recently-used tenth of the cache.
fn evict_least_recent(entries: &mut HashMap<u32, CachedMembership>) {
    let evict = (entries.len() / PID_CACHE_EVICT_FRACTION).max(1);
    let mut by_age: Vec<(u32, u64)> = entries.iter().map(|(p, e)| (*p, e.last_used)).collect();
    by_age.sort_unstable_by_key(|(_, used)| *used);
    for (pid, _) in by_age.into_iter().take(evict) {
        entries.remove(&pid);
    }
}
