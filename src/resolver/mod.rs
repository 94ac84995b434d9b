//! Inode-to-path resolution for VFS events.
//!
//! The probe object often knows only the inode and device of a file at
//! capture time and encodes the target as `ino:<ino>/<dev>`. This resolver
//! turns that back into a real path by remembering observed opens and, as a
//! last resort, scanning the owning process's fd table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Environment override for the fd-scan bound.
const MAX_FD_CHECKS_ENV: &str = "PODSCOPE_PATH_MAX_FD_CHECKS";

/// Default number of fd links stat'ed per resolution attempt.
const DEFAULT_MAX_FD_CHECKS: usize = 100;

/// An fd record older than this cannot be paired with an inode; the fd has
/// likely been reused.
const FD_CORRELATION_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedPath {
    path: String,
    recorded_at: Instant,
}

#[derive(Default)]
struct ResolverState {
    /// (pid, ino, dev) -> path; positive resolutions only.
    resolved: HashMap<(u32, u64, u64), String>,
    /// "ino:<ino>/<dev>" -> path.
    inode_to_path: HashMap<String, CachedPath>,
    /// pid -> fd -> path.
    pid_fd_to_path: HashMap<u32, HashMap<u32, CachedPath>>,
    /// pid -> fd -> inode key.
    pid_fd_to_inode: HashMap<u32, HashMap<u32, String>>,
}

/// Resolver over the three open-file mappings; a single read-write lock
/// protects all of them.
pub struct PathResolver {
    state: RwLock<ResolverState>,
    proc_base: PathBuf,
    max_checks: usize,
    ttl: Duration,
}

impl PathResolver {
    pub fn new(ttl: Duration) -> Self {
        Self::with_proc_base(ttl, "/proc")
    }

    pub fn with_proc_base(ttl: Duration, proc_base: impl Into<PathBuf>) -> Self {
        let max_checks = std::env::var(MAX_FD_CHECKS_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_FD_CHECKS);

        Self {
            state: RwLock::new(ResolverState::default()),
            proc_base: proc_base.into(),
            max_checks,
            ttl,
        }
    }

    /// Resolve an `ino:<ino>/<dev>` target to a path. Non-inode targets and
    /// unresolvable inodes are returned unchanged.
    pub fn resolve_path(&self, pid: u32, target: &str) -> String {
        let Some((ino, dev)) = parse_inode_target(target) else {
            return target.to_string();
        };

        {
            let state = self.read();
            if let Some(cached) = state.inode_to_path.get(target) {
                if cached.recorded_at.elapsed() < self.ttl {
                    return cached.path.clone();
                }
            }
            if let Some(path) = state.resolved.get(&(pid, ino, dev)) {
                return path.clone();
            }
        }

        let path = self.scan_fd_table(pid, ino, dev);
        if path.is_empty() {
            return target.to_string();
        }

        let mut state = self.write();
        state.resolved.insert((pid, ino, dev), path.clone());
        state.inode_to_path.insert(
            target.to_string(),
            CachedPath {
                path: path.clone(),
                recorded_at: Instant::now(),
            },
        );
        path
    }

    /// Record an observed open with a known inode. Populates both the
    /// inode-keyed and the {pid, fd}-keyed mappings.
    pub fn record_open(&self, pid: u32, fd: u32, path: &str, ino: u64, dev: u64) {
        if path.is_empty() {
            return;
        }

        let now = Instant::now();
        let inode_key = inode_key(ino, dev);
        let mut state = self.write();

        state.inode_to_path.insert(
            inode_key.clone(),
            CachedPath {
                path: path.to_string(),
                recorded_at: now,
            },
        );
        state.pid_fd_to_path.entry(pid).or_default().insert(
            fd,
            CachedPath {
                path: path.to_string(),
                recorded_at: now,
            },
        );
        state
            .pid_fd_to_inode
            .entry(pid)
            .or_default()
            .insert(fd, inode_key);
    }

    /// Record an observed open before the inode is known.
    pub fn record_open_by_fd(&self, pid: u32, fd: u32, path: &str) {
        if path.is_empty() {
            return;
        }

        let mut state = self.write();
        state.pid_fd_to_path.entry(pid).or_default().insert(
            fd,
            CachedPath {
                path: path.to_string(),
                recorded_at: Instant::now(),
            },
        );
    }

    /// Pair a prior [`Self::record_open_by_fd`] entry with its inode. A
    /// no-op when no fd record exists or it is older than the correlation
    /// window.
    pub fn correlate_fd_with_inode(&self, pid: u32, fd: u32, ino: u64, dev: u64) {
        let mut state = self.write();

        let Some(cached) = state
            .pid_fd_to_path
            .get(&pid)
            .and_then(|fds| fds.get(&fd))
            .cloned()
        else {
            return;
        };

        if cached.recorded_at.elapsed() > FD_CORRELATION_WINDOW {
            return;
        }

        let inode_key = inode_key(ino, dev);
        state.inode_to_path.insert(
            inode_key.clone(),
            CachedPath {
                path: cached.path,
                recorded_at: Instant::now(),
            },
        );
        state
            .pid_fd_to_inode
            .entry(pid)
            .or_default()
            .insert(fd, inode_key);
    }

    /// Drop all mappings atomically.
    pub fn clear(&self) {
        *self.write() = ResolverState::default();
    }

    /// Remove entries past TTL. A per-process fd map that becomes empty
    /// removes both of its parent entries.
    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        let mut state = self.write();

        state
            .inode_to_path
            .retain(|_, cached| cached.recorded_at.elapsed() <= ttl);

        let mut emptied: Vec<u32> = Vec::new();
        for (pid, fds) in state.pid_fd_to_path.iter_mut() {
            fds.retain(|_, cached| cached.recorded_at.elapsed() <= ttl);
            if fds.is_empty() {
                emptied.push(*pid);
            }
        }
        for pid in emptied {
            state.pid_fd_to_path.remove(&pid);
            state.pid_fd_to_inode.remove(&pid);
        }
    }

    fn is_process_alive(&self, pid: u32) -> bool {
        self.proc_base.join(pid.to_string()).exists()
    }

    /// Walk `/proc/<pid>/fd`, stat up to `max_checks` links, and return the
    /// first path whose (inode, device) matches. Empty string on a miss.
    #[cfg(unix)]
    fn scan_fd_table(&self, pid: u32, ino: u64, dev: u64) -> String {
        use std::os::unix::fs::MetadataExt;

        if !self.is_process_alive(pid) {
            return String::new();
        }

        let fd_dir = self.proc_base.join(pid.to_string()).join("fd");
        let Ok(entries) = std::fs::read_dir(&fd_dir) else {
            return String::new();
        };

        let mut checked = 0usize;
        for entry in entries.flatten() {
            if checked >= self.max_checks {
                break;
            }
            if entry.file_name().to_string_lossy().parse::<u32>().is_err() {
                continue;
            }
            checked += 1;

            let Ok(link) = std::fs::read_link(entry.path()) else {
                continue;
            };
            let link = if link.is_absolute() {
                link
            } else {
                fd_dir.join(link)
            };

            let Ok(meta) = std::fs::metadata(&link) else {
                continue;
            };
            if meta.ino() == ino && meta.dev() == dev {
                return link.to_string_lossy().into_owned();
            }
        }

        String::new()
    }

    #[cfg(not(unix))]
    fn scan_fd_table(&self, _pid: u32, _ino: u64, _dev: u64) -> String {
        String::new()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ResolverState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ResolverState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build the canonical inode key used by the probe encoding.
fn inode_key(ino: u64, dev: u64) -> String {
    format!("ino:{ino}/{dev}")
}

/// Parse `ino:<ino>/<dev>`; None for anything else.
fn parse_inode_target(target: &str) -> Option<(u64, u64)> {
    let rest = target.strip_prefix("ino:")?;
    let (ino, dev) = rest.split_once('/')?;
    Some((ino.parse().ok()?, dev.parse().ok()?))
}
